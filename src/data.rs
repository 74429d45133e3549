use std::{ops::Deref, sync::Arc};

use poise::serenity_prelude as serenity;
use serenity::prelude::TypeMapKey;

use crate::moderation::ModerationEngine;
use crate::store::{StoreResult, YamlStore};

/// Centralized data structure for the bot
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

// Implement TypeMapKey for Data so event handlers can reach it through Serenity's data map
impl TypeMapKey for Data {
    type Value = Data;
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("store", &self.store)
            .field("engine", &self.engine)
            .finish()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Data {
    #[must_use]
    pub fn new(store: YamlStore, engine: ModerationEngine) -> Self {
        Self(Arc::new(DataInner { store, engine }))
    }

    /// Flush every table to disk
    /// # Errors
    /// Returns an error if a table cannot be serialized or written.
    pub async fn save(&self) -> StoreResult<()> {
        self.store.save().await
    }
}

pub struct DataInner {
    pub store: YamlStore,
    pub engine: ModerationEngine,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::ThrottleGuard;
    use crate::moderation::testing::{FakePlatform, RecordingNotifier};

    fn data() -> Data {
        let store = YamlStore::in_memory();
        let engine = ModerationEngine::new(
            Arc::new(FakePlatform::new()),
            Arc::new(store.clone()),
            Arc::new(RecordingNotifier::default()),
            1,
            ThrottleGuard::default(),
        );
        Data::new(store, engine)
    }

    #[test]
    fn test_data_debug_impl() {
        let debug_output = format!("{:?}", data());
        assert!(debug_output.contains("Data"));
        assert!(debug_output.contains("store"));
        assert!(debug_output.contains("engine"));
    }

    #[tokio::test]
    async fn test_in_memory_save_is_noop() {
        assert!(data().save().await.is_ok());
    }

    #[test]
    fn test_clone_shares_state() {
        let data = data();
        let other = data.clone();
        assert!(Arc::ptr_eq(&data.0, &other.0));
    }
}
