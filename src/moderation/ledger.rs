//! Warning ledger
//!
//! Thin layer over [`ModerationStore`] that owns the warning semantics: counts
//! come back from the same atomic operation that wrote the row, revocation
//! removes the newest warning only, and a chat without a policy uses the
//! default threshold.

use crate::moderation::error::{ModerationError, ModerationResult};
use crate::store::{DEFAULT_WARNING_THRESHOLD, ModerationStore, Warning, WarningTally};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct WarningLedger {
    store: Arc<dyn ModerationStore>,
}

impl WarningLedger {
    pub fn new(store: Arc<dyn ModerationStore>) -> Self {
        Self { store }
    }

    /// Record a warning and return the pair's total, the new one included
    pub async fn add_warning(
        &self,
        chat_id: u64,
        user_id: u64,
        admin_id: u64,
        reason: Option<String>,
    ) -> ModerationResult<u32> {
        let threshold = self.get_threshold(chat_id).await?;
        let tally = self
            .record_warning(chat_id, user_id, admin_id, reason, threshold)
            .await?;
        Ok(tally.count)
    }

    /// Record a warning against `threshold`. The tally says whether this
    /// warning is the one that crossed it.
    pub async fn record_warning(
        &self,
        chat_id: u64,
        user_id: u64,
        admin_id: u64,
        reason: Option<String>,
        threshold: u32,
    ) -> ModerationResult<WarningTally> {
        let warning = Warning::new(chat_id, user_id, admin_id, reason);
        debug!(%warning, "Recording warning");
        let warning_id = warning.id.clone();
        let tally = self
            .store
            .insert_warning_and_count(warning, threshold)
            .await?;
        info!(
            chat_id,
            user_id,
            admin_id,
            %warning_id,
            count = tally.count,
            threshold,
            crossed = tally.crossed,
            "Warning recorded"
        );
        Ok(tally)
    }

    /// Let the next warning at or above the threshold cross it again
    pub async fn reset_escalation(&self, chat_id: u64, user_id: u64) -> ModerationResult<()> {
        Ok(self.store.reset_escalation(chat_id, user_id).await?)
    }

    /// Delete the newest warning and return how many remain
    ///
    /// # Errors
    /// [`ModerationError::NoWarningFound`] when the pair has no warnings.
    pub async fn remove_latest_warning(&self, chat_id: u64, user_id: u64) -> ModerationResult<u32> {
        match self.store.remove_latest_warning(chat_id, user_id).await? {
            Some((removed, remaining)) => {
                info!(chat_id, user_id, warning_id = %removed.id, remaining, "Warning removed");
                Ok(remaining)
            }
            None => Err(ModerationError::NoWarningFound),
        }
    }

    pub async fn count_warnings(&self, chat_id: u64, user_id: u64) -> ModerationResult<u32> {
        Ok(self.store.count_warnings(chat_id, user_id).await?)
    }

    /// Newest first
    pub async fn list_warnings(&self, chat_id: u64, user_id: u64) -> ModerationResult<Vec<Warning>> {
        Ok(self.store.list_warnings(chat_id, user_id).await?)
    }

    /// The chat's auto-ban threshold
    pub async fn get_threshold(&self, chat_id: u64) -> ModerationResult<u32> {
        Ok(self
            .store
            .get_policy(chat_id)
            .await?
            .map_or(DEFAULT_WARNING_THRESHOLD, |policy| policy.warning_threshold))
    }
}

impl std::fmt::Debug for WarningLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarningLedger").finish_non_exhaustive()
    }
}
