//! Who may issue moderation commands

use crate::moderation::platform::ChatPlatform;
use std::sync::Arc;
use tracing::{debug, warn};

/// Decides whether an identity may moderate a chat
#[derive(Clone)]
pub struct Authorizer {
    owner_id: u64,
    platform: Arc<dyn ChatPlatform>,
}

impl Authorizer {
    pub fn new(owner_id: u64, platform: Arc<dyn ChatPlatform>) -> Self {
        Self { owner_id, platform }
    }

    /// Is this the configured system owner
    #[must_use]
    pub fn is_owner(&self, user_id: u64) -> bool {
        user_id == self.owner_id
    }

    /// The owner is always authorized. Anyone else must be an administrator or
    /// owner of the chat. A failed lookup denies.
    pub async fn is_authorized(&self, chat_id: u64, user_id: u64) -> bool {
        if self.is_owner(user_id) {
            return true;
        }

        match self.platform.get_chat_member(chat_id, user_id).await {
            Ok(role) => {
                debug!(chat_id, user_id, %role, "Resolved issuer role");
                role.is_privileged()
            }
            Err(e) => {
                warn!(chat_id, user_id, error = %e, "Membership lookup failed, denying");
                false
            }
        }
    }

    /// Whether the bot itself can moderate the chat
    pub async fn bot_has_admin_rights(&self, chat_id: u64) -> bool {
        let bot_id = self.platform.bot_user_id();
        match self.platform.get_chat_member(chat_id, bot_id).await {
            Ok(role) => role.is_privileged(),
            Err(e) => {
                warn!(chat_id, bot_id, error = %e, "Failed to look up bot membership");
                false
            }
        }
    }
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer")
            .field("owner_id", &self.owner_id)
            .finish_non_exhaustive()
    }
}
