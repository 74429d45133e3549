//! Durable storage for warnings, chat policies and audit records
//!
//! The moderation engine only talks to storage through [`ModerationStore`], so
//! the backing engine can be swapped without touching command handling.

mod models;
mod yaml;

pub use models::{
    AuditRecord, ChatPolicy, DEFAULT_WARNING_THRESHOLD, PolicyUpdate, SYSTEM_ADMIN_ID, Warning,
};
pub use yaml::YamlStore;

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by a storage backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing a data file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A data file could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of recording a warning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarningTally {
    /// Warnings now held for the pair, the new one included
    pub count: u32,
    /// This warning is the first to reach the threshold since the pair was
    /// last below it. At most one concurrent insert sees `true`.
    pub crossed: bool,
}

/// Storage collaborator for the moderation engine
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModerationStore: Send + Sync {
    /// Persist a warning and return the number of warnings now held for its
    /// (chat, user) pair, plus whether this insert crossed `threshold`. No
    /// other write for the same pair may interleave between the insert, the
    /// count and the crossing decision. A failed write leaves no trace.
    async fn insert_warning_and_count(
        &self,
        warning: Warning,
        threshold: u32,
    ) -> StoreResult<WarningTally>;

    /// Forget that the pair crossed its threshold, so the next warning at or
    /// above it crosses again
    async fn reset_escalation(&self, chat_id: u64, user_id: u64) -> StoreResult<()>;

    /// Delete the most recently created warning for the pair and return it with
    /// the remaining count, or `None` when the pair has no warnings. Dropping
    /// below the threshold the pair crossed clears the crossing.
    async fn remove_latest_warning(
        &self,
        chat_id: u64,
        user_id: u64,
    ) -> StoreResult<Option<(Warning, u32)>>;

    async fn count_warnings(&self, chat_id: u64, user_id: u64) -> StoreResult<u32>;

    /// Warnings for the pair, newest first
    async fn list_warnings(&self, chat_id: u64, user_id: u64) -> StoreResult<Vec<Warning>>;

    async fn get_policy(&self, chat_id: u64) -> StoreResult<Option<ChatPolicy>>;

    /// Apply an update to the chat's policy, creating the row on first write.
    /// A failed write restores the previous policy.
    async fn update_policy(&self, chat_id: u64, update: PolicyUpdate) -> StoreResult<ChatPolicy>;

    /// Append a record. A failed write leaves no trace.
    async fn append_audit(&self, record: AuditRecord) -> StoreResult<()>;

    /// Audit records for a chat, oldest first
    async fn list_audit(&self, chat_id: u64) -> StoreResult<Vec<AuditRecord>>;
}
