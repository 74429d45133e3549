//! Audit sink
//!
//! Every completed action is written to storage first and then mirrored to the
//! operator as a notification. Storage failures are returned; notification
//! failures are only logged.

use crate::AUDIT_TARGET;
use crate::moderation::error::ModerationResult;
use crate::moderation::platform::{ChatPlatform, Notifier};
use crate::store::{AuditRecord, ModerationStore, SYSTEM_ADMIN_ID};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AuditSink {
    store: Arc<dyn ModerationStore>,
    platform: Arc<dyn ChatPlatform>,
    notifier: Arc<dyn Notifier>,
}

impl AuditSink {
    pub fn new(
        store: Arc<dyn ModerationStore>,
        platform: Arc<dyn ChatPlatform>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            platform,
            notifier,
        }
    }

    /// Persist an audit record, then notify the operator
    pub async fn record(
        &self,
        chat_id: u64,
        user_id: u64,
        admin_id: u64,
        action: &str,
    ) -> ModerationResult<()> {
        let record = AuditRecord::new(chat_id, user_id, admin_id, action);
        let created_at = record.created_at;
        self.store.append_audit(record).await?;

        info!(
            target: AUDIT_TARGET,
            chat_id,
            user_id,
            admin_id,
            action,
            "Audit record written"
        );

        let text = self
            .describe(chat_id, user_id, admin_id, action, created_at)
            .await;
        if let Err(e) = self.notifier.notify(&text).await {
            warn!(chat_id, user_id, error = %e, "Failed to deliver audit notification");
        }

        Ok(())
    }

    async fn describe(
        &self,
        chat_id: u64,
        user_id: u64,
        admin_id: u64,
        action: &str,
        at: DateTime<Utc>,
    ) -> String {
        let chat_name = self
            .platform
            .chat_title(chat_id)
            .await
            .unwrap_or_else(|_| chat_id.to_string());
        let user_name = self.name_of(user_id).await;
        let admin_name = if admin_id == SYSTEM_ADMIN_ID {
            None
        } else {
            Some(self.name_of(admin_id).await)
        };

        format_notification(&chat_name, &user_name, admin_name.as_deref(), action, at)
    }

    async fn name_of(&self, user_id: u64) -> String {
        self.platform
            .user_display_name(user_id)
            .await
            .unwrap_or_else(|_| user_id.to_string())
    }
}

impl std::fmt::Debug for AuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditSink").finish_non_exhaustive()
    }
}

/// Operator-facing summary of one action. `admin` is `None` for events the bot
/// observed on its own.
#[must_use]
pub fn format_notification(
    chat: &str,
    user: &str,
    admin: Option<&str>,
    action: &str,
    at: DateTime<Utc>,
) -> String {
    format!(
        "**Moderation Action**\nChat: {chat}\nUser: {user}\nAdmin: {}\nAction: {action}\nTime: {}",
        admin.unwrap_or("system"),
        at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::error::ModerationError;
    use crate::moderation::platform::{MockNotifier, PlatformError};
    use crate::moderation::testing::{FakePlatform, RecordingNotifier};
    use crate::store::{MockModerationStore, StoreError, YamlStore};
    use chrono::TimeZone;

    #[test]
    fn test_format_notification() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let text = format_notification("Rust Club", "alice", Some("bob"), "kick", at);
        assert_eq!(
            text,
            "**Moderation Action**\nChat: Rust Club\nUser: alice\nAdmin: bob\nAction: kick\nTime: 2024-03-01 12:30:00 UTC"
        );

        let text = format_notification("Rust Club", "alice", None, "joined the group", at);
        assert!(text.contains("Admin: system"));
    }

    #[tokio::test]
    async fn test_record_persists_then_notifies() {
        let store = Arc::new(YamlStore::in_memory());
        let platform = Arc::new(FakePlatform::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let sink = AuditSink::new(store.clone(), platform, notifier.clone());

        sink.record(100, 42, 1, "ban").await.unwrap();

        let records = store.list_audit(100).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, "ban");
        assert_eq!(records[0].admin_id, 1);

        let sent = notifier.messages();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Chat: Chat 100"));
        assert!(sent[0].contains("User: User 42"));
        assert!(sent[0].contains("Admin: User 1"));
        assert!(sent[0].contains("Action: ban"));
    }

    #[tokio::test]
    async fn test_notification_failure_is_swallowed() {
        let store = Arc::new(YamlStore::in_memory());
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .times(1)
            .returning(|_| Err(PlatformError::Transport("dm closed".into())));
        let sink = AuditSink::new(store.clone(), Arc::new(FakePlatform::new()), Arc::new(notifier));

        assert!(sink.record(100, 42, 1, "kick").await.is_ok());
        assert_eq!(store.list_audit(100).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_skips_notification() {
        let mut store = MockModerationStore::new();
        store
            .expect_append_audit()
            .returning(|_| Err(StoreError::Other("read-only".into())));
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().never();
        let sink = AuditSink::new(Arc::new(store), Arc::new(FakePlatform::new()), Arc::new(notifier));

        assert_eq!(
            sink.record(100, 42, 1, "kick").await,
            Err(ModerationError::StorageFailure("read-only".into()))
        );
    }

    #[tokio::test]
    async fn test_name_lookup_failures_fall_back_to_ids() {
        let platform = Arc::new(FakePlatform::new());
        platform.fail_lookups();
        let notifier = Arc::new(RecordingNotifier::default());
        let sink = AuditSink::new(Arc::new(YamlStore::in_memory()), platform, notifier.clone());

        sink.record(100, 42, 0, "left the group").await.unwrap();

        let sent = notifier.messages();
        assert!(sent[0].contains("Chat: 100"));
        assert!(sent[0].contains("User: 42"));
        assert!(sent[0].contains("Admin: system"));
    }
}
