//! Persistent moderation records
//!
//! Warnings, per-chat policies and audit records as they are written to disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Warning threshold used when a chat has no policy row
pub const DEFAULT_WARNING_THRESHOLD: u32 = 3;

/// Admin id recorded for events the bot observed rather than performed
pub const SYSTEM_ADMIN_ID: u64 = 0;

/// One recorded infraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub id: String,
    pub chat_id: u64,
    pub user_id: u64,
    pub admin_id: u64,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Warning {
    /// Create a new warning stamped with the current time
    pub fn new(chat_id: u64, user_id: u64, admin_id: u64, reason: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            chat_id,
            user_id,
            admin_id,
            reason,
            created_at: Utc::now(),
        }
    }
}

impl Display for Warning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Warning ID: {}. Chat ID: {}. User ID: {}. Admin ID: {}. Created: {}.",
            self.id,
            self.chat_id,
            self.user_id,
            self.admin_id,
            self.created_at.to_rfc3339()
        )?;
        if let Some(reason) = &self.reason {
            write!(f, " Reason: {reason}.")?;
        }
        Ok(())
    }
}

/// Moderation settings for one chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPolicy {
    pub chat_id: u64,
    pub welcome_message: Option<String>,
    pub goodbye_message: Option<String>,
    pub rules: Option<String>,
    pub warning_threshold: u32,
    pub updated_at: DateTime<Utc>,
}

impl ChatPolicy {
    /// A policy with every setting at its default
    pub fn new(chat_id: u64) -> Self {
        Self {
            chat_id,
            welcome_message: None,
            goodbye_message: None,
            rules: None,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
            updated_at: Utc::now(),
        }
    }

    /// Apply a single update in place and bump `updated_at`
    pub fn apply(&mut self, update: PolicyUpdate) {
        match update {
            PolicyUpdate::WarningThreshold(threshold) => self.warning_threshold = threshold,
            PolicyUpdate::Rules(rules) => self.rules = Some(rules),
            PolicyUpdate::WelcomeMessage(message) => self.welcome_message = Some(message),
            PolicyUpdate::GoodbyeMessage(message) => self.goodbye_message = Some(message),
        }
        self.updated_at = Utc::now();
    }
}

/// A change to one field of a [`ChatPolicy`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyUpdate {
    WarningThreshold(u32),
    Rules(String),
    WelcomeMessage(String),
    GoodbyeMessage(String),
}

/// One completed moderation action. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub chat_id: u64,
    pub user_id: u64,
    pub admin_id: u64,
    pub action: String,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(chat_id: u64, user_id: u64, admin_id: u64, action: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            chat_id,
            user_id,
            admin_id,
            action: action.into(),
            created_at: Utc::now(),
        }
    }

    /// Whether the bot recorded this on its own rather than on an admin's behalf
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.admin_id == SYSTEM_ADMIN_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_defaults() {
        let policy = ChatPolicy::new(100);
        assert_eq!(policy.chat_id, 100);
        assert_eq!(policy.warning_threshold, DEFAULT_WARNING_THRESHOLD);
        assert!(policy.rules.is_none());
        assert!(policy.welcome_message.is_none());
        assert!(policy.goodbye_message.is_none());
    }

    #[test]
    fn test_policy_apply_touches_one_field() {
        let mut policy = ChatPolicy::new(100);
        let before = policy.updated_at;

        policy.apply(PolicyUpdate::WarningThreshold(5));
        policy.apply(PolicyUpdate::Rules("Be nice".to_string()));

        assert_eq!(policy.warning_threshold, 5);
        assert_eq!(policy.rules.as_deref(), Some("Be nice"));
        assert!(policy.welcome_message.is_none());
        assert!(policy.updated_at >= before);
    }

    #[test]
    fn test_warning_display_includes_reason() {
        let warning = Warning::new(100, 42, 7, Some("spam".to_string()));
        let text = warning.to_string();
        assert!(text.contains("User ID: 42"));
        assert!(text.contains("Reason: spam."));

        let warning = Warning::new(100, 42, 7, None);
        assert!(!warning.to_string().contains("Reason"));
    }

    #[test]
    fn test_audit_record_serialization() {
        let record = AuditRecord::new(100, 42, SYSTEM_ADMIN_ID, "joined the group");
        assert!(record.is_system());

        let serialized = serde_yaml::to_string(&record).expect("Failed to serialize");
        assert!(serialized.contains("chat_id: 100"));
        assert!(serialized.contains("action: joined the group"));

        let deserialized: AuditRecord =
            serde_yaml::from_str(&serialized).expect("Failed to deserialize");
        assert_eq!(deserialized, record);
    }
}
