//! Chat platform and notification collaborators
//!
//! The engine decides whether and what to enforce; these traits are how it
//! asks the platform to actually do it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A user's standing in a chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberRole {
    Member,
    Administrator,
    Owner,
    Left,
    Banned,
}

impl MemberRole {
    /// Admins and owners may moderate and may not be moderated
    #[must_use]
    pub const fn is_privileged(self) -> bool {
        match self {
            Self::Administrator | Self::Owner => true,
            Self::Member | Self::Left | Self::Banned => false,
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Member => write!(f, "Member"),
            Self::Administrator => write!(f, "Administrator"),
            Self::Owner => write!(f, "Owner"),
            Self::Left => write!(f, "Left"),
            Self::Banned => write!(f, "Banned"),
        }
    }
}

/// Permissions applied by a restrict call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionSet {
    /// Nothing may be sent
    None,
    /// Everything a regular member may do
    Full,
}

/// Location of a message on the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: u64,
    pub channel_id: u64,
    pub message_id: u64,
}

/// Failures reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("Missing permissions")]
    InsufficientPrivilege,

    #[error("Target is a protected admin")]
    TargetIsProtectedAdmin,

    #[error("Rate limited, retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    #[error("{0}")]
    Transport(String),
}

/// Result type for platform calls
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Chat platform client
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Id of the account the bot acts as
    fn bot_user_id(&self) -> u64;

    async fn get_chat_member(&self, chat_id: u64, user_id: u64) -> PlatformResult<MemberRole>;

    async fn ban(&self, chat_id: u64, user_id: u64) -> PlatformResult<()>;

    async fn unban(&self, chat_id: u64, user_id: u64) -> PlatformResult<()>;

    /// Replace the user's permissions, optionally only until `until`
    async fn restrict(
        &self,
        chat_id: u64,
        user_id: u64,
        permissions: PermissionSet,
        until: Option<DateTime<Utc>>,
    ) -> PlatformResult<()>;

    async fn delete_message(&self, message: MessageRef) -> PlatformResult<()>;

    async fn send_message(&self, chat_id: u64, text: &str) -> PlatformResult<()>;

    /// Resolve a mention or raw id typed by a user
    async fn resolve_user(&self, identifier: &str) -> PlatformResult<u64>;

    async fn chat_title(&self, chat_id: u64) -> PlatformResult<String>;

    async fn user_display_name(&self, user_id: u64) -> PlatformResult<String>;
}

/// Delivers operator notifications
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> PlatformResult<()>;
}
