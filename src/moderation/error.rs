//! Error types for the moderation engine
//!
//! Every failure a command can hit is one of these kinds, and each kind maps to
//! exactly one reply for the user who issued the command.

use crate::moderation::platform::PlatformError;
use crate::store::StoreError;
use thiserror::Error;

/// Reasons a moderation command was rejected or failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModerationError {
    /// Issuer is neither the system owner nor a chat admin
    #[error("Not authorized")]
    NotAuthorized,

    /// Issuer ran a command too recently
    #[error("Cooldown active")]
    CooldownActive,

    /// The bot lacks admin rights in the chat
    #[error("Insufficient privilege")]
    InsufficientPrivilege,

    /// No target could be resolved from a reply or an argument
    #[error("No target")]
    NoTarget,

    /// An argument was malformed; carries the message shown to the user
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The target is a chat admin or owner
    #[error("Target is a protected admin")]
    TargetIsProtectedAdmin,

    /// Unwarn found nothing to remove
    #[error("No warning found")]
    NoWarningFound,

    /// The platform asked us to back off
    #[error("Rate limited for {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    /// Any other platform failure
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// Storage read or write failed
    #[error("Storage failure: {0}")]
    StorageFailure(String),
}

impl ModerationError {
    /// The reply shown to the issuer. `verb` names the command, e.g. "kick".
    #[must_use]
    pub fn reply_text(&self, verb: &str) -> String {
        match self {
            Self::NotAuthorized => "You need to be an admin to use this command.".to_string(),
            Self::CooldownActive => "Please wait before using this command again.".to_string(),
            Self::InsufficientPrivilege => {
                "I need admin rights to perform this action.".to_string()
            }
            Self::NoTarget => "Please reply to a message or provide a user.".to_string(),
            Self::InvalidArgument(message) => message.clone(),
            Self::TargetIsProtectedAdmin => format!("Cannot {verb} an admin."),
            Self::NoWarningFound => "This user has no warnings to remove.".to_string(),
            Self::RateLimited { retry_after } => {
                format!("Rate limited. Please try again in {retry_after} seconds.")
            }
            Self::TransportFailure(detail) => format!("Error: {detail}"),
            Self::StorageFailure(detail) => format!("Storage error: {detail}"),
        }
    }

    /// Convenience constructor for [`ModerationError::InvalidArgument`]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

impl From<PlatformError> for ModerationError {
    fn from(error: PlatformError) -> Self {
        match error {
            PlatformError::InsufficientPrivilege => Self::InsufficientPrivilege,
            PlatformError::TargetIsProtectedAdmin => Self::TargetIsProtectedAdmin,
            PlatformError::RateLimited { retry_after } => Self::RateLimited { retry_after },
            PlatformError::Transport(detail) => Self::TransportFailure(detail),
        }
    }
}

impl From<StoreError> for ModerationError {
    fn from(error: StoreError) -> Self {
        Self::StorageFailure(error.to_string())
    }
}

/// Result type for moderation operations
pub type ModerationResult<T> = Result<T, ModerationError>;
