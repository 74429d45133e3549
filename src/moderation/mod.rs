//! Moderation core
//!
//! Platform-agnostic: everything here talks to the chat platform through
//! [`ChatPlatform`] and to storage through [`ModerationStore`](crate::store::ModerationStore).

mod audit;
mod auth;
mod command;
mod engine;
mod error;
mod greeting;
mod ledger;
mod platform;
mod policy;
mod report;
mod throttle;

pub use audit::{AuditSink, format_notification};
pub use auth::Authorizer;
pub use command::{
    ActionReport, CommandDescriptor, CommandInvocation, CommandKind, RepliedMessage,
};
pub use engine::{DEFAULT_MUTE_SECONDS, ModerationEngine};
pub use error::{ModerationError, ModerationResult};
pub use greeting::{DEFAULT_GOODBYE, DEFAULT_WELCOME, MemberProfile, render_template};
pub use ledger::WarningLedger;
pub use platform::{
    ChatPlatform, MemberRole, MessageRef, Notifier, PermissionSet, PlatformError, PlatformResult,
};
pub use policy::PolicyCommand;
pub use throttle::{DEFAULT_COOLDOWN, ThrottleGuard};
