//! Command descriptors, invocations and outcomes
//!
//! Each moderation command is one [`CommandKind`]; its [`CommandDescriptor`]
//! tells the engine which gates apply, so every command runs through the same
//! pipeline.

use crate::moderation::platform::MessageRef;
use std::fmt;

/// The moderation commands the engine knows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Kick,
    Ban,
    Mute,
    Unmute,
    Unban,
    Warn,
    Unwarn,
}

/// Static gate configuration for a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub kind: CommandKind,
    /// Used as the throttle class and in replies
    pub verb: &'static str,
    /// The bot must be a chat admin before anything happens
    pub requires_bot_admin: bool,
    /// Admins and owners cannot be targeted
    pub protects_admins: bool,
}

impl CommandKind {
    pub const ALL: [Self; 7] = [
        Self::Kick,
        Self::Ban,
        Self::Mute,
        Self::Unmute,
        Self::Unban,
        Self::Warn,
        Self::Unwarn,
    ];

    #[must_use]
    pub const fn descriptor(self) -> CommandDescriptor {
        let (verb, requires_bot_admin, protects_admins) = match self {
            Self::Kick => ("kick", true, true),
            Self::Ban => ("ban", true, true),
            Self::Mute => ("mute", true, true),
            Self::Unmute => ("unmute", true, false),
            Self::Unban => ("unban", true, false),
            // Warn may auto-ban, so the bot needs its rights up front
            Self::Warn => ("warn", true, true),
            Self::Unwarn => ("unwarn", false, false),
        };
        CommandDescriptor {
            kind: self,
            verb,
            requires_bot_admin,
            protects_admins,
        }
    }

    #[must_use]
    pub const fn verb(self) -> &'static str {
        self.descriptor().verb
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// The message a command replied to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepliedMessage {
    pub author_id: u64,
    pub message: MessageRef,
}

/// One inbound moderation command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub kind: CommandKind,
    pub chat_id: u64,
    pub issuer_id: u64,
    /// Set when the command was sent as a reply; the author becomes the target
    pub reply_to: Option<RepliedMessage>,
    /// Raw arguments. Without a reply the first one names the target.
    pub args: Vec<String>,
}

impl CommandInvocation {
    pub fn new(kind: CommandKind, chat_id: u64, issuer_id: u64) -> Self {
        Self {
            kind,
            chat_id,
            issuer_id,
            reply_to: None,
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn replying_to(mut self, reply: RepliedMessage) -> Self {
        self.reply_to = Some(reply);
        self
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// What a successful command did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionReport {
    Kicked,
    Banned,
    Muted { seconds: u64 },
    Unmuted,
    Unbanned,
    Warned {
        count: u32,
        threshold: u32,
        reason: Option<String>,
    },
    AutoBanned { count: u32, threshold: u32 },
    Unwarned { remaining: u32 },
}

impl ActionReport {
    #[must_use]
    pub fn reply_text(&self) -> String {
        match self {
            Self::Kicked => "User kicked.".to_string(),
            Self::Banned => "User banned.".to_string(),
            Self::Muted { seconds } => format!("User muted for {seconds} seconds."),
            Self::Unmuted => "User unmuted.".to_string(),
            Self::Unbanned => "User unbanned.".to_string(),
            Self::Warned {
                count,
                threshold,
                reason,
            } => match reason {
                Some(reason) => format!("User warned ({count}/{threshold}). Reason: {reason}"),
                None => format!("User warned ({count}/{threshold})."),
            },
            Self::AutoBanned { count, threshold } => {
                format!("User has reached {count}/{threshold} warnings and has been banned.")
            }
            Self::Unwarned { remaining } => {
                format!("Warning removed. User now has {remaining} warnings.")
            }
        }
    }
}
