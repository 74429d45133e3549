//! Per-chat policy commands
//!
//! Admin-only writes to the chat's [`ChatPolicy`](crate::store::ChatPolicy).
//! The row is created on the first write.

use crate::moderation::engine::{ModerationEngine, log_rejection};
use crate::moderation::error::{ModerationError, ModerationResult};
use crate::store::PolicyUpdate;
use tracing::info;

const PLACEHOLDER_HELP: &str = "You can use the following placeholders:\n\
{user} - User mention\n\
{first_name} - User's first name\n\
{last_name} - User's last name\n\
{username} - User's username\n\
{group} - Group name";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyCommand {
    SetWarnLimit,
    SetRules,
    SetWelcome,
    SetGoodbye,
}

impl PolicyCommand {
    #[must_use]
    pub const fn verb(self) -> &'static str {
        match self {
            Self::SetWarnLimit => "setwarnlimit",
            Self::SetRules => "setrules",
            Self::SetWelcome => "setwelcome",
            Self::SetGoodbye => "setgoodbye",
        }
    }

    /// Validate arguments into the update to apply
    fn parse(self, args: &[String]) -> ModerationResult<PolicyUpdate> {
        match self {
            Self::SetWarnLimit => {
                let raw = args.first().ok_or_else(|| {
                    ModerationError::invalid(
                        "Please provide a warn limit (number of warnings before ban).",
                    )
                })?;
                let limit = raw
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| ModerationError::invalid("Warn limit must be a number."))?;
                let limit = u32::try_from(limit)
                    .ok()
                    .filter(|limit| *limit >= 1)
                    .ok_or_else(|| ModerationError::invalid("Warn limit must be at least 1."))?;
                Ok(PolicyUpdate::WarningThreshold(limit))
            }
            Self::SetRules => required_text(args, || {
                "Please provide the rules for the group.".to_string()
            })
            .map(PolicyUpdate::Rules),
            Self::SetWelcome => required_text(args, || {
                format!("Please provide a welcome message. {PLACEHOLDER_HELP}")
            })
            .map(PolicyUpdate::WelcomeMessage),
            Self::SetGoodbye => required_text(args, || {
                format!("Please provide a goodbye message. {PLACEHOLDER_HELP}")
            })
            .map(PolicyUpdate::GoodbyeMessage),
        }
    }
}

/// The arguments joined back into one text, rejected when blank
fn required_text(args: &[String], missing: impl FnOnce() -> String) -> ModerationResult<String> {
    let text = args.join(" ");
    let text = text.trim();
    if text.is_empty() {
        return Err(ModerationError::invalid(missing()));
    }
    Ok(text.to_string())
}

fn describe(update: &PolicyUpdate) -> (String, String) {
    match update {
        PolicyUpdate::WarningThreshold(limit) => (
            format!("set warn limit to {limit}"),
            format!("Warn limit set to {limit}."),
        ),
        PolicyUpdate::Rules(_) => (
            "set group rules".to_string(),
            "Group rules set successfully.".to_string(),
        ),
        PolicyUpdate::WelcomeMessage(_) => (
            "set welcome message".to_string(),
            "Welcome message set successfully.".to_string(),
        ),
        PolicyUpdate::GoodbyeMessage(_) => (
            "set goodbye message".to_string(),
            "Goodbye message set successfully.".to_string(),
        ),
    }
}

impl ModerationEngine {
    /// Run a policy command and return the issuer's reply
    pub async fn configure(
        &self,
        chat_id: u64,
        issuer_id: u64,
        command: PolicyCommand,
        args: &[String],
    ) -> String {
        let verb = command.verb();
        match self.try_configure(chat_id, issuer_id, command, args).await {
            Ok(reply) => reply,
            Err(e) => {
                log_rejection(verb, chat_id, issuer_id, &e);
                e.reply_text(verb)
            }
        }
    }

    async fn try_configure(
        &self,
        chat_id: u64,
        issuer_id: u64,
        command: PolicyCommand,
        args: &[String],
    ) -> ModerationResult<String> {
        self.admit(chat_id, issuer_id, command.verb()).await?;
        let update = command.parse(args)?;
        let (action, reply) = describe(&update);

        let policy = self.store.update_policy(chat_id, update).await?;
        info!(
            chat_id,
            issuer_id,
            command = command.verb(),
            threshold = policy.warning_threshold,
            "Chat policy updated"
        );

        self.record_audit(chat_id, issuer_id, issuer_id, &action)
            .await;
        Ok(reply)
    }

    /// Reply for `/rules`
    pub async fn rules(&self, chat_id: u64, issuer_id: u64) -> String {
        let result = async {
            self.cooldown(issuer_id, "rules")?;
            let rules = self
                .store
                .get_policy(chat_id)
                .await?
                .and_then(|policy| policy.rules);
            Ok::<_, ModerationError>(match rules {
                Some(rules) => format!("**Group Rules:**\n\n{rules}"),
                None => "No rules have been set for this group.".to_string(),
            })
        }
        .await;

        result.unwrap_or_else(|e| {
            log_rejection("rules", chat_id, issuer_id, &e);
            e.reply_text("rules")
        })
    }
}
