//! Moderation action engine
//!
//! Every command goes through the same gates, in order:
//! authorization, cooldown, bot rights, target, arguments, protected target.
//! The first failing gate decides the reply and nothing after it runs.
//! Enforcement then calls the platform, updates the warning ledger for
//! warn/unwarn, and writes the audit trail.

use crate::moderation::audit::AuditSink;
use crate::moderation::auth::Authorizer;
use crate::moderation::command::{ActionReport, CommandInvocation, CommandKind};
use crate::moderation::error::{ModerationError, ModerationResult};
use crate::moderation::ledger::WarningLedger;
use crate::moderation::platform::{
    ChatPlatform, MemberRole, Notifier, PermissionSet, PlatformError, PlatformResult,
};
use crate::moderation::throttle::ThrottleGuard;
use crate::store::ModerationStore;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use tokio::time::{Duration, sleep};
use tracing::{debug, error, info, warn};

/// Mute length when none is given
pub const DEFAULT_MUTE_SECONDS: u64 = 3600;

const INVALID_DURATION: &str = "Invalid duration. Please provide a number in seconds.";

/// Parsed, command-specific part of an invocation
#[derive(Debug, Clone, PartialEq, Eq)]
enum Enforcement {
    Kick,
    Ban,
    Mute { seconds: u64, until: DateTime<Utc> },
    Unmute,
    Unban,
    Warn { reason: Option<String> },
    Unwarn,
}

impl Enforcement {
    fn parse(kind: CommandKind, options: &[String]) -> ModerationResult<Self> {
        Ok(match kind {
            CommandKind::Kick => Self::Kick,
            CommandKind::Ban => Self::Ban,
            CommandKind::Mute => {
                let seconds = match options.first() {
                    Some(raw) => raw
                        .trim()
                        .parse::<u64>()
                        .map_err(|_| ModerationError::invalid(INVALID_DURATION))?,
                    None => DEFAULT_MUTE_SECONDS,
                };
                let until = i64::try_from(seconds)
                    .ok()
                    .and_then(TimeDelta::try_seconds)
                    .and_then(|delta| Utc::now().checked_add_signed(delta))
                    .ok_or_else(|| ModerationError::invalid(INVALID_DURATION))?;
                Self::Mute { seconds, until }
            }
            CommandKind::Unmute => Self::Unmute,
            CommandKind::Unban => Self::Unban,
            CommandKind::Warn => {
                let reason = options.join(" ");
                let reason = reason.trim();
                Self::Warn {
                    reason: (!reason.is_empty()).then(|| reason.to_string()),
                }
            }
            CommandKind::Unwarn => Self::Unwarn,
        })
    }
}

/// Orchestrates moderation commands
#[derive(Clone)]
pub struct ModerationEngine {
    pub(super) platform: Arc<dyn ChatPlatform>,
    pub(super) store: Arc<dyn ModerationStore>,
    pub(super) authorizer: Authorizer,
    pub(super) throttle: ThrottleGuard,
    pub(super) ledger: WarningLedger,
    pub(super) audit: AuditSink,
}

impl ModerationEngine {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        store: Arc<dyn ModerationStore>,
        notifier: Arc<dyn Notifier>,
        owner_id: u64,
        throttle: ThrottleGuard,
    ) -> Self {
        Self {
            authorizer: Authorizer::new(owner_id, platform.clone()),
            ledger: WarningLedger::new(store.clone()),
            audit: AuditSink::new(store.clone(), platform.clone(), notifier),
            platform,
            store,
            throttle,
        }
    }

    #[must_use]
    pub fn ledger(&self) -> &WarningLedger {
        &self.ledger
    }

    /// Run a command and turn the outcome into the issuer's reply
    pub async fn execute(&self, invocation: &CommandInvocation) -> String {
        let verb = invocation.kind.verb();
        match self.run(invocation).await {
            Ok(report) => report.reply_text(),
            Err(e) => {
                log_rejection(verb, invocation.chat_id, invocation.issuer_id, &e);
                e.reply_text(verb)
            }
        }
    }

    /// Run a command through the gate pipeline
    pub async fn run(&self, invocation: &CommandInvocation) -> ModerationResult<ActionReport> {
        let descriptor = invocation.kind.descriptor();
        let chat_id = invocation.chat_id;
        let issuer_id = invocation.issuer_id;

        self.admit(chat_id, issuer_id, descriptor.verb).await?;

        if descriptor.requires_bot_admin && !self.authorizer.bot_has_admin_rights(chat_id).await {
            return Err(ModerationError::InsufficientPrivilege);
        }

        let (target_id, options) = self.resolve_target(invocation).await?;
        let enforcement = Enforcement::parse(invocation.kind, options)?;

        let target_role = if descriptor.protects_admins {
            let role = self
                .settle(self.platform.get_chat_member(chat_id, target_id).await)
                .await?;
            if role.is_privileged() {
                return Err(ModerationError::TargetIsProtectedAdmin);
            }
            Some(role)
        } else {
            None
        };

        info!(
            command = descriptor.verb,
            chat_id,
            issuer_id,
            target_id,
            "Enforcing moderation command"
        );

        match enforcement {
            Enforcement::Kick => {
                self.settle(self.platform.ban(chat_id, target_id).await)
                    .await?;
                if let Err(e) = self.settle(self.platform.unban(chat_id, target_id).await).await {
                    // The ban half stands, so it still gets an audit trail
                    self.record_audit(chat_id, target_id, issuer_id, "kick failed: user left banned")
                        .await;
                    return Err(e);
                }
                self.record_audit(chat_id, target_id, issuer_id, "kick")
                    .await;
                Ok(ActionReport::Kicked)
            }
            Enforcement::Ban => {
                self.settle(self.platform.ban(chat_id, target_id).await)
                    .await?;
                if let Some(reply) = invocation.reply_to {
                    if let Err(e) = self.platform.delete_message(reply.message).await {
                        warn!(
                            chat_id,
                            message_id = reply.message.message_id,
                            error = %e,
                            "Failed to delete message from banned user"
                        );
                    }
                }
                self.record_audit(chat_id, target_id, issuer_id, "ban").await;
                Ok(ActionReport::Banned)
            }
            Enforcement::Mute { seconds, until } => {
                self.settle(
                    self.platform
                        .restrict(chat_id, target_id, PermissionSet::None, Some(until))
                        .await,
                )
                .await?;
                self.record_audit(
                    chat_id,
                    target_id,
                    issuer_id,
                    &format!("mute for {seconds} seconds"),
                )
                .await;
                Ok(ActionReport::Muted { seconds })
            }
            Enforcement::Unmute => {
                self.settle(
                    self.platform
                        .restrict(chat_id, target_id, PermissionSet::Full, None)
                        .await,
                )
                .await?;
                self.record_audit(chat_id, target_id, issuer_id, "unmute")
                    .await;
                Ok(ActionReport::Unmuted)
            }
            Enforcement::Unban => {
                self.settle(self.platform.unban(chat_id, target_id).await)
                    .await?;
                self.record_audit(chat_id, target_id, issuer_id, "unban")
                    .await;
                Ok(ActionReport::Unbanned)
            }
            Enforcement::Warn { reason } => {
                self.warn(chat_id, target_id, issuer_id, target_role, reason)
                    .await
            }
            Enforcement::Unwarn => {
                let remaining = self
                    .ledger
                    .remove_latest_warning(chat_id, target_id)
                    .await?;
                self.record_audit(
                    chat_id,
                    target_id,
                    issuer_id,
                    &format!("unwarn (remaining: {remaining})"),
                )
                .await;
                Ok(ActionReport::Unwarned { remaining })
            }
        }
    }

    async fn warn(
        &self,
        chat_id: u64,
        target_id: u64,
        issuer_id: u64,
        target_role: Option<MemberRole>,
        reason: Option<String>,
    ) -> ModerationResult<ActionReport> {
        let threshold = self.ledger.get_threshold(chat_id).await?;
        let tally = self
            .ledger
            .record_warning(chat_id, target_id, issuer_id, reason.clone(), threshold)
            .await?;
        let count = tally.count;

        let action = match &reason {
            Some(reason) => format!("warn ({count}/{threshold}): {reason}"),
            None => format!("warn ({count}/{threshold})"),
        };
        self.record_audit(chat_id, target_id, issuer_id, &action)
            .await;

        // Only the warning that crossed the threshold bans
        if !tally.crossed {
            return Ok(ActionReport::Warned {
                count,
                threshold,
                reason,
            });
        }
        if target_role == Some(MemberRole::Banned) {
            debug!(chat_id, target_id, count, "Threshold reached by a user already banned");
            return Ok(ActionReport::Warned {
                count,
                threshold,
                reason,
            });
        }

        info!(chat_id, target_id, count, threshold, "Warning threshold reached, banning");
        if let Err(e) = self.settle(self.platform.ban(chat_id, target_id).await).await {
            // Nobody was banned, so the next warning may try again
            if let Err(reset) = self.ledger.reset_escalation(chat_id, target_id).await {
                error!(chat_id, target_id, error = %reset, "Could not reset escalation");
            }
            return Err(e);
        }
        self.record_audit(
            chat_id,
            target_id,
            issuer_id,
            &format!("auto-ban after {count} warnings"),
        )
        .await;
        Ok(ActionReport::AutoBanned { count, threshold })
    }

    /// Authorization then cooldown. Used by every admin command.
    pub(super) async fn admit(&self, chat_id: u64, issuer_id: u64, verb: &str) -> ModerationResult<()> {
        if !self.authorizer.is_authorized(chat_id, issuer_id).await {
            return Err(ModerationError::NotAuthorized);
        }
        self.cooldown(issuer_id, verb)
    }

    pub(super) fn cooldown(&self, issuer_id: u64, verb: &str) -> ModerationResult<()> {
        if self.throttle.allow(issuer_id, verb) {
            Ok(())
        } else {
            Err(ModerationError::CooldownActive)
        }
    }

    /// The reply author if there is one, otherwise the first argument. Returns
    /// the remaining arguments alongside.
    async fn resolve_target<'a>(
        &self,
        invocation: &'a CommandInvocation,
    ) -> ModerationResult<(u64, &'a [String])> {
        if let Some(reply) = &invocation.reply_to {
            return Ok((reply.author_id, &invocation.args));
        }

        let Some((identifier, rest)) = invocation.args.split_first() else {
            return Err(ModerationError::NoTarget);
        };

        Ok((self.resolve_identifier(identifier).await?, rest))
    }

    /// A mention, id or name typed by the issuer, as a user id
    pub(super) async fn resolve_identifier(&self, identifier: &str) -> ModerationResult<u64> {
        self.platform.resolve_user(identifier).await.map_err(|e| {
            debug!(identifier = %identifier, error = %e, "Could not resolve target");
            ModerationError::NoTarget
        })
    }

    /// Map a platform result, waiting out a rate limit before reporting it
    pub(super) async fn settle<T>(&self, result: PlatformResult<T>) -> ModerationResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(PlatformError::RateLimited { retry_after }) => {
                warn!(retry_after, "Rate limited by platform, backing off");
                sleep(Duration::from_secs(retry_after)).await;
                Err(ModerationError::RateLimited { retry_after })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write an audit record. The action already happened, so a failure is
    /// logged and not returned.
    pub(super) async fn record_audit(&self, chat_id: u64, user_id: u64, admin_id: u64, action: &str) {
        if let Err(e) = self.audit.record(chat_id, user_id, admin_id, action).await {
            error!(chat_id, user_id, admin_id, action, error = %e, "Audit record lost");
        }
    }
}

impl std::fmt::Debug for ModerationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModerationEngine")
            .field("authorizer", &self.authorizer)
            .field("throttle", &self.throttle)
            .finish_non_exhaustive()
    }
}

pub(super) fn log_rejection(command: &str, chat_id: u64, issuer_id: u64, e: &ModerationError) {
    match e {
        ModerationError::TransportFailure(_) | ModerationError::StorageFailure(_) => {
            warn!(command, chat_id, issuer_id, error = %e, "Command failed");
        }
        _ => debug!(command, chat_id, issuer_id, error = %e, "Command rejected"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::command::RepliedMessage;
    use crate::moderation::platform::MessageRef;
    use crate::moderation::testing::{BOT_ID, FakePlatform, Op, PlatformCall, RecordingNotifier};
    use crate::store::{MockModerationStore, PolicyUpdate, StoreError, YamlStore};
    use tokio::time::{Instant, advance};

    const CHAT: u64 = 100;
    const OWNER: u64 = 1;
    const ADMIN: u64 = 7;
    const TARGET: u64 = 42;

    struct Harness {
        engine: ModerationEngine,
        platform: Arc<FakePlatform>,
        store: Arc<YamlStore>,
    }

    fn harness() -> Harness {
        let platform = Arc::new(FakePlatform::new());
        platform.set_role(CHAT, ADMIN, MemberRole::Administrator);
        let store = Arc::new(YamlStore::in_memory());
        let engine = ModerationEngine::new(
            platform.clone(),
            store.clone(),
            Arc::new(RecordingNotifier::default()),
            OWNER,
            ThrottleGuard::default(),
        );
        Harness {
            engine,
            platform,
            store,
        }
    }

    fn command(kind: CommandKind, issuer: u64, args: &[&str]) -> CommandInvocation {
        CommandInvocation::new(kind, CHAT, issuer).with_args(args.iter().copied())
    }

    async fn audit_actions(store: &YamlStore) -> Vec<String> {
        store
            .list_audit(CHAT)
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.action)
            .collect()
    }

    async fn pass_cooldown() {
        advance(Duration::from_secs(3)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_warnings_trigger_auto_ban() {
        let h = harness();
        let warn = command(CommandKind::Warn, OWNER, &["42"]);

        assert_eq!(h.engine.execute(&warn).await, "User warned (1/3).");
        pass_cooldown().await;
        assert_eq!(h.engine.execute(&warn).await, "User warned (2/3).");
        pass_cooldown().await;
        assert_eq!(
            h.engine.execute(&warn).await,
            "User has reached 3/3 warnings and has been banned."
        );

        assert_eq!(
            h.platform.enforcement_calls(),
            vec![PlatformCall::Ban {
                chat_id: CHAT,
                user_id: TARGET
            }]
        );
        let actions = audit_actions(&h.store).await;
        assert_eq!(
            actions,
            vec![
                "warn (1/3)",
                "warn (2/3)",
                "warn (3/3)",
                "auto-ban after 3 warnings"
            ]
        );
        // Warnings are kept after the ban
        assert_eq!(h.engine.ledger().count_warnings(CHAT, TARGET).await.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_ban_fires_once_per_crossing() {
        let h = harness();
        h.store
            .update_policy(CHAT, PolicyUpdate::WarningThreshold(1))
            .await
            .unwrap();
        let warn = command(CommandKind::Warn, OWNER, &["42"]);

        assert_eq!(
            h.engine.run(&warn).await,
            Ok(ActionReport::AutoBanned {
                count: 1,
                threshold: 1
            })
        );
        pass_cooldown().await;
        assert_eq!(
            h.engine.run(&warn).await,
            Ok(ActionReport::Warned {
                count: 2,
                threshold: 1,
                reason: None
            })
        );
        assert_eq!(h.platform.enforcement_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_warns_ban_exactly_once() {
        let h = harness();
        h.platform.interleave();
        for _ in 0..2 {
            h.engine
                .ledger()
                .add_warning(CHAT, TARGET, OWNER, None)
                .await
                .unwrap();
        }
        let from_owner = command(CommandKind::Warn, OWNER, &["42"]);
        let from_admin = command(CommandKind::Warn, ADMIN, &["42"]);

        let (a, b) = tokio::join!(h.engine.run(&from_owner), h.engine.run(&from_admin));
        let mut outcomes = vec![a.unwrap(), b.unwrap()];
        outcomes.sort_by_key(|report| matches!(report, ActionReport::AutoBanned { .. }));

        assert!(matches!(outcomes[0], ActionReport::Warned { count: 4, .. }));
        assert!(matches!(outcomes[1], ActionReport::AutoBanned { count: 3, .. }));
        assert_eq!(
            h.platform.enforcement_calls(),
            vec![PlatformCall::Ban {
                chat_id: CHAT,
                user_id: TARGET
            }]
        );
        let auto_bans: Vec<_> = audit_actions(&h.store)
            .await
            .into_iter()
            .filter(|action| action.starts_with("auto-ban"))
            .collect();
        assert_eq!(auto_bans, vec!["auto-ban after 3 warnings"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_auto_ban_lets_next_warning_ban() {
        let h = harness();
        h.store
            .update_policy(CHAT, PolicyUpdate::WarningThreshold(1))
            .await
            .unwrap();
        h.platform
            .fail(Op::Ban, PlatformError::Transport("gateway closed".into()));
        let warn = command(CommandKind::Warn, OWNER, &["42"]);

        assert_eq!(
            h.engine.run(&warn).await,
            Err(ModerationError::TransportFailure("gateway closed".into()))
        );

        h.platform.recover(Op::Ban);
        pass_cooldown().await;
        assert_eq!(
            h.engine.run(&warn).await,
            Ok(ActionReport::AutoBanned {
                count: 2,
                threshold: 1
            })
        );
        assert_eq!(h.platform.enforcement_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_warning_a_banned_user_does_not_ban_again() {
        let h = harness();
        h.platform.set_role(CHAT, TARGET, MemberRole::Banned);
        h.store
            .update_policy(CHAT, PolicyUpdate::WarningThreshold(1))
            .await
            .unwrap();

        assert_eq!(
            h.engine.run(&command(CommandKind::Warn, OWNER, &["42"])).await,
            Ok(ActionReport::Warned {
                count: 1,
                threshold: 1,
                reason: None
            })
        );
        assert!(h.platform.enforcement_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_warn_with_reason() {
        let h = harness();
        let warn = command(CommandKind::Warn, ADMIN, &["<@42>", "posting", "links"]);

        assert_eq!(
            h.engine.execute(&warn).await,
            "User warned (1/3). Reason: posting links"
        );
        assert_eq!(audit_actions(&h.store).await, vec!["warn (1/3): posting links"]);
        let warnings = h.engine.ledger().list_warnings(CHAT, TARGET).await.unwrap();
        assert_eq!(warnings[0].admin_id, ADMIN);
        assert_eq!(warnings[0].reason.as_deref(), Some("posting links"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mute_with_duration() {
        let h = harness();
        let before = Utc::now();

        let reply = h.engine.execute(&command(CommandKind::Mute, ADMIN, &["42", "120"])).await;

        assert_eq!(reply, "User muted for 120 seconds.");
        let calls = h.platform.enforcement_calls();
        let [PlatformCall::Restrict {
            chat_id,
            user_id,
            permissions,
            until: Some(until),
        }] = calls.as_slice()
        else {
            panic!("expected one restrict call, got {calls:?}");
        };
        assert_eq!((*chat_id, *user_id), (CHAT, TARGET));
        assert_eq!(*permissions, PermissionSet::None);
        let offset = (*until - before).num_seconds();
        assert!((119..=121).contains(&offset), "offset was {offset}");
        assert_eq!(audit_actions(&h.store).await, vec!["mute for 120 seconds"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mute_defaults_to_an_hour() {
        let h = harness();
        let reply_to = RepliedMessage {
            author_id: TARGET,
            message: MessageRef {
                chat_id: CHAT,
                channel_id: 5,
                message_id: 500,
            },
        };
        let mute = CommandInvocation::new(CommandKind::Mute, CHAT, ADMIN).replying_to(reply_to);

        assert_eq!(
            h.engine.run(&mute).await,
            Ok(ActionReport::Muted { seconds: 3600 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_typed_arguments_with_and_without_reply() {
        let h = harness();
        let reply_to = RepliedMessage {
            author_id: TARGET,
            message: MessageRef {
                chat_id: CHAT,
                channel_id: 5,
                message_id: 500,
            },
        };

        // Replying, the first argument is already the duration
        let mute = CommandInvocation::new(CommandKind::Mute, CHAT, ADMIN)
            .with_args(["120"])
            .replying_to(reply_to);
        assert_eq!(
            h.engine.run(&mute).await,
            Ok(ActionReport::Muted { seconds: 120 })
        );

        // Not replying, a name that is no user gets the target reply
        pass_cooldown().await;
        assert_eq!(
            h.engine
                .execute(&command(CommandKind::Mute, ADMIN, &["alice", "120"]))
                .await,
            "Please reply to a message or provide a user."
        );
        assert_eq!(h.platform.enforcement_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_duration_makes_no_platform_call() {
        let h = harness();

        for raw in ["soon", "-5", "99999999999999999"] {
            pass_cooldown().await;
            let reply = h.engine.execute(&command(CommandKind::Mute, ADMIN, &["42", raw])).await;
            assert_eq!(reply, INVALID_DURATION, "duration {raw}");
        }
        assert!(h.platform.enforcement_calls().is_empty());
        assert!(audit_actions(&h.store).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unwarn_with_no_warnings() {
        let h = harness();

        let reply = h.engine.execute(&command(CommandKind::Unwarn, ADMIN, &["42"])).await;

        assert_eq!(reply, "This user has no warnings to remove.");
        assert!(audit_actions(&h.store).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unwarn_removes_latest() {
        let h = harness();
        h.engine.run(&command(CommandKind::Warn, ADMIN, &["42"])).await.unwrap();
        pass_cooldown().await;
        h.engine.run(&command(CommandKind::Warn, ADMIN, &["42"])).await.unwrap();
        pass_cooldown().await;

        let reply = h.engine.execute(&command(CommandKind::Unwarn, ADMIN, &["42"])).await;

        assert_eq!(reply, "Warning removed. User now has 1 warnings.");
        assert_eq!(
            audit_actions(&h.store).await.last().map(String::as_str),
            Some("unwarn (remaining: 1)")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_members_are_not_authorized() {
        let h = harness();

        for kind in CommandKind::ALL {
            pass_cooldown().await;
            let reply = h.engine.execute(&command(kind, TARGET, &["43"])).await;
            assert_eq!(reply, "You need to be an admin to use this command.", "{kind}");
        }
        assert!(h.platform.enforcement_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bot_without_rights() {
        let h = harness();
        h.platform.set_role(CHAT, BOT_ID, MemberRole::Member);

        assert_eq!(
            h.engine.run(&command(CommandKind::Kick, OWNER, &["42"])).await,
            Err(ModerationError::InsufficientPrivilege)
        );
        pass_cooldown().await;
        // Unwarn never touches the platform
        assert_eq!(
            h.engine.run(&command(CommandKind::Unwarn, OWNER, &["42"])).await,
            Err(ModerationError::NoWarningFound)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_admin_targets() {
        let h = harness();

        for kind in [CommandKind::Kick, CommandKind::Ban, CommandKind::Mute, CommandKind::Warn] {
            pass_cooldown().await;
            let reply = h.engine.execute(&command(kind, OWNER, &["7"])).await;
            assert_eq!(reply, format!("Cannot {} an admin.", kind.verb()));
        }
        assert!(h.platform.enforcement_calls().is_empty());

        pass_cooldown().await;
        assert_eq!(
            h.engine.run(&command(CommandKind::Unmute, OWNER, &["7"])).await,
            Ok(ActionReport::Unmuted)
        );
        pass_cooldown().await;
        assert_eq!(
            h.engine.run(&command(CommandKind::Unban, OWNER, &["7"])).await,
            Ok(ActionReport::Unbanned)
        );
        pass_cooldown().await;
        assert_eq!(
            h.engine.run(&command(CommandKind::Unwarn, OWNER, &["7"])).await,
            Err(ModerationError::NoWarningFound)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_between_commands() {
        let h = harness();

        assert!(h.engine.run(&command(CommandKind::Unban, ADMIN, &["42"])).await.is_ok());
        assert_eq!(
            h.engine.run(&command(CommandKind::Kick, ADMIN, &["42"])).await,
            Err(ModerationError::CooldownActive)
        );
        // Another issuer is not affected
        assert!(h.engine.run(&command(CommandKind::Unban, OWNER, &["42"])).await.is_ok());

        pass_cooldown().await;
        assert_eq!(
            h.engine.run(&command(CommandKind::Kick, ADMIN, &["42"])).await,
            Ok(ActionReport::Kicked)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_target() {
        let h = harness();

        assert_eq!(
            h.engine.execute(&command(CommandKind::Ban, ADMIN, &[])).await,
            "Please reply to a message or provide a user."
        );
        pass_cooldown().await;
        assert_eq!(
            h.engine.run(&command(CommandKind::Ban, ADMIN, &["nobody"])).await,
            Err(ModerationError::NoTarget)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_kick_is_ban_then_unban() {
        let h = harness();

        assert_eq!(
            h.engine.execute(&command(CommandKind::Kick, ADMIN, &["42"])).await,
            "User kicked."
        );
        assert_eq!(
            h.platform.enforcement_calls(),
            vec![
                PlatformCall::Ban {
                    chat_id: CHAT,
                    user_id: TARGET
                },
                PlatformCall::Unban {
                    chat_id: CHAT,
                    user_id: TARGET
                },
            ]
        );
        assert_eq!(audit_actions(&h.store).await, vec!["kick"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_kick_that_leaves_user_banned_is_audited() {
        let h = harness();
        h.platform
            .fail(Op::Unban, PlatformError::Transport("gateway closed".into()));

        assert_eq!(
            h.engine.execute(&command(CommandKind::Kick, ADMIN, &["42"])).await,
            "Error: gateway closed"
        );
        assert_eq!(h.platform.role(CHAT, TARGET), MemberRole::Banned);
        assert_eq!(
            audit_actions(&h.store).await,
            vec!["kick failed: user left banned"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ban_deletes_replied_message() {
        let h = harness();
        let message = MessageRef {
            chat_id: CHAT,
            channel_id: 5,
            message_id: 500,
        };
        let ban = CommandInvocation::new(CommandKind::Ban, CHAT, ADMIN).replying_to(RepliedMessage {
            author_id: TARGET,
            message,
        });

        assert_eq!(h.engine.execute(&ban).await, "User banned.");
        assert!(h.platform.enforcement_calls().contains(&PlatformCall::Delete(message)));
        assert_eq!(audit_actions(&h.store).await, vec!["ban"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_delete_does_not_fail_ban() {
        let h = harness();
        h.platform
            .fail(Op::DeleteMessage, PlatformError::Transport("gone".into()));
        let ban = CommandInvocation::new(CommandKind::Ban, CHAT, ADMIN).replying_to(RepliedMessage {
            author_id: TARGET,
            message: MessageRef {
                chat_id: CHAT,
                channel_id: 5,
                message_id: 500,
            },
        });

        assert_eq!(h.engine.run(&ban).await, Ok(ActionReport::Banned));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_then_reports() {
        let h = harness();
        h.platform
            .fail(Op::Ban, PlatformError::RateLimited { retry_after: 5 });
        let started = Instant::now();

        let reply = h.engine.execute(&command(CommandKind::Ban, ADMIN, &["42"])).await;

        assert_eq!(reply, "Rate limited. Please try again in 5 seconds.");
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(audit_actions(&h.store).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_platform_failures_become_replies() {
        let h = harness();
        h.platform
            .fail(Op::Unban, PlatformError::Transport("gateway closed".into()));
        h.platform
            .fail(Op::Restrict, PlatformError::InsufficientPrivilege);

        assert_eq!(
            h.engine.execute(&command(CommandKind::Unban, ADMIN, &["42"])).await,
            "Error: gateway closed"
        );
        pass_cooldown().await;
        assert_eq!(
            h.engine.execute(&command(CommandKind::Unmute, ADMIN, &["42"])).await,
            "I need admin rights to perform this action."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_audit_failure_keeps_success_reply() {
        let platform = Arc::new(FakePlatform::new());
        let mut store = MockModerationStore::new();
        store
            .expect_append_audit()
            .times(1)
            .returning(|_| Err(StoreError::Other("read-only".into())));
        let engine = ModerationEngine::new(
            platform.clone(),
            Arc::new(store),
            Arc::new(RecordingNotifier::default()),
            OWNER,
            ThrottleGuard::default(),
        );

        assert_eq!(
            engine.execute(&command(CommandKind::Ban, OWNER, &["42"])).await,
            "User banned."
        );
        assert_eq!(platform.enforcement_calls().len(), 1);
    }
}
