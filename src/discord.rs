//! Discord binding for the moderation core
//!
//! Guilds are chats. A mute is a communication timeout, and chat messages
//! go to the guild's system channel.

use crate::moderation::{
    ChatPlatform, MemberRole, MessageRef, Notifier, PermissionSet, PlatformError, PlatformResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::all::{
    ChannelId, CreateMessage, GuildId, Member, MessageId, PartialGuild, Permissions, RoleId,
    UserId,
};
use serenity::http::{Http, HttpError};
use std::sync::Arc;
use tracing::{info, warn};

/// Missing Permissions
const MISSING_PERMISSIONS: isize = 50013;
/// Unknown Member
const UNKNOWN_MEMBER: isize = 10007;
/// Used when Discord reports 429 without surfacing a delay
const DEFAULT_RETRY_AFTER: u64 = 5;

impl From<serenity::Error> for PlatformError {
    fn from(error: serenity::Error) -> Self {
        if let serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) = &error {
            let status = response.status_code.as_u16();
            if status == 403 || response.error.code == MISSING_PERMISSIONS {
                return Self::InsufficientPrivilege;
            }
            if status == 429 {
                return Self::RateLimited {
                    retry_after: DEFAULT_RETRY_AFTER,
                };
            }
        }
        Self::Transport(error.to_string())
    }
}

fn is_unknown_member(error: &serenity::Error) -> bool {
    matches!(
        error,
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response))
            if response.error.code == UNKNOWN_MEMBER || response.status_code.as_u16() == 404
    )
}

fn guild_id(chat_id: u64) -> PlatformResult<GuildId> {
    if chat_id == 0 {
        return Err(PlatformError::Transport("invalid guild id 0".to_string()));
    }
    Ok(GuildId::new(chat_id))
}

fn user_id(user_id: u64) -> PlatformResult<UserId> {
    if user_id == 0 {
        return Err(PlatformError::Transport("invalid user id 0".to_string()));
    }
    Ok(UserId::new(user_id))
}

/// Parse `<@id>`, `<@!id>` or a bare id
fn parse_user_reference(identifier: &str) -> Option<u64> {
    let trimmed = identifier.trim();
    let raw = trimmed
        .strip_prefix("<@")
        .and_then(|rest| rest.strip_suffix('>'))
        .map_or(trimmed, |inner| inner.trim_start_matches('!'));
    raw.parse::<u64>().ok().filter(|id| *id != 0)
}

/// Union of the @everyone role and the member's roles
fn role_permissions(guild: &PartialGuild, member: &Member) -> Permissions {
    let mut permissions = Permissions::empty();
    if let Some(everyone) = guild.roles.get(&RoleId::new(guild.id.get())) {
        permissions |= everyone.permissions;
    }
    for role_id in &member.roles {
        if let Some(role) = guild.roles.get(role_id) {
            permissions |= role.permissions;
        }
    }
    permissions
}

/// [`ChatPlatform`] over the Discord HTTP API
#[derive(Clone)]
pub struct DiscordPlatform {
    http: Arc<Http>,
    bot_id: UserId,
}

impl DiscordPlatform {
    pub fn new(http: Arc<Http>, bot_id: UserId) -> Self {
        Self { http, bot_id }
    }

    async fn guild_and_member(
        &self,
        chat_id: u64,
        target: u64,
    ) -> PlatformResult<(PartialGuild, Member)> {
        let http: &Http = &self.http;
        let guild = guild_id(chat_id)?.to_partial_guild(http).await?;
        let member = guild.member(http, user_id(target)?).await?;
        Ok((guild, member))
    }
}

impl std::fmt::Debug for DiscordPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordPlatform")
            .field("bot_id", &self.bot_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    fn bot_user_id(&self) -> u64 {
        self.bot_id.get()
    }

    async fn get_chat_member(&self, chat_id: u64, target: u64) -> PlatformResult<MemberRole> {
        let http: &Http = &self.http;
        let guild_id = guild_id(chat_id)?;
        let user_id = user_id(target)?;
        let guild = guild_id.to_partial_guild(http).await?;

        if guild.owner_id == user_id {
            return Ok(MemberRole::Owner);
        }

        match guild.member(http, user_id).await {
            Ok(member) => {
                if role_permissions(&guild, &member).contains(Permissions::ADMINISTRATOR) {
                    Ok(MemberRole::Administrator)
                } else {
                    Ok(MemberRole::Member)
                }
            }
            Err(e) if is_unknown_member(&e) => {
                let bans = guild_id.bans(http, None, None).await?;
                if bans.iter().any(|ban| ban.user.id == user_id) {
                    Ok(MemberRole::Banned)
                } else {
                    Ok(MemberRole::Left)
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn ban(&self, chat_id: u64, target: u64) -> PlatformResult<()> {
        let http: &Http = &self.http;
        guild_id(chat_id)?.ban(http, user_id(target)?, 0).await?;
        info!("Banned user {target} in guild {chat_id}");
        Ok(())
    }

    async fn unban(&self, chat_id: u64, target: u64) -> PlatformResult<()> {
        let http: &Http = &self.http;
        guild_id(chat_id)?.unban(http, user_id(target)?).await?;
        info!("Unbanned user {target} in guild {chat_id}");
        Ok(())
    }

    async fn restrict(
        &self,
        chat_id: u64,
        target: u64,
        permissions: PermissionSet,
        until: Option<DateTime<Utc>>,
    ) -> PlatformResult<()> {
        let http: &Http = &self.http;
        let (_, mut member) = self.guild_and_member(chat_id, target).await?;

        match (permissions, until) {
            (PermissionSet::None, Some(until)) => {
                member
                    .disable_communication_until_datetime(http, until.into())
                    .await?;
                info!("Timed out user {target} in guild {chat_id} until {until}");
            }
            (PermissionSet::None, None) => {
                return Err(PlatformError::Transport(
                    "Discord timeouts need an end time".to_string(),
                ));
            }
            (PermissionSet::Full, _) => {
                member.enable_communication(http).await?;
                info!("Lifted timeout for user {target} in guild {chat_id}");
            }
        }
        Ok(())
    }

    async fn delete_message(&self, message: MessageRef) -> PlatformResult<()> {
        if message.channel_id == 0 || message.message_id == 0 {
            return Err(PlatformError::Transport("invalid message reference".to_string()));
        }
        let http: &Http = &self.http;
        ChannelId::new(message.channel_id)
            .delete_message(http, MessageId::new(message.message_id))
            .await?;
        Ok(())
    }

    async fn send_message(&self, chat_id: u64, text: &str) -> PlatformResult<()> {
        let http: &Http = &self.http;
        let guild = guild_id(chat_id)?.to_partial_guild(http).await?;
        let channel = guild.system_channel_id.ok_or_else(|| {
            PlatformError::Transport(format!("Guild {chat_id} has no system channel"))
        })?;
        channel.say(http, text).await?;
        Ok(())
    }

    async fn resolve_user(&self, identifier: &str) -> PlatformResult<u64> {
        let id = parse_user_reference(identifier)
            .ok_or_else(|| PlatformError::Transport(format!("Not a user: {identifier}")))?;
        let http: &Http = &self.http;
        let user = UserId::new(id).to_user(http).await?;
        Ok(user.id.get())
    }

    async fn chat_title(&self, chat_id: u64) -> PlatformResult<String> {
        let http: &Http = &self.http;
        Ok(guild_id(chat_id)?.to_partial_guild(http).await?.name)
    }

    async fn user_display_name(&self, target: u64) -> PlatformResult<String> {
        let http: &Http = &self.http;
        let user = user_id(target)?.to_user(http).await?;
        Ok(user.global_name.clone().unwrap_or(user.name))
    }
}

/// Sends audit notifications to the owner by DM
#[derive(Clone)]
pub struct DiscordNotifier {
    http: Arc<Http>,
    recipient: UserId,
}

impl DiscordNotifier {
    /// Returns `None` when `owner_id` is not a valid user id
    pub fn new(http: Arc<Http>, owner_id: u64) -> Option<Self> {
        (owner_id != 0).then(|| Self {
            http,
            recipient: UserId::new(owner_id),
        })
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, text: &str) -> PlatformResult<()> {
        let http: &Http = &self.http;
        if let Err(e) = self
            .recipient
            .direct_message(http, CreateMessage::new().content(text))
            .await
        {
            warn!("Failed to DM owner {}: {e}", self.recipient);
            return Err(e.into());
        }
        Ok(())
    }
}
