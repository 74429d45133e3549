use crate::moderation::MemberProfile;
use crate::{Data, EVENT_TARGET};
use poise::serenity_prelude::{
    self as serenity, Context, EventHandler, GuildId, Member, Mentionable, Ready, User,
};
use tracing::{info, warn};

pub struct Handler;

fn profile(user: &User) -> MemberProfile {
    MemberProfile {
        user_id: user.id.get(),
        mention: user.mention().to_string(),
        first_name: user.global_name.clone().unwrap_or_else(|| user.name.clone()),
        last_name: None,
        username: Some(user.name.clone()),
    }
}

async fn shared_data(ctx: &Context) -> Option<Data> {
    let data = ctx.data.read().await.get::<Data>().cloned();
    if data.is_none() {
        warn!(target: EVENT_TARGET, "Event received before bot data was registered");
    }
    data
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!("Connected as {user_name}, shard {shard_id}");
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!("Cache ready! The bot is in {guild_count} guild(s)");
    }

    async fn guild_member_addition(&self, ctx: Context, new_member: Member) {
        if new_member.user.bot {
            return;
        }
        let Some(data) = shared_data(&ctx).await else {
            return;
        };
        info!(
            target: EVENT_TARGET,
            guild_id = %new_member.guild_id,
            user_id = %new_member.user.id,
            "Member joined"
        );
        data.engine
            .on_member_joined(new_member.guild_id.get(), &profile(&new_member.user))
            .await;
    }

    async fn guild_member_removal(
        &self,
        ctx: Context,
        guild_id: GuildId,
        user: User,
        _member_data_if_available: Option<Member>,
    ) {
        if user.bot {
            return;
        }
        let Some(data) = shared_data(&ctx).await else {
            return;
        };
        info!(
            target: EVENT_TARGET,
            guild_id = %guild_id,
            user_id = %user.id,
            "Member left"
        );
        data.engine
            .on_member_left(guild_id.get(), &profile(&user))
            .await;
    }
}
