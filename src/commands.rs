use crate::moderation::{
    CommandInvocation, CommandKind, MessageRef, PolicyCommand, RepliedMessage,
};
use crate::{Context, Data, Error};
use poise::command;
use poise::serenity_prelude as serenity;

/// Every command the bot registers
#[must_use]
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        ping(),
        kick(),
        ban(),
        mute(),
        unmute(),
        unban(),
        warn(),
        unwarn(),
        warnings(),
        setwarnlimit(),
        setrules(),
        setwelcome(),
        setgoodbye(),
        rules(),
    ]
}

/// Tell the issuer how to call a command whose arguments could not be parsed
pub async fn reply_argument_error(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say(usage(ctx.command())).await?;
    Ok(())
}

fn usage(command: &poise::Command<Data, Error>) -> String {
    let mut text = format!(
        "Could not understand those arguments. Usage: /{}",
        command.name
    );
    for parameter in &command.parameters {
        if parameter.required {
            text.push_str(&format!(" <{}>", parameter.name));
        } else {
            text.push_str(&format!(" [{}]", parameter.name));
        }
    }
    text
}

/// The message a prefix command replied to. Slash commands cannot reply.
fn replied_message(ctx: Context<'_>) -> Option<RepliedMessage> {
    let poise::Context::Prefix(prefix) = ctx else {
        return None;
    };
    let referenced = prefix.msg.referenced_message.as_deref()?;
    Some(RepliedMessage {
        author_id: referenced.author.id.get(),
        message: MessageRef {
            chat_id: prefix.msg.guild_id.map_or(0, serenity::GuildId::get),
            channel_id: referenced.channel_id.get(),
            message_id: referenced.id.get(),
        },
    })
}

/// Hand a moderation command to the engine and post its reply
///
/// Arguments go through as typed. The engine decides whether the first one
/// names the target or, when replying to a message, is already an option.
async fn moderate(
    ctx: Context<'_>,
    kind: CommandKind,
    user: Option<String>,
    options: Vec<String>,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };

    let mut invocation = CommandInvocation::new(kind, guild_id.get(), ctx.author().id.get())
        .with_args(user.into_iter().chain(options));
    invocation.reply_to = replied_message(ctx);

    let reply = ctx.data().engine.execute(&invocation).await;
    ctx.say(reply).await?;
    Ok(())
}

async fn configure(
    ctx: Context<'_>,
    command: PolicyCommand,
    value: Option<String>,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };
    let args: Vec<String> = value.into_iter().collect();
    let reply = ctx
        .data()
        .engine
        .configure(guild_id.get(), ctx.author().id.get(), command, &args)
        .await;
    ctx.say(reply).await?;
    Ok(())
}

/// Basic ping command
/// This command is used to check if the bot is responsive.
#[command(prefix_command, slash_command, guild_only)]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say("Pong!").await?;
    Ok(())
}

/// Kick a user from the server
#[command(prefix_command, slash_command, guild_only)]
pub async fn kick(
    ctx: Context<'_>,
    #[description = "User mention or id to kick, or reply to their message"] user: Option<String>,
) -> Result<(), Error> {
    moderate(ctx, CommandKind::Kick, user, Vec::new()).await
}

/// Ban a user from the server
#[command(prefix_command, slash_command, guild_only)]
pub async fn ban(
    ctx: Context<'_>,
    #[description = "User mention or id to ban, or reply to their message"] user: Option<String>,
) -> Result<(), Error> {
    moderate(ctx, CommandKind::Ban, user, Vec::new()).await
}

/// Time a user out
#[command(prefix_command, slash_command, guild_only)]
pub async fn mute(
    ctx: Context<'_>,
    #[description = "User mention or id to mute, or reply to their message"] user: Option<String>,
    #[description = "Duration in seconds (default 3600)"] duration: Option<String>,
) -> Result<(), Error> {
    moderate(ctx, CommandKind::Mute, user, duration.into_iter().collect()).await
}

/// Lift a user's timeout
#[command(prefix_command, slash_command, guild_only)]
pub async fn unmute(
    ctx: Context<'_>,
    #[description = "User mention or id to unmute"] user: Option<String>,
) -> Result<(), Error> {
    moderate(ctx, CommandKind::Unmute, user, Vec::new()).await
}

/// Lift a ban
#[command(prefix_command, slash_command, guild_only)]
pub async fn unban(
    ctx: Context<'_>,
    #[description = "User mention or id to unban"] user: Option<String>,
) -> Result<(), Error> {
    moderate(ctx, CommandKind::Unban, user, Vec::new()).await
}

/// Warn a user. Reaching the server's warn limit bans them.
#[command(prefix_command, slash_command, guild_only)]
pub async fn warn(
    ctx: Context<'_>,
    #[description = "User mention or id to warn, or reply to their message"] user: Option<String>,
    #[rest]
    #[description = "Reason"]
    reason: Option<String>,
) -> Result<(), Error> {
    moderate(ctx, CommandKind::Warn, user, reason.into_iter().collect()).await
}

/// Remove a user's most recent warning
#[command(prefix_command, slash_command, guild_only)]
pub async fn unwarn(
    ctx: Context<'_>,
    #[description = "User mention or id to unwarn, or reply to their message"] user: Option<String>,
) -> Result<(), Error> {
    moderate(ctx, CommandKind::Unwarn, user, Vec::new()).await
}

/// List a user's warnings
#[command(prefix_command, slash_command, guild_only)]
pub async fn warnings(
    ctx: Context<'_>,
    #[description = "User mention or id to look up, or reply to their message"] user: Option<String>,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };
    let reply_author = replied_message(ctx).map(|reply| reply.author_id);
    let reply = ctx
        .data()
        .engine
        .warnings_report(
            guild_id.get(),
            ctx.author().id.get(),
            reply_author,
            user.as_deref(),
        )
        .await;
    ctx.say(reply).await?;
    Ok(())
}

/// Set how many warnings lead to a ban
#[command(prefix_command, slash_command, guild_only)]
pub async fn setwarnlimit(
    ctx: Context<'_>,
    #[description = "Number of warnings before ban"] limit: Option<String>,
) -> Result<(), Error> {
    configure(ctx, PolicyCommand::SetWarnLimit, limit).await
}

/// Set the server rules
#[command(prefix_command, slash_command, guild_only)]
pub async fn setrules(
    ctx: Context<'_>,
    #[rest]
    #[description = "Rules text"]
    rules: Option<String>,
) -> Result<(), Error> {
    configure(ctx, PolicyCommand::SetRules, rules).await
}

/// Set the welcome message. Placeholders: {user} {first_name} {last_name} {username} {group}
#[command(prefix_command, slash_command, guild_only)]
pub async fn setwelcome(
    ctx: Context<'_>,
    #[rest]
    #[description = "Welcome message template"]
    message: Option<String>,
) -> Result<(), Error> {
    configure(ctx, PolicyCommand::SetWelcome, message).await
}

/// Set the goodbye message. Placeholders: {user} {first_name} {last_name} {username} {group}
#[command(prefix_command, slash_command, guild_only)]
pub async fn setgoodbye(
    ctx: Context<'_>,
    #[rest]
    #[description = "Goodbye message template"]
    message: Option<String>,
) -> Result<(), Error> {
    configure(ctx, PolicyCommand::SetGoodbye, message).await
}

/// Show the server rules
#[command(prefix_command, slash_command, guild_only)]
pub async fn rules(ctx: Context<'_>) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };
    let reply = ctx
        .data()
        .engine
        .rules(guild_id.get(), ctx.author().id.get())
        .await;
    ctx.say(reply).await?;
    Ok(())
}
