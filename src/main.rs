use std::sync::Arc;

use bailiff::config::BotConfig;
use bailiff::discord::{DiscordNotifier, DiscordPlatform};
use bailiff::moderation::{ModerationEngine, ThrottleGuard};
use bailiff::store::YamlStore;
use bailiff::{BOT_NAME, Data, Error, commands, handlers, logging};
use poise::serenity_prelude::{self as serenity};
use serenity::GatewayIntents;
use tracing::{error, info};

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    // Initialize logging
    logging::init()?;

    let config = BotConfig::from_env()?;
    let store = YamlStore::load(&config.data_dir).await?;
    let token = config.discord_token.clone();

    // Configure the Poise framework
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some("/".into()),
                ..Default::default()
            },
            pre_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_start(ctx).await;
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_end(ctx).await;
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    logging::log_command_error(&error);
                    if let poise::FrameworkError::ArgumentParse { ctx, .. } = error {
                        if let Err(e) = commands::reply_argument_error(ctx).await {
                            error!("Failed to reply to argument error: {e}");
                        }
                    }
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                logging::log_console(format!("Registering commands for {BOT_NAME}"));
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                let platform = Arc::new(DiscordPlatform::new(ctx.http.clone(), ready.user.id));
                let notifier = DiscordNotifier::new(ctx.http.clone(), config.owner_id)
                    .ok_or("OWNER_ID must be a Discord user id")?;
                let engine = ModerationEngine::new(
                    platform,
                    Arc::new(store.clone()),
                    Arc::new(notifier),
                    config.owner_id,
                    ThrottleGuard::new(config.cooldown),
                );
                let data = Data::new(store, engine);

                // Event handlers read the same data through serenity's type map
                ctx.data.write().await.insert::<Data>(data.clone());
                Ok(data)
            })
        })
        .build();

    // Member events need the privileged GUILD_MEMBERS intent
    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS;
    let mut client = serenity::ClientBuilder::new(token, intents)
        .event_handler(handlers::Handler)
        .framework(framework)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            shard_manager.shutdown_all().await;
        }
    });

    info!("Starting bot...");
    if let Err(err) = client.start().await {
        error!("Error starting the bot: {err}");
    }

    // Data only exists once setup ran
    let data = client.data.read().await.get::<Data>().cloned();
    if let Some(data) = data {
        data.save().await?;
        info!("Moderation data saved");
    }
    Ok(())
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to start runtime: {err}");
            std::process::exit(1);
        }
    };

    // Handle any errors that occurred during execution
    if let Err(err) = runtime.block_on(async_main()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
