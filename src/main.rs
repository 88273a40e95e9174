use poise::serenity_prelude as serenity;
use serenity::all::FullEvent;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod desk;
mod error;
mod helpers;
mod settings;
mod structs;
mod types;

use types::{Data, Error};

use crate::commands::{all_commands, component_payload, outcome_embed};
use crate::desk::{Desk, Event};
use crate::helpers::discord::SerenityGateway;
use crate::settings::Settings;

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match &error {
        poise::FrameworkError::Setup { error, .. } => {
            error!(error = %error, "failed to start bot");
        }
        poise::FrameworkError::Command { ctx, error, .. } => {
            error!(command = %ctx.command().qualified_name, error = %error, "command failed");
            let reply = poise::CreateReply::default()
                .content("Something went wrong while running that command.")
                .ephemeral(true);
            if let Err(e) = ctx.send(reply).await {
                warn!(error = %e, "could not report command failure, interaction likely expired");
            }
        }
        poise::FrameworkError::CommandCheckFailed { ctx, .. } => {
            let guild_id = ctx.guild_id().map(|id| id.get());
            warn!(command = %ctx.command().qualified_name, user = %ctx.author().name, guild_id = ?guild_id, "command check failed");
        }
        _ => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!(error = %e, "unhandled framework error");
            }
        }
    }
}

async fn handle_component(ctx: &serenity::Context, component: &serenity::ComponentInteraction, data: &Data) {
    let Some(payload) = component_payload(&component.data.custom_id) else {
        return;
    };

    if let Err(e) = component.defer_ephemeral(&ctx.http).await {
        warn!(custom_id = %component.data.custom_id, error = %e, "interaction expired before it was acknowledged");
        return;
    }

    let event = Event {
        guild_id: component.guild_id.map(|id| id.get()),
        actor: component.user.id.get(),
        channel_id: Some(component.channel_id.get()),
        payload,
    };
    let outcome = data.desk.dispatch(event).await;

    let followup = serenity::CreateInteractionResponseFollowup::new()
        .embed(outcome_embed(&outcome))
        .ephemeral(true);
    if let Err(e) = component.create_followup(&ctx.http, followup).await {
        // the ticket channel may already be gone
        warn!(custom_id = %component.data.custom_id, error = %e, "could not send interaction reply");
    }
}

async fn event_handler(
    ctx: &serenity::Context,
    event: &FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        FullEvent::Ready { data_about_bot } => {
            info!(user = %data_about_bot.user.name, guilds = data_about_bot.guilds.len(), "connected");
        }
        FullEvent::InteractionCreate { interaction: serenity::Interaction::Component(component) } => {
            handle_component(ctx, component, data).await;
        }
        _ => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env()?;

    let http_client = Arc::new(serenity::Http::new(&settings.token));
    let bot_user = http_client.get_current_user().await?;
    let gateway = Arc::new(SerenityGateway::new(http_client));
    let desk = Arc::new(Desk::open(&settings, gateway, bot_user.id.get()).await?);

    let intents = serenity::GatewayIntents::GUILDS | serenity::GatewayIntents::GUILD_MEMBERS;

    let setup_desk = Arc::clone(&desk);
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: all_commands(),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            pre_command: |ctx| {
                Box::pin(async move {
                    info!(command = %ctx.command().qualified_name, user = %ctx.author().name, "running command");
                })
            },
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                info!("slash commands registered");

                Ok(Data { desk: setup_desk })
            })
        })
        .build();

    let mut client = serenity::Client::builder(&settings.token, intents)
        .framework(framework)
        .await?;

    let shard_manager = Arc::clone(&client.shard_manager);
    let shutdown_desk = Arc::clone(&desk);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down, flushing pending writes");
            shutdown_desk.flush().await;
            shard_manager.shutdown_all().await;
        }
    });

    client.start().await?;
    desk.flush().await;

    Ok(())
}
