use poise::serenity_prelude as serenity;
use poise::CreateReply;

use super::{dispatch, event, outcome_embed};
use crate::desk::Payload;
use crate::structs::premium::{BrandingPatch, FeaturesPatch, PingPatch, PingsPatch, TranscriptsPatch};
pub(crate) use crate::types::{Context, Data, Error};

pub fn all_commands() -> Vec<poise::Command<Data, Error>> {
    vec![
        premium(),
        // add more here
    ]
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum PingTarget {
    #[name = "support"]
    Support,
    #[name = "trade"]
    Trade,
}

#[poise::command(
    slash_command,
    subcommands("redeem", "status", "branding", "features", "pings", "genkeys", "keys"),
    subcommand_required
)]
pub async fn premium(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Redeem a license key for this server
#[poise::command(slash_command, guild_only)]
pub async fn redeem(
    ctx: Context<'_>,
    #[description = "License key, e.g. TKT-XXXX-XXXX-XXXX"] key: String,
) -> Result<(), Error> {
    dispatch(ctx, Payload::Redeem { key }).await
}

/// Show this server's plan
#[poise::command(slash_command, guild_only)]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    dispatch(ctx, Payload::Status).await
}

/// Change how ticket embeds look
#[poise::command(slash_command, guild_only)]
pub async fn branding(
    ctx: Context<'_>,
    #[description = "Name shown in the footer"] name: Option<String>,
    #[description = "Footer icon (http or https url)"] icon_url: Option<String>,
    #[description = "Accent colour, e.g. #5865F2"] accent: Option<String>,
) -> Result<(), Error> {
    let patch = BrandingPatch {
        name: name.map(Some),
        icon_url: icon_url.map(Some),
        accent: accent.map(Some),
    };
    dispatch(ctx, Payload::Branding(patch)).await
}

/// Change premium ticket behaviour
#[poise::command(slash_command, guild_only)]
pub async fn features(
    ctx: Context<'_>,
    #[description = "Channel name template using {user}, {type} and {id}"] name_template: Option<String>,
    #[description = "Welcome message using {user}, {type}, {id} and {server}"] welcome: Option<String>,
    #[description = "Close tickets automatically after this many minutes (0 = off)"]
    #[max = 1440]
    auto_close_minutes: Option<u32>,
    #[description = "Comma separated close reasons"] close_reasons: Option<String>,
    #[description = "Prefix claimed tickets with claimed-"] claim_tag: Option<bool>,
    #[description = "Mark new tickets as priority"] priority: Option<bool>,
    #[description = "Post a transcript when a ticket closes"] transcripts: Option<bool>,
    #[description = "Where transcripts go (defaults to the log channel)"]
    #[channel_types("Text")]
    transcript_channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let transcripts = match (transcripts, transcript_channel) {
        (None, None) => None,
        (enabled, channel) => Some(TranscriptsPatch {
            enabled,
            channel_id: channel.map(|c| Some(c.id.get())),
        }),
    };
    let patch = FeaturesPatch {
        ticket_name_template: name_template.map(Some),
        welcome_message: welcome.map(Some),
        auto_close_minutes,
        close_reasons: close_reasons.map(|raw| raw.split(',').map(|r| r.trim().to_string()).collect()),
        claim_auto_tag: claim_tag,
        priority,
        transcripts,
        ..Default::default()
    };
    dispatch(ctx, Payload::Features(patch)).await
}

/// Choose who gets pinged when a ticket opens
#[poise::command(slash_command, guild_only)]
pub async fn pings(
    ctx: Context<'_>,
    #[description = "Which ticket type"] kind: PingTarget,
    #[description = "Role mentions or ids to ping"] roles: Option<String>,
    #[description = "Ping @here"] here: Option<bool>,
    #[description = "Ping @everyone"] everyone: Option<bool>,
) -> Result<(), Error> {
    let ping = PingPatch {
        roles: roles.map(|raw| raw.split_whitespace().map(str::to_string).collect()),
        here,
        everyone,
    };
    let pings = match kind {
        PingTarget::Support => PingsPatch { support: Some(ping), ..Default::default() },
        PingTarget::Trade => PingsPatch { trade: Some(ping), ..Default::default() },
    };
    let patch = FeaturesPatch { pings: Some(pings), ..Default::default() };
    dispatch(ctx, Payload::Features(patch)).await
}

/// Issue license keys (bot owner only)
#[poise::command(slash_command)]
pub async fn genkeys(
    ctx: Context<'_>,
    #[description = "Duration, e.g. 30d, 1m, 2w 3d"] duration: String,
    #[description = "How many keys (1-25)"]
    #[min = 1]
    #[max = 25]
    count: Option<u8>,
    #[description = "Plan label"] plan: Option<String>,
) -> Result<(), Error> {
    let payload = Payload::GenerateKeys { plan, duration, count: count.map(usize::from).unwrap_or(1) };
    let outcome = ctx.data().desk.dispatch(event(&ctx, payload)).await;

    let mut reply = CreateReply::default().embed(outcome_embed(&outcome)).ephemeral(true);
    if let Some(keys) = outcome.data.as_ref().and_then(|d| d.as_array()) {
        let text = keys.iter().filter_map(|k| k.as_str()).collect::<Vec<_>>().join("\n");
        reply = reply.attachment(serenity::CreateAttachment::bytes(text.into_bytes(), "keys.txt"));
    }
    ctx.send(reply).await?;
    Ok(())
}

/// List issued license keys (bot owner only)
#[poise::command(slash_command)]
pub async fn keys(
    ctx: Context<'_>,
    #[description = "Include redeemed keys"] include_used: Option<bool>,
) -> Result<(), Error> {
    let payload = Payload::ListKeys { include_used: include_used.unwrap_or(false) };
    let outcome = ctx.data().desk.dispatch(event(&ctx, payload)).await;

    let mut reply = CreateReply::default().embed(outcome_embed(&outcome)).ephemeral(true);
    if let Some(data) = &outcome.data {
        let listing = serde_json::to_vec_pretty(data)?;
        reply = reply.attachment(serenity::CreateAttachment::bytes(listing, "keys.json"));
    }
    ctx.send(reply).await?;
    Ok(())
}
