use poise::serenity_prelude as serenity;
use poise::CreateReply;

use super::{dispatch, reply};
use crate::desk::{Outcome, Payload};
use crate::structs::guild_config::{ConfigPatch, GuildConfig, PanelTextPatch};
pub(crate) use crate::types::{Context, Data, Error};

pub fn all_commands() -> Vec<poise::Command<Data, Error>> {
    vec![
        setup(),
        // add more here
    ]
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum RoleGroup {
    #[name = "support"]
    Support,
    #[name = "middleman"]
    Middleman,
    #[name = "admin"]
    Admin,
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum PanelKind {
    #[name = "support"]
    Support,
    #[name = "trade"]
    Trade,
}

#[poise::command(
    slash_command,
    guild_only,
    subcommands("support", "trade", "logs", "roles", "panel", "show"),
    subcommand_required
)]
pub async fn setup(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Set the category support tickets open in
#[poise::command(slash_command, guild_only)]
pub async fn support(
    ctx: Context<'_>,
    #[description = "Category for support tickets"]
    #[channel_types("Category")]
    category: Option<serenity::GuildChannel>,
    #[description = "Turn support tickets on or off"] enabled: Option<bool>,
    #[description = "Forget the configured category"] clear: Option<bool>,
) -> Result<(), Error> {
    let patch = ConfigPatch {
        support_category_id: id_change(category.map(|c| c.id.get()), clear),
        support_enabled: enabled,
        ..Default::default()
    };
    dispatch(ctx, Payload::Configure(patch)).await
}

/// Set the category trade tickets open in
#[poise::command(slash_command, guild_only)]
pub async fn trade(
    ctx: Context<'_>,
    #[description = "Category for trade tickets"]
    #[channel_types("Category")]
    category: Option<serenity::GuildChannel>,
    #[description = "Turn trade tickets on or off"] enabled: Option<bool>,
    #[description = "Forget the configured category"] clear: Option<bool>,
) -> Result<(), Error> {
    let patch = ConfigPatch {
        mm_category_id: id_change(category.map(|c| c.id.get()), clear),
        trade_enabled: enabled,
        ..Default::default()
    };
    dispatch(ctx, Payload::Configure(patch)).await
}

/// Set where closed tickets are logged
#[poise::command(slash_command, guild_only)]
pub async fn logs(
    ctx: Context<'_>,
    #[description = "Log channel"]
    #[channel_types("Text")]
    channel: Option<serenity::GuildChannel>,
    #[description = "Turn logging on or off"] enabled: Option<bool>,
    #[description = "Forget the configured channel"] clear: Option<bool>,
) -> Result<(), Error> {
    let patch = ConfigPatch {
        log_channel_id: id_change(channel.map(|c| c.id.get()), clear),
        logs_enabled: enabled,
        ..Default::default()
    };
    dispatch(ctx, Payload::Configure(patch)).await
}

/// Replace a staff role list. Mentions or ids, separated by spaces or commas
#[poise::command(slash_command, guild_only)]
pub async fn roles(
    ctx: Context<'_>,
    #[description = "Which staff group"] group: RoleGroup,
    #[description = "Role mentions or ids; leave empty to clear"] roles: Option<String>,
) -> Result<(), Error> {
    let roles = split_list(roles.as_deref().unwrap_or(""));
    let patch = match group {
        RoleGroup::Support => ConfigPatch { support_roles: Some(roles), ..Default::default() },
        RoleGroup::Middleman => ConfigPatch { mm_roles: Some(roles), ..Default::default() },
        RoleGroup::Admin => ConfigPatch { admin_roles: Some(roles), ..Default::default() },
    };
    dispatch(ctx, Payload::Configure(patch)).await
}

/// Set the description shown on a ticket
#[poise::command(slash_command, guild_only)]
pub async fn panel(
    ctx: Context<'_>,
    #[description = "Which ticket type"] kind: PanelKind,
    #[description = "Text to show; leave empty to reset"] text: Option<String>,
) -> Result<(), Error> {
    let panel = match kind {
        PanelKind::Support => PanelTextPatch { support_description: Some(text), ..Default::default() },
        PanelKind::Trade => PanelTextPatch { trade_description: Some(text), ..Default::default() },
    };
    let patch = ConfigPatch { panel_text: Some(panel), ..Default::default() };
    dispatch(ctx, Payload::Configure(patch)).await
}

/// Show the current ticket configuration
#[poise::command(slash_command, guild_only)]
pub async fn show(ctx: Context<'_>) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return reply(ctx, Outcome::ok("There is nothing to show outside a server.")).await;
    };
    let config = ctx.data().desk.configs.get_config(guild_id.get());

    ctx.send(CreateReply::default().embed(config_embed(&config)).ephemeral(true)).await?;
    Ok(())
}

fn id_change(id: Option<u64>, clear: Option<bool>) -> Option<Option<u64>> {
    match (id, clear) {
        (_, Some(true)) => Some(None),
        (Some(id), _) => Some(Some(id)),
        (None, _) => None,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn channel_line(id: Option<u64>, enabled: bool) -> String {
    match id {
        Some(id) => format!("<#{}> ({})", id, if enabled { "on" } else { "off" }),
        None => "not set".to_string(),
    }
}

fn role_line(roles: &std::collections::BTreeSet<u64>) -> String {
    if roles.is_empty() {
        "none".to_string()
    } else {
        roles.iter().map(|id| format!("<@&{}>", id)).collect::<Vec<_>>().join(" ")
    }
}

fn config_embed(config: &GuildConfig) -> serenity::CreateEmbed {
    serenity::CreateEmbed::default()
        .title("Ticket configuration")
        .field("Support category", channel_line(config.support_category_id, config.support_enabled), true)
        .field("Trade category", channel_line(config.mm_category_id, config.trade_enabled), true)
        .field("Log channel", channel_line(config.log_channel_id, config.logs_enabled), true)
        .field("Support roles", role_line(&config.support_roles), false)
        .field("Middleman roles", role_line(&config.mm_roles), false)
        .field("Admin roles", role_line(&config.admin_roles), false)
        .colour(0x5865f2)
}
