use poise::serenity_prelude as serenity;
use poise::CreateReply;

use super::{dispatch, reply};
use crate::desk::{Outcome, Payload};
use crate::structs::ticket::TicketKind;
pub(crate) use crate::types::{Context, Data, Error};

pub fn all_commands() -> Vec<poise::Command<Data, Error>> {
    vec![
        ticket(),
        // add more here
    ]
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum KindChoice {
    #[name = "support"]
    Support,
    #[name = "trade"]
    Trade,
}

impl From<KindChoice> for TicketKind {
    fn from(choice: KindChoice) -> Self {
        match choice {
            KindChoice::Support => TicketKind::Support,
            KindChoice::Trade => TicketKind::Trade,
        }
    }
}

#[poise::command(
    slash_command,
    guild_only,
    subcommands("open", "claim", "unclaim", "close", "reasons"),
    subcommand_required
)]
pub async fn ticket(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Open a support or trade ticket
#[poise::command(slash_command, guild_only)]
pub async fn open(
    ctx: Context<'_>,
    #[description = "What kind of ticket"] kind: KindChoice,
    #[description = "Who you are trading with"] other_party: Option<String>,
    #[description = "What do you need help with?"] details: Option<String>,
) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;

    let guild_name = ctx
        .guild()
        .map(|guild| guild.name.clone())
        .unwrap_or_else(|| "this server".to_string());

    let payload = Payload::Create {
        kind: kind.into(),
        opener_name: ctx.author().name.clone(),
        guild_name,
        other_party,
        details,
    };
    dispatch(ctx, payload).await
}

/// Take responsibility for this ticket
#[poise::command(slash_command, guild_only)]
pub async fn claim(ctx: Context<'_>) -> Result<(), Error> {
    dispatch(ctx, Payload::Claim).await
}

/// Hand this ticket back
#[poise::command(slash_command, guild_only)]
pub async fn unclaim(ctx: Context<'_>) -> Result<(), Error> {
    dispatch(ctx, Payload::Unclaim).await
}

async fn autocomplete_reason(ctx: Context<'_>, partial: &str) -> impl Iterator<Item = String> {
    let reasons = match ctx.guild_id() {
        Some(guild_id) => ctx.data().desk.tickets.close_reasons(guild_id.get()).await,
        None => Vec::new(),
    };
    let partial = partial.to_lowercase();
    reasons
        .into_iter()
        .filter(move |reason| reason.to_lowercase().contains(&partial))
}

/// Close this ticket
#[poise::command(slash_command, guild_only)]
pub async fn close(
    ctx: Context<'_>,
    #[description = "Why the ticket is being closed"]
    #[autocomplete = "autocomplete_reason"]
    reason: Option<String>,
) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;
    dispatch(ctx, Payload::Close { reason }).await
}

/// List the close reasons for this server
#[poise::command(slash_command, guild_only)]
pub async fn reasons(ctx: Context<'_>) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return reply(ctx, Outcome::ok("Close reasons only exist inside a server.")).await;
    };

    let reasons = ctx.data().desk.tickets.close_reasons(guild_id.get()).await;
    let list = reasons
        .iter()
        .enumerate()
        .map(|(i, reason)| format!("{}. {}", i + 1, reason))
        .collect::<Vec<_>>()
        .join("\n");

    let embed = serenity::CreateEmbed::default()
        .title("Close reasons")
        .description(list)
        .colour(0x5865f2);
    ctx.send(CreateReply::default().embed(embed).ephemeral(true)).await?;
    Ok(())
}
