pub mod premium;
pub mod rate;
pub mod setup;
pub mod ticket;

use poise::serenity_prelude as serenity;
use poise::{Command, CreateReply};

use crate::desk::{Event, Outcome, Payload, Status};
use crate::helpers::tickets::{CLAIM_CONTROL, CLOSE_CONTROL, UNCLAIM_CONTROL};
use crate::structs::reviews::RatingVote;
use crate::types::{Context, Data, Error};

const OK_COLOUR: u32 = 0x57f287;
const ERROR_COLOUR: u32 = 0xed4245;

pub fn all_commands() -> Vec<Command<Data, Error>> {
    let mut commands = Vec::new();

    commands.extend(ticket::all_commands());
    commands.extend(setup::all_commands());
    commands.extend(premium::all_commands());
    commands.extend(rate::all_commands());

    commands
}

pub(crate) fn event(ctx: &Context<'_>, payload: Payload) -> Event {
    Event {
        guild_id: ctx.guild_id().map(|id| id.get()),
        actor: ctx.author().id.get(),
        channel_id: Some(ctx.channel_id().get()),
        payload,
    }
}

/// Maps a button's custom id to the action it stands for.
pub fn component_payload(custom_id: &str) -> Option<Payload> {
    match custom_id {
        CLAIM_CONTROL => Some(Payload::Claim),
        UNCLAIM_CONTROL => Some(Payload::Unclaim),
        CLOSE_CONTROL => Some(Payload::Close { reason: None }),
        other => RatingVote::parse(other).map(Payload::Rate),
    }
}

pub fn outcome_embed(outcome: &Outcome) -> serenity::CreateEmbed {
    let (title, colour) = match outcome.status {
        Status::Ok => ("Done", OK_COLOUR),
        Status::Error => ("Something went wrong", ERROR_COLOUR),
    };
    let mut embed = serenity::CreateEmbed::default().title(title).colour(colour);
    if let Some(message) = &outcome.message {
        embed = embed.description(message);
    }
    embed
}

/// Ephemeral reply with the outcome; errors are never shown to the channel.
pub(crate) async fn reply(ctx: Context<'_>, outcome: Outcome) -> Result<(), Error> {
    ctx.send(CreateReply::default().embed(outcome_embed(&outcome)).ephemeral(true)).await?;
    Ok(())
}

pub(crate) async fn dispatch(ctx: Context<'_>, payload: Payload) -> Result<(), Error> {
    let outcome = ctx.data().desk.dispatch(event(&ctx, payload)).await;
    reply(ctx, outcome).await
}
