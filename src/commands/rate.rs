use poise::serenity_prelude as serenity;
use poise::CreateReply;

use super::dispatch;
use crate::desk::Payload;
use crate::structs::reviews::{RatingBucket, RatingKind, RatingVote};
pub(crate) use crate::types::{Context, Data, Error};

pub fn all_commands() -> Vec<poise::Command<Data, Error>> {
    vec![
        rate(),
        rating(),
        // add more here
    ]
}

/// Rate the ticket you opened, from inside it
#[poise::command(slash_command, guild_only)]
pub async fn rate(
    ctx: Context<'_>,
    #[description = "1 to 5 stars"]
    #[min = 1]
    #[max = 5]
    score: u8,
    #[description = "The middleman who handled your trade; leave empty to rate the service"]
    staff: Option<serenity::User>,
) -> Result<(), Error> {
    let kind = if staff.is_some() { RatingKind::Trade } else { RatingKind::Service };
    let vote = RatingVote {
        kind,
        ticket_id: ctx.channel_id().get(),
        subject: staff.map(|user| user.id.get()),
        score,
    };
    dispatch(ctx, Payload::Rate(vote)).await
}

/// Show ratings for a staff member, or the service overall
#[poise::command(slash_command)]
pub async fn rating(
    ctx: Context<'_>,
    #[description = "Staff member; leave empty for the service rating"] staff: Option<serenity::User>,
) -> Result<(), Error> {
    let ledger = &ctx.data().desk.ratings;
    let (title, bucket) = match &staff {
        Some(user) => (format!("Ratings for {}", user.name), ledger.staff_summary(user.id.get())),
        None => ("Service rating".to_string(), ledger.service_summary()),
    };

    let embed = serenity::CreateEmbed::default()
        .title(title)
        .description(summary_line(bucket.as_ref()))
        .colour(0xfee75c);
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

fn summary_line(bucket: Option<&RatingBucket>) -> String {
    match bucket {
        Some(bucket) if bucket.count > 0 => format!("⭐ {:.2} from {} rating(s)", bucket.avg, bucket.count),
        _ => "No ratings yet.".to_string(),
    }
}
