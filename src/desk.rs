//! Wires the managers together and turns normalized events into outcomes.
//! Slash commands, buttons and any other front end go through [`Desk::dispatch`].

use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::DeskError;
use crate::helpers::auth::is_admin;
use crate::helpers::clock::{Clock, SystemClock};
use crate::helpers::gateway::Gateway;
use crate::helpers::guild_config::GuildConfigManager;
use crate::helpers::license::KeyIssuer;
use crate::helpers::premium::PremiumManager;
use crate::helpers::reviews::RatingLedger;
use crate::helpers::scheduler::{Scheduler, TokioScheduler};
use crate::helpers::sqlite_store::SqliteBackend;
use crate::helpers::store::{
    Backend, JsonFileBackend, Repository, StoreError, WritePolicy, GUILD_CONFIGS, PREMIUM_GUILDS, PREMIUM_KEYS,
    RATED_TICKETS, REVIEWS,
};
use crate::helpers::tickets::{Actor, EngineSettings, TicketEngine, TicketRequest};
use crate::settings::{Settings, StorageTarget};
use crate::structs::guild_config::ConfigPatch;
use crate::structs::premium::{BrandingPatch, FeaturesPatch, PremiumPatch};
use crate::structs::reviews::RatingVote;
use crate::structs::ticket::TicketKind;

#[derive(Debug, Clone)]
pub enum Payload {
    Create {
        kind: TicketKind,
        opener_name: String,
        guild_name: String,
        other_party: Option<String>,
        details: Option<String>,
    },
    Claim,
    Unclaim,
    Close {
        reason: Option<String>,
    },
    Configure(ConfigPatch),
    Redeem {
        key: String,
    },
    Branding(BrandingPatch),
    Features(FeaturesPatch),
    GenerateKeys {
        plan: Option<String>,
        duration: String,
        count: usize,
    },
    ListKeys {
        include_used: bool,
    },
    Rate(RatingVote),
    Status,
}

/// One user action. `guild_id` is absent for actions taken in DMs, such as
/// rating buttons.
#[derive(Debug, Clone)]
pub struct Event {
    pub guild_id: Option<u64>,
    pub actor: u64,
    pub channel_id: Option<u64>,
    pub payload: Payload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Outcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { status: Status::Ok, message: Some(message.into()), data: None }
    }

    pub fn error(error: &DeskError) -> Self {
        Self { status: Status::Error, message: Some(error.user_message()), data: None }
    }

    fn with<T: Serialize>(mut self, data: &T) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

pub struct Desk {
    pub configs: GuildConfigManager,
    pub premium: Arc<PremiumManager>,
    pub issuer: KeyIssuer,
    pub tickets: Arc<TicketEngine>,
    pub ratings: RatingLedger,
    bot_owner_id: Option<u64>,
}

impl Desk {
    pub async fn open(settings: &Settings, gateway: Arc<dyn Gateway>, bot_user_id: u64) -> Result<Self, StoreError> {
        let backend: Arc<dyn Backend> = match &settings.storage {
            StorageTarget::JsonDir(dir) => {
                info!(dir = %dir.display(), "storing documents as json files");
                Arc::new(JsonFileBackend::new(dir.clone()))
            }
            StorageTarget::Sqlite(url) => {
                info!("storing documents in sqlite");
                Arc::new(SqliteBackend::new(url).await?)
            }
        };

        let scheduler = Arc::new(TokioScheduler);
        Ok(Self::assemble(backend, scheduler, Arc::new(SystemClock), gateway, Some(bot_user_id), settings).await)
    }

    pub async fn assemble(
        backend: Arc<dyn Backend>,
        scheduler: Arc<dyn Scheduler>,
        clock: Arc<dyn Clock>,
        gateway: Arc<dyn Gateway>,
        bot_user_id: Option<u64>,
        settings: &Settings,
    ) -> Self {
        let retry = settings.store_retry;
        let debounced = WritePolicy::Debounced(settings.config_debounce);
        let immediate = WritePolicy::Immediate;

        let configs = Repository::open(GUILD_CONFIGS, backend.clone(), scheduler.clone(), debounced, retry).await;
        let states = Repository::open(PREMIUM_GUILDS, backend.clone(), scheduler.clone(), immediate, retry).await;
        let keys = Repository::open(PREMIUM_KEYS, backend.clone(), scheduler.clone(), immediate, retry).await;
        let reviews = Repository::open(REVIEWS, backend.clone(), scheduler.clone(), immediate, retry).await;
        let rated = Repository::open(RATED_TICKETS, backend, scheduler.clone(), immediate, retry).await;

        let configs = GuildConfigManager::new(configs);
        let premium = Arc::new(PremiumManager::new(states, keys.clone(), clock.clone()));
        let tickets = Arc::new(TicketEngine::new(
            configs.clone(),
            premium.clone(),
            gateway,
            scheduler,
            EngineSettings {
                bot_user_id,
                bot_owner_id: settings.bot_owner_id,
                dm_summary: settings.dm_summary,
                close_grace: settings.close_grace,
            },
        ));

        Self {
            configs,
            premium,
            issuer: KeyIssuer::new(keys, clock),
            tickets,
            ratings: RatingLedger::new(reviews, rated),
            bot_owner_id: settings.bot_owner_id,
        }
    }

    /// Writes pending coalesced changes. Called on shutdown.
    pub async fn flush(&self) {
        self.configs.flush().await;
    }

    pub async fn dispatch(&self, event: Event) -> Outcome {
        let guild_id = event.guild_id;
        let actor = event.actor;
        match self.handle(event).await {
            Ok(outcome) => outcome,
            Err(e) => {
                match &e {
                    DeskError::Platform(_) | DeskError::PersistenceDegraded(_) => {
                        warn!(guild_id = ?guild_id, actor, error = %e, "action failed")
                    }
                    _ => debug!(guild_id = ?guild_id, actor, error = %e, "action rejected"),
                }
                Outcome::error(&e)
            }
        }
    }

    async fn handle(&self, event: Event) -> Result<Outcome, DeskError> {
        let actor = event.actor;
        match event.payload {
            Payload::Create { kind, opener_name, guild_name, other_party, details } => {
                let request = TicketRequest {
                    guild_id: in_guild(event.guild_id)?,
                    guild_name,
                    opener_id: actor,
                    opener_name,
                    kind,
                    other_party,
                    details,
                };
                let opened = self.tickets.create(request).await?;
                Ok(Outcome::ok(format!("Your ticket is ready: <#{}>", opened.channel_id)).with(&json!({
                    "channelId": opened.channel_id.to_string(),
                    "name": opened.name,
                })))
            }
            Payload::Claim => {
                let topic = self.tickets.claim(in_channel(event.channel_id)?, actor).await?;
                Ok(Outcome::ok("You claimed this ticket.").with(&json!({ "topic": topic.serialize() })))
            }
            Payload::Unclaim => {
                let topic = self.tickets.unclaim(in_channel(event.channel_id)?, actor).await?;
                Ok(Outcome::ok("Ticket unclaimed.").with(&json!({ "topic": topic.serialize() })))
            }
            Payload::Close { reason } => {
                let channel_id = in_channel(event.channel_id)?;
                let report = self.tickets.close(channel_id, Actor::Member(actor), reason).await?;
                let message = if report.already_closing {
                    "This ticket is already closing."
                } else if report.channel_gone {
                    "This ticket no longer exists."
                } else {
                    "Closing ticket."
                };
                Ok(Outcome::ok(message).with(&json!({
                    "deletionScheduled": report.deletion_scheduled,
                    "alreadyClosing": report.already_closing,
                })))
            }
            Payload::Configure(patch) => {
                let guild_id = in_guild(event.guild_id)?;
                self.require_admin(guild_id, actor).await?;
                let config = self.configs.save_config(guild_id, patch).await;
                Ok(Outcome::ok("Configuration saved.").with(&config))
            }
            Payload::Redeem { key } => {
                let guild_id = in_guild(event.guild_id)?;
                self.require_admin(guild_id, actor).await?;
                let state = self.premium.redeem(guild_id, &key).await?;
                let until = state
                    .expires_at
                    .map_or("no expiry".to_string(), |at| format!("until <t:{}:F>", at.timestamp()));
                Ok(Outcome::ok(format!("Premium is active {}.", until)).with(&state))
            }
            Payload::Branding(branding) => {
                let guild_id = in_guild(event.guild_id)?;
                self.require_admin(guild_id, actor).await?;
                self.require_premium(guild_id).await?;
                let patch = PremiumPatch { branding: Some(branding), ..Default::default() };
                let state = self.premium.save_state(guild_id, patch).await?;
                Ok(Outcome::ok("Branding updated.").with(&state.branding))
            }
            Payload::Features(features) => {
                let guild_id = in_guild(event.guild_id)?;
                self.require_admin(guild_id, actor).await?;
                self.require_premium(guild_id).await?;
                let patch = PremiumPatch { features: Some(features), ..Default::default() };
                let state = self.premium.save_state(guild_id, patch).await?;
                Ok(Outcome::ok("Premium features updated.").with(&state.features))
            }
            Payload::GenerateKeys { plan, duration, count } => {
                self.require_owner(actor)?;
                let keys = self.issuer.generate(plan.as_deref(), &duration, count, Some(actor)).await?;
                let codes: Vec<&str> = keys.iter().map(|k| k.key.as_str()).collect();
                Ok(Outcome::ok(format!("Generated {} key(s).", keys.len())).with(&codes))
            }
            Payload::ListKeys { include_used } => {
                self.require_owner(actor)?;
                let keys = self.issuer.list_keys(include_used);
                Ok(Outcome::ok(format!("{} key(s).", keys.len())).with(&keys))
            }
            Payload::Rate(vote) => {
                // inside a server only the opener can rate, and only from the ticket itself
                if event.guild_id.is_some() {
                    let channel_id = in_channel(event.channel_id)?;
                    if vote.ticket_id != channel_id || self.tickets.opener_of(channel_id).await? != actor {
                        return Err(DeskError::Forbidden);
                    }
                }
                let bucket = self.ratings.rate(actor, vote).await?;
                Ok(Outcome::ok("Thanks for your feedback!").with(&bucket))
            }
            Payload::Status => {
                let guild_id = in_guild(event.guild_id)?;
                let state = self.premium.get_state(guild_id).await;
                let config = self.configs.get_config(guild_id);
                let message = if state.is_premium { "Premium is active." } else { "This server is on the free plan." };
                Ok(Outcome::ok(message).with(&json!({ "premium": state, "config": config })))
            }
        }
    }

    async fn require_admin(&self, guild_id: u64, actor: u64) -> Result<(), DeskError> {
        if self.bot_owner_id == Some(actor) {
            return Ok(());
        }
        let member = self
            .tickets
            .gateway()
            .member(guild_id, actor)
            .await?
            .ok_or(DeskError::Forbidden)?;
        if is_admin(&member, &self.configs.get_config(guild_id), self.bot_owner_id) {
            Ok(())
        } else {
            Err(DeskError::Forbidden)
        }
    }

    async fn require_premium(&self, guild_id: u64) -> Result<(), DeskError> {
        if self.premium.is_premium(guild_id).await {
            Ok(())
        } else {
            Err(DeskError::NotPremium)
        }
    }

    fn require_owner(&self, actor: u64) -> Result<(), DeskError> {
        if self.bot_owner_id == Some(actor) {
            Ok(())
        } else {
            Err(DeskError::Forbidden)
        }
    }
}

fn in_guild(guild_id: Option<u64>) -> Result<u64, DeskError> {
    guild_id.ok_or_else(|| DeskError::Invalid("this only works inside a server".to_string()))
}

fn in_channel(channel_id: Option<u64>) -> Result<u64, DeskError> {
    channel_id.ok_or_else(|| DeskError::Invalid("this only works inside a ticket channel".to_string()))
}
