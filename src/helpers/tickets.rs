use chrono::SecondsFormat;
use poise::futures_util::lock::Mutex as AsyncMutex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::DeskError;
use crate::helpers::auth::{can_manage_ticket, is_admin, MemberInfo};
use crate::helpers::auto_close::{clamp_minutes, deletion_job, AutoCloseTimers};
use crate::helpers::gateway::{
    Access, Attachment, ChannelInfo, ChannelKind, Control, ControlStyle, EmbedData, Gateway, GatewayError, HistoryLine,
    NewChannel, OutgoingMessage, Overwrite, OverwriteTarget,
};
use crate::helpers::guild_config::GuildConfigManager;
use crate::helpers::premium::PremiumManager;
use crate::helpers::scheduler::Scheduler;
use crate::structs::guild_config::GuildConfig;
use crate::structs::premium::PremiumState;
use crate::structs::reviews::{RatingKind, RatingVote};
use crate::structs::ticket::{
    has_ticket_prefix, render_channel_name, with_claimed_prefix, without_claimed_prefix, TicketKind, TicketTopic,
};

pub const CLAIM_CONTROL: &str = "ticket:claim";
pub const UNCLAIM_CONTROL: &str = "ticket:unclaim";
pub const CLOSE_CONTROL: &str = "ticket:close";

pub const DEFAULT_CLOSE_REASONS: [&str; 5] = ["Resolved", "Trade completed", "No response", "Duplicate ticket", "Other"];
const NO_REASON: &str = "No reason provided";

pub const TRANSCRIPT_LIMIT: usize = 500;

const DEFAULT_COLOUR: u32 = 0x5865f2;
const CLAIMED_COLOUR: u32 = 0x57f287;
const CLOSED_COLOUR: u32 = 0xed4245;

/// Who is acting on a ticket. `System` is the auto-close timer and skips
/// the management check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Member(u64),
    System,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// The bot's own user, granted access to every ticket it opens.
    pub bot_user_id: Option<u64>,
    pub bot_owner_id: Option<u64>,
    pub dm_summary: bool,
    pub close_grace: Duration,
}

#[derive(Debug, Clone)]
pub struct TicketRequest {
    pub guild_id: u64,
    pub guild_name: String,
    pub opener_id: u64,
    pub opener_name: String,
    pub kind: TicketKind,
    pub other_party: Option<String>,
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenedTicket {
    pub channel_id: u64,
    pub name: String,
    pub auto_close_minutes: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SideEffect {
    #[default]
    Skipped,
    Done,
    Failed,
}

/// What a close actually managed to do. Each side effect is attempted on
/// its own; one failing never stops the next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloseReport {
    pub channel_gone: bool,
    pub already_closing: bool,
    pub dm: SideEffect,
    pub log: SideEffect,
    pub transcript: SideEffect,
    pub notice: SideEffect,
    pub deletion_scheduled: bool,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn side_effect(result: Result<(), GatewayError>, what: &str, channel_id: u64) -> SideEffect {
    match result {
        Ok(()) => SideEffect::Done,
        Err(e) => {
            warn!(channel_id, error = %e, "close side effect failed: {}", what);
            SideEffect::Failed
        }
    }
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

/// A channel is a ticket when it sits in a ticket category, carries a ticket
/// topic, or still has a ticket-style name.
pub fn is_ticket_channel(channel: &ChannelInfo, config: &GuildConfig) -> bool {
    let in_category = channel
        .parent_id
        .is_some_and(|parent| config.support_category_id == Some(parent) || config.mm_category_id == Some(parent));

    in_category
        || channel.topic.as_deref().and_then(TicketTopic::parse).is_some()
        || has_ticket_prefix(&channel.name)
}

fn ticket_kind(channel: &ChannelInfo, config: &GuildConfig) -> TicketKind {
    match channel.parent_id {
        Some(parent) if config.mm_category_id == Some(parent) => TicketKind::Trade,
        _ => TicketKind::Support,
    }
}

/// Opens, claims and closes tickets. A ticket's state lives in its channel
/// topic; the engine only keeps locks and timers in memory.
pub struct TicketEngine {
    configs: GuildConfigManager,
    premium: Arc<PremiumManager>,
    gateway: Arc<dyn Gateway>,
    scheduler: Arc<dyn Scheduler>,
    settings: EngineSettings,
    channel_locks: Mutex<HashMap<u64, Arc<AsyncMutex<()>>>>,
    closing: Arc<Mutex<HashSet<u64>>>,
    timers: AutoCloseTimers,
}

impl TicketEngine {
    pub fn new(
        configs: GuildConfigManager,
        premium: Arc<PremiumManager>,
        gateway: Arc<dyn Gateway>,
        scheduler: Arc<dyn Scheduler>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            configs,
            premium,
            gateway,
            scheduler,
            settings,
            channel_locks: Mutex::new(HashMap::new()),
            closing: Arc::new(Mutex::new(HashSet::new())),
            timers: AutoCloseTimers::default(),
        }
    }

    pub fn gateway(&self) -> &Arc<dyn Gateway> {
        &self.gateway
    }

    fn channel_lock(&self, channel_id: u64) -> Arc<AsyncMutex<()>> {
        let mut locks = locked(&self.channel_locks);
        Arc::clone(locks.entry(channel_id).or_default())
    }

    async fn member(&self, guild_id: u64, user_id: u64) -> Result<MemberInfo, DeskError> {
        self.gateway.member(guild_id, user_id).await?.ok_or(DeskError::Forbidden)
    }

    /// Loads a channel that must be a live ticket with a readable topic.
    async fn resolve_ticket(&self, channel_id: u64) -> Result<(ChannelInfo, GuildConfig, TicketTopic), DeskError> {
        let channel = self.gateway.channel(channel_id).await?.ok_or(DeskError::NotATicket)?;
        let config = self.configs.get_config(channel.guild_id);
        let topic = channel
            .topic
            .as_deref()
            .and_then(TicketTopic::parse)
            .ok_or(DeskError::NotATicket)?;
        Ok((channel, config, topic))
    }

    pub async fn create(self: &Arc<Self>, request: TicketRequest) -> Result<OpenedTicket, DeskError> {
        let guild_id = request.guild_id;
        let kind = request.kind;
        let config = self.configs.get_config(guild_id);

        if !config.is_enabled(kind) {
            return Err(DeskError::Disabled(kind));
        }
        let category_id = config.category_id(kind).ok_or(DeskError::NotConfigured(kind))?;
        match self.gateway.channel(category_id).await? {
            Some(category) if category.kind == ChannelKind::Category && category.guild_id == guild_id => {}
            _ => {
                warn!(guild_id, category_id, "configured ticket category is missing or not a category");
                return Err(DeskError::NotConfigured(kind));
            }
        }

        let state = self.premium.get_state(guild_id).await;
        let features = state.is_premium.then_some(&state.features);

        let template = features.and_then(|f| f.ticket_name_template.as_deref());
        let name = render_channel_name(template, &request.opener_name, kind, request.opener_id);

        let existing_roles = self.gateway.guild_roles(guild_id).await?;
        let mut overwrites = vec![
            Overwrite { target: OverwriteTarget::Role(guild_id), access: Access::Hidden },
            Overwrite { target: OverwriteTarget::Member(request.opener_id), access: Access::Granted },
        ];
        if let Some(bot) = self.settings.bot_user_id {
            overwrites.push(Overwrite { target: OverwriteTarget::Member(bot), access: Access::Granted });
        }
        for role in config.staff_roles(kind) {
            if existing_roles.contains(&role) {
                overwrites.push(Overwrite { target: OverwriteTarget::Role(role), access: Access::Granted });
            } else {
                debug!(guild_id, role, "skipping configured role that no longer exists");
            }
        }

        let topic = TicketTopic::new(request.opener_id);
        let channel_id = self
            .gateway
            .create_channel(
                guild_id,
                NewChannel {
                    name: name.clone(),
                    parent_id: category_id,
                    topic: topic.serialize(),
                    overwrites,
                },
            )
            .await?;
        info!(guild_id, channel_id, kind = %kind, opener = request.opener_id, "ticket opened");

        let ping = self.premium.compute_ping_mention(guild_id, kind).await;
        let opening = OutgoingMessage {
            content: Some(format!("{} <@{}>", ping, request.opener_id)),
            embed: Some(ticket_embed(&request, &config, &state)),
            controls: vec![
                Control::new(CLAIM_CONTROL, "Claim", ControlStyle::Success),
                Control::new(CLOSE_CONTROL, "Close", ControlStyle::Danger),
            ],
            attachment: None,
        };
        if let Err(e) = self.gateway.send_message(channel_id, opening).await {
            warn!(channel_id, error = %e, "failed to post ticket opening message");
        }

        if let Some(welcome) = features.and_then(|f| f.welcome_message.as_deref()) {
            let text = render_welcome(welcome, &request);
            if let Err(e) = self.gateway.send_message(channel_id, OutgoingMessage::text(text)).await {
                warn!(channel_id, error = %e, "failed to post welcome message");
            }
        }

        let auto_close_minutes = features.and_then(|f| clamp_minutes(f.auto_close_minutes));
        if let Some(minutes) = auto_close_minutes {
            self.timers.arm(self, self.scheduler.as_ref(), channel_id, minutes);
        }

        Ok(OpenedTicket { channel_id, name, auto_close_minutes })
    }

    pub async fn claim(&self, channel_id: u64, actor_id: u64) -> Result<TicketTopic, DeskError> {
        let channel_lock = self.channel_lock(channel_id);
        let _guard = channel_lock.lock().await;

        let (channel, config, mut topic) = self.resolve_ticket(channel_id).await?;
        let member = self.member(channel.guild_id, actor_id).await?;
        if !can_manage_ticket(&member, &config, channel.parent_id, self.settings.bot_owner_id) {
            return Err(DeskError::Forbidden);
        }
        if let Some(staff) = topic.claimed_by {
            return Err(DeskError::AlreadyClaimed(staff));
        }

        topic.claimed_by = Some(actor_id);
        self.gateway.set_topic(channel_id, &topic.serialize()).await?;
        info!(guild_id = channel.guild_id, channel_id, staff = actor_id, "ticket claimed");

        let state = self.premium.get_state(channel.guild_id).await;
        if state.is_premium && state.features.claim_auto_tag {
            let tagged = with_claimed_prefix(&channel.name);
            if tagged != channel.name {
                if let Err(e) = self.gateway.rename_channel(channel_id, &tagged).await {
                    warn!(channel_id, error = %e, "failed to tag claimed ticket");
                }
            }
        }

        let notice = OutgoingMessage {
            embed: Some(
                EmbedData::new("Ticket claimed")
                    .description(format!("<@{}> will be handling this ticket.", actor_id))
                    .colour(CLAIMED_COLOUR),
            ),
            controls: vec![Control::new(UNCLAIM_CONTROL, "Unclaim", ControlStyle::Secondary)],
            ..Default::default()
        };
        if let Err(e) = self.gateway.send_message(channel_id, notice).await {
            warn!(channel_id, error = %e, "failed to post claim notice");
        }

        Ok(topic)
    }

    pub async fn unclaim(&self, channel_id: u64, actor_id: u64) -> Result<TicketTopic, DeskError> {
        let channel_lock = self.channel_lock(channel_id);
        let _guard = channel_lock.lock().await;

        let (channel, config, mut topic) = self.resolve_ticket(channel_id).await?;
        let claimer = topic.claimed_by.ok_or(DeskError::NotClaimed)?;
        if claimer != actor_id {
            let member = self.member(channel.guild_id, actor_id).await?;
            if !is_admin(&member, &config, self.settings.bot_owner_id) {
                return Err(DeskError::Forbidden);
            }
        }

        topic.claimed_by = None;
        self.gateway.set_topic(channel_id, &topic.serialize()).await?;
        info!(guild_id = channel.guild_id, channel_id, staff = claimer, by = actor_id, "ticket unclaimed");

        if let Some(original) = without_claimed_prefix(&channel.name) {
            if let Err(e) = self.gateway.rename_channel(channel_id, original).await {
                warn!(channel_id, error = %e, "failed to remove claimed tag");
            }
        }

        let notice = EmbedData::new("Ticket unclaimed")
            .description(format!("<@{}> is no longer handling this ticket.", claimer))
            .colour(DEFAULT_COLOUR);
        let message = OutgoingMessage {
            embed: Some(notice),
            controls: vec![Control::new(CLAIM_CONTROL, "Claim", ControlStyle::Success)],
            ..Default::default()
        };
        if let Err(e) = self.gateway.send_message(channel_id, message).await {
            warn!(channel_id, error = %e, "failed to post unclaim notice");
        }

        Ok(topic)
    }

    pub async fn close(&self, channel_id: u64, actor: Actor, reason: Option<String>) -> Result<CloseReport, DeskError> {
        let channel_lock = self.channel_lock(channel_id);
        let _guard = channel_lock.lock().await;

        let Some(channel) = self.gateway.channel(channel_id).await? else {
            self.timers.disarm(channel_id);
            locked(&self.channel_locks).remove(&channel_id);
            return Ok(CloseReport { channel_gone: true, ..Default::default() });
        };
        let config = self.configs.get_config(channel.guild_id);
        if !is_ticket_channel(&channel, &config) {
            return Err(DeskError::NotATicket);
        }
        if let Actor::Member(user_id) = actor {
            let member = self.member(channel.guild_id, user_id).await?;
            if !can_manage_ticket(&member, &config, channel.parent_id, self.settings.bot_owner_id) {
                return Err(DeskError::Forbidden);
            }
        }
        if !locked(&self.closing).insert(channel_id) {
            debug!(channel_id, "close requested while one is already pending");
            return Ok(CloseReport { already_closing: true, ..Default::default() });
        }
        self.timers.disarm(channel_id);

        let topic = channel.topic.as_deref().and_then(TicketTopic::parse);
        let reason = non_empty(reason).unwrap_or_else(|| NO_REASON.to_string());
        let state = self.premium.get_state(channel.guild_id).await;
        let mut report = CloseReport::default();

        if let (true, Some(topic)) = (self.settings.dm_summary, topic) {
            let summary = summary_message(&channel, &config, &topic, &reason);
            let result = self.gateway.send_dm(topic.opened_by, summary).await;
            report.dm = side_effect(result, "summary DM", channel_id);
        }

        if let Some(log_channel) = config.log_channel() {
            let embed = close_log_embed(&channel, topic.as_ref(), actor, &reason);
            let result = self.gateway.send_message(log_channel, OutgoingMessage::embed(embed)).await;
            report.log = side_effect(result, "log embed", channel_id);
        }

        let transcripts = &state.features.transcripts;
        if state.is_premium && transcripts.enabled {
            match transcripts.channel_id.or(config.log_channel()) {
                Some(destination) => {
                    let result = self.post_transcript(&channel, destination).await;
                    report.transcript = side_effect(result, "transcript", channel_id);
                }
                None => debug!(channel_id, "transcripts enabled but no destination configured"),
            }
        }

        let notice = EmbedData::new("Closing ticket")
            .description(format!(
                "This ticket will be deleted in {} seconds.\n**Reason:** {}",
                self.settings.close_grace.as_secs(),
                reason
            ))
            .colour(CLOSED_COLOUR);
        let result = self.gateway.send_message(channel_id, OutgoingMessage::embed(notice)).await;
        report.notice = side_effect(result, "closing notice", channel_id);

        self.scheduler.schedule(
            self.settings.close_grace,
            deletion_job(Arc::clone(&self.gateway), Arc::clone(&self.closing), channel_id),
        );
        report.deletion_scheduled = true;
        locked(&self.channel_locks).remove(&channel_id);

        info!(guild_id = channel.guild_id, channel_id, ?actor, reason = %reason, "ticket closed");
        Ok(report)
    }

    /// The guild's own close reasons when premium defines any, else the
    /// built-in list.
    pub async fn close_reasons(&self, guild_id: u64) -> Vec<String> {
        let state = self.premium.get_state(guild_id).await;
        if state.is_premium && !state.features.close_reasons.is_empty() {
            state.features.close_reasons
        } else {
            DEFAULT_CLOSE_REASONS.iter().map(|r| r.to_string()).collect()
        }
    }

    /// The user who opened the ticket in `channel_id`.
    pub async fn opener_of(&self, channel_id: u64) -> Result<u64, DeskError> {
        let (_, _, topic) = self.resolve_ticket(channel_id).await?;
        Ok(topic.opened_by)
    }

    async fn post_transcript(&self, channel: &ChannelInfo, destination: u64) -> Result<(), GatewayError> {
        let lines = self.gateway.recent_messages(channel.id, TRANSCRIPT_LIMIT).await?;
        let message = OutgoingMessage {
            content: Some(format!("Transcript of #{} ({} messages)", channel.name, lines.len())),
            attachment: Some(Attachment {
                filename: format!("transcript-{}.txt", channel.name),
                bytes: render_transcript(channel, &lines).into_bytes(),
            }),
            ..Default::default()
        };
        self.gateway.send_message(destination, message).await
    }
}

fn brand_colour(state: &PremiumState) -> u32 {
    state
        .is_premium
        .then(|| state.accent_colour())
        .flatten()
        .unwrap_or(DEFAULT_COLOUR)
}

fn ticket_embed(request: &TicketRequest, config: &GuildConfig, state: &PremiumState) -> EmbedData {
    let description = config
        .panel_description(request.kind)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Thanks for opening a {} ticket. Staff will be with you shortly.", request.kind));

    let mut embed = EmbedData::new(request.kind.title())
        .description(description)
        .field("Opened by", format!("<@{}>", request.opener_id), true)
        .colour(brand_colour(state));

    if let Some(other) = non_empty(request.other_party.clone()) {
        embed = embed.field("Other party", other, true);
    }
    if let Some(details) = non_empty(request.details.clone()) {
        embed = embed.field("Details", details, false);
    }
    if state.is_premium {
        if state.features.priority {
            embed = embed.field("Priority", "High", true);
        }
        embed.footer = state.branding.name.clone();
        embed.footer_icon = state.branding.icon_url.clone();
    }

    embed
}

fn render_welcome(template: &str, request: &TicketRequest) -> String {
    template
        .replace("{user}", &format!("<@{}>", request.opener_id))
        .replace("{type}", request.kind.as_str())
        .replace("{id}", &request.opener_id.to_string())
        .replace("{server}", &request.guild_name)
}

fn close_log_embed(channel: &ChannelInfo, topic: Option<&TicketTopic>, actor: Actor, reason: &str) -> EmbedData {
    let opened_by = topic.map_or("unknown".to_string(), |t| format!("<@{}>", t.opened_by));
    let claimed_by = topic
        .and_then(|t| t.claimed_by)
        .map_or("nobody".to_string(), |staff| format!("<@{}>", staff));
    let closed_by = match actor {
        Actor::Member(id) => format!("<@{}>", id),
        Actor::System => "Auto-close".to_string(),
    };

    EmbedData::new("Ticket closed")
        .field("Ticket", format!("#{}", channel.name), true)
        .field("Opened by", opened_by, true)
        .field("Claimed by", claimed_by, true)
        .field("Closed by", closed_by, true)
        .field("Reason", reason, false)
        .colour(CLOSED_COLOUR)
}

/// DM to the opener. Claimed trade tickets ask for a rating of the staff
/// member, everything else rates the service.
fn summary_message(channel: &ChannelInfo, config: &GuildConfig, topic: &TicketTopic, reason: &str) -> OutgoingMessage {
    let (kind, subject, prompt) = match (ticket_kind(channel, config), topic.claimed_by) {
        (TicketKind::Trade, Some(staff)) => (RatingKind::Trade, Some(staff), format!("How did <@{}> do?", staff)),
        _ => (RatingKind::Service, None, "How was our service?".to_string()),
    };

    let controls = (1..=5u8)
        .map(|score| {
            let vote = RatingVote { kind, ticket_id: channel.id, subject, score };
            Control::new(vote.control_id(), "⭐".repeat(usize::from(score)), ControlStyle::Secondary)
        })
        .collect();

    OutgoingMessage {
        embed: Some(
            EmbedData::new("Your ticket was closed")
                .field("Ticket", format!("#{}", channel.name), true)
                .field("Reason", reason, false)
                .description(prompt)
                .colour(CLOSED_COLOUR),
        ),
        controls,
        ..Default::default()
    }
}

fn render_transcript(channel: &ChannelInfo, lines: &[HistoryLine]) -> String {
    let mut out = format!("Transcript of #{} ({})\n\n", channel.name, channel.id);
    for line in lines {
        out.push_str(&format!(
            "[{}] {} ({}): {}\n",
            line.sent_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            line.author_name,
            line.author_id,
            line.content
        ));
    }
    out
}
