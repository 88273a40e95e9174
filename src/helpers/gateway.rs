//! The chat platform as the ticket engine sees it. Everything here is
//! fallible; callers decide which failures to swallow.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::helpers::auth::MemberInfo;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("resource no longer exists")]
    NotFound,
    #[error("{0}")]
    Platform(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Category,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub id: u64,
    pub guild_id: u64,
    pub name: String,
    pub kind: ChannelKind,
    pub parent_id: Option<u64>,
    pub topic: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteTarget {
    Role(u64),
    Member(u64),
}

/// `Granted` is view + send + read history + attach; `Hidden` denies view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overwrite {
    pub target: OverwriteTarget,
    pub access: Access,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewChannel {
    pub name: String,
    pub parent_id: u64,
    pub topic: String,
    pub overwrites: Vec<Overwrite>,
}

pub const EMBED_TITLE_LIMIT: usize = 256;
pub const EMBED_DESCRIPTION_LIMIT: usize = 4096;
pub const FIELD_NAME_LIMIT: usize = 256;
pub const FIELD_VALUE_LIMIT: usize = 1024;

/// Cuts `text` to at most `limit` chars, marking the cut with an ellipsis.
pub fn clip(text: String, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text;
    }
    let mut clipped: String = text.chars().take(limit.saturating_sub(1)).collect();
    clipped.push('…');
    clipped
}

/// Embed content. The builders clip every part to what Discord accepts, so
/// user text can't make a message fail.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbedData {
    pub title: String,
    pub description: Option<String>,
    pub fields: Vec<(String, String, bool)>,
    pub colour: Option<u32>,
    pub footer: Option<String>,
    pub footer_icon: Option<String>,
}

impl EmbedData {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: clip(title.into(), EMBED_TITLE_LIMIT), ..Default::default() }
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(clip(text.into(), EMBED_DESCRIPTION_LIMIT));
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push((
            clip(name.into(), FIELD_NAME_LIMIT),
            clip(value.into(), FIELD_VALUE_LIMIT),
            inline,
        ));
        self
    }

    pub fn colour(mut self, colour: u32) -> Self {
        self.colour = Some(colour);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlStyle {
    Primary,
    Secondary,
    Success,
    Danger,
}

/// A button; `id` is the custom id routed back through the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    pub id: String,
    pub label: String,
    pub style: ControlStyle,
}

impl Control {
    pub fn new(id: impl Into<String>, label: impl Into<String>, style: ControlStyle) -> Self {
        Self { id: id.into(), label: label.into(), style }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutgoingMessage {
    pub content: Option<String>,
    pub embed: Option<EmbedData>,
    pub controls: Vec<Control>,
    pub attachment: Option<Attachment>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: Some(content.into()), ..Default::default() }
    }

    pub fn embed(embed: EmbedData) -> Self {
        Self { embed: Some(embed), ..Default::default() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryLine {
    pub author_id: u64,
    pub author_name: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

#[async_trait]
pub trait Gateway: Send + Sync {
    /// `Ok(None)` when the channel is gone or is not a guild channel.
    async fn channel(&self, channel_id: u64) -> Result<Option<ChannelInfo>, GatewayError>;

    async fn guild_roles(&self, guild_id: u64) -> Result<BTreeSet<u64>, GatewayError>;

    async fn member(&self, guild_id: u64, user_id: u64) -> Result<Option<MemberInfo>, GatewayError>;

    async fn create_channel(&self, guild_id: u64, channel: NewChannel) -> Result<u64, GatewayError>;

    async fn set_topic(&self, channel_id: u64, topic: &str) -> Result<(), GatewayError>;

    async fn rename_channel(&self, channel_id: u64, name: &str) -> Result<(), GatewayError>;

    async fn send_message(&self, channel_id: u64, message: OutgoingMessage) -> Result<(), GatewayError>;

    async fn send_dm(&self, user_id: u64, message: OutgoingMessage) -> Result<(), GatewayError>;

    /// Oldest first.
    async fn recent_messages(&self, channel_id: u64, limit: usize) -> Result<Vec<HistoryLine>, GatewayError>;

    async fn delete_channel(&self, channel_id: u64) -> Result<(), GatewayError>;
}
