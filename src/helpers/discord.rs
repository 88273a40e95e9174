use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::helpers::auth::MemberInfo;
use crate::helpers::gateway::{
    Access, ChannelInfo, ChannelKind, ControlStyle, EmbedData, Gateway, GatewayError, HistoryLine,
    NewChannel, OutgoingMessage, OverwriteTarget,
};

const PAGE_SIZE: u8 = 100;

/// [`Gateway`] over the bot's HTTP client.
pub struct SerenityGateway {
    http: Arc<serenity::Http>,
}

impl SerenityGateway {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

fn map_err(e: serenity::Error) -> GatewayError {
    if let serenity::Error::Http(serenity::http::HttpError::UnsuccessfulRequest(response)) = &e {
        if response.status_code.as_u16() == 404 {
            return GatewayError::NotFound;
        }
    }
    GatewayError::Platform(e.to_string())
}

fn ticket_access() -> serenity::Permissions {
    serenity::Permissions::VIEW_CHANNEL
        | serenity::Permissions::SEND_MESSAGES
        | serenity::Permissions::READ_MESSAGE_HISTORY
        | serenity::Permissions::ATTACH_FILES
        | serenity::Permissions::EMBED_LINKS
}

pub fn create_embed(data: &EmbedData) -> serenity::CreateEmbed {
    let mut embed = serenity::CreateEmbed::default().title(&data.title);

    if let Some(description) = &data.description {
        embed = embed.description(description);
    }
    for (name, value, inline) in &data.fields {
        embed = embed.field(name, value, *inline);
    }
    if let Some(colour) = data.colour {
        embed = embed.color(colour);
    }
    if let Some(footer) = &data.footer {
        let mut footer = serenity::CreateEmbedFooter::new(footer);
        if let Some(icon) = &data.footer_icon {
            footer = footer.icon_url(icon);
        }
        embed = embed.footer(footer);
    }

    embed
}

fn create_message(message: OutgoingMessage) -> serenity::CreateMessage {
    let mut builder = serenity::CreateMessage::new();

    if let Some(content) = message.content {
        builder = builder.content(content);
    }
    if let Some(embed) = &message.embed {
        builder = builder.embed(create_embed(embed));
    }
    if !message.controls.is_empty() {
        let buttons = message
            .controls
            .iter()
            .map(|control| {
                let style = match control.style {
                    ControlStyle::Primary => serenity::ButtonStyle::Primary,
                    ControlStyle::Secondary => serenity::ButtonStyle::Secondary,
                    ControlStyle::Success => serenity::ButtonStyle::Success,
                    ControlStyle::Danger => serenity::ButtonStyle::Danger,
                };
                serenity::CreateButton::new(&control.id).label(&control.label).style(style)
            })
            .collect();
        builder = builder.components(vec![serenity::CreateActionRow::Buttons(buttons)]);
    }
    if let Some(attachment) = message.attachment {
        builder = builder.add_file(serenity::CreateAttachment::bytes(attachment.bytes, attachment.filename));
    }

    builder
}

#[async_trait]
impl Gateway for SerenityGateway {
    async fn channel(&self, channel_id: u64) -> Result<Option<ChannelInfo>, GatewayError> {
        let channel = match serenity::ChannelId::new(channel_id).to_channel(&self.http).await {
            Ok(channel) => channel,
            Err(e) => {
                return match map_err(e) {
                    GatewayError::NotFound => Ok(None),
                    other => Err(other),
                }
            }
        };

        let serenity::Channel::Guild(channel) = channel else {
            return Ok(None);
        };

        let kind = match channel.kind {
            serenity::ChannelType::Text => ChannelKind::Text,
            serenity::ChannelType::Category => ChannelKind::Category,
            _ => ChannelKind::Other,
        };

        Ok(Some(ChannelInfo {
            id: channel.id.get(),
            guild_id: channel.guild_id.get(),
            name: channel.name.clone(),
            kind,
            parent_id: channel.parent_id.map(|id| id.get()),
            topic: channel.topic.clone(),
        }))
    }

    async fn guild_roles(&self, guild_id: u64) -> Result<BTreeSet<u64>, GatewayError> {
        let roles = serenity::GuildId::new(guild_id)
            .roles(&self.http)
            .await
            .map_err(map_err)?;
        Ok(roles.keys().map(|id| id.get()).collect())
    }

    async fn member(&self, guild_id: u64, user_id: u64) -> Result<Option<MemberInfo>, GatewayError> {
        let guild = serenity::GuildId::new(guild_id);
        let member = match guild.member(&self.http, serenity::UserId::new(user_id)).await {
            Ok(member) => member,
            Err(e) => {
                return match map_err(e) {
                    GatewayError::NotFound => Ok(None),
                    other => Err(other),
                }
            }
        };
        let owner_id = guild.to_partial_guild(&self.http).await.map_err(map_err)?.owner_id;

        Ok(Some(MemberInfo {
            user_id,
            roles: member.roles.iter().map(|id| id.get()).collect(),
            is_owner: owner_id.get() == user_id,
        }))
    }

    async fn create_channel(&self, guild_id: u64, channel: NewChannel) -> Result<u64, GatewayError> {
        let overwrites: Vec<serenity::PermissionOverwrite> = channel
            .overwrites
            .iter()
            .map(|overwrite| {
                let kind = match overwrite.target {
                    OverwriteTarget::Role(id) => serenity::PermissionOverwriteType::Role(serenity::RoleId::new(id)),
                    OverwriteTarget::Member(id) => serenity::PermissionOverwriteType::Member(serenity::UserId::new(id)),
                };
                let (allow, deny) = match overwrite.access {
                    Access::Granted => (ticket_access(), serenity::Permissions::empty()),
                    Access::Hidden => (serenity::Permissions::empty(), serenity::Permissions::VIEW_CHANNEL),
                };
                serenity::PermissionOverwrite { allow, deny, kind }
            })
            .collect();

        let builder = serenity::CreateChannel::new(channel.name)
            .kind(serenity::ChannelType::Text)
            .category(serenity::ChannelId::new(channel.parent_id))
            .topic(channel.topic)
            .permissions(overwrites);

        let created = serenity::GuildId::new(guild_id)
            .create_channel(&self.http, builder)
            .await
            .map_err(map_err)?;
        Ok(created.id.get())
    }

    async fn set_topic(&self, channel_id: u64, topic: &str) -> Result<(), GatewayError> {
        serenity::ChannelId::new(channel_id)
            .edit(&self.http, serenity::EditChannel::new().topic(topic))
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn rename_channel(&self, channel_id: u64, name: &str) -> Result<(), GatewayError> {
        serenity::ChannelId::new(channel_id)
            .edit(&self.http, serenity::EditChannel::new().name(name))
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn send_message(&self, channel_id: u64, message: OutgoingMessage) -> Result<(), GatewayError> {
        serenity::ChannelId::new(channel_id)
            .send_message(&self.http, create_message(message))
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn send_dm(&self, user_id: u64, message: OutgoingMessage) -> Result<(), GatewayError> {
        let dm_channel = serenity::UserId::new(user_id)
            .create_dm_channel(&self.http)
            .await
            .map_err(map_err)?;
        dm_channel
            .send_message(&self.http, create_message(message))
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn recent_messages(&self, channel_id: u64, limit: usize) -> Result<Vec<HistoryLine>, GatewayError> {
        let channel = serenity::ChannelId::new(channel_id);
        let mut lines = Vec::new();
        let mut before: Option<serenity::MessageId> = None;

        while lines.len() < limit {
            let mut request = serenity::GetMessages::new().limit(PAGE_SIZE);
            if let Some(before) = before {
                request = request.before(before);
            }
            let page = channel.messages(&self.http, request).await.map_err(map_err)?;
            let Some(oldest) = page.last() else {
                break;
            };
            before = Some(oldest.id);
            let exhausted = page.len() < usize::from(PAGE_SIZE);

            for message in page {
                let sent_at = DateTime::<Utc>::from_timestamp(message.timestamp.unix_timestamp(), 0)
                    .unwrap_or_default();
                lines.push(HistoryLine {
                    author_id: message.author.id.get(),
                    author_name: message.author.name.clone(),
                    content: message.content.clone(),
                    sent_at,
                });
            }
            if exhausted {
                break;
            }
        }

        lines.truncate(limit);
        lines.reverse();
        Ok(lines)
    }

    async fn delete_channel(&self, channel_id: u64) -> Result<(), GatewayError> {
        match serenity::ChannelId::new(channel_id).delete(&self.http).await {
            Ok(_) => Ok(()),
            Err(e) => match map_err(e) {
                GatewayError::NotFound => Ok(()),
                other => Err(other),
            },
        }
    }
}
