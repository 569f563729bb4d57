use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serenity::all::{
    Channel, ChannelId, ChannelType, GetMessages, GuildChannel, GuildId, Message, MessageId,
    ReactionType, Timestamp,
};
use serenity::http::{Http, HttpError};
use tracing::{debug, warn};

use super::model::{ChannelHandle, ChannelKind, MessageSnapshot, PageCursor, ReactionCount};
use super::platform::Platform;

/// Discord epoch (2015-01-01T00:00:00Z) in unix milliseconds.
const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;

/// Creation instant encoded in a snowflake, unix milliseconds.
pub fn snowflake_millis(id: u64) -> i64 {
    ((id >> 22) + DISCORD_EPOCH_MS) as i64
}

/// Platform timestamp in unix milliseconds.
fn timestamp_millis(ts: &Timestamp) -> i64 {
    ts.timestamp_millis()
}

pub struct DiscordPlatform {
    http: Arc<Http>,
}

impl DiscordPlatform {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

fn parse_id(raw: &str) -> anyhow::Result<u64> {
    raw.parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .ok_or_else(|| anyhow::anyhow!("invalid snowflake '{}'", raw))
}

fn is_not_found(err: &serenity::Error) -> bool {
    matches!(
        err,
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response))
            if response.status_code.as_u16() == 404
    )
}

fn emoji_name(reaction: &ReactionType) -> String {
    match reaction {
        ReactionType::Unicode(emoji) => emoji.clone(),
        ReactionType::Custom { name, id, .. } => {
            name.clone().unwrap_or_else(|| id.to_string())
        }
        other => other.to_string(),
    }
}

/// Converts a gateway/HTTP message into the archiver's snapshot.
pub fn snapshot_from(message: &Message) -> MessageSnapshot {
    MessageSnapshot {
        id: message.id.to_string(),
        content: message.content.clone(),
        author: message.author.name.clone(),
        channel_id: message.channel_id.to_string(),
        guild_id: message.guild_id.map(|id| id.to_string()),
        created_at: snowflake_millis(message.id.get()),
        edited_at: message.edited_timestamp.as_ref().map(timestamp_millis),
        attachments: message.attachments.iter().map(|a| a.url.clone()).collect(),
        embeds: message.embeds.iter().filter_map(|e| e.url.clone()).collect(),
        reactions: message
            .reactions
            .iter()
            .map(|r| ReactionCount::new(emoji_name(&r.reaction_type), r.count))
            .collect(),
        mentions: message.mentions.iter().map(|u| u.name.clone()).collect(),
        pinned: message.pinned,
        kind: format!("{:?}", message.kind),
    }
}

fn guild_channel_handle(channel: &GuildChannel) -> ChannelHandle {
    let kind = match channel.kind {
        ChannelType::Text | ChannelType::News | ChannelType::Voice | ChannelType::Stage => {
            ChannelKind::Text
        }
        ChannelType::PublicThread | ChannelType::PrivateThread | ChannelType::NewsThread => {
            ChannelKind::Thread
        }
        _ => ChannelKind::Unsupported,
    };
    ChannelHandle {
        id: channel.id.to_string(),
        name: channel.name.clone(),
        kind,
    }
}

fn channel_handle(channel: &Channel) -> ChannelHandle {
    match channel {
        Channel::Guild(guild_channel) => guild_channel_handle(guild_channel),
        Channel::Private(private) => ChannelHandle {
            id: private.id.to_string(),
            name: private.recipient.name.clone(),
            kind: ChannelKind::Direct {
                recipient: Some(private.recipient.name.clone()),
            },
        },
        other => ChannelHandle {
            id: other.id().to_string(),
            name: String::new(),
            kind: ChannelKind::Unsupported,
        },
    }
}

#[async_trait]
impl Platform for DiscordPlatform {
    async fn fetch_page(
        &self,
        channel_id: &str,
        cursor: &PageCursor,
        limit: usize,
    ) -> anyhow::Result<Vec<MessageSnapshot>> {
        let channel = ChannelId::new(parse_id(channel_id)?);
        let builder = GetMessages::new().limit(limit.min(100) as u8);
        let builder = match cursor {
            PageCursor::Latest => builder,
            PageCursor::Before(id) => builder.before(MessageId::new(parse_id(id)?)),
            PageCursor::After(id) => builder.after(MessageId::new(parse_id(id)?)),
        };

        let messages = channel
            .messages(&self.http, builder)
            .await
            .with_context(|| format!("fetching messages in channel {}", channel))?;
        Ok(messages.iter().map(snapshot_from).collect())
    }

    async fn fetch_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> anyhow::Result<MessageSnapshot> {
        let channel = ChannelId::new(parse_id(channel_id)?);
        let message_id = MessageId::new(parse_id(message_id)?);
        channel
            .message(self.http.as_ref(), message_id)
            .await
            .map(|message| snapshot_from(&message))
            .with_context(|| format!("fetching message {} in channel {}", message_id, channel))
    }

    async fn resolve_channel(&self, channel_id: &str) -> anyhow::Result<Option<ChannelHandle>> {
        let channel = ChannelId::new(parse_id(channel_id)?);
        match channel.to_channel(self.http.as_ref()).await {
            Ok(channel) => Ok(Some(channel_handle(&channel))),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(anyhow::Error::new(e).context(format!("resolving channel {}", channel))),
        }
    }

    async fn guild_channels(&self, guild_id: &str) -> anyhow::Result<Vec<ChannelHandle>> {
        let guild = GuildId::new(parse_id(guild_id)?);
        let mut channels: Vec<GuildChannel> = guild
            .channels(&self.http)
            .await
            .with_context(|| format!("listing channels of guild {}", guild))?
            .into_values()
            .filter(|c| matches!(c.kind, ChannelType::Text | ChannelType::News))
            .collect();
        channels.sort_by_key(|c| (c.position, c.id));

        let threads = match guild.get_active_threads(&self.http).await {
            Ok(data) => data.threads,
            Err(e) => {
                warn!("Discord: cannot list active threads of guild {}: {}", guild, e);
                Vec::new()
            }
        };

        let mut handles = Vec::with_capacity(channels.len() + threads.len());
        for channel in &channels {
            handles.push(guild_channel_handle(channel));
            handles.extend(
                threads
                    .iter()
                    .filter(|t| t.parent_id == Some(channel.id))
                    .map(guild_channel_handle),
            );
        }
        debug!(
            "Discord: guild {} has {} archivable channels",
            guild,
            handles.len()
        );
        Ok(handles)
    }
}
