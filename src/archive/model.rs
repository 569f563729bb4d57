//! Data types shared by the archive pipeline.
//!
//! `MessageSnapshot` is what the platform hands us, `MessageRecord` is what
//! the store keeps. A `MessageRef` may arrive without content (gateway
//! partials) and has to be resolved into a snapshot before any handler looks
//! at it.

use serde::{Deserialize, Serialize};

/// Maximum number of messages the platform returns per page.
pub const PAGE_SIZE: usize = 100;

/// One superseded version of a message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: i64,
    pub content: String,
}

impl HistoryEntry {
    pub fn new(timestamp: i64, content: impl Into<String>) -> Self {
        Self {
            timestamp,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionCount {
    pub emoji_name: String,
    pub count: u64,
}

impl ReactionCount {
    pub fn new(emoji_name: impl Into<String>, count: u64) -> Self {
        Self {
            emoji_name: emoji_name.into(),
            count,
        }
    }
}

/// A fully loaded message as observed on the platform.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageSnapshot {
    pub id: String,
    pub content: String,
    pub author: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    /// Creation instant, unix milliseconds.
    pub created_at: i64,
    /// Last edit instant, unix milliseconds.
    pub edited_at: Option<i64>,
    pub attachments: Vec<String>,
    pub embeds: Vec<String>,
    pub reactions: Vec<ReactionCount>,
    pub mentions: Vec<String>,
    pub pinned: bool,
    pub kind: String,
}

/// A message as delivered by the event source: either with content or as a
/// bare reference that must be fetched first.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageRef {
    Loaded(MessageSnapshot),
    Reference { id: String, channel_id: String },
}

impl MessageRef {
    pub fn id(&self) -> &str {
        match self {
            MessageRef::Loaded(snapshot) => &snapshot.id,
            MessageRef::Reference { id, .. } => id,
        }
    }

    pub fn channel_id(&self) -> &str {
        match self {
            MessageRef::Loaded(snapshot) => &snapshot.channel_id,
            MessageRef::Reference { channel_id, .. } => channel_id,
        }
    }
}

impl From<MessageSnapshot> for MessageRef {
    fn from(snapshot: MessageSnapshot) -> Self {
        MessageRef::Loaded(snapshot)
    }
}

/// One archived message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    pub id: String,
    pub content: String,
    pub author: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub original_timestamp: i64,
    /// Instant at which `content` became current, if it was ever edited.
    pub edited_timestamp: Option<i64>,
    pub content_history: Vec<HistoryEntry>,
    pub attachments: Vec<String>,
    pub embeds: Vec<String>,
    pub mentions: Vec<String>,
    pub reactions: Vec<ReactionCount>,
    pub pinned: bool,
    pub kind: String,
    pub deleted_timestamp: Option<i64>,
}

impl MessageRecord {
    /// Moves the current body into history and makes `content` current.
    ///
    /// The first call materializes the original body (stamped with the
    /// creation instant); later calls push whatever was current, so history
    /// never contains the live body and never repeats the original.
    pub fn apply_edit(&mut self, edited_at: i64, content: String) {
        let current_since = self.edited_timestamp.unwrap_or(self.original_timestamp);
        self.content_history.push(HistoryEntry::new(
            current_since,
            std::mem::take(&mut self.content),
        ));
        self.content = content;
        self.edited_timestamp = Some(edited_at);
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_timestamp.is_some()
    }
}

impl From<MessageSnapshot> for MessageRecord {
    fn from(snapshot: MessageSnapshot) -> Self {
        Self {
            id: snapshot.id,
            content: snapshot.content,
            author: snapshot.author,
            channel_id: snapshot.channel_id,
            guild_id: snapshot.guild_id,
            original_timestamp: snapshot.created_at,
            edited_timestamp: snapshot.edited_at,
            content_history: Vec::new(),
            attachments: snapshot.attachments,
            embeds: snapshot.embeds,
            mentions: snapshot.mentions,
            reactions: snapshot.reactions,
            pinned: snapshot.pinned,
            kind: snapshot.kind,
            deleted_timestamp: None,
        }
    }
}

/// Pagination direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveMode {
    /// Forward from the newest stored message toward the present.
    Resume,
    /// Backward from the channel's newest message toward its start.
    Full,
}

impl ArchiveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveMode::Resume => "resume",
            ArchiveMode::Full => "full",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Thread,
    Direct { recipient: Option<String> },
    Unsupported,
}

/// A resolved channel on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    pub id: String,
    pub name: String,
    pub kind: ChannelKind,
}

impl ChannelHandle {
    pub fn is_text_based(&self) -> bool {
        !matches!(self.kind, ChannelKind::Unsupported)
    }

    pub fn display_name(&self) -> String {
        match &self.kind {
            ChannelKind::Direct { recipient } => format!(
                "DM with {}",
                recipient.as_deref().unwrap_or("Unknown user")
            ),
            ChannelKind::Thread => format!("thread #{}", self.name),
            _ => format!("channel #{}", self.name),
        }
    }
}

/// Cursor for one page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    Latest,
    Before(String),
    After(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionDirection {
    Added,
    Removed,
}

/// A live notification from the event source.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    Created(MessageRef),
    Edited(MessageRef),
    Deleted { id: String, channel_id: String },
    ReactionChanged {
        message: MessageRef,
        direction: ReactionDirection,
    },
}

impl LiveEvent {
    pub fn message_id(&self) -> &str {
        match self {
            LiveEvent::Created(message) | LiveEvent::Edited(message) => message.id(),
            LiveEvent::Deleted { id, .. } => id,
            LiveEvent::ReactionChanged { message, .. } => message.id(),
        }
    }
}

/// What a single-message handler did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Archived,
    Queued,
    Edited { revisions: usize },
    Unchanged,
    MarkedDeleted,
    AlreadyDeleted,
    ReactionsReplaced { distinct: usize },
}

/// Summary returned by the channel and guild entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub success: bool,
    pub message: String,
    pub count: Option<u64>,
    pub channel_name: Option<String>,
}

impl ArchiveSummary {
    pub fn success(message: impl Into<String>, count: u64) -> Self {
        Self {
            success: true,
            message: message.into(),
            count: Some(count),
            channel_name: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            count: None,
            channel_name: None,
        }
    }

    pub fn with_channel(mut self, name: impl Into<String>) -> Self {
        self.channel_name = Some(name.into());
        self
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }
}

/// Orders snowflake identifiers numerically without parsing them.
pub fn snowflake_key(id: &str) -> (usize, &str) {
    (id.len(), id)
}
