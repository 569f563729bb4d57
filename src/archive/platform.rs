use async_trait::async_trait;

use super::model::{ChannelHandle, MessageSnapshot, PageCursor};

/// The chat platform as seen by the archiver.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Fetches up to `limit` messages around `cursor`, in whatever order the
    /// platform returns them.
    async fn fetch_page(
        &self,
        channel_id: &str,
        cursor: &PageCursor,
        limit: usize,
    ) -> anyhow::Result<Vec<MessageSnapshot>>;

    /// Fetches one message with its current content and reactions.
    async fn fetch_message(&self, channel_id: &str, message_id: &str)
        -> anyhow::Result<MessageSnapshot>;

    /// Resolves a channel. `Ok(None)` means it no longer exists.
    async fn resolve_channel(&self, channel_id: &str) -> anyhow::Result<Option<ChannelHandle>>;

    /// Every text-capable channel and thread of a guild, in sweep order.
    async fn guild_channels(&self, guild_id: &str) -> anyhow::Result<Vec<ChannelHandle>>;
}
