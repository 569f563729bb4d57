//! In-memory platform that pages like Discord: every page is returned
//! newest-first, `after` yields the oldest messages past the cursor.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::model::{
    snowflake_key, ChannelHandle, ChannelKind, MessageSnapshot, PageCursor, ReactionCount,
};
use super::platform::Platform;
use crate::config::Config;

pub(crate) fn snapshot(id: u64, channel: &str, content: &str) -> MessageSnapshot {
    MessageSnapshot {
        id: id.to_string(),
        content: content.to_string(),
        author: "alice".to_string(),
        channel_id: channel.to_string(),
        guild_id: Some("g1".to_string()),
        created_at: id as i64 * 1_000,
        kind: "Regular".to_string(),
        ..Default::default()
    }
}

pub(crate) fn config(database_url: &str) -> Config {
    Config {
        discord_token: "test_token".to_string(),
        database_url: database_url.to_string(),
        status_message: "Archiving messages".to_string(),
        dev_guild_id: None,
        backlog_enabled: true,
        backlog_delay: Duration::ZERO,
        default_delay: Duration::ZERO,
    }
}

pub(crate) fn text_channel(id: &str, name: &str) -> ChannelHandle {
    ChannelHandle {
        id: id.to_string(),
        name: name.to_string(),
        kind: ChannelKind::Text,
    }
}

#[derive(Default)]
pub(crate) struct FakePlatform {
    channels: Mutex<HashMap<String, ChannelHandle>>,
    messages: Mutex<HashMap<String, Vec<MessageSnapshot>>>,
    guilds: Mutex<HashMap<String, Vec<String>>>,
    failing: Mutex<HashSet<String>>,
    gate: Option<Semaphore>,
    page_fetches: AtomicUsize,
    fetches_by_channel: Mutex<HashMap<String, usize>>,
    waiting: AtomicUsize,
}

impl FakePlatform {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Page fetches block until `open_gate` is called.
    pub(crate) fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub(crate) fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub(crate) fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    pub(crate) fn add_channel(&self, channel: ChannelHandle) {
        self.channels
            .lock()
            .unwrap()
            .insert(channel.id.clone(), channel);
    }

    /// Adds messages `first..=last` to a channel.
    pub(crate) fn add_range(&self, channel: &str, first: u64, last: u64) {
        for id in first..=last {
            self.add_message(snapshot(id, channel, &format!("message {}", id)));
        }
    }

    pub(crate) fn add_message(&self, message: MessageSnapshot) {
        let mut messages = self.messages.lock().unwrap();
        let list = messages.entry(message.channel_id.clone()).or_default();
        list.retain(|m| m.id != message.id);
        list.push(message);
        list.sort_by(|a, b| snowflake_key(&a.id).cmp(&snowflake_key(&b.id)));
    }

    pub(crate) fn set_reactions(&self, channel: &str, id: &str, reactions: Vec<ReactionCount>) {
        let mut messages = self.messages.lock().unwrap();
        if let Some(message) = messages
            .get_mut(channel)
            .and_then(|list| list.iter_mut().find(|m| m.id == id))
        {
            message.reactions = reactions;
        }
    }

    pub(crate) fn add_guild(&self, guild: &str, channels: &[&str]) {
        self.guilds.lock().unwrap().insert(
            guild.to_string(),
            channels.iter().map(|c| c.to_string()).collect(),
        );
    }

    pub(crate) fn fail_channel(&self, channel: &str) {
        self.failing.lock().unwrap().insert(channel.to_string());
    }

    pub(crate) fn page_fetches(&self) -> usize {
        self.page_fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn page_fetches_for(&self, channel: &str) -> usize {
        self.fetches_by_channel
            .lock()
            .unwrap()
            .get(channel)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn fetch_page(
        &self,
        channel_id: &str,
        cursor: &PageCursor,
        limit: usize,
    ) -> anyhow::Result<Vec<MessageSnapshot>> {
        if let Some(gate) = &self.gate {
            self.waiting.fetch_add(1, Ordering::SeqCst);
            let _permit = gate.acquire().await?;
            self.waiting.fetch_sub(1, Ordering::SeqCst);
        }
        self.page_fetches.fetch_add(1, Ordering::SeqCst);
        *self
            .fetches_by_channel
            .lock()
            .unwrap()
            .entry(channel_id.to_string())
            .or_default() += 1;

        if self.failing.lock().unwrap().contains(channel_id) {
            anyhow::bail!("Missing Access");
        }

        let messages = self.messages.lock().unwrap();
        let all = messages.get(channel_id).cloned().unwrap_or_default();
        let mut page: Vec<MessageSnapshot> = match cursor {
            PageCursor::Latest => all.iter().rev().take(limit).cloned().collect(),
            PageCursor::Before(id) => all
                .iter()
                .rev()
                .filter(|m| snowflake_key(&m.id) < snowflake_key(id))
                .take(limit)
                .cloned()
                .collect(),
            PageCursor::After(id) => all
                .iter()
                .filter(|m| snowflake_key(&m.id) > snowflake_key(id))
                .take(limit)
                .cloned()
                .collect(),
        };
        page.sort_by(|a, b| snowflake_key(&b.id).cmp(&snowflake_key(&a.id)));
        Ok(page)
    }

    async fn fetch_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> anyhow::Result<MessageSnapshot> {
        self.messages
            .lock()
            .unwrap()
            .get(channel_id)
            .and_then(|list| list.iter().find(|m| m.id == message_id).cloned())
            .ok_or_else(|| anyhow::anyhow!("Unknown Message"))
    }

    async fn resolve_channel(&self, channel_id: &str) -> anyhow::Result<Option<ChannelHandle>> {
        Ok(self.channels.lock().unwrap().get(channel_id).cloned())
    }

    async fn guild_channels(&self, guild_id: &str) -> anyhow::Result<Vec<ChannelHandle>> {
        let ids = self
            .guilds
            .lock()
            .unwrap()
            .get(guild_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Unknown Guild"))?;
        let channels = self.channels.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| channels.get(id).cloned())
            .collect())
    }
}
