//! Message archival pipeline.
//!
//! The [`Archiver`] owns the store handle, the platform client and the
//! backlog session. Startup reconciliation (`run_backlog`) scans every known
//! channel forward from its newest archived message while live events are
//! queued in the session; the queue is replayed in arrival order before live
//! events are admitted directly.

pub mod discord;
pub mod model;
pub mod platform;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::{Database, RecordUpdate};
use crate::error::ArchiveError;
use model::{
    snowflake_key, ArchiveMode, ArchiveSummary, ChannelHandle, LiveEvent, MessageRecord,
    MessageRef, MessageSnapshot, Outcome, PageCursor, ReactionDirection, PAGE_SIZE,
};
use platform::Platform;
use session::{Admission, BacklogSession};

/// Totals of one startup reconciliation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BacklogReport {
    pub channels: usize,
    pub skipped: usize,
    pub failed: usize,
    pub archived: u64,
    pub replayed: usize,
}

pub struct Archiver {
    db: Database,
    platform: Arc<dyn Platform>,
    session: BacklogSession,
    backlog_delay: Duration,
}

impl Archiver {
    pub fn new(db: Database, platform: Arc<dyn Platform>) -> Self {
        Self {
            db,
            platform,
            session: BacklogSession::new(),
            backlog_delay: Duration::ZERO,
        }
    }

    /// Opens the configured store and builds an archiver over it. A store
    /// that cannot be opened disables archiving for the process: the error is
    /// logged and `None` returned.
    pub fn open(config: &Config, platform: Arc<dyn Platform>) -> Option<Self> {
        let db = match Database::new(config).and_then(|db| db.execute_init().map(|_| db)) {
            Ok(db) => db,
            Err(e) => {
                error!("Database error: {}", e);
                warn!("Archiver failed to initialize. Archiving will not work.");
                return None;
            }
        };

        let archiver = Self::new(db, platform).with_backlog_delay(config.backlog_delay);
        info!("Archiver initialized.");
        if config.backlog_enabled {
            Some(archiver)
        } else {
            Some(archiver.without_backlog())
        }
    }

    pub fn with_backlog_delay(mut self, delay: Duration) -> Self {
        self.backlog_delay = delay;
        self
    }

    /// Admit live events directly; no startup reconciliation will run.
    pub fn without_backlog(mut self) -> Self {
        self.session = BacklogSession::live();
        self
    }

    pub fn session(&self) -> &BacklogSession {
        &self.session
    }

    // --- Live intake ---

    /// Entry point for live notifications. Events are queued while the
    /// backlog is being reconciled and processed directly afterwards.
    pub async fn dispatch(&self, event: LiveEvent) -> Result<Outcome, ArchiveError> {
        match self.session.admit(event) {
            Admission::Process(event) => self.process(event).await,
            Admission::Queued { position } => {
                debug!("Archiver: queued live event (position {})", position);
                Ok(Outcome::Queued)
            }
        }
    }

    async fn process(&self, event: LiveEvent) -> Result<Outcome, ArchiveError> {
        match event {
            LiveEvent::Created(message) => self.archive_single(message).await,
            LiveEvent::Edited(message) => self.message_edited(message).await,
            LiveEvent::Deleted { id, .. } => self.message_deleted(&id).await,
            LiveEvent::ReactionChanged { message, direction } => {
                self.reaction_changed(message, direction).await
            }
        }
    }

    // --- Single message ---

    /// Archives one message. A message that is already stored yields
    /// `ArchiveError::AlreadyExists`.
    pub async fn archive_single(&self, message: MessageRef) -> Result<Outcome, ArchiveError> {
        let snapshot = self.resolve(message).await?;
        self.insert_snapshot(snapshot).await
    }

    async fn resolve(&self, message: MessageRef) -> Result<MessageSnapshot, ArchiveError> {
        match message {
            MessageRef::Loaded(snapshot) => Ok(snapshot),
            MessageRef::Reference { id, channel_id } => {
                debug!("Archiver: fetching partial message {}", id);
                self.platform
                    .fetch_message(&channel_id, &id)
                    .await
                    .map_err(|source| ArchiveError::ResolutionFailure { id, source })
            }
        }
    }

    async fn insert_snapshot(&self, snapshot: MessageSnapshot) -> Result<Outcome, ArchiveError> {
        let record = MessageRecord::from(snapshot);
        self.db
            .run_blocking(move |db| db.insert_message(&record))
            .await?;
        Ok(Outcome::Archived)
    }

    async fn find(&self, id: &str) -> Result<Option<MessageRecord>, ArchiveError> {
        let id = id.to_string();
        Ok(self.db.run_blocking(move |db| db.find_message(&id)).await?)
    }

    async fn update(&self, id: &str, update: RecordUpdate) -> Result<(), ArchiveError> {
        let key = id.to_string();
        let found = self
            .db
            .run_blocking(move |db| db.update_message(&key, &update))
            .await?;
        if found {
            Ok(())
        } else {
            Err(ArchiveError::NotFound(format!("message {}", id)))
        }
    }

    // --- Update handlers ---

    /// Records a new body for a message. Unknown messages are archived fresh.
    pub async fn message_edited(&self, message: MessageRef) -> Result<Outcome, ArchiveError> {
        let Some(mut record) = self.find(message.id()).await? else {
            return self.archive_single(message).await;
        };

        let snapshot = self.resolve(message).await?;
        if snapshot.content == record.content {
            // Embed unfurls and pins arrive as edits without a new body.
            return Ok(Outcome::Unchanged);
        }

        let edited_at = snapshot.edited_at.unwrap_or_else(now_millis);
        record.apply_edit(edited_at, snapshot.content);

        let revisions = record.content_history.len();
        let update = RecordUpdate {
            content: Some(record.content),
            edited_timestamp: record.edited_timestamp,
            content_history: Some(record.content_history),
            ..Default::default()
        };
        self.update(&record.id, update).await?;
        Ok(Outcome::Edited { revisions })
    }

    /// Flags a message as deleted. The platform gives no deletion instant,
    /// so the local clock is used.
    pub async fn message_deleted(&self, id: &str) -> Result<Outcome, ArchiveError> {
        let Some(record) = self.find(id).await? else {
            return Err(ArchiveError::NotFound(format!("message {}", id)));
        };
        if record.is_deleted() {
            return Ok(Outcome::AlreadyDeleted);
        }

        let update = RecordUpdate {
            deleted_timestamp: Some(now_millis()),
            ..Default::default()
        };
        self.update(id, update).await?;
        Ok(Outcome::MarkedDeleted)
    }

    /// Replaces the stored reaction snapshot with the platform's current one.
    pub async fn reaction_changed(
        &self,
        message: MessageRef,
        direction: ReactionDirection,
    ) -> Result<Outcome, ArchiveError> {
        let Some(record) = self.find(message.id()).await? else {
            return self.archive_single(message).await;
        };

        debug!(
            "Archiver: reaction {:?} on message {}, refreshing snapshot",
            direction, record.id
        );
        let fresh = self
            .platform
            .fetch_message(&record.channel_id, &record.id)
            .await
            .map_err(|source| ArchiveError::ResolutionFailure {
                id: record.id.clone(),
                source,
            })?;

        let distinct = fresh.reactions.len();
        let update = RecordUpdate {
            reactions: Some(fresh.reactions),
            ..Default::default()
        };
        self.update(&record.id, update).await?;
        Ok(Outcome::ReactionsReplaced { distinct })
    }

    // --- Channel paginator ---

    /// Resolves a channel by identifier, then archives it.
    pub async fn archive_channel_by_id(
        &self,
        channel_id: &str,
        mode: ArchiveMode,
        delay: Duration,
    ) -> ArchiveSummary {
        match self.platform.resolve_channel(channel_id).await {
            Ok(Some(channel)) => self.archive_channel(&channel, mode, delay).await,
            Ok(None) => ArchiveSummary::failure(
                ArchiveError::NotFound(format!("channel {}", channel_id)).to_string(),
            ),
            Err(e) => ArchiveSummary::failure(ArchiveError::Platform(e).to_string()),
        }
    }

    /// Pages through a channel and archives every message seen.
    ///
    /// Per-message failures are logged and skipped; only a failed page fetch
    /// or cursor lookup ends the scan early.
    pub async fn archive_channel(
        &self,
        channel: &ChannelHandle,
        mode: ArchiveMode,
        delay: Duration,
    ) -> ArchiveSummary {
        if !channel.is_text_based() {
            return ArchiveSummary::failure(
                ArchiveError::ChannelTypeUnsupported(channel.id.clone()).to_string(),
            );
        }

        let name = channel.display_name();
        let (direction, mut cursor) = match self.starting_cursor(channel, mode).await {
            Ok(start) => start,
            Err(e) => {
                error!("Archiver: cannot read cursor for {}: {}", name, e);
                return ArchiveSummary::failure(e.to_string()).with_channel(name);
            }
        };
        info!(
            "Archiver: archiving messages in {} ({} mode)",
            name,
            direction.as_str()
        );

        let mut archived: u64 = 0;
        let mut pages = 0usize;
        loop {
            if pages > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let page = match self
                .platform
                .fetch_page(&channel.id, &cursor, PAGE_SIZE)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    error!("Archiver: failed to fetch messages in {}: {:#}", name, e);
                    return ArchiveSummary::failure(format!(
                        "Failed to fetch messages in {} after archiving {}: {:#}",
                        name, archived, e
                    ))
                    .with_count(archived)
                    .with_channel(name);
                }
            };
            pages += 1;
            debug!("Archiver: fetched {} messages from {}", page.len(), name);

            let exhausted = page.len() < PAGE_SIZE;
            let next = next_cursor(&page, direction);

            for snapshot in page {
                let id = snapshot.id.clone();
                match self.insert_snapshot(snapshot).await {
                    Ok(_) => archived += 1,
                    Err(e) if e.is_already_exists() => {
                        debug!("Archiver: message {} already archived", id)
                    }
                    Err(e) => warn!("Archiver: error archiving message {}: {}", id, e),
                }
            }

            match next {
                Some(next) if !exhausted => cursor = next,
                _ => break,
            }
        }

        info!(
            "Archiver: {} messages archived in {} over {} pages",
            archived, name, pages
        );
        ArchiveSummary::success(format!("{} messages archived in {}.", archived, name), archived)
            .with_channel(name)
    }

    async fn starting_cursor(
        &self,
        channel: &ChannelHandle,
        mode: ArchiveMode,
    ) -> Result<(ArchiveMode, PageCursor), ArchiveError> {
        if mode == ArchiveMode::Full {
            return Ok((ArchiveMode::Full, PageCursor::Latest));
        }

        let channel_id = channel.id.clone();
        let newest = self
            .db
            .run_blocking(move |db| db.most_recent_by_channel(&channel_id))
            .await?;
        match newest {
            Some(record) => Ok((ArchiveMode::Resume, PageCursor::After(record.id))),
            None => {
                debug!(
                    "Archiver: nothing stored for {}, scanning its full history",
                    channel.id
                );
                Ok((ArchiveMode::Full, PageCursor::Latest))
            }
        }
    }

    // --- Guild-wide orchestrator ---

    /// Archives every text channel and thread of a guild, one at a time.
    /// Stops at the first channel that fails.
    pub async fn archive_guild(
        &self,
        guild_id: &str,
        mode: ArchiveMode,
        delay: Duration,
    ) -> ArchiveSummary {
        let channels = match self.platform.guild_channels(guild_id).await {
            Ok(channels) => channels,
            Err(e) => {
                error!("Archiver: cannot list channels of guild {}: {:#}", guild_id, e);
                return ArchiveSummary::failure(ArchiveError::Platform(e).to_string());
            }
        };

        let mut total: u64 = 0;
        for (i, channel) in channels.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let result = self.archive_channel(channel, mode, delay).await;
            if !result.success {
                error!(
                    "Archiver: guild {} sweep stopped at {}: {}",
                    guild_id,
                    channel.display_name(),
                    result.message
                );
                return result;
            }
            total += result.count.unwrap_or(0);
        }

        ArchiveSummary::success(
            format!("Archived {} messages in {} channels.", total, channels.len()),
            total,
        )
    }

    // --- Backlog coordinator ---

    /// Catches up on every channel seen before, then replays queued live
    /// events and switches the session to live. Runs at most once.
    pub async fn run_backlog(&self) -> BacklogReport {
        let mut report = BacklogReport::default();
        if !self.session.begin_backlog() {
            warn!("Archiver: backlog already processed, ignoring");
            return report;
        }

        info!("Archiver: processing messages sent while offline...");
        let channel_ids = match self.db.run_blocking(|db| db.distinct_channel_ids()).await {
            Ok(ids) => ids,
            Err(e) => {
                error!("Archiver: cannot list archived channels: {}", e);
                Vec::new()
            }
        };
        info!("Archiver: found {} channels in database", channel_ids.len());
        report.channels = channel_ids.len();

        let scans = channel_ids.iter().map(|id| self.catch_up_channel(id));
        for result in futures::future::join_all(scans).await {
            match result {
                None => report.skipped += 1,
                Some(summary) if !summary.success => {
                    error!("Archiver: error during backlog catch-up: {}", summary.message);
                    report.failed += 1;
                    report.archived += summary.count.unwrap_or(0);
                }
                Some(summary) => {
                    let count = summary.count.unwrap_or(0);
                    if count > 0 {
                        info!(
                            "Archiver: backlog catch-up archived {} messages in {}",
                            count,
                            summary.channel_name.as_deref().unwrap_or("unknown channel")
                        );
                    }
                    report.archived += count;
                }
            }
        }

        report.replayed = self.drain_pending().await;
        info!(
            "Archiver: backlog catch-up complete ({} archived, {} replayed, {} skipped)",
            report.archived, report.replayed, report.skipped
        );
        report
    }

    async fn catch_up_channel(&self, channel_id: &str) -> Option<ArchiveSummary> {
        match self.platform.resolve_channel(channel_id).await {
            Ok(Some(channel)) => Some(
                self.archive_channel(&channel, ArchiveMode::Resume, self.backlog_delay)
                    .await,
            ),
            Ok(None) => {
                warn!(
                    "Archiver: channel {} not found during backlog catch-up, skipping",
                    channel_id
                );
                None
            }
            Err(e) => {
                warn!(
                    "Archiver: cannot resolve channel {} during backlog catch-up, skipping: {:#}",
                    channel_id, e
                );
                None
            }
        }
    }

    async fn drain_pending(&self) -> usize {
        let mut replayed = 0;
        while let Some(batch) = self.session.next_drain_batch() {
            info!("Archiver: replaying {} queued events", batch.len());
            for event in batch {
                let id = event.message_id().to_string();
                let result = self.process(event).await;
                report("queued event", &id, &result);
                replayed += 1;
            }
        }
        replayed
    }
}

/// Logs a handler result at the level its tag calls for.
pub fn report(context: &str, message_id: &str, result: &Result<Outcome, ArchiveError>) {
    match result {
        Ok(outcome) => debug!("Archiver: {} {}: {:?}", context, message_id, outcome),
        Err(e) if e.is_already_exists() => debug!("Archiver: {} {}: {}", context, message_id, e),
        Err(e) if e.is_not_found() => info!("Archiver: {} {}: {}", context, message_id, e),
        Err(e) => warn!("Archiver: {} {} failed: {}", context, message_id, e),
    }
}

fn next_cursor(page: &[MessageSnapshot], direction: ArchiveMode) -> Option<PageCursor> {
    let by_id = |a: &&MessageSnapshot, b: &&MessageSnapshot| {
        snowflake_key(&a.id).cmp(&snowflake_key(&b.id))
    };
    match direction {
        ArchiveMode::Resume => page
            .iter()
            .max_by(by_id)
            .map(|m| PageCursor::After(m.id.clone())),
        ArchiveMode::Full => page
            .iter()
            .min_by(by_id)
            .map(|m| PageCursor::Before(m.id.clone())),
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
