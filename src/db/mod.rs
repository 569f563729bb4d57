pub mod schema;

use crate::archive::model::{HistoryEntry, MessageRecord, ReactionCount};
use crate::config::Config;
use rusqlite::{ffi, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("message {0} already exists")]
    Conflict(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("database lock poisoned")]
    Poisoned,

    #[error("blocking task failed: {0}")]
    Task(String),
}

/// Fields an update may overwrite. `None` leaves the column untouched.
#[derive(Debug, Default, Clone)]
pub struct RecordUpdate {
    pub content: Option<String>,
    pub edited_timestamp: Option<i64>,
    pub content_history: Option<Vec<HistoryEntry>>,
    pub reactions: Option<Vec<ReactionCount>>,
    pub deleted_timestamp: Option<i64>,
}

impl RecordUpdate {
    fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.edited_timestamp.is_none()
            && self.content_history.is_none()
            && self.reactions.is_none()
            && self.deleted_timestamp.is_none()
    }
}

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(config: &Config) -> Result<Self, StoreError> {
        Self::open(&config.database_url)
    }

    pub fn open(path: &str) -> Result<Self, StoreError> {
        if path != ":memory:" {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::Task(format!("cannot create {}: {}", parent.display(), e))
                    })?;
                }
            }
        }
        let conn = Connection::open(path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn execute_init(&self) -> Result<(), StoreError> {
        info!("Database: Initializing schema...");
        let conn = self.lock()?;
        conn.execute_batch(schema::SCHEMA)?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    /// Runs a store call on the blocking pool so async callers never hold the
    /// connection lock across an await point.
    pub async fn run_blocking<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn insert_message(&self, record: &MessageRecord) -> Result<(), StoreError> {
        debug!(
            "Database: Archiving message {} from {} in channel {}",
            record.id, record.author, record.channel_id
        );
        let conn = self.lock()?;
        let result = conn.execute(
            &format!(
                "INSERT INTO messages ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                schema::RECORD_COLUMNS
            ),
            rusqlite::params![
                record.id,
                record.content,
                record.author,
                record.channel_id,
                record.guild_id,
                record.original_timestamp,
                record.edited_timestamp,
                serde_json::to_string(&record.content_history)?,
                serde_json::to_string(&record.attachments)?,
                serde_json::to_string(&record.embeds)?,
                serde_json::to_string(&record.mentions)?,
                serde_json::to_string(&record.reactions)?,
                record.pinned,
                record.kind,
                record.deleted_timestamp,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::Conflict(record.id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_message(&self, id: &str) -> Result<Option<MessageRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM messages WHERE discord_id = ?1",
            schema::RECORD_COLUMNS
        ))?;
        let mut rows = stmt.query([id])?;

        let record = match rows.next()? {
            Some(row) => Some(read_record(row)?),
            None => None,
        };
        Ok(record)
    }

    /// Applies `update` to an existing record. Returns `false` when no record
    /// has this identifier. A deletion timestamp that is already set is kept.
    pub fn update_message(&self, id: &str, update: &RecordUpdate) -> Result<bool, StoreError> {
        if update.is_empty() {
            return Ok(self.find_message(id)?.is_some());
        }

        let mut assignments: Vec<&str> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(content) = &update.content {
            assignments.push("content = ?");
            params.push(Box::new(content.clone()));
        }
        if let Some(edited) = update.edited_timestamp {
            assignments.push("edited_timestamp = ?");
            params.push(Box::new(edited));
        }
        if let Some(history) = &update.content_history {
            assignments.push("content_history = ?");
            params.push(Box::new(serde_json::to_string(history)?));
        }
        if let Some(reactions) = &update.reactions {
            assignments.push("reactions = ?");
            params.push(Box::new(serde_json::to_string(reactions)?));
        }
        if let Some(deleted) = update.deleted_timestamp {
            assignments.push("deleted_timestamp = COALESCE(deleted_timestamp, ?)");
            params.push(Box::new(deleted));
        }

        let sql = format!(
            "UPDATE messages SET {} WHERE discord_id = ?",
            assignments.join(", ")
        );
        params.push(Box::new(id.to_string()));

        let conn = self.lock()?;
        let params_slice: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let changed = conn.execute(&sql, &params_slice[..])?;
        Ok(changed > 0)
    }

    /// Channels with at least one archived message.
    pub fn distinct_channel_ids(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT channel_id FROM messages ORDER BY channel_id")?;
        let rows = stmt.query_map([], |row| row.get(0))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// The newest archived message of a channel, used as the resume cursor.
    pub fn most_recent_by_channel(
        &self,
        channel_id: &str,
    ) -> Result<Option<MessageRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM messages WHERE channel_id = ?1
             ORDER BY original_timestamp DESC, length(discord_id) DESC, discord_id DESC
             LIMIT 1",
            schema::RECORD_COLUMNS
        ))?;
        let mut rows = stmt.query([channel_id])?;

        let record = match rows.next()? {
            Some(row) => Some(read_record(row)?),
            None => None,
        };
        Ok(record)
    }

    pub fn count_messages(&self, channel_id: Option<&str>) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let count: i64 = match channel_id {
            Some(channel) => conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE channel_id = ?1",
                [channel],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?,
        };
        Ok(count as usize)
    }
}

fn read_record(row: &Row<'_>) -> Result<MessageRecord, StoreError> {
    let history: String = row.get(7)?;
    let attachments: String = row.get(8)?;
    let embeds: String = row.get(9)?;
    let mentions: String = row.get(10)?;
    let reactions: String = row.get(11)?;

    Ok(MessageRecord {
        id: row.get(0)?,
        content: row.get(1)?,
        author: row.get(2)?,
        channel_id: row.get(3)?,
        guild_id: row.get(4)?,
        original_timestamp: row.get(5)?,
        edited_timestamp: row.get(6)?,
        content_history: serde_json::from_str(&history)?,
        attachments: serde_json::from_str(&attachments)?,
        embeds: serde_json::from_str(&embeds)?,
        mentions: serde_json::from_str(&mentions)?,
        reactions: serde_json::from_str(&reactions)?,
        pinned: row.get(12)?,
        kind: row.get(13)?,
        deleted_timestamp: row.get(14)?,
    })
}

/// Only identifier clashes count as conflicts; other constraint failures
/// are real errors.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::model::MessageSnapshot;

    fn test_db() -> Database {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        db
    }

    fn record(id: &str, channel: &str, ts: i64) -> MessageRecord {
        MessageRecord::from(MessageSnapshot {
            id: id.to_string(),
            content: format!("message {}", id),
            author: "alice".to_string(),
            channel_id: channel.to_string(),
            guild_id: Some("g1".to_string()),
            created_at: ts,
            attachments: vec!["https://cdn.example/a.png".to_string()],
            mentions: vec!["bob".to_string()],
            reactions: vec![ReactionCount::new("🔥", 2)],
            kind: "Regular".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_db_init_and_insert() {
        let db = test_db();
        let original = record("1", "c1", 1_600_000_000_000);
        db.insert_message(&original).unwrap();

        let stored = db.find_message("1").unwrap().unwrap();
        assert_eq!(stored, original);
        assert!(db.find_message("2").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_insert_is_conflict() {
        let db = test_db();
        db.insert_message(&record("1", "c1", 1)).unwrap();

        let err = db.insert_message(&record("1", "c1", 1)).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ref id) if id == "1"));
        assert_eq!(db.count_messages(None).unwrap(), 1);
    }

    #[test]
    fn test_other_constraint_failures_are_not_conflicts() {
        let db = test_db();
        db.lock()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_blank BEFORE INSERT ON messages
                 WHEN NEW.content = ''
                 BEGIN SELECT RAISE(ABORT, 'blank content'); END;",
            )
            .unwrap();

        let mut blank = record("1", "c1", 1);
        blank.content = String::new();
        let err = db.insert_message(&blank).unwrap_err();
        assert!(matches!(err, StoreError::Sqlite(_)), "got {:?}", err);
        let err: crate::error::ArchiveError = err.into();
        assert!(!err.is_already_exists());
    }

    #[test]
    fn test_update_fields() {
        let db = test_db();
        db.insert_message(&record("1", "c1", 1)).unwrap();

        let update = RecordUpdate {
            content: Some("edited".to_string()),
            edited_timestamp: Some(5),
            content_history: Some(vec![HistoryEntry::new(1, "message 1")]),
            reactions: Some(vec![ReactionCount::new("👍", 1)]),
            ..Default::default()
        };
        assert!(db.update_message("1", &update).unwrap());

        let stored = db.find_message("1").unwrap().unwrap();
        assert_eq!(stored.content, "edited");
        assert_eq!(stored.edited_timestamp, Some(5));
        assert_eq!(stored.content_history, vec![HistoryEntry::new(1, "message 1")]);
        assert_eq!(stored.reactions, vec![ReactionCount::new("👍", 1)]);
        // Untouched columns stay
        assert_eq!(stored.mentions, vec!["bob".to_string()]);
    }

    #[test]
    fn test_update_missing_record() {
        let db = test_db();
        let update = RecordUpdate {
            content: Some("x".to_string()),
            ..Default::default()
        };
        assert!(!db.update_message("404", &update).unwrap());
    }

    #[test]
    fn test_deleted_timestamp_is_final() {
        let db = test_db();
        db.insert_message(&record("1", "c1", 1)).unwrap();

        let first = RecordUpdate {
            deleted_timestamp: Some(100),
            ..Default::default()
        };
        db.update_message("1", &first).unwrap();

        let second = RecordUpdate {
            deleted_timestamp: Some(200),
            ..Default::default()
        };
        db.update_message("1", &second).unwrap();

        let stored = db.find_message("1").unwrap().unwrap();
        assert_eq!(stored.deleted_timestamp, Some(100));
    }

    #[test]
    fn test_channel_cursor_queries() {
        let db = test_db();
        db.insert_message(&record("10", "c1", 1_000)).unwrap();
        db.insert_message(&record("30", "c1", 3_000)).unwrap();
        db.insert_message(&record("20", "c1", 2_000)).unwrap();
        db.insert_message(&record("5", "c2", 500)).unwrap();

        let channels = db.distinct_channel_ids().unwrap();
        assert_eq!(channels, vec!["c1".to_string(), "c2".to_string()]);

        let newest = db.most_recent_by_channel("c1").unwrap().unwrap();
        assert_eq!(newest.id, "30");
        assert!(db.most_recent_by_channel("c3").unwrap().is_none());

        assert_eq!(db.count_messages(Some("c1")).unwrap(), 3);
        assert_eq!(db.count_messages(Some("c2")).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_run_blocking() {
        let db = test_db();
        let rec = record("1", "c1", 1);
        db.run_blocking(move |db| db.insert_message(&rec))
            .await
            .unwrap();

        let count = db
            .run_blocking(|db| db.count_messages(None))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
