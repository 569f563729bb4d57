/// Archive schema. `discord_id` is the only consistency mechanism: a second
/// insert with the same identifier fails with a constraint violation.
pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS messages (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        discord_id TEXT NOT NULL UNIQUE,
        content TEXT NOT NULL,
        author TEXT NOT NULL,
        channel_id TEXT NOT NULL,
        guild_id TEXT,
        original_timestamp INTEGER NOT NULL,
        edited_timestamp INTEGER,
        content_history TEXT NOT NULL DEFAULT '[]',
        attachments TEXT NOT NULL DEFAULT '[]',
        embeds TEXT NOT NULL DEFAULT '[]',
        mentions TEXT NOT NULL DEFAULT '[]',
        reactions TEXT NOT NULL DEFAULT '[]',
        pinned BOOLEAN NOT NULL DEFAULT FALSE,
        message_type TEXT NOT NULL,
        deleted_timestamp INTEGER
    );

    -- Serves the per-channel resume cursor lookup
    CREATE INDEX IF NOT EXISTS idx_messages_channel_date ON messages (channel_id, original_timestamp);
";

pub(crate) const RECORD_COLUMNS: &str = "discord_id, content, author, channel_id, guild_id, \
     original_timestamp, edited_timestamp, content_history, attachments, embeds, mentions, \
     reactions, pinned, message_type, deleted_timestamp";
