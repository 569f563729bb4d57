use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub database_url: String,
    pub status_message: String,
    pub dev_guild_id: Option<u64>,

    // Startup reconciliation
    pub backlog_enabled: bool,
    pub backlog_delay: Duration,

    // Default throttle for operator-triggered scans
    pub default_delay: Duration,
}

const DEFAULT_DELAY: Duration = Duration::from_millis(100);

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "data/scribe.db".to_string()),
            status_message: env::var("STATUS_MESSAGE")
                .unwrap_or_else(|_| "Archiving messages".to_string()),
            dev_guild_id: env::var("DEV_GUILD_ID")
                .ok()
                .and_then(|id| id.parse().ok())
                .filter(|id| *id != 0),
            backlog_enabled: env::var("ARCHIVE_BACKLOG_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            backlog_delay: parse_delay("ARCHIVE_BACKLOG_DELAY"),
            default_delay: parse_delay("ARCHIVE_DEFAULT_DELAY"),
        })
    }
}

fn parse_delay(var: &str) -> Duration {
    env::var(var)
        .ok()
        .and_then(|raw| humantime::parse_duration(raw.trim()).ok())
        .unwrap_or(DEFAULT_DELAY)
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("database_url", &self.database_url)
            .field("status_message", &self.status_message)
            .field("dev_guild_id", &self.dev_guild_id)
            .field("backlog_enabled", &self.backlog_enabled)
            .field("backlog_delay", &self.backlog_delay)
            .field("default_delay", &self.default_delay)
            .finish()
    }
}
