pub mod archive;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod events;

use std::sync::Arc;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    /// Absent when the store could not be opened; archiving is then a no-op.
    pub archiver: Option<Arc<archive::Archiver>>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
