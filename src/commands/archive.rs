use crate::archive::model::{ArchiveMode, ArchiveSummary};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use std::time::Duration;
use tracing::info;

const MAX_DELAY_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum ScanMode {
    #[name = "full"]
    Full,
    #[name = "resume"]
    Resume,
}

impl From<ScanMode> for ArchiveMode {
    fn from(mode: ScanMode) -> Self {
        match mode {
            ScanMode::Full => ArchiveMode::Full,
            ScanMode::Resume => ArchiveMode::Resume,
        }
    }
}

fn resolve_delay(ctx: &Context<'_>, delay_ms: Option<u64>) -> Duration {
    delay_ms
        .map(|ms| Duration::from_millis(ms.min(MAX_DELAY_MS)))
        .unwrap_or(ctx.data().config.default_delay)
}

fn render(summary: &ArchiveSummary) -> String {
    if summary.success {
        format!("✅ {}", summary.message)
    } else {
        format!("❌ {}", summary.message)
    }
}

/// Archive every message in a channel or thread
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn archive(
    ctx: Context<'_>,
    #[description = "Channel to archive (defaults to this one)"] channel: Option<serenity::Channel>,
    #[description = "Scan backwards through all history, or forward from the last archived message"]
    mode: Option<ScanMode>,
    #[description = "Delay between fetch requests, in milliseconds"]
    #[min = 0]
    #[max = 10000]
    delay_ms: Option<u64>,
) -> Result<(), Error> {
    let Some(archiver) = ctx.data().archiver.clone() else {
        ctx.say("Archiving is not available.").await?;
        return Ok(());
    };

    ctx.defer().await?;

    let channel_id = channel.map(|c| c.id()).unwrap_or_else(|| ctx.channel_id());
    let mode = mode.map(ArchiveMode::from).unwrap_or(ArchiveMode::Full);
    let delay = resolve_delay(&ctx, delay_ms);
    info!(
        "Archive command received from {} for channel {} ({} mode)",
        ctx.author().name,
        channel_id,
        mode.as_str()
    );

    let summary = archiver
        .archive_channel_by_id(&channel_id.to_string(), mode, delay)
        .await;
    ctx.say(render(&summary)).await?;
    Ok(())
}

/// Archive all messages in every channel and thread of this server
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn archiveall(
    ctx: Context<'_>,
    #[description = "Scan backwards through all history, or forward from the last archived message"]
    mode: Option<ScanMode>,
    #[description = "Delay between fetch requests, in milliseconds"]
    #[min = 0]
    #[max = 10000]
    delay_ms: Option<u64>,
) -> Result<(), Error> {
    let Some(archiver) = ctx.data().archiver.clone() else {
        ctx.say("Archiving is not available.").await?;
        return Ok(());
    };
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;

    ctx.defer_ephemeral().await?;

    let mode = mode.map(ArchiveMode::from).unwrap_or(ArchiveMode::Full);
    let delay = resolve_delay(&ctx, delay_ms);
    info!(
        "Archive-all command received from {} for guild {} ({} mode)",
        ctx.author().name,
        guild_id,
        mode.as_str()
    );

    let summary = archiver
        .archive_guild(&guild_id.to_string(), mode, delay)
        .await;
    info!("Archive-all finished for guild {}: {}", guild_id, summary.message);
    ctx.say(render(&summary)).await?;
    Ok(())
}
