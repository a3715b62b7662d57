//! Background pruning of expired cache entries.
//!
//! Runs once on startup, then periodically. Purging is an optimization
//! only; reads already skip stale entries, this just returns the memory.

use std::time::Duration;
use tokio::time;

use crate::services::channels::ChannelService;
use crate::services::epg::GuideService;

/// Configuration for the cleanup task
pub struct CleanupConfig {
    /// How often to run cleanup (in seconds)
    pub interval_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600, // Run every hour
        }
    }
}

/// Run a single cleanup cycle over every cache.
/// Returns (channel list entries, guide entries) evicted.
pub async fn run_cleanup(channels: &ChannelService, guides: &GuideService) -> (usize, usize) {
    let channel_entries = channels.purge_expired().await;
    let guide_entries = guides.purge_expired().await;
    if channel_entries + guide_entries > 0 {
        tracing::info!(
            "Cleanup: dropped {} channel list entries, {} guide entries",
            channel_entries,
            guide_entries
        );
    }
    (channel_entries, guide_entries)
}

/// Start the background cleanup task
///
/// Runs immediately on startup, then periodically at the configured interval.
/// This should be spawned as a background task using `tokio::spawn`.
pub async fn start_cleanup_task(
    channels: ChannelService,
    guides: GuideService,
    config: CleanupConfig,
) {
    tracing::info!("Starting cleanup task (interval: {}s)", config.interval_secs);

    run_cleanup(&channels, &guides).await;

    let mut interval = time::interval(Duration::from_secs(config.interval_secs));
    // The first tick completes immediately and would double the startup run.
    interval.tick().await;

    loop {
        interval.tick().await;
        run_cleanup(&channels, &guides).await;
    }
}
