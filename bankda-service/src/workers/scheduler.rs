//! Recurring sync trigger.

use crate::services::{CycleOutcome, SyncService};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Run sync cycles every `interval` until cancelled. The first tick fires a
/// full interval after startup; operators can always trigger a cycle through
/// the sync endpoint in the meantime.
pub async fn run_sync_scheduler(
    sync: Arc<SyncService>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // interval() fires immediately; consume that tick.
    ticker.tick().await;

    info!(interval_secs = interval.as_secs(), "Sync scheduler started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Sync scheduler shutting down");
                break;
            }
            _ = ticker.tick() => {
                match sync.run_cycle().await {
                    Ok(CycleOutcome::Completed(report)) => {
                        info!(
                            processed = report.processed,
                            skipped = report.skipped,
                            "Scheduled sync cycle completed"
                        );
                    }
                    Ok(CycleOutcome::RateLimited) => {
                        info!("Scheduled sync cycle skipped: provider rate limit");
                    }
                    Ok(CycleOutcome::FetchFailed(reason)) => {
                        warn!(reason = %reason, "Scheduled sync cycle failed to fetch");
                    }
                    Err(e) => {
                        error!(error = %e, "Scheduled sync cycle failed");
                    }
                }
            }
        }
    }
}
