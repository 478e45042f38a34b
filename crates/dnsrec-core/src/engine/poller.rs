// # Poller
//
// Waits out an initial quiescence delay, runs one refresh pass over every
// tracked record, then repeats at a fixed interval until cancelled. A failed
// pass is logged and does not stop the schedule.

use super::SyncHandle;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Run the refresh schedule until `cancel` fires
pub async fn run_poller(
    handle: SyncHandle,
    initial_delay: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    debug!(
        "Poller started (initial delay {:?}, interval {:?})",
        initial_delay, interval
    );

    tokio::select! {
        _ = cancel.cancelled() => {
            debug!("Poller cancelled before the first refresh");
            return;
        }
        _ = tokio::time::sleep(initial_delay) => {}
    }

    refresh_once(&handle).await;

    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => refresh_once(&handle).await,
        }
    }

    debug!("Poller stopped");
}

async fn refresh_once(handle: &SyncHandle) {
    match handle.refresh().await {
        Ok(count) => info!("Refreshed {} record(s)", count),
        Err(e) => warn!("Refresh failed: {}", e),
    }
}
