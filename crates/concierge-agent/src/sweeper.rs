use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::session::PendingStore;

/// Periodically evict expired pending requests until `cancel` fires.
///
/// Reads already ignore expired entries; the sweep only bounds the memory
/// held by sessions that are never read again.
pub fn spawn_sweeper(
    store: Arc<PendingStore>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Pending-request sweeper started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel.cancelled() => {
                    info!("Pending-request sweeper shutting down");
                    break;
                }
            }

            let removed = store.sweep_expired();
            debug!(removed, remaining = store.len(), "Sweep finished");
        }
    })
}
