//! Periodic removal of expired sessions

use super::store::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Start the background sweep. It runs until `cancel` fires.
///
/// The sweep only removes sessions; it never touches live ones.
pub fn spawn_sweeper(
    store: Arc<dyn SessionStore>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = store.sweep_expired().await;
                    if removed > 0 {
                        let remaining = store.session_count().await;
                        tracing::info!(removed, remaining, "Swept expired sessions");
                    }
                }
            }
        }
        tracing::info!("Session sweeper stopped");
    })
}
