//! Background poller
//!
//! Drives the same refresh operation as `/api/refresh` on a fixed interval.
//! The first cycle runs immediately; missed ticks are skipped rather than
//! bunched up.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::pipeline::Refresher;

/// Handle to a running poller
pub struct Poller {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Poller {
    /// Spawn the poller on the current runtime
    pub fn spawn(refresher: Refresher, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run(refresher, interval, shutdown_rx));
        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Stop polling and wait for the in-flight cycle to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "Poller task ended abnormally");
        }
    }
}

async fn run(refresher: Refresher, interval: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        source = %refresher.source().name(),
        interval_secs = interval.as_secs(),
        "Poller started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Failures are already counted and logged by the refresher
                let _ = refresher.refresh().await;
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("Poller stopped");
}
