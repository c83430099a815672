// src/core/persistence/snapshot_retry.rs

//! Implements the snapshot retry background task.
//! A failed write leaves the store dirty; this task keeps retrying the write
//! until it succeeds, so the table becomes durable without waiting for the
//! next `set`.

use crate::core::storage::VariableStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// The background task struct for the snapshot retrier.
pub struct SnapshotRetryTask {
    store: Arc<VariableStore>,
    interval: Duration,
}

impl SnapshotRetryTask {
    pub fn new(store: Arc<VariableStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Runs until the shutdown signal. The final flush on shutdown is left to
    /// the server's shutdown sequence.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "Snapshot retry task started (every {:?}).",
            self.interval
        );
        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if !self.store.is_dirty() {
                        continue;
                    }
                    match self.store.flush().await {
                        Ok(true) => info!("Retried snapshot write succeeded."),
                        Ok(false) => debug!("Snapshot became current before the retry ran."),
                        Err(e) => warn!("Retried snapshot write failed: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Snapshot retry task received shutdown signal.");
                    return;
                }
            }
        }
    }
}
