// src/server/spawner.rs

//! Spawns all of the server's long-running background tasks.

use super::context::ServerContext;
use super::metrics_server;
use crate::core::persistence::SnapshotRetryTask;
use tracing::info;

/// Spawns all background tasks into the context's JoinSet.
pub fn spawn_all(ctx: &mut ServerContext) {
    let server_state = &ctx.state;
    let shutdown_tx = &server_state.shutdown_tx;
    let background_tasks = &mut ctx.background_tasks;

    // --- Metrics Server ---
    if server_state.config.metrics.enabled {
        let metrics_state = server_state.clone();
        let shutdown_rx_metrics = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            metrics_server::run_metrics_server(metrics_state, shutdown_rx_metrics).await;
            Ok(())
        });
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }

    // --- Persistence Retry ---
    if let Some(interval) = server_state.config.persist_retry_interval() {
        let retry_task = SnapshotRetryTask::new(server_state.store.clone(), interval);
        let shutdown_rx_retry = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            retry_task.run(shutdown_rx_retry).await;
            Ok(())
        });
    } else {
        info!("Snapshot write retries are disabled in the configuration.");
    }

    info!("All background tasks have been spawned.");
}
