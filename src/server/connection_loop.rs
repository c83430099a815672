// src/server/connection_loop.rs

//! Contains the main server loop serving connections and handling graceful shutdown.

use super::context::ServerContext;
use super::http;
use std::future::Future;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// How long shutdown waits for sessions to send their close frames.
const SESSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
const BACKGROUND_TASK_TIMEOUT: Duration = Duration::from_secs(10);

/// Serves until SIGINT or SIGTERM, then shuts down gracefully.
pub async fn run(ctx: ServerContext) {
    serve_until(ctx, shutdown_signal()).await;
}

/// Serves until `shutdown` resolves or a background task fails, then closes
/// every session with 1001, flushes the store if dirty and returns.
pub async fn serve_until<F>(ctx: ServerContext, shutdown: F)
where
    F: Future<Output = ()>,
{
    let ServerContext {
        state,
        listener,
        mut background_tasks,
    } = ctx;
    let shutdown_tx = state.shutdown_tx.clone();
    let app = http::router(state.clone());
    let mut server_shutdown_rx: broadcast::Receiver<()> = shutdown_tx.subscribe();

    let mut server = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            server_shutdown_rx.recv().await.ok();
        })
        .await
    });

    tokio::pin!(shutdown);
    let mut server_finished = false;
    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("Shutdown requested, initiating graceful shutdown.");
                break;
            }

            Some(res) = background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); break; }
                }
            },

            res = &mut server => {
                server_finished = true;
                match res {
                    Ok(Ok(())) => warn!("HTTP server stopped unexpectedly. Shutting down."),
                    Ok(Err(e)) => error!("CRITICAL: HTTP server failed: {}. Shutting down.", e),
                    Err(e) => error!("CRITICAL: HTTP server task panicked: {e:?}. Shutting down."),
                }
                break;
            }
        }
    }

    info!("Shutting down. Sending signal to all tasks.");
    if shutdown_tx.send(()).is_err() {
        warn!("No task was listening for the shutdown signal.");
    }

    let drain_start = Instant::now();
    while !state.hub.is_empty() && drain_start.elapsed() < SESSION_DRAIN_TIMEOUT {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    if state.hub.is_empty() {
        info!("All sessions closed.");
    } else {
        warn!(
            "{} sessions still open after {:?}. Continuing shutdown.",
            state.hub.len(),
            SESSION_DRAIN_TIMEOUT
        );
    }

    if !server_finished {
        match tokio::time::timeout(SESSION_DRAIN_TIMEOUT, &mut server).await {
            Ok(_) => info!("HTTP server stopped."),
            Err(_) => {
                warn!("HTTP server did not stop in time. Aborting it.");
                server.abort();
            }
        }
    }

    match state.store.flush().await {
        Ok(true) => info!("Final snapshot written on shutdown."),
        Ok(false) => info!("Snapshot already current. No final write needed."),
        Err(e) => error!("CRITICAL: Final snapshot write on shutdown failed: {}", e),
    }

    info!("Waiting for background tasks to finish...");
    if tokio::time::timeout(BACKGROUND_TASK_TIMEOUT, async {
        while background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
    };
    info!(
        "Server shutdown complete. Served {} connections ({} denied by address, {} closed by identity).",
        state.stats.get_total_connections(),
        state.stats.get_rejected_connections(),
        state.stats.get_rejected_messages()
    );
}

/// Resolves on ctrl-c / SIGINT, or on SIGTERM where available.
pub async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("SIGINT received, initiating graceful shutdown."),
        _ = terminate => info!("SIGTERM received, initiating graceful shutdown."),
    }
}
