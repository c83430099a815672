// src/server/initialization.rs

//! Handles the complete server initialization process, from state setup and
//! persistence loading to binding the listener.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::state::ServerState;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Initializes all server components before starting the main loop.
pub async fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);
    remove_leftover_temp_files(Path::new(&config.cloud_data_path)).await;

    let state = ServerState::initialize(config)
        .await
        .context("Failed to initialize server state")?;
    info!("Server state initialized.");

    setup_with_state(state).await
}

/// Binds the listener for an already initialized state.
pub async fn setup_with_state(state: Arc<ServerState>) -> Result<ServerContext> {
    let (host, port) = (state.config.host.as_str(), state.config.port);
    let listener = TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))?;
    let local_addr = listener.local_addr()?;
    info!("Cloud variable server listening on {}", local_addr);

    Ok(ServerContext {
        state,
        listener,
        background_tasks: JoinSet::new(),
    })
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    info!("Variables are persisted to '{}'.", config.cloud_data_path);
    if config.http_response {
        info!("Serving static files from '{}'.", config.public_dir);
    } else {
        info!("HTTP responses are disabled. Only WebSocket upgrades are served.");
    }
    info!(
        "Session limits: {} clients, {} queued updates per session.",
        config.max_clients, config.send_queue_capacity
    );
}

/// Deletes `<data file>.tmp.*` files left behind by a crash mid-write. The
/// data file itself is never touched.
async fn remove_leftover_temp_files(data_path: &Path) {
    let Some(file_name) = data_path.file_name().and_then(|n| n.to_str()) else {
        return;
    };
    let prefix = format!("{file_name}.tmp.");
    let parent = match data_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let Ok(mut entries) = tokio::fs::read_dir(parent).await else {
        return;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        if let Some(name) = name.to_str()
            && name.starts_with(&prefix)
        {
            warn!(
                "Removing leftover temp file '{}' from an interrupted write.",
                entry.path().display()
            );
            if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                warn!("Failed to remove '{}': {}", entry.path().display(), e);
            }
        }
    }
}
