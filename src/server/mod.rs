// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;

mod connection_loop;
mod context;
mod gateway;
mod http;
mod initialization;
mod metrics_server;
mod spawner;

pub use connection_loop::{serve_until, shutdown_signal};
pub use context::ServerContext;
pub use http::{content_type_for, resolve_public_path, router};
pub use initialization::{setup, setup_with_state};
pub use spawner::spawn_all;

/// The main server startup function, orchestrating all setup phases.
pub async fn run(config: Config) -> Result<()> {
    // 1. Initialize server state and bind the listener.
    let mut server_context = initialization::setup(config).await?;

    // 2. Spawn all background tasks.
    spawner::spawn_all(&mut server_context);

    // 3. Serve connections. This function will run until shutdown.
    connection_loop::run(server_context).await;

    Ok(())
}
