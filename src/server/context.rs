// src/server/context.rs

use crate::core::state::ServerState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

/// Holds all the initialized state required to run the server's main loop.
pub struct ServerContext {
    pub state: Arc<ServerState>,
    pub listener: TcpListener,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
}

impl ServerContext {
    /// The address the listener is actually bound to. Differs from the
    /// configured one when port 0 was requested.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}
