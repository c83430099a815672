// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for session resource management.

use crate::core::metrics;
use crate::core::state::ServerState;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// An RAII guard to ensure a session is always removed from the broadcast
/// hub when its connection handler's scope is exited, whether the peer
/// disconnected cleanly, vanished, or was closed by the server.
pub struct ConnectionGuard {
    /// A shared reference to the server state.
    pub(crate) state: Arc<ServerState>,
    /// The unique identifier for the client session.
    pub(crate) session_id: u64,
    /// The network address of the client.
    pub(crate) addr: SocketAddr,
}

impl ConnectionGuard {
    /// Creates a new `ConnectionGuard` and counts the session as connected.
    pub(crate) fn new(state: Arc<ServerState>, session_id: u64, addr: SocketAddr) -> Self {
        metrics::CONNECTED_SESSIONS.inc();
        Self {
            state,
            session_id,
            addr,
        }
    }
}

impl Drop for ConnectionGuard {
    /// Deregisters the session. Runs exactly once per session.
    fn drop(&mut self) {
        metrics::CONNECTED_SESSIONS.dec();
        debug!(
            "ConnectionGuard dropping, cleaning up session {} ({})",
            self.session_id, self.addr
        );

        if !self.state.hub.unregister(self.session_id) {
            debug!(
                "Session {} was not registered with the hub upon cleanup.",
                self.session_id
            );
        }
    }
}
