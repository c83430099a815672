// src/server/gateway.rs

//! The connection gateway: admission of upgraded WebSocket connections and
//! hand-off to a `ConnectionHandler`.

use crate::connection::ConnectionHandler;
use crate::core::metrics;
use crate::core::state::ServerState;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code};
use axum::response::Response;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{info, warn};

/// Completes the upgrade and runs the session on the upgraded socket.
pub fn accept(upgrade: WebSocketUpgrade, addr: SocketAddr, state: Arc<ServerState>) -> Response {
    state.stats.increment_total_connections();
    metrics::CONNECTIONS_RECEIVED_TOTAL.inc();
    upgrade.on_upgrade(move |socket| handle_socket(socket, addr, state))
}

/// Admits or rejects a freshly upgraded socket, then runs its session.
async fn handle_socket(socket: WebSocket, addr: SocketAddr, state: Arc<ServerState>) {
    let send_timeout = state.config.send_timeout();

    if !state.policy.admit_connection(&addr.ip()).is_allowed() {
        warn!("Connection from {} denied by the IP filter.", addr);
        state.stats.increment_rejected_connections();
        metrics::POLICY_DENIALS_TOTAL.inc();
        close_with(socket, close_code::POLICY, "ip blocked", send_timeout).await;
        return;
    }

    let Ok(permit) = state.connection_permits.clone().try_acquire_owned() else {
        warn!(
            "Connection from {} rejected: max_clients ({}) reached.",
            addr, state.config.max_clients
        );
        close_with(socket, close_code::AGAIN, "try again later", send_timeout).await;
        return;
    };

    let session_id = state.next_session_id();
    info!("Accepted session {} from {}", session_id, addr);
    let handler = ConnectionHandler::new(socket, addr, state, session_id);
    if let Err(e) = handler.run().await {
        warn!("Session from {} terminated unexpectedly: {}", addr, e);
    }
    drop(permit);
}

/// Sends a close frame before any data and waits briefly for the peer to
/// acknowledge it.
async fn close_with(mut socket: WebSocket, code: u16, reason: &'static str, send_timeout: Duration) {
    let frame = CloseFrame {
        code,
        reason: Utf8Bytes::from_static(reason),
    };
    if time::timeout(send_timeout, socket.send(Message::Close(Some(frame))))
        .await
        .is_err()
    {
        return;
    }
    let _ = time::timeout(send_timeout, async {
        while let Some(Ok(_)) = socket.recv().await {}
    })
    .await;
}
