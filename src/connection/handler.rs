// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of a
//! WebSocket session: snapshot delivery, inbound message processing, the
//! outbound writer task and the close sequence.

use super::guard::ConnectionGuard;
use super::session::SessionState;
use crate::core::CloudVarError;
use crate::core::hub::{Outbound, PeerHandle};
use crate::core::metrics;
use crate::core::protocol::ClientMessage;
use crate::core::state::ServerState;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// Why a session ended. Decides the close frame sent to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    /// The peer sent a Close frame or the stream ended.
    PeerClosed,
    TransportError,
    Shutdown,
    /// The hub could not queue an update for this peer.
    Evicted,
    /// A socket write failed or timed out. The sink is already gone.
    WriteFailed,
    IdleTimeout,
    PolicyDenied,
    AttachFailed,
}

impl CloseReason {
    fn close_frame(self) -> Option<CloseFrame> {
        let (code, reason) = match self {
            CloseReason::PeerClosed | CloseReason::TransportError | CloseReason::WriteFailed => {
                return None;
            }
            CloseReason::Shutdown => (close_code::AWAY, "server shutting down"),
            CloseReason::Evicted => (close_code::AGAIN, "outbound queue overflow"),
            CloseReason::IdleTimeout => (close_code::AWAY, "idle timeout"),
            CloseReason::PolicyDenied => (close_code::POLICY, "name blocked"),
            CloseReason::AttachFailed => (close_code::ERROR, "internal error"),
        };
        Some(CloseFrame {
            code,
            reason: Utf8Bytes::from_static(reason),
        })
    }
}

/// The next step for the connection's main loop to take.
enum NextAction {
    Continue,
    Close(CloseReason),
}

/// Manages the full lifecycle of a WebSocket session.
pub struct ConnectionHandler {
    socket: Option<WebSocket>,
    addr: SocketAddr,
    state: Arc<ServerState>,
    session_id: u64,
    global_shutdown_rx: broadcast::Receiver<()>,
    session: SessionState,
}

impl ConnectionHandler {
    /// Creates a new `ConnectionHandler` for an admitted, upgraded socket.
    pub fn new(socket: WebSocket, addr: SocketAddr, state: Arc<ServerState>, session_id: u64) -> Self {
        let global_shutdown_rx = state.shutdown_tx.subscribe();
        Self {
            socket: Some(socket),
            addr,
            state,
            session_id,
            global_shutdown_rx,
            session: SessionState::new(),
        }
    }

    /// Runs the session until the peer leaves, the server shuts down, or the
    /// session is closed by policy. The session is deregistered before this
    /// returns.
    pub async fn run(mut self) -> Result<(), CloudVarError> {
        let socket = self
            .socket
            .take()
            .ok_or_else(|| CloudVarError::Internal("WebSocket already taken".into()))?;
        let (sink, mut stream) = socket.split();

        let config = self.state.config.clone();
        let (tx, rx) = mpsc::channel(config.send_queue_capacity);
        let (kill_tx, mut kill_rx) = broadcast::channel(1);
        let peer = Arc::new(PeerHandle::new(self.session_id, self.addr, tx, kill_tx));
        let (close_tx, close_rx) = oneshot::channel();
        let (write_failed_tx, mut write_failed_rx) = oneshot::channel();

        let guard = ConnectionGuard::new(self.state.clone(), self.session_id, self.addr);
        let writer = tokio::spawn(run_writer(
            sink,
            rx,
            close_rx,
            write_failed_tx,
            peer.clone(),
            config.send_timeout(),
            config.ping_interval(),
        ));

        let reason = match self.state.store.attach(peer.clone()).await {
            Ok(count) => {
                debug!(
                    "Session {} ({}): queued snapshot of {} variables.",
                    self.session_id, self.addr, count
                );
                self.read_loop(&mut stream, &mut kill_rx, &mut write_failed_rx)
                    .await
            }
            Err(e) => {
                error!(
                    "Session {} ({}): failed to queue the initial snapshot: {}",
                    self.session_id, self.addr, e
                );
                CloseReason::AttachFailed
            }
        };

        // Deregister before closing so no further update is queued.
        drop(guard);

        info!(
            "Session {} ({}, project {}) closed ({:?}) after {:.1}s, {} sets applied, {} updates dropped.",
            self.session_id,
            self.addr,
            self.session.project_id.as_deref().unwrap_or("<none>"),
            reason,
            self.session.connected_at.elapsed().as_secs_f64(),
            self.session.sets_applied,
            peer.dropped_count()
        );

        // An error only means the writer is already gone.
        let _ = close_tx.send(reason.close_frame());
        let writer_deadline = config.send_timeout() * 2;
        let writer_abort = writer.abort_handle();
        if time::timeout(writer_deadline, writer).await.is_err() {
            debug!(
                "Session {}: writer did not finish within {:?}. Aborting it.",
                self.session_id, writer_deadline
            );
            writer_abort.abort();
        }
        Ok(())
    }

    /// The main event loop for inbound frames and signals.
    async fn read_loop(
        &mut self,
        stream: &mut WsStream,
        kill_rx: &mut broadcast::Receiver<()>,
        write_failed_rx: &mut oneshot::Receiver<()>,
    ) -> CloseReason {
        let idle_timeout = self.state.config.idle_timeout();
        let mut idle_check = idle_timeout.map(|timeout| {
            let period = (timeout / 4).max(Duration::from_millis(50));
            new_interval(period)
        });

        let mut writer_alive = true;

        loop {
            tokio::select! {
                // Prioritize shutdown signals over other events.
                biased;
                _ = self.global_shutdown_rx.recv() => {
                    info!("Session {} ({}) received GLOBAL shutdown signal.", self.session_id, self.addr);
                    return CloseReason::Shutdown;
                }
                failed = &mut *write_failed_rx, if writer_alive => {
                    if failed.is_ok() {
                        info!("Session {} ({}): socket write failed.", self.session_id, self.addr);
                        return CloseReason::WriteFailed;
                    }
                    writer_alive = false;
                }
                _ = kill_rx.recv() => {
                    info!("Session {} ({}) received kill signal.", self.session_id, self.addr);
                    return CloseReason::Evicted;
                }
                frame = stream.next() => {
                    let message = match frame {
                        Some(Ok(message)) => message,
                        Some(Err(e)) => {
                            debug!("Connection error for {}: {}", self.addr, e);
                            return CloseReason::TransportError;
                        }
                        None => {
                            debug!("Connection from {} closed by peer.", self.addr);
                            return CloseReason::PeerClosed;
                        }
                    };
                    self.session.touch();
                    let action = match message {
                        Message::Text(text) => self.process_text(text.as_str()).await,
                        Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                            Ok(text) => self.process_text(text).await,
                            Err(_) => {
                                self.record_decode_error(&CloudVarError::Decode(
                                    "binary frame is not valid UTF-8".into(),
                                ));
                                NextAction::Continue
                            }
                        },
                        Message::Ping(_) | Message::Pong(_) => NextAction::Continue,
                        Message::Close(frame) => {
                            debug!("Session {} ({}) sent close: {:?}", self.session_id, self.addr, frame);
                            NextAction::Close(CloseReason::PeerClosed)
                        }
                    };
                    if let NextAction::Close(reason) = action {
                        return reason;
                    }
                }
                _ = tick(&mut idle_check) => {
                    if let Some(timeout) = idle_timeout
                        && self.session.idle_for() > timeout
                    {
                        info!(
                            "Session {} ({}) idle for more than {:?}. Disconnecting.",
                            self.session_id, self.addr, timeout
                        );
                        return CloseReason::IdleTimeout;
                    }
                }
            }
        }
    }

    /// Decodes one text frame and applies it.
    async fn process_text(&mut self, text: &str) -> NextAction {
        let message = match ClientMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                self.record_decode_error(&e);
                return NextAction::Continue;
            }
        };

        debug!(
            "Session {} ({}) RECEIVED {}",
            self.session_id,
            self.addr,
            message.method()
        );

        match message {
            ClientMessage::Handshake { user, project_id } => {
                info!(
                    "Session {} ({}) handshake: user={}, project={}",
                    self.session_id,
                    self.addr,
                    user.as_deref().unwrap_or("<anonymous>"),
                    project_id.as_deref().unwrap_or("<none>")
                );
                self.session.record_handshake(user, project_id);
                NextAction::Continue
            }
            ClientMessage::Set { name, value, user } => {
                debug!(
                    "Session {} ({}) set {} = {} ({}) from {}",
                    self.session_id,
                    self.addr,
                    name,
                    value,
                    value.kind(),
                    self.session
                        .effective_identity(user.as_deref())
                        .unwrap_or("<anonymous>")
                );
                let policy = &self.state.policy;
                if let Some(denied_identity) = self
                    .session
                    .identities(user.as_deref())
                    .find(|identity| !policy.admit_identity(Some(*identity)).is_allowed())
                {
                    let denied = CloudVarError::PolicyDenied(format!(
                        "identity '{}' is deny-listed",
                        denied_identity
                    ));
                    warn!(
                        "Session {} ({}): {}. Discarding set of '{}' and closing.",
                        self.session_id, self.addr, denied, name
                    );
                    self.state.stats.increment_rejected_messages();
                    metrics::POLICY_DENIALS_TOTAL.inc();
                    return NextAction::Close(CloseReason::PolicyDenied);
                }

                let outcome = self.state.store.set(name, value).await;
                self.session.sets_applied += 1;
                debug!(
                    "Session {}: set delivered to {} sessions ({} failed, persisted: {}).",
                    self.session_id,
                    outcome.delivery.delivered,
                    outcome.delivery.failed,
                    outcome.is_persisted()
                );
                NextAction::Continue
            }
            ClientMessage::Unknown(method) => {
                debug!(
                    "Session {} ({}): ignoring unknown method '{}'.",
                    self.session_id, self.addr, method
                );
                NextAction::Continue
            }
        }
    }

    fn record_decode_error(&self, e: &CloudVarError) {
        self.state.stats.increment_decode_errors();
        metrics::DECODE_ERRORS_TOTAL.inc();
        warn!(
            "Session {} ({}): dropping frame: {}",
            self.session_id, self.addr, e
        );
    }
}

/// Drains the session's outbound queue into the socket. Any failed or
/// timed-out write evicts the peer, which ends the reader loop too.
async fn run_writer(
    mut sink: WsSink,
    mut rx: mpsc::Receiver<Outbound>,
    mut close_rx: oneshot::Receiver<Option<CloseFrame>>,
    write_failed_tx: oneshot::Sender<()>,
    peer: Arc<PeerHandle>,
    send_timeout: Duration,
    ping_interval: Option<Duration>,
) {
    let mut heartbeat = ping_interval.map(new_interval);

    loop {
        tokio::select! {
            biased;
            close = &mut close_rx => {
                if let Ok(Some(frame)) = close {
                    let _ = send_with_timeout(&mut sink, Message::Close(Some(frame)), send_timeout).await;
                }
                break;
            }
            item = rx.recv() => {
                let Some(item) = item else { break };
                let result = match item {
                    Outbound::Frame(frame) => {
                        send_with_timeout(&mut sink, Message::Text(Utf8Bytes::from(&*frame)), send_timeout).await
                    }
                    Outbound::Snapshot(frames) => {
                        let mut result = Ok(());
                        for frame in frames {
                            result = send_with_timeout(&mut sink, Message::Text(frame.into()), send_timeout).await;
                            if result.is_err() {
                                break;
                            }
                        }
                        result
                    }
                };
                if let Err(e) = result {
                    debug!("Session {} ({}): write failed: {}", peer.session_id, peer.addr, e);
                    fail_writer(write_failed_tx, &peer);
                    return;
                }
            }
            _ = tick(&mut heartbeat) => {
                if let Err(e) = send_with_timeout(&mut sink, Message::Ping(Default::default()), send_timeout).await {
                    debug!("Session {} ({}): heartbeat failed: {}", peer.session_id, peer.addr, e);
                    fail_writer(write_failed_tx, &peer);
                    return;
                }
            }
        }
    }
    let _ = sink.close().await;
}

/// Reports a dead sink to the reader loop, then stops the hub from queueing
/// more updates for this peer. The report is sent first, so the reader loop
/// closes the session as `WriteFailed` rather than `Evicted`.
fn fail_writer(write_failed_tx: oneshot::Sender<()>, peer: &PeerHandle) {
    // An error only means the reader loop has already ended.
    let _ = write_failed_tx.send(());
    peer.evict();
}

async fn send_with_timeout(
    sink: &mut WsSink,
    message: Message,
    send_timeout: Duration,
) -> Result<(), CloudVarError> {
    match time::timeout(send_timeout, sink.send(message)).await {
        Ok(result) => result.map_err(CloudVarError::from),
        Err(_) => Err(CloudVarError::Io(Arc::new(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("socket write exceeded {send_timeout:?}"),
        )))),
    }
}

fn new_interval(period: Duration) -> Interval {
    let mut interval = time::interval_at(time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Waits for the next tick, or forever if the timer is disabled.
async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
