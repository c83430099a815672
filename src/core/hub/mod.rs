// src/core/hub/mod.rs

//! The broadcast hub: the set of live sessions and the fan-out of updates to
//! them.

mod peer;

pub use peer::{KillSender, Outbound, PeerHandle};

use crate::core::CloudVarError;
use crate::core::metrics;
use crate::core::protocol::ServerMessage;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// The result of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Sessions the update was queued for.
    pub delivered: usize,
    /// Sessions whose queue rejected the update.
    pub failed: usize,
}

/// `BroadcastHub` holds every registered session, keyed by session ID.
///
/// Publishing never waits on a socket: each session has its own bounded
/// queue drained by its writer task, so a slow peer only ever hurts itself.
/// A peer whose queue rejects an update is evicted, so it reconnects and
/// receives a fresh snapshot rather than silently missing the update.
#[derive(Debug, Default)]
pub struct BroadcastHub {
    peers: DashMap<u64, Arc<PeerHandle>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a session. Callers must already have queued the session's
    /// baseline snapshot; see `VariableStore::attach`.
    pub fn register(&self, peer: Arc<PeerHandle>) {
        debug!(
            "Registering session {} ({}) with the broadcast hub.",
            peer.session_id, peer.addr
        );
        if let Some(previous) = self.peers.insert(peer.session_id, peer) {
            warn!(
                "Session ID {} was already registered; replaced the stale entry.",
                previous.session_id
            );
        }
    }

    /// Removes a session. Returns false if it was not registered.
    pub fn unregister(&self, session_id: u64) -> bool {
        let removed = self.peers.remove(&session_id).is_some();
        if removed {
            debug!("Session {} removed from the broadcast hub.", session_id);
        }
        removed
    }

    /// Serializes `message` once and fans it out to every registered session.
    pub fn publish(&self, message: &ServerMessage) -> Result<Delivery, CloudVarError> {
        let frame: Arc<str> = message.encode()?.into();
        Ok(self.publish_frame(frame))
    }

    /// Fans an already serialized frame out to every registered session.
    /// Individual failures are logged and isolated.
    pub fn publish_frame(&self, frame: Arc<str>) -> Delivery {
        let mut delivery = Delivery::default();
        for entry in self.peers.iter() {
            let peer = entry.value();
            match peer.offer(Outbound::Frame(frame.clone())) {
                Ok(()) => delivery.delivered += 1,
                Err(e) => {
                    delivery.failed += 1;
                    metrics::DELIVERY_FAILURES_TOTAL.inc();
                    if peer.evict() {
                        warn!(
                            "{} ({}): outbound queue full or closed. Disconnecting the session.",
                            e, peer.addr
                        );
                    }
                }
            }
        }
        debug!(
            "Broadcast delivered to {} sessions ({} failed).",
            delivery.delivered, delivery.failed
        );
        delivery
    }

    pub fn contains(&self, session_id: u64) -> bool {
        self.peers.contains_key(&session_id)
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
