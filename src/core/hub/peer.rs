// src/core/hub/peer.rs

//! The hub's view of one connected session: its outbound queue and kill switch.

use crate::core::CloudVarError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{broadcast, mpsc};

/// An item on a session's outbound queue.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A single serialized update, shared between all recipients.
    Frame(Arc<str>),
    /// The initial snapshot. Occupies one queue slot regardless of size so a
    /// large table never overflows a fresh queue.
    Snapshot(Vec<String>),
}

pub type KillSender = broadcast::Sender<()>;

/// A registered session as seen by the `BroadcastHub`.
#[derive(Debug)]
pub struct PeerHandle {
    pub session_id: u64,
    pub addr: SocketAddr,
    tx: mpsc::Sender<Outbound>,
    kill_tx: KillSender,
    evicted: AtomicBool,
    dropped: AtomicU64,
}

impl PeerHandle {
    pub fn new(
        session_id: u64,
        addr: SocketAddr,
        tx: mpsc::Sender<Outbound>,
        kill_tx: KillSender,
    ) -> Self {
        Self {
            session_id,
            addr,
            tx,
            kill_tx,
            evicted: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueues an item without waiting. A full or closed queue is a delivery
    /// failure for this peer only.
    pub fn offer(&self, item: Outbound) -> Result<(), CloudVarError> {
        if self.is_evicted() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(CloudVarError::Delivery(self.session_id));
        }
        self.tx.try_send(item).map_err(|_| {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            CloudVarError::Delivery(self.session_id)
        })
    }

    /// Marks the peer as evicted and signals its connection handler to close.
    /// Returns true only for the call that performed the eviction.
    pub fn evict(&self) -> bool {
        if self.evicted.swap(true, Ordering::SeqCst) {
            return false;
        }
        // An error only means the handler is already gone.
        let _ = self.kill_tx.send(());
        true
    }

    pub fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::SeqCst)
    }

    /// Number of items that could not be queued for this peer.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
