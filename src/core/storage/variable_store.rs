// src/core/storage/variable_store.rs

//! Defines `VariableStore`, the authoritative table of cloud variables.

use crate::core::CloudVarError;
use crate::core::hub::{BroadcastHub, Delivery, Outbound, PeerHandle};
use crate::core::metrics;
use crate::core::persistence::{SnapshotStore, VariableTable};
use crate::core::protocol::{ServerMessage, VariableValue};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// A consistent, point-in-time copy of the table in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    entries: VariableTable,
}

impl Snapshot {
    pub fn get(&self, name: &str) -> Option<&VariableValue> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &VariableValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_table(&self) -> &VariableTable {
        &self.entries
    }

    /// Encodes every variable as a `set` message, in table order.
    pub fn to_frames(&self) -> Result<Vec<String>, CloudVarError> {
        self.entries
            .iter()
            .map(|(name, value)| ServerMessage::set(name.clone(), value.clone()).encode())
            .collect()
    }
}

/// What happened during one `VariableStore::set`.
#[derive(Debug, Clone, PartialEq)]
pub struct SetOutcome {
    /// `Some` if the table could not be persisted. The in-memory update and
    /// the broadcast happened regardless.
    pub persist_error: Option<CloudVarError>,
    pub delivery: Delivery,
}

impl SetOutcome {
    pub fn is_persisted(&self) -> bool {
        self.persist_error.is_none()
    }
}

/// The authoritative mapping of variable name to value.
///
/// Every mutation runs as one critical section under `table`:
/// update in memory, rewrite the snapshot, queue the update on every peer.
/// Attaching a new peer takes the same lock, so its baseline snapshot is
/// queued strictly before any update published after it.
pub struct VariableStore {
    table: Mutex<VariableTable>,
    backend: Arc<dyn SnapshotStore>,
    hub: Arc<BroadcastHub>,
    /// Set while the in-memory table holds changes the backend has not accepted.
    dirty: AtomicBool,
}

impl VariableStore {
    /// Loads the persisted table from `backend` and wires the store to `hub`.
    pub async fn open(
        backend: Arc<dyn SnapshotStore>,
        hub: Arc<BroadcastHub>,
    ) -> Result<Self, CloudVarError> {
        let table = backend.load().await?;
        info!(
            "Variable store opened with {} variables from {}.",
            table.len(),
            backend.describe()
        );
        Ok(Self {
            table: Mutex::new(table),
            backend,
            hub,
            dirty: AtomicBool::new(false),
        })
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub async fn snapshot(&self) -> Snapshot {
        Snapshot {
            entries: self.table.lock().await.clone(),
        }
    }

    pub async fn get(&self, name: &str) -> Option<VariableValue> {
        self.table.lock().await.get(name).cloned()
    }

    pub async fn len(&self) -> usize {
        self.table.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.table.lock().await.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Sets `name` to `value`, persists the whole table, and publishes the
    /// update to every registered session.
    ///
    /// A persistence failure does not undo the in-memory update and does not
    /// suppress the broadcast; it is logged and reported in the outcome.
    pub async fn set(&self, name: String, value: VariableValue) -> SetOutcome {
        let start_time = Instant::now();
        let mut table = self.table.lock().await;

        table.insert(name.clone(), value.clone());
        self.dirty.store(true, Ordering::SeqCst);

        let persist_error = match self.backend.save(&table).await {
            Ok(()) => {
                self.dirty.store(false, Ordering::SeqCst);
                None
            }
            Err(e) => {
                metrics::PERSISTENCE_FAILURES_TOTAL.inc();
                error!(
                    "Failed to persist variable '{}' to {}: {}. The value is kept in memory only.",
                    name,
                    self.backend.describe(),
                    e
                );
                Some(e)
            }
        };

        let message = ServerMessage::set(name, value);
        let delivery = match self.hub.publish(&message) {
            Ok(delivery) => delivery,
            Err(e) => {
                error!("Failed to encode update for broadcast: {}", e);
                Delivery::default()
            }
        };
        drop(table);

        metrics::SETS_APPLIED_TOTAL.inc();
        metrics::SET_LATENCY_SECONDS.observe(start_time.elapsed().as_secs_f64());

        SetOutcome {
            persist_error,
            delivery,
        }
    }

    /// Queues the full current table on `peer` and registers it with the hub,
    /// atomically with respect to `set`. Returns the number of variables sent.
    pub async fn attach(&self, peer: Arc<PeerHandle>) -> Result<usize, CloudVarError> {
        let table = self.table.lock().await;
        let count = table.len();
        if count > 0 {
            let frames = Snapshot {
                entries: table.clone(),
            }
            .to_frames()?;
            peer.offer(Outbound::Snapshot(frames))?;
        }
        self.hub.register(peer);
        drop(table);
        Ok(count)
    }

    /// Writes the table if it holds unpersisted changes. Returns true if a
    /// write happened.
    pub async fn flush(&self) -> Result<bool, CloudVarError> {
        let table = self.table.lock().await;
        if !self.is_dirty() {
            debug!("Flush requested, but the snapshot is already current.");
            return Ok(false);
        }
        self.backend.save(&table).await?;
        self.dirty.store(false, Ordering::SeqCst);
        info!(
            "Flushed {} variables to {}.",
            table.len(),
            self.backend.describe()
        );
        Ok(true)
    }
}

impl std::fmt::Debug for VariableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableStore")
            .field("backend", &self.backend.describe())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
