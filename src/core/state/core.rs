// src/core/state/core.rs

//! Defines the central `ServerState` struct, holding all shared server-wide state.

use super::stats::StatsState;
use crate::config::Config;
use crate::core::CloudVarError;
use crate::core::hub::BroadcastHub;
use crate::core::persistence::{JsonSnapshotFile, SnapshotStore};
use crate::core::policy::AccessPolicy;
use crate::core::storage::VariableStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Semaphore, broadcast};
use tracing::info;

/// The central struct holding all shared, server-wide state.
/// It is wrapped in an `Arc` and handed to every connection handler and
/// HTTP route.
#[derive(Debug)]
pub struct ServerState {
    /// The immutable configuration snapshot taken at startup.
    pub config: Arc<Config>,
    /// The authoritative variable table.
    pub store: Arc<VariableStore>,
    /// The set of live sessions. Also reachable through `store.hub()`.
    pub hub: Arc<BroadcastHub>,
    /// Deny-lists loaded at startup.
    pub policy: Arc<AccessPolicy>,
    /// Limits concurrent sessions to `config.max_clients`.
    pub connection_permits: Arc<Semaphore>,
    /// Fires once when the server begins a graceful shutdown.
    pub shutdown_tx: broadcast::Sender<()>,
    /// Holds all server-wide statistics.
    pub stats: StatsState,
    session_id_counter: AtomicU64,
}

impl ServerState {
    /// Initializes the server state from the configuration: loads the
    /// deny-lists and the persisted variable table.
    pub async fn initialize(config: Config) -> Result<Arc<Self>, CloudVarError> {
        let snapshot_file = JsonSnapshotFile::new(&config.cloud_data_path);
        snapshot_file.ensure_parent_dir().await?;
        let policy = AccessPolicy::from_config(&config)?;
        Self::initialize_with(config, Arc::new(snapshot_file), policy).await
    }

    /// Initializes the server state with an explicit persistence backend and
    /// access policy.
    pub async fn initialize_with(
        config: Config,
        backend: Arc<dyn SnapshotStore>,
        policy: AccessPolicy,
    ) -> Result<Arc<Self>, CloudVarError> {
        let hub = Arc::new(BroadcastHub::new());
        let store = Arc::new(VariableStore::open(backend, hub.clone()).await?);
        let (shutdown_tx, _) = broadcast::channel(1);

        info!(
            "Access policy: IP filter {}, name filter {}.",
            if policy.ip_filter_enabled() { "on" } else { "off" },
            if policy.name_filter_enabled() { "on" } else { "off" },
        );

        Ok(Arc::new(Self {
            connection_permits: Arc::new(Semaphore::new(config.max_clients)),
            config: Arc::new(config),
            store,
            hub,
            policy: Arc::new(policy),
            shutdown_tx,
            stats: StatsState::new(),
            session_id_counter: AtomicU64::new(0),
        }))
    }

    /// Allocates a unique session ID.
    pub fn next_session_id(&self) -> u64 {
        self.session_id_counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}
