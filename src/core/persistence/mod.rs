// src/core/persistence/mod.rs

//! Durable storage for the variable table.
//!
//! The store never appends: every successful `set` rewrites the whole table.
//! Implementations must make each rewrite atomic, so a reader (or a restart)
//! only ever observes a complete snapshot.

mod snapshot_file;
mod snapshot_retry;

pub use snapshot_file::JsonSnapshotFile;
pub use snapshot_retry::SnapshotRetryTask;

use crate::core::CloudVarError;
use crate::core::protocol::VariableValue;
use async_trait::async_trait;
use indexmap::IndexMap;

/// The in-memory table shape that is persisted.
pub type VariableTable = IndexMap<String, VariableValue>;

/// The persistence medium the variable store writes through.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Loads the last persisted table. A medium with nothing persisted yet
    /// yields an empty table.
    async fn load(&self) -> Result<VariableTable, CloudVarError>;

    /// Replaces the persisted table with `table`.
    async fn save(&self, table: &VariableTable) -> Result<(), CloudVarError>;

    /// A human-readable location, for log lines.
    fn describe(&self) -> String;
}
