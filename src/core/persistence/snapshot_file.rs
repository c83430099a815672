// src/core/persistence/snapshot_file.rs

//! A `SnapshotStore` backed by a pretty-printed JSON object on disk.

use super::{SnapshotStore, VariableTable};
use crate::core::CloudVarError;
use crate::core::protocol::VariableValue;
use async_trait::async_trait;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

/// Persists the table as `{"name": value, ...}` at a fixed path.
#[derive(Debug, Clone)]
pub struct JsonSnapshotFile {
    path: PathBuf,
}

impl JsonSnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the parent directory of the snapshot file if it is missing.
    pub async fn ensure_parent_dir(&self) -> Result<(), CloudVarError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                CloudVarError::Persistence(format!(
                    "failed to create directory '{}': {e}",
                    parent.display()
                ))
            })?;
            info!("Created persistence directory: {}", parent.display());
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".tmp.{}", rand::random::<u32>()));
        self.path.with_file_name(name)
    }

    async fn write_temp(&self, temp_path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(temp_path).await?;
        file.write_all(bytes).await?;
        file.write_all(b"\n").await?;
        file.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for JsonSnapshotFile {
    async fn load(&self) -> Result<VariableTable, CloudVarError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(
                    "Snapshot file not found at {}. Starting with no variables.",
                    self.path.display()
                );
                return Ok(VariableTable::new());
            }
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            warn!(
                "Snapshot file {} is empty. Starting with no variables.",
                self.path.display()
            );
            return Ok(VariableTable::new());
        }

        let parsed: Value = serde_json::from_str(&contents).map_err(|e| {
            CloudVarError::Persistence(format!(
                "snapshot file '{}' is not valid JSON: {e}",
                self.path.display()
            ))
        })?;
        let Value::Object(entries) = parsed else {
            return Err(CloudVarError::Persistence(format!(
                "snapshot file '{}' must contain a JSON object",
                self.path.display()
            )));
        };

        let mut table = VariableTable::with_capacity(entries.len());
        for (name, value) in entries {
            match VariableValue::try_from(value) {
                Ok(v) => {
                    table.insert(name, v);
                }
                Err(e) => warn!("Skipping persisted variable '{}': {}", name, e),
            }
        }
        info!(
            "Loaded {} variables from {}",
            table.len(),
            self.path.display()
        );
        Ok(table)
    }

    async fn save(&self, table: &VariableTable) -> Result<(), CloudVarError> {
        let bytes = serde_json::to_vec_pretty(table)?;
        let temp_path = self.temp_path();

        // Step 1: write the full table to a temporary sibling file.
        if let Err(e) = self.write_temp(&temp_path, &bytes).await {
            let reason = format!(
                "failed to write temporary snapshot '{}': {e}",
                temp_path.display()
            );
            if let Err(remove_err) = fs::remove_file(&temp_path).await
                && remove_err.kind() != ErrorKind::NotFound
            {
                error!(
                    "Additionally failed to remove temporary snapshot '{}': {remove_err}",
                    temp_path.display()
                );
            }
            return Err(CloudVarError::Persistence(reason));
        }

        // Step 2: atomically replace the previous snapshot.
        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let reason = format!(
                "failed to rename '{}' to '{}': {e}",
                temp_path.display(),
                self.path.display()
            );
            if let Err(remove_err) = fs::remove_file(&temp_path).await {
                error!(
                    "Additionally failed to remove temporary snapshot '{}': {remove_err}",
                    temp_path.display()
                );
            }
            return Err(CloudVarError::Persistence(reason));
        }

        debug!(
            "Snapshot with {} variables written to {}",
            table.len(),
            self.path.display()
        );
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
