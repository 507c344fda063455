//! Store snapshots for quick and dirty restoration across restarts.

use super::{Item, MemoryStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Schema version for snapshot format compatibility
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Errors while reading or writing a snapshot file
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot rejected: {0}")]
    Invalid(String),
}

/// A serializable copy of every table in a [`MemoryStore`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Schema version for forward compatibility
    pub schema_version: u32,
    /// Export timestamp (ISO8601)
    pub exported_at: String,
    /// Table name -> primary key -> item
    pub tables: HashMap<String, HashMap<String, Item>>,
}

impl StoreSnapshot {
    pub fn new(tables: HashMap<String, HashMap<String, Item>>) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            exported_at: chrono::Utc::now().to_rfc3339(),
            tables,
        }
    }

    /// Read a snapshot from `path`. Returns `Ok(None)` when the file does not exist.
    pub async fn read_from(path: &Path) -> Result<Option<Self>, SnapshotError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Validate the snapshot before import
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version > SNAPSHOT_SCHEMA_VERSION {
            return Err(format!(
                "Snapshot schema version {} is newer than supported version {}",
                self.schema_version, SNAPSHOT_SCHEMA_VERSION
            ));
        }
        if self.tables.keys().any(|name| name.trim().is_empty()) {
            return Err("Snapshot contains a table with an empty name".to_string());
        }
        Ok(())
    }
}

impl MemoryStore {
    /// Write the current contents to `path` as pretty JSON
    pub async fn save_to(&self, path: &Path) -> Result<(), SnapshotError> {
        let snapshot = self.export().await;
        let json = serde_json::to_vec_pretty(&snapshot)?;

        // Write next to the target and rename so a crash never leaves half a file
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

/// Spawn a background task that saves the store to `path` every `interval`
pub fn spawn_snapshot_saver(store: MemoryStore, path: PathBuf, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately; nothing new to save yet
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match store.save_to(&path).await {
                Ok(()) => tracing::debug!("Saved store snapshot to {}", path.display()),
                Err(e) => tracing::error!("Failed to save store snapshot: {}", e),
            }
        }
    });
}
