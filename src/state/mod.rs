use crate::chat::ChatService;
use crate::config::ChatConfig;
use crate::delivery::ConnectionHub;
use crate::message_log::SystemClock;
use crate::store::snapshot::SnapshotError;
use crate::store::{MemoryStore, StoreSnapshot};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub chat: ChatService,
    /// Outbound queues of the sockets attached to this process
    pub hub: ConnectionHub,
    /// Backing store, kept concrete for snapshot export/import
    pub store: MemoryStore,
}

impl AppState {
    pub fn new(config: &ChatConfig) -> Self {
        Self::with_store(MemoryStore::new(), config)
    }

    pub fn with_store(store: MemoryStore, config: &ChatConfig) -> Self {
        let hub = ConnectionHub::with_capacity(config.outbound_queue);
        let chat = ChatService::new(
            Arc::new(store.clone()),
            Arc::new(hub.clone()),
            config,
            Arc::new(SystemClock),
        );
        Self { chat, hub, store }
    }

    /// Replace the store contents after checking the snapshot's chat tables
    pub async fn import_snapshot(&self, snapshot: StoreSnapshot) -> Result<(), SnapshotError> {
        self.chat
            .check_snapshot(&snapshot)
            .map_err(SnapshotError::Invalid)?;
        self.store
            .import(snapshot)
            .await
            .map_err(SnapshotError::Invalid)
    }

    /// Restore from a snapshot file. Returns `Ok(false)` when there is none.
    pub async fn restore_from(&self, path: &std::path::Path) -> Result<bool, SnapshotError> {
        match StoreSnapshot::read_from(path).await? {
            Some(snapshot) => {
                self.import_snapshot(snapshot).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(&ChatConfig::default())
    }
}
