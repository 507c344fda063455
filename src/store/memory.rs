//! In-process [`KeyValueStore`] used by the server binary and by tests.

use super::{Item, KeyValueStore, StoreError, StoreResult, StoreSnapshot};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

type Table = HashMap<String, Item>;

/// Tables held in memory behind a single lock.
///
/// Every primitive takes the lock once, so each put/get/delete/atomic_add is
/// atomic per item. Scans take a point-in-time copy of the table and yield it
/// in hash order.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<HashMap<String, Table>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated availability. While unavailable every primitive fails
    /// with [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of items currently in `table`
    pub async fn len(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .map(|t| t.len())
            .unwrap_or(0)
    }

    /// Take a serializable copy of every table
    pub async fn export(&self) -> StoreSnapshot {
        StoreSnapshot::new(self.tables.read().await.clone())
    }

    /// Replace every table with the contents of `snapshot`
    pub async fn import(&self, snapshot: StoreSnapshot) -> Result<(), String> {
        snapshot.validate()?;
        let table_count = snapshot.tables.len();
        *self.tables.write().await = snapshot.tables;
        tracing::info!("Imported store snapshot with {} tables", table_count);
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn put(&self, table: &str, key: &str, item: Item) -> StoreResult<()> {
        self.check_available()?;
        self.tables
            .write()
            .await
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), item);
        Ok(())
    }

    async fn get(&self, table: &str, key: &str) -> StoreResult<Option<Item>> {
        self.check_available()?;
        Ok(self
            .tables
            .read()
            .await
            .get(table)
            .and_then(|t| t.get(key))
            .cloned())
    }

    async fn delete(&self, table: &str, key: &str) -> StoreResult<()> {
        self.check_available()?;
        if let Some(t) = self.tables.write().await.get_mut(table) {
            t.remove(key);
        }
        Ok(())
    }

    async fn atomic_add(
        &self,
        table: &str,
        key_attr: &str,
        key: &str,
        field: &str,
        delta: i64,
    ) -> StoreResult<i64> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let item = tables
            .entry(table.to_string())
            .or_default()
            .entry(key.to_string())
            .or_insert_with(|| {
                let mut fresh = Item::new();
                fresh.insert(key_attr.to_string(), Value::from(key));
                fresh
            });

        let current = match item.get(field) {
            None => 0,
            Some(value) => value.as_i64().ok_or_else(|| StoreError::Malformed {
                table: table.to_string(),
                reason: format!("attribute '{}' of '{}' is not an integer", field, key),
            })?,
        };

        let updated = current + delta;
        item.insert(field.to_string(), Value::from(updated));
        Ok(updated)
    }

    fn scan<'a>(&'a self, table: &'a str) -> BoxStream<'a, StoreResult<Item>> {
        stream::once(async move {
            self.check_available()?;
            let items: Vec<Item> = self
                .tables
                .read()
                .await
                .get(table)
                .map(|t| t.values().cloned().collect())
                .unwrap_or_default();
            Ok::<_, StoreError>(items)
        })
        .flat_map(|snapshot| match snapshot {
            Ok(items) => stream::iter(items.into_iter().map(Ok)).left_stream(),
            Err(e) => stream::once(async move { Err(e) }).right_stream(),
        })
        .boxed()
    }
}
