//! Key-value storage seam.
//!
//! Every piece of shared chat state (membership, history, counter) lives behind
//! [`KeyValueStore`]. The trait mirrors a per-item consistent table store: no
//! multi-item transactions, no secondary indexes and no ordering on scan.

pub mod memory;
pub mod snapshot;

use async_trait::async_trait;
use futures::stream::{BoxStream, TryStreamExt};
use serde_json::Value;

pub use memory::MemoryStore;
pub use snapshot::{StoreSnapshot, SNAPSHOT_SCHEMA_VERSION};

/// A stored item: a flat JSON object of attribute name to value
pub type Item = serde_json::Map<String, Value>;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a store backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("malformed item in table {table}: {reason}")]
    Malformed { table: String, reason: String },
}

/// Primitive operations consumed by the chat core
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Insert or overwrite the item stored under `key`
    async fn put(&self, table: &str, key: &str, item: Item) -> StoreResult<()>;

    /// Fetch the item stored under `key`, if any
    async fn get(&self, table: &str, key: &str) -> StoreResult<Option<Item>>;

    /// Delete the item stored under `key`. Deleting a missing key is not an error.
    async fn delete(&self, table: &str, key: &str) -> StoreResult<()>;

    /// Atomically add `delta` to a numeric `field`, creating the item and the
    /// field (starting from 0) when absent. A new item also gets its key
    /// stored under `key_attr`. Returns the new value.
    async fn atomic_add(
        &self,
        table: &str,
        key_attr: &str,
        key: &str,
        field: &str,
        delta: i64,
    ) -> StoreResult<i64>;

    /// Enumerate every item in `table`. Order is unspecified and each call
    /// starts a fresh enumeration.
    fn scan<'a>(&'a self, table: &'a str) -> BoxStream<'a, StoreResult<Item>>;
}

/// Drain a full table scan into memory
pub async fn scan_all(store: &dyn KeyValueStore, table: &str) -> StoreResult<Vec<Item>> {
    store.scan(table).try_collect().await
}

/// Read a string attribute from an item
pub fn string_attr<'a>(item: &'a Item, table: &str, field: &str) -> StoreResult<&'a str> {
    item.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::Malformed {
            table: table.to_string(),
            reason: format!("missing string attribute '{}'", field),
        })
}

/// Read a numeric attribute from an item as f64
pub fn number_attr(item: &Item, table: &str, field: &str) -> StoreResult<f64> {
    item.get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| StoreError::Malformed {
            table: table.to_string(),
            reason: format!("missing numeric attribute '{}'", field),
        })
}
