//! Durable total-message counter.

use crate::error::ChatResult;
use crate::store::{Item, KeyValueStore, StoreError, StoreResult};
use serde_json::Value;
use std::sync::Arc;

pub(crate) const KEY_FIELD: &str = "myid";
pub(crate) const COUNTER_KEY: &str = "counter";
pub(crate) const COUNT_FIELD: &str = "msgCount";

/// Singleton counter incremented with a store-level atomic add
#[derive(Clone)]
pub struct Counter {
    store: Arc<dyn KeyValueStore>,
    table: String,
}

impl Counter {
    pub fn new(store: Arc<dyn KeyValueStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Add one and return the new value. Creates the counter at 1 when absent.
    pub async fn increment(&self) -> ChatResult<u64> {
        let value = self
            .store
            .atomic_add(&self.table, KEY_FIELD, COUNTER_KEY, COUNT_FIELD, 1)
            .await?;
        Ok(u64::try_from(value).unwrap_or(0))
    }

    /// Current value, or 0 if the counter was never incremented.
    ///
    /// An item without a usable count reads as 0, same as a missing item.
    /// Only store failures are errors.
    pub async fn read(&self) -> ChatResult<u64> {
        let value = self
            .store
            .get(&self.table, COUNTER_KEY)
            .await?
            .and_then(|item| item.get(COUNT_FIELD).and_then(Value::as_u64))
            .unwrap_or(0);
        Ok(value)
    }
}

/// Check that `item`, stored under `key`, is the singleton counter with a
/// count that `atomic_add` can keep adding to
pub(crate) fn check_item(table: &str, key: &str, item: &Item) -> StoreResult<()> {
    let malformed = |reason: String| StoreError::Malformed {
        table: table.to_string(),
        reason,
    };
    if key != COUNTER_KEY {
        return Err(malformed(format!("unexpected counter key '{}'", key)));
    }
    match item.get(COUNT_FIELD) {
        None => Ok(()),
        Some(value) if value.as_u64().is_some() => Ok(()),
        Some(value) => Err(malformed(format!(
            "'{}' must be a non-negative integer, got {}",
            COUNT_FIELD, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatError;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn counter() -> (MemoryStore, Counter) {
        let store = MemoryStore::new();
        let counter = Counter::new(Arc::new(store.clone()), "msg_counter");
        (store, counter)
    }

    #[tokio::test]
    async fn test_read_before_first_increment_is_zero() {
        let (_, counter) = counter();
        assert_eq!(counter.read().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_explicit_zero_reads_as_zero() {
        let (store, counter) = counter();
        let item = json!({"myid": "counter", "msgCount": 0})
            .as_object()
            .cloned()
            .unwrap();
        store.put("msg_counter", "counter", item).await.unwrap();

        assert_eq!(counter.read().await.unwrap(), 0);
        assert_eq!(counter.increment().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_first_increment_stores_key_field() {
        let (store, counter) = counter();
        counter.increment().await.unwrap();

        let item = store.get("msg_counter", "counter").await.unwrap().unwrap();
        assert_eq!(item["myid"], "counter");
        assert_eq!(item["msgCount"], 1);
        assert!(check_item("msg_counter", "counter", &item).is_ok());
    }

    #[test]
    fn test_check_item_rejects_non_integer_count() {
        let item = json!({"myid": "counter", "msgCount": "lots"})
            .as_object()
            .cloned()
            .unwrap();
        assert!(check_item("msg_counter", "counter", &item).is_err());
        assert!(check_item("msg_counter", "other", &Item::new()).is_err());
    }

    #[tokio::test]
    async fn test_increment_is_monotonic() {
        let (_, counter) = counter();
        let mut last = counter.read().await.unwrap();
        for expected in 1..=5 {
            let value = counter.increment().await.unwrap();
            assert_eq!(value, expected);
            let observed = counter.read().await.unwrap();
            assert!(observed >= last);
            last = observed;
        }
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let (_, counter) = counter();
        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let counter = counter.clone();
                tokio::spawn(async move { counter.increment().await.unwrap() })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(counter.read().await.unwrap(), 64);
    }

    #[tokio::test]
    async fn test_store_outage_propagates() {
        let (store, counter) = counter();
        store.set_available(false);
        assert!(matches!(
            counter.increment().await,
            Err(ChatError::StorageUnavailable(_))
        ));
        assert!(counter.read().await.is_err());
    }
}
