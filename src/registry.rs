//! Durable connection membership.

use crate::error::{ChatError, ChatResult};
use crate::store::{scan_all, string_attr, Item, KeyValueStore, StoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub type ConnectionId = String;

const ID_FIELD: &str = "connectionId";
const NAME_FIELD: &str = "username";

/// One live client session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub display_name: String,
}

impl Connection {
    fn to_item(&self) -> Item {
        let mut item = Item::new();
        item.insert(ID_FIELD.to_string(), Value::from(self.id.clone()));
        item.insert(NAME_FIELD.to_string(), Value::from(self.display_name.clone()));
        item
    }

    pub(crate) fn from_item(table: &str, item: &Item) -> StoreResult<Self> {
        Ok(Self {
            id: string_attr(item, table, ID_FIELD)?.to_string(),
            display_name: string_attr(item, table, NAME_FIELD)?.to_string(),
        })
    }
}

/// Connection id -> display name, backed by one store table.
///
/// Nothing is cached; every call goes to the store.
#[derive(Clone)]
pub struct ConnectionRegistry {
    store: Arc<dyn KeyValueStore>,
    table: String,
}

impl ConnectionRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Insert or overwrite the entry for `id`
    pub async fn register(&self, id: &str, display_name: &str) -> ChatResult<()> {
        let connection = Connection {
            id: id.to_string(),
            display_name: display_name.to_string(),
        };
        self.store
            .put(&self.table, id, connection.to_item())
            .await?;
        tracing::debug!("Registered connection {} as {}", id, display_name);
        Ok(())
    }

    /// Remove the entry for `id`; absent ids are fine
    pub async fn unregister(&self, id: &str) -> ChatResult<()> {
        self.store.delete(&self.table, id).await?;
        tracing::debug!("Unregistered connection {}", id);
        Ok(())
    }

    pub async fn lookup(&self, id: &str) -> ChatResult<String> {
        let item = self
            .store
            .get(&self.table, id)
            .await?
            .ok_or_else(|| ChatError::NotFound(id.to_string()))?;
        Ok(Connection::from_item(&self.table, &item)?.display_name)
    }

    /// Every registered connection, in no particular order.
    ///
    /// Unreadable rows are skipped with a warning.
    pub async fn list_all(&self) -> ChatResult<Vec<Connection>> {
        let items = scan_all(self.store.as_ref(), &self.table).await?;
        Ok(items
            .iter()
            .filter_map(|item| match Connection::from_item(&self.table, item) {
                Ok(connection) => Some(connection),
                Err(e) => {
                    tracing::warn!("Skipping unreadable connection row: {}", e);
                    None
                }
            })
            .collect())
    }
}
