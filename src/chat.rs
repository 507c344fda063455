//! Join / message / leave flows over the registry, log, counter and broadcaster.

use crate::broadcast::{BroadcastReport, Broadcaster};
use crate::config::ChatConfig;
use crate::counter::Counter;
use crate::delivery::Delivery;
use crate::error::{ChatError, ChatResult};
use crate::counter;
use crate::message_log::{Clock, MessageLog, MessageRecord};
use crate::registry::{Connection, ConnectionRegistry};
use crate::store::{KeyValueStore, StoreSnapshot};
use std::sync::Arc;

pub const WELCOME_BANNER: &str = "Welcome to Simple Chat";

/// Build the private payload sent to a joining connection
pub fn welcome_text(connected: usize, total_messages: u64, history: &[String]) -> String {
    format!(
        "{}\nThere are {} users connected.\nTotal of {} messages recorded as of today.\n\n{}",
        WELCOME_BANNER,
        connected,
        total_messages,
        history.join("\n")
    )
}

pub fn joined_text(display_name: &str) -> String {
    format!("{} has joined the chat room", display_name)
}

pub fn left_text(display_name: &str) -> String {
    format!("{} has left the chat room", display_name)
}

/// `[<local time> <name>] <body>`
pub fn chat_line(display_name: &str, body: &str) -> String {
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("[{} {}] {}", now, display_name, body)
}

/// Counts shown on the health endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatStats {
    pub connections: usize,
    pub messages: u64,
}

/// Stateless coordinator: every piece of shared state lives in the store
#[derive(Clone)]
pub struct ChatService {
    registry: ConnectionRegistry,
    counter: Counter,
    log: MessageLog,
    broadcaster: Broadcaster,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        delivery: Arc<dyn Delivery>,
        config: &ChatConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let registry = ConnectionRegistry::new(store.clone(), config.connection_table.clone());
        let counter = Counter::new(store.clone(), config.counter_table.clone());
        let log = MessageLog::new(
            store,
            config.message_table.clone(),
            config.history_cap,
            counter.clone(),
            clock,
        );
        let broadcaster = Broadcaster::new(registry.clone(), delivery);

        Self {
            registry,
            counter,
            log,
            broadcaster,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn counter(&self) -> &Counter {
        &self.counter
    }

    /// First half of a join: record the connection
    pub async fn connect(&self, connection_id: &str, display_name: &str) -> ChatResult<()> {
        tracing::info!("{} connected as {}", connection_id, display_name);
        self.registry.register(connection_id, display_name).await
    }

    /// Second half of a join: send the welcome to the joiner, then tell
    /// everyone (joiner included) who arrived.
    pub async fn notify(&self, connection_id: &str) -> ChatResult<BroadcastReport> {
        let display_name = self.registry.lookup(connection_id).await?;
        let recipients = self.registry.list_all().await?;
        let total = self.counter.read().await?;
        let history = self.log.history().await?;

        let welcome = welcome_text(recipients.len(), total, &history);
        if let Err(e) = self.broadcaster.unicast(connection_id, &welcome).await {
            tracing::warn!("Failed to send welcome to {}: {}", connection_id, e);
        }

        self.broadcaster
            .broadcast(&recipients, &joined_text(&display_name))
            .await
    }

    /// Full join: register, welcome, announce
    pub async fn join(
        &self,
        connection_id: &str,
        display_name: &str,
    ) -> ChatResult<BroadcastReport> {
        self.connect(connection_id, display_name).await?;
        self.notify(connection_id).await
    }

    /// Format, store and fan out one chat line from `connection_id`
    pub async fn message(&self, connection_id: &str, body: &str) -> ChatResult<BroadcastReport> {
        let display_name = self.registry.lookup(connection_id).await?;
        let line = chat_line(&display_name, body);

        self.log.append(&line).await?;

        let recipients = self.registry.list_all().await?;
        self.broadcaster.broadcast(&recipients, &line).await
    }

    /// Announce the departure to everyone else, then forget the connection.
    ///
    /// An unknown connection skips the notice; the unregister still happens.
    pub async fn leave(&self, connection_id: &str) -> ChatResult<Option<BroadcastReport>> {
        let report = match self.registry.lookup(connection_id).await {
            Ok(display_name) => {
                let recipients: Vec<_> = self
                    .registry
                    .list_all()
                    .await?
                    .into_iter()
                    .filter(|c| c.id != connection_id)
                    .collect();
                Some(
                    self.broadcaster
                        .broadcast(&recipients, &left_text(&display_name))
                        .await?,
                )
            }
            Err(ChatError::NotFound(_)) => {
                tracing::debug!("{} left without being registered", connection_id);
                None
            }
            Err(e) => return Err(e),
        };

        self.registry.unregister(connection_id).await?;
        tracing::info!("{} disconnected", connection_id);
        Ok(report)
    }

    pub async fn stats(&self) -> ChatResult<ChatStats> {
        Ok(ChatStats {
            connections: self.registry.list_all().await?.len(),
            messages: self.counter.read().await?,
        })
    }

    /// Check every item of the connection, message and counter tables in
    /// `snapshot` against the layout this service reads back. Other tables
    /// pass through untouched.
    pub fn check_snapshot(&self, snapshot: &StoreSnapshot) -> Result<(), String> {
        snapshot.validate()?;

        if let Some(items) = snapshot.tables.get(self.registry.table()) {
            for (key, item) in items {
                let connection = Connection::from_item(self.registry.table(), item)
                    .map_err(|e| format!("connection '{}': {}", key, e))?;
                if connection.id != *key {
                    return Err(format!(
                        "connection '{}' is stored under a different id '{}'",
                        key, connection.id
                    ));
                }
            }
        }

        if let Some(items) = snapshot.tables.get(self.log.table()) {
            for (key, item) in items {
                let record = MessageRecord::from_item(self.log.table(), item)
                    .map_err(|e| format!("message '{}': {}", key, e))?;
                if record.id != *key {
                    return Err(format!(
                        "message '{}' is stored under a different id '{}'",
                        key, record.id
                    ));
                }
            }
        }

        if let Some(items) = snapshot.tables.get(self.counter.table()) {
            for (key, item) in items {
                counter::check_item(self.counter.table(), key, item)
                    .map_err(|e| format!("counter '{}': {}", key, e))?;
            }
        }

        Ok(())
    }
}
