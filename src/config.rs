//! Runtime configuration loaded from the environment

use crate::delivery::OUTBOUND_CAPACITY;
use crate::message_log::DEFAULT_CAP;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Server and storage configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Table holding connection id -> username
    pub connection_table: String,
    /// Table holding the retained chat history
    pub message_table: String,
    /// Table holding the total message counter
    pub counter_table: String,
    /// Number of messages kept in history
    pub history_cap: usize,
    /// Payloads queued per socket before it counts as stalled
    pub outbound_queue: usize,
    /// Address the HTTP/WebSocket server listens on
    pub bind_addr: SocketAddr,
    /// Where to load/save the store snapshot (None = in-memory only)
    pub snapshot_path: Option<PathBuf>,
    /// How often the snapshot is written
    pub snapshot_interval: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            connection_table: "connections".to_string(),
            message_table: "messages".to_string(),
            counter_table: "msg_counter".to_string(),
            history_cap: DEFAULT_CAP,
            outbound_queue: OUTBOUND_CAPACITY,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            snapshot_path: None,
            snapshot_interval: Duration::from_secs(30),
        }
    }
}

/// Read a variable, treating blank values as unset
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

impl ChatConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let history_cap = match env_value("CHAT_HISTORY_CAP").map(|s| s.parse::<usize>()) {
            Some(Ok(cap)) if cap >= 1 => cap,
            Some(_) => {
                tracing::warn!(
                    "CHAT_HISTORY_CAP must be a positive integer, using {}",
                    defaults.history_cap
                );
                defaults.history_cap
            }
            None => defaults.history_cap,
        };

        let bind_addr = match env_value("CHAT_BIND_ADDR").map(|s| s.parse::<SocketAddr>()) {
            Some(Ok(addr)) => addr,
            Some(Err(e)) => {
                tracing::warn!(
                    "Invalid CHAT_BIND_ADDR ({}), using {}",
                    e,
                    defaults.bind_addr
                );
                defaults.bind_addr
            }
            None => defaults.bind_addr,
        };

        Self {
            connection_table: env_value("CONNECTION_TABLE_NAME")
                .unwrap_or(defaults.connection_table),
            message_table: env_value("MESSAGE_TABLE_NAME").unwrap_or(defaults.message_table),
            counter_table: env_value("MSG_COUNTER_TABLE_NAME").unwrap_or(defaults.counter_table),
            history_cap,
            outbound_queue: env_value("CHAT_OUTBOUND_QUEUE")
                .and_then(|s| s.parse::<usize>().ok())
                .filter(|size| *size > 0)
                .unwrap_or(defaults.outbound_queue),
            bind_addr,
            snapshot_path: env_value("CHAT_SNAPSHOT_PATH").map(PathBuf::from),
            snapshot_interval: env_value("CHAT_SNAPSHOT_INTERVAL")
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.snapshot_interval),
        }
    }
}
