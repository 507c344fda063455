//! Point-to-point delivery to a single connection.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Payloads a socket may have queued before it is treated as stalled
pub const OUTBOUND_CAPACITY: usize = 256;

/// Why a payload could not be handed to a connection
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeliveryError {
    #[error("connection {0} is gone")]
    Gone(String),

    #[error("connection {0} is not draining its queue")]
    Stalled(String),

    #[error("send to {connection_id} failed: {reason}")]
    Failed {
        connection_id: String,
        reason: String,
    },
}

/// The send primitive the broadcaster fans out over
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn send(&self, connection_id: &str, payload: &str) -> Result<(), DeliveryError>;
}

/// Bounded outbound queues of the WebSocket connections attached to this process
#[derive(Clone)]
pub struct ConnectionHub {
    outbound: Arc<RwLock<HashMap<String, mpsc::Sender<String>>>>,
    capacity: usize,
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::with_capacity(OUTBOUND_CAPACITY)
    }
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            outbound: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Attach a connection and return the receiving end of its outbound queue
    pub async fn attach(&self, connection_id: &str) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.outbound
            .write()
            .await
            .insert(connection_id.to_string(), tx);
        rx
    }

    pub async fn detach(&self, connection_id: &str) {
        self.outbound.write().await.remove(connection_id);
    }

    pub async fn attached_count(&self) -> usize {
        self.outbound.read().await.len()
    }
}

#[async_trait]
impl Delivery for ConnectionHub {
    async fn send(&self, connection_id: &str, payload: &str) -> Result<(), DeliveryError> {
        let sent = {
            let outbound = self.outbound.read().await;
            let tx = outbound
                .get(connection_id)
                .ok_or_else(|| DeliveryError::Gone(connection_id.to_string()))?;
            tx.try_send(payload.to_string())
        };

        match sent {
            Ok(()) => Ok(()),
            // A closed receiver means the socket task already exited
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(DeliveryError::Gone(connection_id.to_string()))
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                // Dropping the sender ends the socket loop once it drains what is queued
                self.detach(connection_id).await;
                Err(DeliveryError::Stalled(connection_id.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_reaches_attached_connection() {
        let hub = ConnectionHub::new();
        let mut rx = hub.attach("abc").await;

        hub.send("abc", "hello").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_send_to_unknown_connection_is_gone() {
        let hub = ConnectionHub::new();
        let result = hub.send("nobody", "hello").await;
        assert!(matches!(result, Err(DeliveryError::Gone(id)) if id == "nobody"));
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped_is_gone() {
        let hub = ConnectionHub::new();
        let rx = hub.attach("abc").await;
        drop(rx);

        let result = hub.send("abc", "hello").await;
        assert!(matches!(result, Err(DeliveryError::Gone(_))));
    }

    #[tokio::test]
    async fn test_detach_removes_connection() {
        let hub = ConnectionHub::new();
        let _rx = hub.attach("abc").await;
        assert_eq!(hub.attached_count().await, 1);

        hub.detach("abc").await;
        assert_eq!(hub.attached_count().await, 0);
        assert!(hub.send("abc", "hello").await.is_err());
    }

    #[tokio::test]
    async fn test_full_queue_is_stalled_and_detached() {
        let hub = ConnectionHub::with_capacity(2);
        let mut rx = hub.attach("slow").await;

        hub.send("slow", "one").await.unwrap();
        hub.send("slow", "two").await.unwrap();
        let result = hub.send("slow", "three").await;
        assert!(matches!(result, Err(DeliveryError::Stalled(id)) if id == "slow"));
        assert_eq!(hub.attached_count().await, 0);

        // What was already queued still drains, then the queue reports closed
        assert_eq!(rx.recv().await.unwrap(), "one");
        assert_eq!(rx.recv().await.unwrap(), "two");
        assert!(rx.recv().await.is_none());
    }
}
