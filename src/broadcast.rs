use crate::delivery::{Delivery, DeliveryError};
use crate::error::ChatResult;
use crate::registry::{Connection, ConnectionRegistry};
use std::sync::Arc;

/// Outcome of one fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Connections dropped from the registry because delivery failed
    pub pruned: Vec<String>,
}

/// Fans payloads out over a [`Delivery`] and prunes dead connections
#[derive(Clone)]
pub struct Broadcaster {
    registry: ConnectionRegistry,
    delivery: Arc<dyn Delivery>,
}

impl Broadcaster {
    pub fn new(registry: ConnectionRegistry, delivery: Arc<dyn Delivery>) -> Self {
        Self { registry, delivery }
    }

    /// Send `payload` to every recipient concurrently.
    ///
    /// A failed send never reaches the caller: the recipient is treated as dead
    /// and unregistered, and the remaining recipients are still attempted.
    /// Only a store failure while pruning is returned.
    pub async fn broadcast(
        &self,
        recipients: &[Connection],
        payload: &str,
    ) -> ChatResult<BroadcastReport> {
        let attempts = recipients.iter().map(|recipient| async move {
            let result = self.delivery.send(&recipient.id, payload).await;
            (recipient, result)
        });
        let results = futures::future::join_all(attempts).await;

        let mut report = BroadcastReport::default();
        for (recipient, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!("Pruning connection {}: {}", recipient.id, e);
                    self.registry.unregister(&recipient.id).await?;
                    report.pruned.push(recipient.id.clone());
                }
            }
        }

        tracing::debug!(
            "Broadcast delivered to {}/{} connections",
            report.delivered,
            recipients.len()
        );
        Ok(report)
    }

    /// Send `payload` to a single connection without touching membership
    pub async fn unicast(&self, recipient_id: &str, payload: &str) -> Result<(), DeliveryError> {
        self.delivery.send(recipient_id, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use tokio::sync::Mutex;

    /// Records every delivery and fails for a fixed set of ids
    #[derive(Default)]
    struct FakeDelivery {
        failing: HashSet<String>,
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Delivery for FakeDelivery {
        async fn send(&self, connection_id: &str, payload: &str) -> Result<(), DeliveryError> {
            if self.failing.contains(connection_id) {
                return Err(DeliveryError::Gone(connection_id.to_string()));
            }
            self.sent
                .lock()
                .await
                .push((connection_id.to_string(), payload.to_string()));
            Ok(())
        }
    }

    async fn setup(failing: &[&str]) -> (ConnectionRegistry, Arc<FakeDelivery>, Broadcaster) {
        let registry = ConnectionRegistry::new(Arc::new(MemoryStore::new()), "connections");
        registry.register("A", "foo").await.unwrap();
        registry.register("B", "bar").await.unwrap();
        registry.register("C", "baz").await.unwrap();

        let delivery = Arc::new(FakeDelivery {
            failing: failing.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        });
        let broadcaster = Broadcaster::new(registry.clone(), delivery.clone());
        (registry, delivery, broadcaster)
    }

    fn conn(id: &str, name: &str) -> Connection {
        Connection {
            id: id.to_string(),
            display_name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_failed_recipient_is_pruned_and_others_kept() {
        let (registry, delivery, broadcaster) = setup(&["A"]).await;
        let recipients = vec![conn("A", "foo"), conn("B", "bar"), conn("C", "baz")];

        let report = broadcaster.broadcast(&recipients, "hi").await.unwrap();

        assert_eq!(report.delivered, 2);
        assert_eq!(report.pruned, vec!["A".to_string()]);

        let mut remaining: Vec<String> = registry
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        remaining.sort();
        assert_eq!(remaining, vec!["B", "C"]);

        let mut sent_to: Vec<String> = delivery
            .sent
            .lock()
            .await
            .iter()
            .map(|(id, _)| id.clone())
            .collect();
        sent_to.sort();
        assert_eq!(sent_to, vec!["B", "C"]);
    }

    #[tokio::test]
    async fn test_every_recipient_failing_prunes_all() {
        let (registry, _, broadcaster) = setup(&["A", "B", "C"]).await;
        let recipients = registry.list_all().await.unwrap();

        let report = broadcaster.broadcast(&recipients, "hi").await.unwrap();

        assert_eq!(report.delivered, 0);
        assert_eq!(report.pruned.len(), 3);
        assert!(registry.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_to_nobody_is_a_no_op() {
        let (_, delivery, broadcaster) = setup(&[]).await;
        let report = broadcaster.broadcast(&[], "hi").await.unwrap();

        assert_eq!(report, BroadcastReport::default());
        assert!(delivery.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_unicast_failure_does_not_touch_registry() {
        let (registry, _, broadcaster) = setup(&["A"]).await;

        assert!(broadcaster.unicast("A", "welcome").await.is_err());
        assert_eq!(registry.lookup("A").await.unwrap(), "foo");
    }

    #[tokio::test]
    async fn test_stalled_socket_is_pruned_through_the_hub() {
        use crate::delivery::ConnectionHub;

        let registry = ConnectionRegistry::new(Arc::new(MemoryStore::new()), "connections");
        registry.register("fast", "foo").await.unwrap();
        registry.register("slow", "bar").await.unwrap();

        let hub = ConnectionHub::with_capacity(1);
        let mut fast_rx = hub.attach("fast").await;
        let _slow_rx = hub.attach("slow").await;
        let broadcaster = Broadcaster::new(registry.clone(), Arc::new(hub.clone()));

        let recipients = registry.list_all().await.unwrap();
        let report = broadcaster.broadcast(&recipients, "first").await.unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(fast_rx.recv().await.unwrap(), "first");

        // "slow" never reads, so its single slot is still taken
        let report = broadcaster.broadcast(&recipients, "second").await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.pruned, vec!["slow".to_string()]);
        assert_eq!(fast_rx.recv().await.unwrap(), "second");

        let remaining: Vec<String> = registry
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(remaining, vec!["fast"]);
        assert_eq!(hub.attached_count().await, 1);
    }
}
