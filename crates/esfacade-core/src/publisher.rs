//! Event publishing after a successful append.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::PublishError;
use crate::event::DomainEvent;

/// Receives each event after it has been durably appended.
///
/// Delivery is fire-and-forget from the store's point of view: an `Err`
/// is logged and never turns a successful append into a failure.
#[async_trait]
pub trait EventPublisher<E: DomainEvent>: Send + Sync {
    /// Publishes one event.
    async fn publish(&self, event: &E) -> Result<(), PublishError>;
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

#[async_trait]
impl<E: DomainEvent> EventPublisher<E> for NoopPublisher {
    async fn publish(&self, _event: &E) -> Result<(), PublishError> {
        Ok(())
    }
}

/// In-process bus fanning events out to every live subscriber.
///
/// Subscribers that fall more than `capacity` events behind miss events
/// (`RecvError::Lagged`).
#[derive(Debug, Clone)]
pub struct BroadcastPublisher<E> {
    sender: broadcast::Sender<E>,
}

impl<E: DomainEvent> BroadcastPublisher<E> {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribes to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl<E: DomainEvent> EventPublisher<E> for BroadcastPublisher<E> {
    async fn publish(&self, event: &E) -> Result<(), PublishError> {
        // No subscribers is not a failure.
        let _ = self.sender.send(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Pinged(u32);

    impl DomainEvent for Pinged {
        fn event_type(&self) -> &'static str {
            "test.pinged"
        }

        fn to_payload(&self) -> serde_json::Value {
            serde_json::json!({ "n": self.0 })
        }
    }

    #[tokio::test]
    async fn test_broadcast_delivers_in_order() {
        let bus = BroadcastPublisher::new(8);
        let mut rx = bus.subscribe();

        bus.publish(&Pinged(1)).await.unwrap();
        bus.publish(&Pinged(2)).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), Pinged(1));
        assert_eq!(rx.recv().await.unwrap(), Pinged(2));
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_succeeds() {
        let bus = BroadcastPublisher::new(1);
        assert!(bus.publish(&Pinged(1)).await.is_ok());
    }
}
