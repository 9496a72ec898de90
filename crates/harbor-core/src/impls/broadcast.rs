//! BroadcastPublisher - tokio broadcast によるファンアウト

use tokio::sync::broadcast;
use tracing::trace;

use crate::domain::DomainEvent;
use crate::ports::UpdatePublisher;

pub struct BroadcastPublisher {
    tx: broadcast::Sender<DomainEvent>,
}

impl BroadcastPublisher {
    /// `capacity` is per subscriber; slow subscribers lag and skip events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

impl UpdatePublisher for BroadcastPublisher {
    fn publish(&self, event: DomainEvent) {
        trace!(event = event.name(), "publish");
        // no subscribers is fine
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AppId;
    use ulid::Ulid;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let publisher = BroadcastPublisher::default();
        let mut rx = publisher.subscribe();

        let id = AppId::from_ulid(Ulid::new());
        publisher.publish(DomainEvent::AppRemoved(id));

        assert_eq!(rx.recv().await.unwrap(), DomainEvent::AppRemoved(id));
    }

    #[test]
    fn publish_without_subscribers_does_not_fail() {
        let publisher = BroadcastPublisher::default();
        publisher.publish(DomainEvent::AppRemoved(AppId::from_ulid(Ulid::new())));
    }
}
