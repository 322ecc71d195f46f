//! In-process event bus backed by a tokio mpsc channel.
//!
//! The publisher side implements [`EventPublisher`] for the core; the
//! receiving half is drained by the inbound event dispatcher. A single
//! consumer keeps events of one order in commit order.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::DomainEvent;
use crate::domain::ports::{EventPublisher, EventPublisherError};

/// Events buffered before publishers start waiting.
pub const EVENT_BUS_CAPACITY: usize = 1024;

/// Receiving half of the bus.
pub type EventStream = mpsc::Receiver<DomainEvent>;

/// Publisher handing committed events to the channel.
#[derive(Debug, Clone)]
pub struct ChannelEventPublisher {
    sender: mpsc::Sender<DomainEvent>,
}

/// Create a connected publisher and stream.
pub fn event_channel(capacity: usize) -> (ChannelEventPublisher, EventStream) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (ChannelEventPublisher { sender }, receiver)
}

#[async_trait]
impl EventPublisher for ChannelEventPublisher {
    #[tracing::instrument(name = "bus.publish", skip_all, fields(event = event.name(), order_id = ?event.order_id(), version = ?event.version()))]
    async fn publish(&self, event: DomainEvent) -> Result<(), EventPublisherError> {
        self.sender
            .send(event)
            .await
            .map_err(|error| EventPublisherError::closed(error.to_string()))?;
        debug!("event queued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::domain::OrderId;

    #[rstest]
    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let (publisher, mut stream) = event_channel(4);
        let order_id = OrderId::new(7);

        publisher
            .publish(DomainEvent::OrderCreated {
                order_id,
                version: 1,
            })
            .await
            .expect("created queued");
        publisher
            .publish(DomainEvent::OrderSoftDeleted {
                order_id,
                version: 2,
            })
            .await
            .expect("deleted queued");

        let first = stream.recv().await.map(|event| event.version());
        let second = stream.recv().await.map(|event| event.version());
        assert_eq!((first, second), (Some(Some(1)), Some(Some(2))));
    }

    #[rstest]
    #[tokio::test]
    async fn closed_stream_rejects_events() {
        let (publisher, stream) = event_channel(1);
        drop(stream);

        let result = publisher
            .publish(DomainEvent::OrderRestored {
                order_id: OrderId::new(1),
                version: 3,
            })
            .await;

        assert!(matches!(result, Err(EventPublisherError::Closed { .. })));
    }
}
