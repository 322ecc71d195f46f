//! Ports for publishing and consuming committed domain events.

use async_trait::async_trait;

use crate::domain::DomainEvent;

use super::define_port_error;

define_port_error! {
    /// Errors raised when handing an event to the bus.
    pub enum EventPublisherError {
        /// The bus is no longer accepting events.
        Closed { message: String } =>
            "event bus closed: {message}",
    }
}

/// Outbound side of the event bus.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: DomainEvent) -> Result<(), EventPublisherError>;
}

/// Subscriber fed by the event dispatcher in per-order commit order.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DomainEventHandler: Send + Sync {
    /// Failures are handled (logged, audited) inside the subscriber.
    async fn handle(&self, event: &DomainEvent);
}

/// Publisher that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpEventPublisher;

#[async_trait]
impl EventPublisher for NoOpEventPublisher {
    async fn publish(&self, _event: DomainEvent) -> Result<(), EventPublisherError> {
        Ok(())
    }
}
