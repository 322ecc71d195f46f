//! Event dispatcher feeding committed domain events to their subscribers.
//!
//! Events are delivered one at a time, to every handler in registration
//! order, so a subscriber observes the events of one order in commit order.
//! Handlers own their failure handling; the dispatcher only logs progress.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use crate::domain::DomainEvent;
use crate::domain::ports::DomainEventHandler;

/// Fan-out of domain events to subscribers.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn DomainEventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber after the ones already present.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn DomainEventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Deliver one event to every subscriber.
    #[instrument(name = "events.dispatch", skip_all, fields(event = event.name(), order_id = ?event.order_id(), version = ?event.version()))]
    pub async fn dispatch(&self, event: &DomainEvent) {
        for handler in &self.handlers {
            handler.handle(event).await;
        }
        debug!(handlers = self.handlers.len(), "event delivered");
    }

    /// Drain the stream until every publisher is gone.
    pub async fn run(self, mut events: mpsc::Receiver<DomainEvent>) {
        info!(handlers = self.handlers.len(), "event dispatcher started");
        while let Some(event) = events.recv().await {
            self.dispatch(&event).await;
        }
        info!("event stream closed, dispatcher stopped");
    }
}
