//! Recording doubles for outbound collaborators.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::ports::{
    EventPublisher, EventPublisherError, IngestNotifier, IngestNotifierError, MirrorTransport,
    MirrorTransportError,
};
use crate::domain::{
    Candidate, ChatId, ClientHistorySummary, DomainEvent, MessageId, MirrorCard, Order, OrderId,
    ParseFailure,
};

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(_) => panic!("recording double mutex"),
    }
}

/// Publisher that keeps every event.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<DomainEvent> {
        locked(&self.events).clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        locked(&self.events).iter().map(DomainEvent::name).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<(), EventPublisherError> {
        locked(&self.events).push(event);
        Ok(())
    }
}

/// One transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Publish { chat_id: ChatId, card: MirrorCard },
    Edit { chat_id: ChatId, message_id: MessageId, card: MirrorCard },
    Pin { chat_id: ChatId, message_id: MessageId },
    Unpin { chat_id: ChatId, message_id: MessageId },
    Remove { chat_id: ChatId, message_id: MessageId },
}

/// Mirror transport that succeeds and records every call.
pub struct RecordingTransport {
    calls: Mutex<Vec<TransportCall>>,
    next_message_id: AtomicI64,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_message_id: AtomicI64::new(700),
        }
    }
}

impl RecordingTransport {
    pub fn calls(&self) -> Vec<TransportCall> {
        locked(&self.calls).clone()
    }
}

#[async_trait]
impl MirrorTransport for RecordingTransport {
    async fn publish(
        &self,
        chat_id: ChatId,
        card: &MirrorCard,
    ) -> Result<MessageId, MirrorTransportError> {
        locked(&self.calls).push(TransportCall::Publish {
            chat_id,
            card: card.clone(),
        });
        Ok(MessageId::new(
            self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1,
        ))
    }

    async fn edit(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        card: &MirrorCard,
    ) -> Result<(), MirrorTransportError> {
        locked(&self.calls).push(TransportCall::Edit {
            chat_id,
            message_id,
            card: card.clone(),
        });
        Ok(())
    }

    async fn pin(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), MirrorTransportError> {
        locked(&self.calls).push(TransportCall::Pin {
            chat_id,
            message_id,
        });
        Ok(())
    }

    async fn unpin(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), MirrorTransportError> {
        locked(&self.calls).push(TransportCall::Unpin {
            chat_id,
            message_id,
        });
        Ok(())
    }

    async fn remove(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), MirrorTransportError> {
        locked(&self.calls).push(TransportCall::Remove {
            chat_id,
            message_id,
        });
        Ok(())
    }
}

/// Message sent by the ingest pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentNotice {
    ParseFailed {
        chat_id: ChatId,
        failure: ParseFailure,
    },
    Duplicate {
        chat_id: ChatId,
        existing: OrderId,
    },
    History {
        chat_id: ChatId,
        orders: usize,
    },
    Confirmation {
        chat_id: ChatId,
        confirmation_id: MessageId,
    },
    OrderCreated {
        chat_id: ChatId,
        order_id: OrderId,
    },
}

/// Ingest notifier that records every notice.
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotice>>,
    next_message_id: AtomicI64,
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            next_message_id: AtomicI64::new(5000),
        }
    }
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<SentNotice> {
        locked(&self.sent).clone()
    }

    /// Id of the most recent confirmation request.
    pub fn last_confirmation(&self) -> Option<MessageId> {
        locked(&self.sent).iter().rev().find_map(|notice| match notice {
            SentNotice::Confirmation {
                confirmation_id, ..
            } => Some(*confirmation_id),
            _ => None,
        })
    }
}

#[async_trait]
impl IngestNotifier for RecordingNotifier {
    async fn parse_failed(
        &self,
        chat_id: ChatId,
        _reply_to: MessageId,
        failure: &ParseFailure,
    ) -> Result<(), IngestNotifierError> {
        locked(&self.sent).push(SentNotice::ParseFailed {
            chat_id,
            failure: failure.clone(),
        });
        Ok(())
    }

    async fn duplicate_detected(
        &self,
        chat_id: ChatId,
        _reply_to: MessageId,
        existing: OrderId,
    ) -> Result<(), IngestNotifierError> {
        locked(&self.sent).push(SentNotice::Duplicate { chat_id, existing });
        Ok(())
    }

    async fn history_summary(
        &self,
        chat_id: ChatId,
        _reply_to: MessageId,
        summary: &ClientHistorySummary,
    ) -> Result<(), IngestNotifierError> {
        locked(&self.sent).push(SentNotice::History {
            chat_id,
            orders: summary.orders.len(),
        });
        Ok(())
    }

    async fn request_confirmation(
        &self,
        chat_id: ChatId,
        _reply_to: MessageId,
        _candidate: &Candidate,
    ) -> Result<MessageId, IngestNotifierError> {
        let confirmation_id =
            MessageId::new(self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1);
        locked(&self.sent).push(SentNotice::Confirmation {
            chat_id,
            confirmation_id,
        });
        Ok(confirmation_id)
    }

    async fn order_created(
        &self,
        chat_id: ChatId,
        order: &Order,
    ) -> Result<(), IngestNotifierError> {
        locked(&self.sent).push(SentNotice::OrderCreated {
            chat_id,
            order_id: order.id,
        });
        Ok(())
    }
}
