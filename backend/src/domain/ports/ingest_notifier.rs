//! Port for messages the ingest pipeline sends back to chats.

use async_trait::async_trait;

use crate::domain::{
    Candidate, ChatId, ClientHistorySummary, MessageId, Order, OrderId, ParseFailure,
};

use super::define_port_error;

define_port_error! {
    /// Errors raised by ingest notifiers.
    pub enum IngestNotifierError {
        /// The chat platform could not be reached or refused the message.
        Delivery { message: String } =>
            "ingest notification failed: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IngestNotifier: Send + Sync {
    /// Report a parse failure worth showing to the source group.
    async fn parse_failed(
        &self,
        chat_id: ChatId,
        reply_to: MessageId,
        failure: &ParseFailure,
    ) -> Result<(), IngestNotifierError>;

    async fn duplicate_detected(
        &self,
        chat_id: ChatId,
        reply_to: MessageId,
        existing: OrderId,
    ) -> Result<(), IngestNotifierError>;

    async fn history_summary(
        &self,
        chat_id: ChatId,
        reply_to: MessageId,
        summary: &ClientHistorySummary,
    ) -> Result<(), IngestNotifierError>;

    /// Ask for a yes/no decision; returns the confirmation message id.
    async fn request_confirmation(
        &self,
        chat_id: ChatId,
        reply_to: MessageId,
        candidate: &Candidate,
    ) -> Result<MessageId, IngestNotifierError>;

    async fn order_created(&self, chat_id: ChatId, order: &Order)
    -> Result<(), IngestNotifierError>;
}
