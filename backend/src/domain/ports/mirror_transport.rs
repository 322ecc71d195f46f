//! Port for the external chat surface that displays mirrored orders.

use async_trait::async_trait;

use crate::domain::{ChatId, MessageId, MirrorCard};

use super::define_port_error;

define_port_error! {
    /// Errors raised by mirror transports.
    pub enum MirrorTransportError {
        /// Temporary failure; the call may succeed if retried.
        Transient { message: String } =>
            "mirror transport temporarily failed: {message}",
        /// The platform rejected the call; retrying will not help.
        Permanent { message: String } =>
            "mirror transport rejected the call: {message}",
    }
}

impl MirrorTransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Operations on materialised order cards.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MirrorTransport: Send + Sync {
    /// Post a new card and return its message id.
    async fn publish(
        &self,
        chat_id: ChatId,
        card: &MirrorCard,
    ) -> Result<MessageId, MirrorTransportError>;

    async fn edit(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        card: &MirrorCard,
    ) -> Result<(), MirrorTransportError>;

    async fn pin(&self, chat_id: ChatId, message_id: MessageId)
    -> Result<(), MirrorTransportError>;

    async fn unpin(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), MirrorTransportError>;

    /// Remove or archive the card.
    async fn remove(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), MirrorTransportError>;
}
