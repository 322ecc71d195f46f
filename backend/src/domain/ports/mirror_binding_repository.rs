//! Port for order-to-group message bindings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ChatId, MessageId, MirrorBinding, NewMirrorBinding, OrderId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by mirror binding adapters.
    pub enum MirrorBindingRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "mirror binding repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "mirror binding repository query failed: {message}",
        /// A binding already exists for the `(order, chat)` pair.
        Duplicate { order_id: OrderId, chat_id: ChatId } =>
            "order {order_id} already has a binding in chat {chat_id}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MirrorBindingRepository: Send + Sync {
    /// Every binding for the order, active or not.
    async fn bindings_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<MirrorBinding>, MirrorBindingRepositoryError>;

    /// Insert an active binding; unique on `(order_id, chat_id)`.
    async fn insert_binding(
        &self,
        binding: NewMirrorBinding,
    ) -> Result<MirrorBinding, MirrorBindingRepositoryError>;

    async fn deactivate_binding(
        &self,
        order_id: OrderId,
        chat_id: ChatId,
        at: DateTime<Utc>,
    ) -> Result<(), MirrorBindingRepositoryError>;

    /// Re-activate an inactive binding against a freshly published message.
    async fn reactivate_binding(
        &self,
        order_id: OrderId,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), MirrorBindingRepositoryError>;
}
