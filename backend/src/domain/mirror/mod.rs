//! Mirrored order cards in external group conversations.
//!
//! The coordinator reacts to committed order events and reconciles the set of
//! active bindings for the order with its current state:
//!
//! - active statuses (ASSIGNED, ACCEPTED, ONSITE, DR) keep one card per
//!   policy target, created once and edited afterwards;
//! - NEW, CLOSED, REFUSED and tombstoned orders have no active bindings.
//!
//! Transport failures never touch the order. They are retried under
//! [`RetryRunner`]; a call that still fails deactivates the binding and writes
//! a `MIRROR_DIVERGED` audit entry.

mod policy;
mod retry;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

pub use policy::WorkChannelPolicy;
pub use retry::{
    AttemptJitter, BackoffJitter, MirrorRetryConfig, RetryExhausted, RetryRunner, RetrySleeper,
    TokioSleeper,
};

use super::ports::{
    AuditLogRepository, DomainEventHandler, MirrorBindingRepository,
    MirrorBindingRepositoryError, MirrorTargetPolicy, MirrorTransport, OrderRepository,
    Visibility,
};
use super::{
    AuditAction, AuditLogEntry, ChatId, CivilClock, DomainEvent, MessageId, Order, OrderId,
    OrderStatus, TechnicianId,
};

/// Binding between an order and one materialised message in one chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorBinding {
    pub order_id: OrderId,
    pub technician_id: TechnicianId,
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
}

/// Binding to insert after a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMirrorBinding {
    pub order_id: OrderId,
    pub technician_id: TechnicianId,
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub created_at: DateTime<Utc>,
}

/// Conversation an order should be mirrored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MirrorTarget {
    pub chat_id: ChatId,
    pub technician_id: TechnicianId,
}

/// Display data handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorCard {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub equipment_type: String,
    pub problem_description: String,
    pub client_address: String,
    pub scheduled_time: Option<String>,
    /// Revealed once the technician has accepted the order.
    pub client_name: Option<String>,
    pub client_phone: Option<String>,
    pub notes: Option<String>,
}

impl MirrorCard {
    pub fn from_order(order: &Order) -> Self {
        let reveal_client = matches!(
            order.status,
            OrderStatus::Accepted | OrderStatus::Onsite | OrderStatus::Dr
        );
        Self {
            order_id: order.id,
            status: order.status,
            equipment_type: order.equipment_type.clone(),
            problem_description: order.problem_description.clone(),
            client_address: order.client_address.clone(),
            scheduled_time: order.scheduled_time.clone(),
            client_name: reveal_client.then(|| order.client_name.clone()),
            client_phone: order.client_phone.clone().filter(|_| reveal_client),
            notes: order.notes.clone(),
        }
    }
}

/// Ports used by the coordinator.
pub struct MirrorPorts {
    pub orders: Arc<dyn OrderRepository>,
    pub bindings: Arc<dyn MirrorBindingRepository>,
    pub transport: Arc<dyn MirrorTransport>,
    pub policy: Arc<dyn MirrorTargetPolicy>,
    pub audit: Arc<dyn AuditLogRepository>,
}

/// Keeps mirrored cards in step with committed order state.
pub struct MirrorCoordinator {
    orders: Arc<dyn OrderRepository>,
    bindings: Arc<dyn MirrorBindingRepository>,
    transport: Arc<dyn MirrorTransport>,
    policy: Arc<dyn MirrorTargetPolicy>,
    audit: Arc<dyn AuditLogRepository>,
    clock: CivilClock,
    retry: RetryRunner,
    applied_versions: Mutex<HashMap<OrderId, i64>>,
}

impl MirrorCoordinator {
    pub fn new(ports: MirrorPorts, clock: CivilClock, retry: RetryRunner) -> Self {
        Self {
            orders: ports.orders,
            bindings: ports.bindings,
            transport: ports.transport,
            policy: ports.policy,
            audit: ports.audit,
            clock,
            retry,
            applied_versions: Mutex::new(HashMap::new()),
        }
    }

    fn is_stale(&self, order_id: OrderId, version: i64) -> bool {
        let Ok(applied) = self.applied_versions.lock() else {
            return false;
        };
        applied.get(&order_id).is_some_and(|seen| *seen >= version)
    }

    fn mark_applied(&self, order_id: OrderId, version: i64) {
        if let Ok(mut applied) = self.applied_versions.lock() {
            let entry = applied.entry(order_id).or_insert(version);
            *entry = (*entry).max(version);
        }
    }

    /// Drop the version of an order that will never be mirrored again.
    fn forget(&self, order_id: OrderId) {
        if let Ok(mut applied) = self.applied_versions.lock() {
            applied.remove(&order_id);
        }
    }

    /// Reconcile the bindings of one order after a committed change.
    #[instrument(skip(self))]
    pub async fn sync_order(&self, order_id: OrderId, version: i64) {
        if self.is_stale(order_id, version) {
            debug!("skipping stale mirror event");
            return;
        }
        let order = match self.orders.find_order(order_id, Visibility::IncludeDeleted).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                warn!("order vanished before mirroring");
                return;
            }
            Err(error) => {
                warn!(%error, "could not load order for mirroring");
                return;
            }
        };
        let bindings = match self.bindings.bindings_for_order(order_id).await {
            Ok(bindings) => bindings,
            Err(error) => {
                warn!(%error, "could not load mirror bindings");
                return;
            }
        };

        if order.is_deleted() || !order.status.is_active() {
            self.retire_all(&order, bindings).await;
            if order.is_deleted() || order.status.is_terminal() {
                self.forget(order_id);
                return;
            }
        } else {
            self.refresh(&order, bindings).await;
        }
        self.mark_applied(order_id, version.max(order.version));
    }

    async fn refresh(&self, order: &Order, bindings: Vec<MirrorBinding>) {
        let targets = match self.policy.targets(order).await {
            Ok(targets) => targets,
            Err(error) => {
                warn!(%error, "mirror target lookup failed");
                return;
            }
        };
        let card = MirrorCard::from_order(order);

        let (current, stale): (Vec<_>, Vec<_>) = bindings.into_iter().partition(|binding| {
            targets
                .iter()
                .any(|target| target.chat_id == binding.chat_id)
        });
        for binding in stale.into_iter().filter(|binding| binding.is_active) {
            self.retire(order, &binding).await;
        }

        for target in targets {
            match current.iter().find(|binding| binding.chat_id == target.chat_id) {
                Some(binding) if binding.is_active => self.edit(order, binding, &card).await,
                Some(_) => self.republish(order, target, &card).await,
                None => self.publish(order, target, &card).await,
            }
        }
    }

    async fn publish(&self, order: &Order, target: MirrorTarget, card: &MirrorCard) {
        let Some(message_id) = self.post(order, target, card).await else {
            return;
        };
        let inserted = self
            .bindings
            .insert_binding(NewMirrorBinding {
                order_id: order.id,
                technician_id: target.technician_id,
                chat_id: target.chat_id,
                message_id,
                created_at: self.clock.now(),
            })
            .await;
        match inserted {
            Ok(_) => info!(chat_id = %target.chat_id, %message_id, "order mirrored"),
            Err(MirrorBindingRepositoryError::Duplicate { .. }) => {
                // A concurrent publish won; keep its card and drop ours.
                if let Err(failure) = self
                    .retry
                    .run("remove", || self.transport.remove(target.chat_id, message_id))
                    .await
                {
                    warn!(
                        chat_id = %target.chat_id,
                        %message_id,
                        error = %failure.last_error,
                        "could not remove the losing duplicate card"
                    );
                }
                let bindings = match self.bindings.bindings_for_order(order.id).await {
                    Ok(bindings) => bindings,
                    Err(error) => {
                        warn!(%error, chat_id = %target.chat_id, "could not reload mirror bindings");
                        return;
                    }
                };
                let existing = bindings
                    .iter()
                    .find(|binding| binding.chat_id == target.chat_id && binding.is_active);
                if let Some(existing) = existing {
                    self.edit(order, existing, card).await;
                }
            }
            Err(error) => warn!(%error, chat_id = %target.chat_id, "could not store mirror binding"),
        }
    }

    async fn republish(&self, order: &Order, target: MirrorTarget, card: &MirrorCard) {
        let Some(message_id) = self.post(order, target, card).await else {
            return;
        };
        if let Err(error) = self
            .bindings
            .reactivate_binding(order.id, target.chat_id, message_id)
            .await
        {
            warn!(%error, chat_id = %target.chat_id, "could not reactivate mirror binding");
        }
    }

    /// Publish and pin a card; `None` when the publish failed for good.
    async fn post(
        &self,
        order: &Order,
        target: MirrorTarget,
        card: &MirrorCard,
    ) -> Option<MessageId> {
        let published = self
            .retry
            .run("publish", || self.transport.publish(target.chat_id, card))
            .await;
        match published {
            Ok(message_id) => {
                if let Err(failure) = self
                    .retry
                    .run("pin", || self.transport.pin(target.chat_id, message_id))
                    .await
                {
                    debug!(error = %failure.last_error, "pin failed; card stays unpinned");
                }
                Some(message_id)
            }
            Err(failure) => {
                self.record_divergence(order, target.chat_id, "publish", &failure)
                    .await;
                None
            }
        }
    }

    async fn edit(&self, order: &Order, binding: &MirrorBinding, card: &MirrorCard) {
        let edited = self
            .retry
            .run("edit", || {
                self.transport.edit(binding.chat_id, binding.message_id, card)
            })
            .await;
        if let Err(failure) = edited {
            self.record_divergence(order, binding.chat_id, "edit", &failure)
                .await;
            self.deactivate(order.id, binding.chat_id).await;
        }
    }

    async fn retire_all(&self, order: &Order, bindings: Vec<MirrorBinding>) {
        for binding in bindings.into_iter().filter(|binding| binding.is_active) {
            self.retire(order, &binding).await;
        }
    }

    /// Unpin, remove and deactivate one binding. The binding is deactivated
    /// even when the transport keeps failing.
    async fn retire(&self, order: &Order, binding: &MirrorBinding) {
        if let Err(failure) = self
            .retry
            .run("unpin", || {
                self.transport.unpin(binding.chat_id, binding.message_id)
            })
            .await
        {
            warn!(
                chat_id = %binding.chat_id,
                message_id = %binding.message_id,
                error = %failure.last_error,
                "unpin failed"
            );
        }
        let removed = self
            .retry
            .run("remove", || {
                self.transport.remove(binding.chat_id, binding.message_id)
            })
            .await;
        if let Err(failure) = removed {
            self.record_divergence(order, binding.chat_id, "remove", &failure)
                .await;
        }
        self.deactivate(order.id, binding.chat_id).await;
    }

    async fn deactivate(&self, order_id: OrderId, chat_id: ChatId) {
        if let Err(error) = self
            .bindings
            .deactivate_binding(order_id, chat_id, self.clock.now())
            .await
        {
            warn!(%error, %chat_id, "could not deactivate mirror binding");
        }
    }

    async fn record_divergence(
        &self,
        order: &Order,
        chat_id: ChatId,
        operation: &str,
        failure: &RetryExhausted,
    ) {
        warn!(
            %chat_id,
            operation,
            attempts = failure.attempts,
            error = %failure.last_error,
            "mirror diverged"
        );
        let entry = AuditLogEntry::new(
            None,
            AuditAction::MirrorDiverged,
            format!(
                "{operation} in chat {chat_id} failed after {} attempt(s): {}",
                failure.attempts, failure.last_error
            ),
            self.clock.now(),
        )
        .for_order(order.id);
        if let Err(error) = self.audit.append(entry).await {
            warn!(%error, "could not record mirror divergence");
        }
    }
}

#[async_trait]
impl DomainEventHandler for MirrorCoordinator {
    async fn handle(&self, event: &DomainEvent) {
        match event {
            // Restored orders are not re-published until their next change.
            DomainEvent::OrderRestored { order_id, version } => {
                self.mark_applied(*order_id, *version);
            }
            DomainEvent::TechnicianDeactivated { .. } => {}
            _ => {
                if let (Some(order_id), Some(version)) = (event.order_id(), event.version()) {
                    self.sync_order(order_id, version).await;
                }
            }
        }
    }
}
