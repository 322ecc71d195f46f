//! Order lifecycle service.
//!
//! Every public operation loads the order, checks the caller's expected
//! version, validates the change and hands one [`OrderChange`] to the
//! repository, which applies it atomically under the version CAS. Events are
//! published only after the commit; a failed publish is logged and never
//! rolls the change back.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::finance::{self, SpecialtyRateTable, SplitInput};
use super::identity::map_identity_error;
use super::ingest::interpret_phrase;
use super::ports::{
    AuditLogRepository, EventPublisher, IdentityRepository, NewOrder, OrderChange,
    OrderRepository, OrderRepositoryError, SpecialtyRateRepository, Visibility,
};
use super::state_machine::{self, InvalidTransition, Permit};
use super::{
    Actor, AuditAction, AuditLogEntry, CivilClock, CloseFlags, DispatchError, DomainEvent,
    EditableField, Entity, FieldHistoryEntry, LongRepairTerms, Money, Order, OrderDraft, OrderId,
    OrderPatch, OrderStatus, Role, Settlement, StatusHistoryEntry, TechnicianId,
};

pub(crate) fn map_order_error(error: OrderRepositoryError) -> DispatchError {
    match error {
        OrderRepositoryError::Connection { message } => {
            DispatchError::unavailable(format!("order repository unavailable: {message}"))
        }
        OrderRepositoryError::Query { message } => {
            DispatchError::internal(format!("order repository error: {message}"))
        }
        OrderRepositoryError::VersionConflict {
            order_id,
            expected_version,
        } => DispatchError::concurrent(Entity::Order, order_id.get(), expected_version),
    }
}

/// Ports used by [`OrderService`].
pub struct OrderServicePorts {
    pub orders: Arc<dyn OrderRepository>,
    pub identity: Arc<dyn IdentityRepository>,
    pub rates: Arc<dyn SpecialtyRateRepository>,
    pub audit: Arc<dyn AuditLogRepository>,
    pub events: Arc<dyn EventPublisher>,
}

/// Sole writer of orders and their history.
#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    identity: Arc<dyn IdentityRepository>,
    rates: Arc<dyn SpecialtyRateRepository>,
    audit: Arc<dyn AuditLogRepository>,
    events: Arc<dyn EventPublisher>,
    clock: CivilClock,
}

/// Status change ready to commit.
struct StatusChange<'a> {
    previous: &'a Order,
    next: Order,
    actor: &'a Actor,
    action: AuditAction,
    note: Option<String>,
    field_entries: Vec<FieldHistoryEntry>,
    extra_audit: Vec<AuditLogEntry>,
}

impl OrderService {
    pub fn new(ports: OrderServicePorts, clock: CivilClock) -> Self {
        Self {
            orders: ports.orders,
            identity: ports.identity,
            rates: ports.rates,
            audit: ports.audit,
            events: ports.events,
            clock,
        }
    }

    /// Create a NEW order. Staff and the system may create orders.
    #[instrument(skip(self, draft, actor), fields(actor = %actor))]
    pub async fn create(&self, draft: OrderDraft, actor: &Actor) -> Result<Order, DispatchError> {
        state_machine::validate(None, OrderStatus::New, actor)?;
        let mut valid = draft.validate()?;
        if valid.scheduled_at.is_none() {
            valid.scheduled_at = valid
                .scheduled_time
                .as_deref()
                .and_then(|phrase| interpret_phrase(phrase, self.clock.civil_now()).at);
        }

        let now = self.clock.now();
        let audit = AuditLogEntry::new(
            actor.principal(),
            AuditAction::OrderCreated,
            format!("order created by {actor}"),
            now,
        );
        let order = self
            .orders
            .insert_order(NewOrder {
                draft: valid,
                dispatcher: actor.principal(),
                created_by: actor.principal(),
                created_at: now,
                audit,
            })
            .await
            .map_err(map_order_error)?;

        info!(order_id = %order.id, "order created");
        self.publish(DomainEvent::OrderCreated {
            order_id: order.id,
            version: order.version,
        })
        .await;
        Ok(order)
    }

    /// Live order by id.
    pub async fn get(&self, order_id: OrderId) -> Result<Order, DispatchError> {
        self.orders
            .find_order(order_id, Visibility::Live)
            .await
            .map_err(map_order_error)?
            .ok_or_else(|| DispatchError::not_found(Entity::Order, order_id))
    }

    pub async fn status_history(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<StatusHistoryEntry>, DispatchError> {
        self.get(order_id).await?;
        self.orders
            .status_history(order_id)
            .await
            .map_err(map_order_error)
    }

    pub async fn field_history(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<FieldHistoryEntry>, DispatchError> {
        self.get(order_id).await?;
        self.orders
            .field_history(order_id)
            .await
            .map_err(map_order_error)
    }

    /// Move an order along the transition table.
    ///
    /// ASSIGNED and CLOSED have dedicated operations ([`Self::assign`],
    /// [`Self::close`]) because they carry extra data. Transitions into NEW
    /// or REFUSED release the technician and keep `notes` as the refusal
    /// reason.
    #[instrument(skip(self, actor, notes), fields(actor = %actor))]
    pub async fn transition(
        &self,
        order_id: OrderId,
        to: OrderStatus,
        actor: &Actor,
        notes: Option<String>,
        expected_version: i64,
    ) -> Result<Order, DispatchError> {
        let order = self.load_for_update(order_id, expected_version).await?;
        let permit = state_machine::validate(Some(order.status), to, actor)?;
        self.ensure_holder(permit, &order, to, actor).await?;

        match to {
            OrderStatus::Assigned => {
                return Err(DispatchError::validation(
                    "assigning requires a technician; use the assignment operation",
                ));
            }
            OrderStatus::Closed => {
                return Err(DispatchError::validation(
                    "closing requires money fields; use the close operation",
                ));
            }
            OrderStatus::Dr
                if order.estimated_completion.is_none() || order.prepayment.is_none() =>
            {
                return Err(DispatchError::validation(
                    "long repair requires estimated completion and prepayment",
                ));
            }
            _ => {}
        }

        let note = non_empty(notes);
        let mut next = self.next_image(&order);
        next.status = to;
        if matches!(to, OrderStatus::New | OrderStatus::Refused) {
            next.assigned_technician = None;
            if note.is_some() {
                next.refuse_reason = note.clone();
            }
        }

        self.commit_status_change(StatusChange {
            previous: &order,
            next,
            actor,
            action: AuditAction::OrderTransitioned,
            note,
            field_entries: Vec::new(),
            extra_audit: Vec::new(),
        })
        .await
    }

    /// Assign a NEW order to an available technician.
    #[instrument(skip(self, actor), fields(actor = %actor))]
    pub async fn assign(
        &self,
        order_id: OrderId,
        technician_id: TechnicianId,
        actor: &Actor,
        expected_version: i64,
    ) -> Result<Order, DispatchError> {
        let order = self.load_for_update(order_id, expected_version).await?;
        state_machine::validate(Some(order.status), OrderStatus::Assigned, actor)?;

        let profile = self
            .identity
            .find_technician(technician_id)
            .await
            .map_err(map_identity_error)?
            .ok_or_else(|| DispatchError::not_found(Entity::Technician, technician_id))?;
        profile
            .technician
            .check_assignable()
            .map_err(|reason| DispatchError::TechnicianUnavailable {
                technician_id,
                reason,
            })?;
        if !profile.roles.contains(Role::Master) {
            return Err(DispatchError::TechnicianUnavailable {
                technician_id,
                reason: super::UnavailableReason::MissingMasterRole,
            });
        }

        let mut next = self.next_image(&order);
        next.status = OrderStatus::Assigned;
        next.assigned_technician = Some(technician_id);

        self.commit_status_change(StatusChange {
            previous: &order,
            next,
            actor,
            action: AuditAction::OrderAssigned,
            note: Some(format!("assigned to technician {technician_id}")),
            field_entries: Vec::new(),
            extra_audit: Vec::new(),
        })
        .await
    }

    /// Return an order to NEW, optionally recording why.
    pub async fn unassign(
        &self,
        order_id: OrderId,
        actor: &Actor,
        refuse_reason: Option<String>,
        expected_version: i64,
    ) -> Result<Order, DispatchError> {
        self.transition(
            order_id,
            OrderStatus::New,
            actor,
            refuse_reason,
            expected_version,
        )
        .await
    }

    /// Apply whitelisted field edits.
    ///
    /// Unchanged values are skipped; a patch that changes nothing returns the
    /// order as it is without a new version.
    #[instrument(skip(self, patch, actor), fields(actor = %actor))]
    pub async fn update_fields(
        &self,
        order_id: OrderId,
        patch: OrderPatch,
        actor: &Actor,
        expected_version: i64,
    ) -> Result<Order, DispatchError> {
        let order = self.load_for_update(order_id, expected_version).await?;
        self.ensure_editor(&order, actor).await?;
        if order.status.is_terminal() {
            return Err(DispatchError::validation(format!(
                "order {order_id} is {} and can no longer be edited",
                order.status
            )));
        }
        let touches_long_repair = patch.touches(EditableField::EstimatedCompletion)
            || patch.touches(EditableField::Prepayment);
        if touches_long_repair && order.status != OrderStatus::Dr {
            return Err(DispatchError::validation(
                "long-repair fields can only be edited in DR",
            ));
        }

        let mut next = order.clone();
        let changes = patch.apply(&mut next)?;
        if changes.is_empty() {
            return Ok(order);
        }
        if next.status == OrderStatus::Dr
            && (next.estimated_completion.is_none() || next.prepayment.is_none())
        {
            return Err(DispatchError::validation(
                "a DR order must keep its estimated completion and prepayment",
            ));
        }
        if patch.touches(EditableField::ScheduledTime) {
            next.scheduled_at = next
                .scheduled_time
                .as_deref()
                .and_then(|phrase| interpret_phrase(phrase, self.clock.civil_now()).at);
        }
        let now = self.clock.now();
        next.version = order.version + 1;
        next.updated_at = now;

        let fields = changes
            .iter()
            .map(|change| change.field.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let field_entries = changes
            .into_iter()
            .map(|change| FieldHistoryEntry::from_change(order_id, change, actor.principal(), now))
            .collect();
        let audit = AuditLogEntry::new(
            actor.principal(),
            AuditAction::OrderUpdated,
            format!("fields changed: {fields}"),
            now,
        )
        .for_order(order_id);

        let committed = self
            .commit(OrderChange {
                order: next,
                expected_version,
                status_entry: None,
                field_entries,
                audit_entries: vec![audit],
            })
            .await?;
        self.publish(DomainEvent::OrderUpdated {
            order_id,
            version: committed.version,
        })
        .await;
        Ok(committed)
    }

    /// Close an ONSITE or DR order with its money fields.
    #[instrument(skip(self, actor), fields(actor = %actor))]
    pub async fn close(
        &self,
        order_id: OrderId,
        money: Money,
        flags: CloseFlags,
        actor: &Actor,
        expected_version: i64,
    ) -> Result<Order, DispatchError> {
        let order = self.load_for_update(order_id, expected_version).await?;
        let permit = state_machine::validate(Some(order.status), OrderStatus::Closed, actor)?;
        self.ensure_holder(permit, &order, OrderStatus::Closed, actor)
            .await?;
        if money.total_amount.is_sign_negative() || money.materials_cost.is_sign_negative() {
            return Err(DispatchError::validation(
                "total amount and materials cost must not be negative",
            ));
        }

        let technician_id = order.assigned_technician.ok_or_else(|| {
            DispatchError::internal(format!("order {order_id} has no technician"))
        })?;
        let profile = self
            .identity
            .find_technician(technician_id)
            .await
            .map_err(map_identity_error)?
            .ok_or_else(|| DispatchError::not_found(Entity::Technician, technician_id))?;
        let rates = self.rates.list_active().await.map_err(|error| {
            DispatchError::unavailable(format!("specialty rates unavailable: {error}"))
        })?;
        let rates = SpecialtyRateTable::new(rates);
        let split = finance::split(&SplitInput {
            money,
            flags,
            technician_roles: &profile.roles,
            equipment_category: &order.equipment_type,
            rates: &rates,
        })?;

        let mut next = self.next_image(&order);
        next.status = OrderStatus::Closed;
        next.settlement = Some(Settlement {
            total_amount: money.total_amount,
            materials_cost: money.materials_cost,
            technician_share: split.technician_share,
            company_share: split.company_share,
            has_review: flags.has_review,
            out_of_city: flags.out_of_city,
        });

        let mut extra_audit = Vec::new();
        if split.company_clamped {
            warn!(%order_id, "company share clamped to zero");
            extra_audit.push(
                AuditLogEntry::new(
                    actor.principal(),
                    AuditAction::FinanceCompanyShareClamped,
                    format!(
                        "bonuses exceeded the company share; technician receives {}",
                        split.technician_share
                    ),
                    next.updated_at,
                )
                .for_order(order_id),
            );
        }

        self.commit_status_change(StatusChange {
            previous: &order,
            next,
            actor,
            action: AuditAction::OrderClosed,
            note: Some(format!("base rule: {:?}", split.base_rule)),
            field_entries: Vec::new(),
            extra_audit,
        })
        .await
    }

    /// Record long-repair terms and move ONSITE to DR in one commit.
    #[instrument(skip(self, terms, actor), fields(actor = %actor))]
    pub async fn move_to_long_repair(
        &self,
        order_id: OrderId,
        terms: LongRepairTerms,
        actor: &Actor,
        expected_version: i64,
    ) -> Result<Order, DispatchError> {
        let order = self.load_for_update(order_id, expected_version).await?;
        let permit = state_machine::validate(Some(order.status), OrderStatus::Dr, actor)?;
        self.ensure_holder(permit, &order, OrderStatus::Dr, actor)
            .await?;

        let estimated = terms.estimated_completion.trim().to_owned();
        if estimated.is_empty() {
            return Err(DispatchError::validation(
                "estimated completion must not be empty",
            ));
        }
        if terms.prepayment.is_sign_negative() {
            return Err(DispatchError::validation("prepayment must not be negative"));
        }
        let prepayment = terms.prepayment.round_dp(2).normalize();

        let mut next = self.next_image(&order);
        next.status = OrderStatus::Dr;
        next.estimated_completion = Some(estimated.clone());
        next.prepayment = Some(prepayment);

        let now = next.updated_at;
        let field_entries = vec![
            FieldHistoryEntry::tracked(
                order_id,
                EditableField::EstimatedCompletion,
                order.estimated_completion.clone(),
                estimated.clone(),
                actor.principal(),
                now,
            ),
            FieldHistoryEntry::tracked(
                order_id,
                EditableField::Prepayment,
                order.prepayment.map(|value| value.to_string()),
                prepayment.to_string(),
                actor.principal(),
                now,
            ),
        ];

        self.commit_status_change(StatusChange {
            previous: &order,
            next,
            actor,
            action: AuditAction::OrderTransitioned,
            note: Some(format!("long repair until {estimated}")),
            field_entries,
            extra_audit: Vec::new(),
        })
        .await
    }

    /// Change the scheduled-arrival phrase of a non-terminal order.
    #[instrument(skip(self, phrase, reason, actor), fields(actor = %actor))]
    pub async fn reschedule(
        &self,
        order_id: OrderId,
        phrase: &str,
        reason: Option<String>,
        actor: &Actor,
        expected_version: i64,
    ) -> Result<Order, DispatchError> {
        let order = self.load_for_update(order_id, expected_version).await?;
        self.ensure_editor(&order, actor).await?;
        if order.status.is_terminal() {
            return Err(DispatchError::validation(format!(
                "order {order_id} is {} and cannot be rescheduled",
                order.status
            )));
        }
        let phrase = phrase.trim();
        if phrase.is_empty() {
            return Err(DispatchError::validation("scheduled time must not be empty"));
        }

        let scheduled = interpret_phrase(phrase, self.clock.civil_now());
        let mut next = self.next_image(&order);
        next.scheduled_time = Some(scheduled.display.clone());
        next.scheduled_at = scheduled.at;
        next.reschedule_count = order.reschedule_count.saturating_add(1);
        next.last_rescheduled_at = Some(next.updated_at);
        next.reschedule_reason = non_empty(reason);

        let now = next.updated_at;
        let field_entry = FieldHistoryEntry::tracked(
            order_id,
            EditableField::ScheduledTime,
            order.scheduled_time.clone(),
            scheduled.display,
            actor.principal(),
            now,
        );
        let audit = AuditLogEntry::new(
            actor.principal(),
            AuditAction::OrderRescheduled,
            format!(
                "rescheduled (#{}){}",
                next.reschedule_count,
                next.reschedule_reason
                    .as_deref()
                    .map(|reason| format!(": {reason}"))
                    .unwrap_or_default()
            ),
            now,
        )
        .for_order(order_id);

        let committed = self
            .commit(OrderChange {
                order: next,
                expected_version,
                status_entry: None,
                field_entries: vec![field_entry],
                audit_entries: vec![audit],
            })
            .await?;
        self.publish(DomainEvent::OrderUpdated {
            order_id,
            version: committed.version,
        })
        .await;
        Ok(committed)
    }

    /// Tombstone an order. Repeating the call only appends another audit
    /// entry.
    #[instrument(skip(self, actor), fields(actor = %actor))]
    pub async fn soft_delete(&self, order_id: OrderId, actor: &Actor) -> Result<Order, DispatchError> {
        if !actor.is_staff() {
            return Err(DispatchError::forbidden("only staff may delete orders"));
        }
        let order = self.load_any(order_id).await?;
        let now = self.clock.now();
        let audit = AuditLogEntry::new(
            actor.principal(),
            AuditAction::OrderSoftDeleted,
            format!("order deleted by {actor}"),
            now,
        )
        .for_order(order_id);

        if order.is_deleted() {
            self.audit.append(audit).await.map_err(|error| {
                DispatchError::unavailable(format!("audit log unavailable: {error}"))
            })?;
            return Ok(order);
        }

        let mut next = order.clone();
        next.deleted_at = Some(now);
        next.version = order.version + 1;
        let committed = self
            .commit(OrderChange {
                order: next,
                expected_version: order.version,
                status_entry: None,
                field_entries: Vec::new(),
                audit_entries: vec![audit],
            })
            .await?;
        info!(version = committed.version, "order tombstoned");
        self.publish(DomainEvent::OrderSoftDeleted {
            order_id,
            version: committed.version,
        })
        .await;
        Ok(committed)
    }

    /// Clear the tombstone if one is set.
    #[instrument(skip(self, actor), fields(actor = %actor))]
    pub async fn restore(&self, order_id: OrderId, actor: &Actor) -> Result<Order, DispatchError> {
        if !actor.is_staff() {
            return Err(DispatchError::forbidden("only staff may restore orders"));
        }
        let order = self.load_any(order_id).await?;
        if !order.is_deleted() {
            return Ok(order);
        }

        let mut next = order.clone();
        next.deleted_at = None;
        next.version = order.version + 1;
        let audit = AuditLogEntry::new(
            actor.principal(),
            AuditAction::OrderRestored,
            format!("order restored by {actor}"),
            self.clock.now(),
        )
        .for_order(order_id);
        let committed = self
            .commit(OrderChange {
                order: next,
                expected_version: order.version,
                status_entry: None,
                field_entries: Vec::new(),
                audit_entries: vec![audit],
            })
            .await?;
        self.publish(DomainEvent::OrderRestored {
            order_id,
            version: committed.version,
        })
        .await;
        Ok(committed)
    }

    async fn load_for_update(
        &self,
        order_id: OrderId,
        expected_version: i64,
    ) -> Result<Order, DispatchError> {
        let order = self.get(order_id).await?;
        if order.version != expected_version {
            return Err(DispatchError::concurrent(
                Entity::Order,
                order_id.get(),
                expected_version,
            ));
        }
        Ok(order)
    }

    async fn load_any(&self, order_id: OrderId) -> Result<Order, DispatchError> {
        self.orders
            .find_order(order_id, Visibility::IncludeDeleted)
            .await
            .map_err(map_order_error)?
            .ok_or_else(|| DispatchError::not_found(Entity::Order, order_id))
    }

    fn next_image(&self, order: &Order) -> Order {
        let mut next = order.clone();
        next.version = order.version + 1;
        next.updated_at = self.clock.now();
        next
    }

    /// Whether the actor's principal is bound to the order's technician.
    async fn holds_order(&self, order: &Order, actor: &Actor) -> Result<bool, DispatchError> {
        let (Some(user_id), Some(assigned)) = (actor.principal(), order.assigned_technician)
        else {
            return Ok(false);
        };
        let technician = self
            .identity
            .find_technician_by_user(user_id)
            .await
            .map_err(map_identity_error)?;
        Ok(technician.is_some_and(|technician| technician.id == assigned))
    }

    /// Technician permits only hold for the technician assigned to the order.
    async fn ensure_holder(
        &self,
        permit: Permit,
        order: &Order,
        to: OrderStatus,
        actor: &Actor,
    ) -> Result<(), DispatchError> {
        if permit != Permit::AssignedTechnician || self.holds_order(order, actor).await? {
            return Ok(());
        }
        Err(InvalidTransition {
            from: Some(order.status),
            to,
            roles: actor.roles(),
        }
        .into())
    }

    /// Staff may edit any order; technicians only the one they hold.
    async fn ensure_editor(&self, order: &Order, actor: &Actor) -> Result<(), DispatchError> {
        if actor.is_staff() {
            return Ok(());
        }
        if actor.roles().is_technician() && self.holds_order(order, actor).await? {
            return Ok(());
        }
        Err(DispatchError::forbidden(format!(
            "{actor} may not edit order {}",
            order.id
        )))
    }

    async fn commit_status_change(&self, change: StatusChange<'_>) -> Result<Order, DispatchError> {
        let StatusChange {
            previous,
            next,
            actor,
            action,
            note,
            field_entries,
            extra_audit,
        } = change;
        let now = next.updated_at;
        let from = previous.status;
        let to = next.status;

        let status_entry = StatusHistoryEntry {
            order_id: previous.id,
            old_status: Some(from),
            new_status: to,
            changed_by: actor.principal(),
            changed_at: now,
            note,
        };
        let mut audit_entries = vec![
            AuditLogEntry::new(actor.principal(), action, format!("{from} -> {to}"), now)
                .for_order(previous.id),
        ];
        audit_entries.extend(extra_audit);

        let committed = self
            .commit(OrderChange {
                order: next,
                expected_version: previous.version,
                status_entry: Some(status_entry),
                field_entries,
                audit_entries,
            })
            .await?;
        info!(order_id = %committed.id, %from, %to, version = committed.version, "order transitioned");

        let event = match committed.settlement.as_ref() {
            Some(settlement) if to == OrderStatus::Closed => DomainEvent::OrderClosed {
                order_id: committed.id,
                version: committed.version,
                technician_share: settlement.technician_share,
                company_share: settlement.company_share,
            },
            _ => DomainEvent::OrderTransitioned {
                order_id: committed.id,
                version: committed.version,
                from,
                to,
                actor: actor.principal(),
            },
        };
        self.publish(event).await;
        Ok(committed)
    }

    async fn commit(&self, change: OrderChange) -> Result<Order, DispatchError> {
        change.order.check_invariants().map_err(|violation| {
            DispatchError::internal(format!(
                "order {} would break an invariant: {violation}",
                change.order.id
            ))
        })?;
        self.orders
            .commit_order_change(change)
            .await
            .map_err(map_order_error)
    }

    async fn publish(&self, event: DomainEvent) {
        let name = event.name();
        if let Err(error) = self.events.publish(event).await {
            warn!(%error, event = name, "could not publish domain event");
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty())
}

#[cfg(test)]
#[path = "order_service_tests.rs"]
mod tests;
