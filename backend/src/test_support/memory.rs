//! In-memory store implementing every persistence port.
//!
//! Mirrors the transactional behaviour of the Diesel adapters: each port call
//! takes the single lock, so a mutation and its history rows land together.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::finance::SpecialtyRate;
use crate::domain::ports::{
    ArchiveRepository, ArchiveRepositoryError, AuditLogRepository, AuditLogRepositoryError,
    ClosedOrdersPage, IdentityRepository, IdentityRepositoryError, IngestConfigRepository,
    IngestRepositoryError, IngestTelemetryRepository, MirrorBindingRepository,
    MirrorBindingRepositoryError, NewOrder, OrderChange, OrderRepository, OrderRepositoryError,
    ReportRepository, ReportRepositoryError, SpecialtyRateRepository,
    SpecialtyRateRepositoryError, Visibility,
};
use crate::domain::{
    ArchiveRecord, AuditLogEntry, ChatId, FieldHistoryEntry, IngestConfig, IngestTelemetry,
    MessageId, MirrorBinding, NewMirrorBinding, NewPeriodReport, Order, OrderId, OrderStatus,
    PeriodReport, ReportId, ReportKind, RoleSet, StatusHistoryEntry, Technician, TechnicianId,
    TechnicianProfile, User, UserId,
};

#[derive(Default)]
struct State {
    orders: BTreeMap<OrderId, Order>,
    next_order_id: i64,
    status_history: Vec<StatusHistoryEntry>,
    field_history: Vec<FieldHistoryEntry>,
    audit: Vec<AuditLogEntry>,
    users: BTreeMap<UserId, User>,
    technicians: BTreeMap<TechnicianId, Technician>,
    bindings: Vec<MirrorBinding>,
    reports: BTreeMap<ReportId, PeriodReport>,
    next_report_id: i64,
    archives: Vec<ArchiveRecord>,
    rates: Vec<SpecialtyRate>,
    telemetry: Vec<IngestTelemetry>,
    ingest_config: IngestConfig,
}

/// Shared in-memory backing for all repository ports.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

fn same_text(left: &str, right: &str) -> bool {
    left.trim().to_lowercase() == right.trim().to_lowercase()
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("in-memory store mutex"),
        }
    }

    /// Seed a live user at version 1.
    pub fn add_user(&self, id: UserId, roles: RoleSet) -> User {
        let user = User {
            id,
            username: None,
            display_name: None,
            roles,
            deleted_at: None,
            version: 1,
        };
        self.lock().users.insert(id, user.clone());
        user
    }

    pub fn add_technician(&self, technician: Technician) {
        self.lock().technicians.insert(technician.id, technician);
    }

    /// Seed an order image as-is, bypassing history.
    pub fn add_order(&self, order: Order) {
        let mut state = self.lock();
        state.next_order_id = state.next_order_id.max(order.id.get());
        state.orders.insert(order.id, order);
    }

    pub fn set_rates(&self, rates: Vec<SpecialtyRate>) {
        self.lock().rates = rates;
    }

    pub fn set_ingest_config(&self, config: IngestConfig) {
        self.lock().ingest_config = config;
    }

    pub fn order(&self, id: OrderId) -> Option<Order> {
        self.lock().orders.get(&id).cloned()
    }

    pub fn orders(&self) -> Vec<Order> {
        self.lock().orders.values().cloned().collect()
    }

    pub fn status_entries(&self, id: OrderId) -> Vec<StatusHistoryEntry> {
        self.lock()
            .status_history
            .iter()
            .filter(|entry| entry.order_id == id)
            .cloned()
            .collect()
    }

    pub fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.lock().audit.clone()
    }

    pub fn bindings(&self) -> Vec<MirrorBinding> {
        self.lock().bindings.clone()
    }

    pub fn archives(&self) -> Vec<ArchiveRecord> {
        self.lock().archives.clone()
    }

    pub fn reports(&self) -> Vec<PeriodReport> {
        self.lock().reports.values().cloned().collect()
    }

    pub fn telemetry(&self) -> Vec<IngestTelemetry> {
        self.lock().telemetry.clone()
    }

    pub fn technician(&self, id: TechnicianId) -> Option<Technician> {
        self.lock().technicians.get(&id).cloned()
    }

    pub fn user(&self, id: UserId) -> Option<User> {
        self.lock().users.get(&id).cloned()
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn insert_order(&self, new: NewOrder) -> Result<Order, OrderRepositoryError> {
        let mut state = self.lock();
        state.next_order_id += 1;
        let id = OrderId::new(state.next_order_id);
        let order = Order::from_draft(id, new.draft, new.dispatcher, new.created_at);
        state.status_history.push(StatusHistoryEntry {
            order_id: id,
            old_status: None,
            new_status: OrderStatus::New,
            changed_by: new.created_by,
            changed_at: new.created_at,
            note: None,
        });
        state.audit.push(new.audit.for_order(id));
        state.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn find_order(
        &self,
        id: OrderId,
        visibility: Visibility,
    ) -> Result<Option<Order>, OrderRepositoryError> {
        Ok(self
            .lock()
            .orders
            .get(&id)
            .filter(|order| visibility == Visibility::IncludeDeleted || !order.is_deleted())
            .cloned())
    }

    async fn commit_order_change(&self, change: OrderChange) -> Result<Order, OrderRepositoryError> {
        let mut state = self.lock();
        let order_id = change.order.id;
        let current = state
            .orders
            .get(&order_id)
            .map(|order| order.version)
            .ok_or_else(|| OrderRepositoryError::query(format!("order {order_id} missing")))?;
        if current != change.expected_version {
            return Err(OrderRepositoryError::version_conflict(
                order_id,
                change.expected_version,
            ));
        }
        state.status_history.extend(change.status_entry);
        state.field_history.extend(change.field_entries);
        state.audit.extend(change.audit_entries);
        state.orders.insert(order_id, change.order.clone());
        Ok(change.order)
    }

    async fn status_history(
        &self,
        id: OrderId,
    ) -> Result<Vec<StatusHistoryEntry>, OrderRepositoryError> {
        Ok(self.status_entries(id))
    }

    async fn field_history(
        &self,
        id: OrderId,
    ) -> Result<Vec<FieldHistoryEntry>, OrderRepositoryError> {
        Ok(self
            .lock()
            .field_history
            .iter()
            .filter(|entry| entry.order_id == id)
            .cloned()
            .collect())
    }

    async fn find_active_duplicate(
        &self,
        phone: &str,
        address: &str,
        equipment_type: &str,
    ) -> Result<Option<OrderId>, OrderRepositoryError> {
        Ok(self
            .lock()
            .orders
            .values()
            .find(|order| {
                !order.is_deleted()
                    && OrderStatus::DUPLICATE_CANDIDATES.contains(&order.status)
                    && order.client_phone.as_deref() == Some(phone.trim())
                    && same_text(&order.client_address, address)
                    && same_text(&order.equipment_type, equipment_type)
            })
            .map(|order| order.id))
    }

    async fn client_history(
        &self,
        phone: Option<String>,
        address: String,
        limit: usize,
    ) -> Result<Vec<Order>, OrderRepositoryError> {
        let state = self.lock();
        let mut matches: Vec<Order> = state
            .orders
            .values()
            .filter(|order| !order.is_deleted())
            .filter(|order| {
                let same_phone = phone.is_some() && order.client_phone == phone;
                same_phone || same_text(&order.client_address, &address)
            })
            .cloned()
            .collect();
        matches.sort_by(|left, right| {
            right
                .created_at
                .cmp(&left.created_at)
                .then(right.id.cmp(&left.id))
        });
        matches.truncate(limit);
        Ok(matches)
    }

    async fn orders_for_technician(
        &self,
        technician_id: TechnicianId,
    ) -> Result<Vec<Order>, OrderRepositoryError> {
        let state = self.lock();
        Ok(state
            .orders
            .values()
            .filter(|order| {
                order.assigned_technician == Some(technician_id)
                    || state.bindings.iter().any(|binding| {
                        binding.order_id == order.id && binding.technician_id == technician_id
                    })
            })
            .cloned()
            .collect())
    }

    async fn closed_orders_page(
        &self,
        page: ClosedOrdersPage,
    ) -> Result<Vec<Order>, OrderRepositoryError> {
        Ok(self
            .lock()
            .orders
            .values()
            .filter(|order| {
                !order.is_deleted()
                    && order.status == OrderStatus::Closed
                    && order.updated_at >= page.from
                    && order.updated_at < page.until
                    && page.after.is_none_or(|after| order.id > after)
            })
            .take(page.limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl IdentityRepository for InMemoryStore {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, IdentityRepositoryError> {
        Ok(self.user(id))
    }

    async fn find_technician(
        &self,
        id: TechnicianId,
    ) -> Result<Option<TechnicianProfile>, IdentityRepositoryError> {
        let state = self.lock();
        Ok(state.technicians.get(&id).map(|technician| TechnicianProfile {
            technician: technician.clone(),
            roles: state
                .users
                .get(&technician.user_id)
                .filter(|user| !user.is_deleted())
                .map_or_else(RoleSet::unknown, |user| user.roles.clone()),
        }))
    }

    async fn find_technician_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<Technician>, IdentityRepositoryError> {
        Ok(self
            .lock()
            .technicians
            .values()
            .find(|technician| technician.user_id == user_id)
            .cloned())
    }

    async fn staff_principals(&self) -> Result<Vec<UserId>, IdentityRepositoryError> {
        Ok(self
            .lock()
            .users
            .values()
            .filter(|user| !user.is_deleted() && user.roles.is_staff())
            .map(|user| user.id)
            .collect())
    }

    async fn update_user_roles(
        &self,
        id: UserId,
        roles: RoleSet,
        expected_version: i64,
        audit: AuditLogEntry,
    ) -> Result<User, IdentityRepositoryError> {
        let mut state = self.lock();
        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| IdentityRepositoryError::missing(format!("user {id}")))?;
        if user.version != expected_version {
            return Err(IdentityRepositoryError::version_conflict(
                id,
                expected_version,
            ));
        }
        user.roles = roles;
        user.version += 1;
        let updated = user.clone();
        state.audit.push(audit);
        Ok(updated)
    }

    async fn set_technician_active(
        &self,
        id: TechnicianId,
        active: bool,
        audit: AuditLogEntry,
    ) -> Result<Technician, IdentityRepositoryError> {
        let mut state = self.lock();
        let technician = state
            .technicians
            .get_mut(&id)
            .ok_or_else(|| IdentityRepositoryError::missing(format!("technician {id}")))?;
        technician.is_active = active;
        let updated = technician.clone();
        if let Some(user) = state.users.get_mut(&updated.user_id) {
            user.version += 1;
        }
        state.audit.push(audit);
        Ok(updated)
    }
}

#[async_trait]
impl AuditLogRepository for InMemoryStore {
    async fn append(&self, entry: AuditLogEntry) -> Result<(), AuditLogRepositoryError> {
        self.lock().audit.push(entry);
        Ok(())
    }
}

#[async_trait]
impl MirrorBindingRepository for InMemoryStore {
    async fn bindings_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<MirrorBinding>, MirrorBindingRepositoryError> {
        Ok(self
            .lock()
            .bindings
            .iter()
            .filter(|binding| binding.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn insert_binding(
        &self,
        binding: NewMirrorBinding,
    ) -> Result<MirrorBinding, MirrorBindingRepositoryError> {
        let mut state = self.lock();
        let exists = state
            .bindings
            .iter()
            .any(|stored| stored.order_id == binding.order_id && stored.chat_id == binding.chat_id);
        if exists {
            return Err(MirrorBindingRepositoryError::duplicate(
                binding.order_id,
                binding.chat_id,
            ));
        }
        let stored = MirrorBinding {
            order_id: binding.order_id,
            technician_id: binding.technician_id,
            chat_id: binding.chat_id,
            message_id: binding.message_id,
            is_active: true,
            created_at: binding.created_at,
            deactivated_at: None,
        };
        state.bindings.push(stored.clone());
        Ok(stored)
    }

    async fn deactivate_binding(
        &self,
        order_id: OrderId,
        chat_id: ChatId,
        at: DateTime<Utc>,
    ) -> Result<(), MirrorBindingRepositoryError> {
        let mut state = self.lock();
        for binding in state
            .bindings
            .iter_mut()
            .filter(|binding| binding.order_id == order_id && binding.chat_id == chat_id)
        {
            binding.is_active = false;
            binding.deactivated_at = Some(at);
        }
        Ok(())
    }

    async fn reactivate_binding(
        &self,
        order_id: OrderId,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), MirrorBindingRepositoryError> {
        let mut state = self.lock();
        for binding in state
            .bindings
            .iter_mut()
            .filter(|binding| binding.order_id == order_id && binding.chat_id == chat_id)
        {
            binding.is_active = true;
            binding.deactivated_at = None;
            binding.message_id = message_id;
        }
        Ok(())
    }
}

#[async_trait]
impl ReportRepository for InMemoryStore {
    async fn save_period_report(
        &self,
        report: NewPeriodReport,
    ) -> Result<ReportId, ReportRepositoryError> {
        let mut state = self.lock();
        state.next_report_id += 1;
        let id = ReportId::new(state.next_report_id);
        state.reports.insert(id, PeriodReport::from_new(id, report));
        Ok(id)
    }

    async fn find_period_report(
        &self,
        id: ReportId,
    ) -> Result<Option<PeriodReport>, ReportRepositoryError> {
        Ok(self.lock().reports.get(&id).cloned())
    }

    async fn period_report_exists(
        &self,
        kind: ReportKind,
        period_start: NaiveDate,
    ) -> Result<bool, ReportRepositoryError> {
        Ok(self
            .lock()
            .reports
            .values()
            .any(|report| report.kind == kind && report.period_start == period_start))
    }
}

#[async_trait]
impl ArchiveRepository for InMemoryStore {
    async fn save_archive(&self, record: ArchiveRecord) -> Result<(), ArchiveRepositoryError> {
        self.lock().archives.push(record);
        Ok(())
    }
}

#[async_trait]
impl SpecialtyRateRepository for InMemoryStore {
    async fn list_active(&self) -> Result<Vec<SpecialtyRate>, SpecialtyRateRepositoryError> {
        Ok(self
            .lock()
            .rates
            .iter()
            .filter(|rate| rate.deleted_at.is_none())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl IngestTelemetryRepository for InMemoryStore {
    async fn record(&self, event: IngestTelemetry) -> Result<(), IngestRepositoryError> {
        self.lock().telemetry.push(event);
        Ok(())
    }
}

#[async_trait]
impl IngestConfigRepository for InMemoryStore {
    async fn load(&self) -> Result<IngestConfig, IngestRepositoryError> {
        Ok(self.lock().ingest_config)
    }
}
