//! Port for order persistence and the order read models the core needs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    AuditLogEntry, FieldHistoryEntry, Order, OrderId, StatusHistoryEntry, TechnicianId, UserId,
    ValidDraft,
};

use super::define_port_error;

define_port_error! {
    /// Errors raised by order repository adapters.
    pub enum OrderRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "order repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "order repository query failed: {message}",
        /// The stored version no longer matches the expected one.
        VersionConflict { order_id: OrderId, expected_version: i64 } =>
            "order {order_id} no longer has version {expected_version}",
    }
}

/// Which rows an order lookup may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Only orders without a tombstone.
    Live,
    /// Tombstoned orders too (archival and restore paths).
    IncludeDeleted,
}

/// A new order together with its creation records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub draft: ValidDraft,
    pub dispatcher: Option<UserId>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    /// Creation audit entry; the adapter fills in the order id.
    pub audit: AuditLogEntry,
}

/// One atomic change of an existing order.
///
/// `order` is the full new image with `version = expected_version + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderChange {
    pub order: Order,
    pub expected_version: i64,
    pub status_entry: Option<StatusHistoryEntry>,
    pub field_entries: Vec<FieldHistoryEntry>,
    pub audit_entries: Vec<AuditLogEntry>,
}

/// Keyset page request over closed orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosedOrdersPage {
    /// Inclusive lower bound on `updated_at`.
    pub from: DateTime<Utc>,
    /// Exclusive upper bound on `updated_at`.
    pub until: DateTime<Utc>,
    /// Return orders with ids strictly greater than this.
    pub after: Option<OrderId>,
    pub limit: usize,
}

/// Port for the order store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert a NEW order, its creation history entry and audit entry in one
    /// transaction; returns the stored order with its assigned id.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, OrderRepositoryError>;

    async fn find_order(
        &self,
        id: OrderId,
        visibility: Visibility,
    ) -> Result<Option<Order>, OrderRepositoryError>;

    /// Apply a change guarded by the version CAS.
    async fn commit_order_change(&self, change: OrderChange) -> Result<Order, OrderRepositoryError>;

    /// Status history in commit order.
    async fn status_history(
        &self,
        id: OrderId,
    ) -> Result<Vec<StatusHistoryEntry>, OrderRepositoryError>;

    /// Field history in commit order.
    async fn field_history(
        &self,
        id: OrderId,
    ) -> Result<Vec<FieldHistoryEntry>, OrderRepositoryError>;

    /// Live order with the same phone, address and equipment whose status is
    /// NEW, ASSIGNED, ACCEPTED or ONSITE. Comparison is case-insensitive on
    /// the trimmed text.
    async fn find_active_duplicate(
        &self,
        phone: &str,
        address: &str,
        equipment_type: &str,
    ) -> Result<Option<OrderId>, OrderRepositoryError>;

    /// Most recent live orders matching the phone or the address.
    async fn client_history(
        &self,
        phone: Option<String>,
        address: String,
        limit: usize,
    ) -> Result<Vec<Order>, OrderRepositoryError>;

    /// Every order ever assigned to the technician, tombstoned ones included.
    async fn orders_for_technician(
        &self,
        technician_id: TechnicianId,
    ) -> Result<Vec<Order>, OrderRepositoryError>;

    /// One page of live CLOSED orders ordered by id.
    async fn closed_orders_page(
        &self,
        page: ClosedOrdersPage,
    ) -> Result<Vec<Order>, OrderRepositoryError>;
}
