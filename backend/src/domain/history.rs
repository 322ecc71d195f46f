//! Append-only history and audit records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EditableField, FieldChange, OrderId, OrderStatus, UserId};

/// One edge taken by an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    pub order_id: OrderId,
    /// `None` for the creation entry.
    pub old_status: Option<OrderStatus>,
    pub new_status: OrderStatus,
    pub changed_by: Option<UserId>,
    pub changed_at: DateTime<Utc>,
    pub note: Option<String>,
}

/// One change of a whitelisted order field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldHistoryEntry {
    pub order_id: OrderId,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: String,
    pub changed_by: Option<UserId>,
    pub changed_at: DateTime<Utc>,
}

impl FieldHistoryEntry {
    pub fn from_change(
        order_id: OrderId,
        change: FieldChange,
        changed_by: Option<UserId>,
        changed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id,
            field_name: change.field.as_str().to_owned(),
            old_value: change.old_value,
            new_value: change.new_value,
            changed_by,
            changed_at,
        }
    }

    /// Entry recorded outside a patch, such as a reschedule.
    pub fn tracked(
        order_id: OrderId,
        field: EditableField,
        old_value: Option<String>,
        new_value: impl Into<String>,
        changed_by: Option<UserId>,
        changed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id,
            field_name: field.as_str().to_owned(),
            old_value,
            new_value: new_value.into(),
            changed_by,
            changed_at,
        }
    }
}

/// Action tags written to the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    OrderCreated,
    OrderTransitioned,
    OrderAssigned,
    OrderClosed,
    OrderUpdated,
    OrderRescheduled,
    OrderSoftDeleted,
    OrderRestored,
    /// Bonuses exceeded the company share and it was clamped to zero.
    FinanceCompanyShareClamped,
    MirrorDiverged,
    RolesChanged,
    TechnicianDeactivated,
    ArchiveCreated,
}

impl AuditAction {
    pub const ALL: [Self; 13] = [
        Self::OrderCreated,
        Self::OrderTransitioned,
        Self::OrderAssigned,
        Self::OrderClosed,
        Self::OrderUpdated,
        Self::OrderRescheduled,
        Self::OrderSoftDeleted,
        Self::OrderRestored,
        Self::FinanceCompanyShareClamped,
        Self::MirrorDiverged,
        Self::RolesChanged,
        Self::TechnicianDeactivated,
        Self::ArchiveCreated,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrderCreated => "ORDER_CREATED",
            Self::OrderTransitioned => "ORDER_TRANSITIONED",
            Self::OrderAssigned => "ORDER_ASSIGNED",
            Self::OrderClosed => "ORDER_CLOSED",
            Self::OrderUpdated => "ORDER_UPDATED",
            Self::OrderRescheduled => "ORDER_RESCHEDULED",
            Self::OrderSoftDeleted => "ORDER_SOFT_DELETED",
            Self::OrderRestored => "ORDER_RESTORED",
            Self::FinanceCompanyShareClamped => "FINANCE_COMPANY_SHARE_CLAMPED",
            Self::MirrorDiverged => "MIRROR_DIVERGED",
            Self::RolesChanged => "ROLES_CHANGED",
            Self::TechnicianDeactivated => "TECHNICIAN_DEACTIVATED",
            Self::ArchiveCreated => "ARCHIVE_CREATED",
        }
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| format!("unknown audit action `{s}`"))
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform-wide audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub actor: Option<UserId>,
    pub action: AuditAction,
    /// Order the entry concerns, if any.
    pub order_id: Option<OrderId>,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(
        actor: Option<UserId>,
        action: AuditAction,
        details: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            actor,
            action,
            order_id: None,
            details: details.into(),
            created_at,
        }
    }

    /// Attach the order the entry concerns.
    pub fn for_order(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }
}
