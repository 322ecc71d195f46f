//! Events published after a change commits.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{OrderId, OrderStatus, TechnicianId, UserId};

/// Committed domain event.
///
/// Order events carry the committed order version so subscribers can drop
/// deliveries older than what they have already applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "PascalCase")]
pub enum DomainEvent {
    OrderCreated {
        order_id: OrderId,
        version: i64,
    },
    OrderTransitioned {
        order_id: OrderId,
        version: i64,
        from: OrderStatus,
        to: OrderStatus,
        actor: Option<UserId>,
    },
    OrderClosed {
        order_id: OrderId,
        version: i64,
        technician_share: Decimal,
        company_share: Decimal,
    },
    /// Descriptive fields changed without a status change.
    OrderUpdated {
        order_id: OrderId,
        version: i64,
    },
    OrderSoftDeleted {
        order_id: OrderId,
        version: i64,
    },
    OrderRestored {
        order_id: OrderId,
        version: i64,
    },
    TechnicianDeactivated {
        technician_id: TechnicianId,
        actor: Option<UserId>,
    },
}

impl DomainEvent {
    /// Order the event refers to, if any.
    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            Self::OrderCreated { order_id, .. }
            | Self::OrderTransitioned { order_id, .. }
            | Self::OrderClosed { order_id, .. }
            | Self::OrderUpdated { order_id, .. }
            | Self::OrderSoftDeleted { order_id, .. }
            | Self::OrderRestored { order_id, .. } => Some(*order_id),
            Self::TechnicianDeactivated { .. } => None,
        }
    }

    /// Committed order version, if the event concerns an order.
    pub fn version(&self) -> Option<i64> {
        match self {
            Self::OrderCreated { version, .. }
            | Self::OrderTransitioned { version, .. }
            | Self::OrderClosed { version, .. }
            | Self::OrderUpdated { version, .. }
            | Self::OrderSoftDeleted { version, .. }
            | Self::OrderRestored { version, .. } => Some(*version),
            Self::TechnicianDeactivated { .. } => None,
        }
    }

    /// Stable name used in logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::OrderCreated { .. } => "OrderCreated",
            Self::OrderTransitioned { .. } => "OrderTransitioned",
            Self::OrderClosed { .. } => "OrderClosed",
            Self::OrderUpdated { .. } => "OrderUpdated",
            Self::OrderSoftDeleted { .. } => "OrderSoftDeleted",
            Self::OrderRestored { .. } => "OrderRestored",
            Self::TechnicianDeactivated { .. } => "TechnicianDeactivated",
        }
    }
}
