//! Domain fixtures shared by unit and integration tests.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{
    Actor, ChatId, Order, OrderDraft, OrderId, OrderStatus, Role, RoleSet, Settlement, Technician,
    TechnicianId, UserId,
};

use super::clock::instant;

pub const ADMIN_ID: UserId = UserId::new(1);
pub const DISPATCHER_ID: UserId = UserId::new(100);

pub fn admin() -> Actor {
    Actor::user(ADMIN_ID, RoleSet::new([Role::Admin]))
}

pub fn dispatcher() -> Actor {
    Actor::user(DISPATCHER_ID, RoleSet::new([Role::Dispatcher]))
}

/// Technician actor with MASTER, plus SENIOR_MASTER when `senior`.
pub fn master(user_id: i64, senior: bool) -> Actor {
    let roles = if senior {
        RoleSet::new([Role::Master, Role::SeniorMaster])
    } else {
        RoleSet::new([Role::Master])
    };
    Actor::user(UserId::new(user_id), roles)
}

/// Active, approved technician with a work channel.
pub fn technician(id: i64, user_id: i64) -> Technician {
    Technician {
        id: TechnicianId::new(id),
        user_id: UserId::new(user_id),
        phone: None,
        specialty: None,
        is_active: true,
        is_approved: true,
        work_chat_id: Some(ChatId::new(-1000 - id)),
    }
}

/// Washing machine order draft used throughout the lifecycle tests.
pub fn draft() -> OrderDraft {
    OrderDraft {
        equipment_type: "Washing machine".to_owned(),
        problem_description: "not spinning".to_owned(),
        client_name: Some("I.P.".to_owned()),
        client_address: "Lenina 5-10".to_owned(),
        client_phone: Some("+79001234567".to_owned()),
        ..OrderDraft::default()
    }
}

/// Stored order image in `status` with the given version.
///
/// Statuses that require a technician get technician `1`.
pub fn order(id: i64, status: OrderStatus, version: i64) -> Order {
    let created_at = instant("2026-03-01T08:00:00Z");
    let valid = match draft().validate() {
        Ok(valid) => valid,
        Err(error) => panic!("fixture draft must validate: {error}"),
    };
    let mut order = Order::from_draft(OrderId::new(id), valid, Some(DISPATCHER_ID), created_at);
    order.status = status;
    order.version = version;
    if status.requires_technician() {
        order.assigned_technician = Some(TechnicianId::new(1));
    }
    order
}

/// CLOSED order with a balanced settlement, closed at `closed_at`.
pub fn closed_order(
    id: i64,
    technician_id: i64,
    total: Decimal,
    materials: Decimal,
    closed_at: DateTime<Utc>,
) -> Order {
    let mut closed = order(id, OrderStatus::Closed, 6);
    let net = total - materials;
    let technician_share = (net / Decimal::TWO).round_dp(2);
    closed.assigned_technician = Some(TechnicianId::new(technician_id));
    closed.settlement = Some(Settlement {
        total_amount: total,
        materials_cost: materials,
        technician_share,
        company_share: net - technician_share,
        has_review: false,
        out_of_city: false,
    });
    closed.updated_at = closed_at;
    closed
}
