//! The order entity and the value types that travel with it.
//!
//! An [`Order`] is the central record of the dispatch platform. Its shape
//! encodes two of the lifecycle invariants directly: money fields live in a
//! single optional [`Settlement`], which is present exactly when the order is
//! CLOSED, and the assigned technician is an `Option` that
//! [`Order::check_invariants`] ties to the status.

mod patch;
mod status;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use patch::{EditableField, FieldChange, OrderPatch, PatchError};
pub use status::{OrderStatus, StatusParseError};

use super::{MessageId, OrderId, TechnicianId, UserId, normalize_phone};

/// Default client name used when a source does not provide one.
pub const DEFAULT_CLIENT_NAME: &str = "Client";

/// Money recorded when an order is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Money {
    pub total_amount: Decimal,
    pub materials_cost: Decimal,
}

impl Money {
    /// `total_amount - materials_cost`.
    pub fn net(&self) -> Decimal {
        self.total_amount - self.materials_cost
    }
}

/// Bonus flags recorded when an order is closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseFlags {
    pub has_review: bool,
    pub out_of_city: bool,
}

/// Financial outcome of a closed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub total_amount: Decimal,
    pub materials_cost: Decimal,
    pub technician_share: Decimal,
    pub company_share: Decimal,
    pub has_review: bool,
    pub out_of_city: bool,
}

impl Settlement {
    /// Net profit the shares are split from.
    pub fn net(&self) -> Decimal {
        self.total_amount - self.materials_cost
    }
}

/// Terms recorded when an order moves into long repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LongRepairTerms {
    pub estimated_completion: String,
    pub prepayment: Decimal,
}

/// Input for order creation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    pub equipment_type: String,
    pub problem_description: String,
    #[serde(default)]
    pub client_name: Option<String>,
    pub client_address: String,
    #[serde(default)]
    pub client_phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Scheduled-arrival phrase as spoken by the client.
    #[serde(default)]
    pub scheduled_time: Option<String>,
    /// Instant the phrase resolves to, when known.
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Upstream message the order was ingested from.
    #[serde(default)]
    pub source_message_id: Option<MessageId>,
}

/// Normalised, validated draft ready for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidDraft {
    pub equipment_type: String,
    pub problem_description: String,
    pub client_name: String,
    pub client_address: String,
    pub client_phone: Option<String>,
    pub notes: Option<String>,
    pub scheduled_time: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub source_message_id: Option<MessageId>,
}

/// Validation failures for [`OrderDraft`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DraftError {
    #[error("{0} must not be empty")]
    Missing(&'static str),
    #[error("client phone `{0}` is not a valid number")]
    InvalidPhone(String),
}

fn required(value: &str, field: &'static str) -> Result<String, DraftError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DraftError::Missing(field));
    }
    Ok(trimmed.to_owned())
}

fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
}

impl OrderDraft {
    /// Trim text, default the client name and normalise the phone.
    pub fn validate(&self) -> Result<ValidDraft, DraftError> {
        let client_phone = match optional(self.client_phone.as_deref()) {
            Some(raw) => Some(normalize_phone(&raw).ok_or(DraftError::InvalidPhone(raw))?),
            None => None,
        };
        Ok(ValidDraft {
            equipment_type: required(&self.equipment_type, "equipment_type")?,
            problem_description: required(&self.problem_description, "problem_description")?,
            client_name: optional(self.client_name.as_deref())
                .unwrap_or_else(|| DEFAULT_CLIENT_NAME.to_owned()),
            client_address: required(&self.client_address, "client_address")?,
            client_phone,
            notes: optional(self.notes.as_deref()),
            scheduled_time: optional(self.scheduled_time.as_deref()),
            scheduled_at: self.scheduled_at,
            source_message_id: self.source_message_id,
        })
    }
}

/// A repair request tracked through its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub equipment_type: String,
    pub problem_description: String,
    pub client_name: String,
    pub client_address: String,
    pub client_phone: Option<String>,
    pub notes: Option<String>,
    pub scheduled_time: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub source_message_id: Option<MessageId>,

    pub status: OrderStatus,
    pub assigned_technician: Option<TechnicianId>,
    /// Creator principal; `None` for ingested orders.
    pub dispatcher: Option<UserId>,
    pub refuse_reason: Option<String>,

    pub estimated_completion: Option<String>,
    pub prepayment: Option<Decimal>,

    pub reschedule_count: i32,
    pub last_rescheduled_at: Option<DateTime<Utc>>,
    pub reschedule_reason: Option<String>,

    pub settlement: Option<Settlement>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
}

/// Violated order invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("status {status} requires an assigned technician")]
    MissingTechnician { status: OrderStatus },
    #[error("status {status} must not have an assigned technician")]
    UnexpectedTechnician { status: OrderStatus },
    #[error("money fields must be present exactly when the order is CLOSED")]
    SettlementMismatch,
    #[error("shares do not add up to the net amount")]
    UnbalancedShares,
    #[error("version must be positive")]
    InvalidVersion,
}

/// Tolerance allowed between the split and the net amount.
pub fn share_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

impl Order {
    /// Build the first image of an order from a validated draft.
    pub fn from_draft(
        id: OrderId,
        draft: ValidDraft,
        dispatcher: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            equipment_type: draft.equipment_type,
            problem_description: draft.problem_description,
            client_name: draft.client_name,
            client_address: draft.client_address,
            client_phone: draft.client_phone,
            notes: draft.notes,
            scheduled_time: draft.scheduled_time,
            scheduled_at: draft.scheduled_at,
            source_message_id: draft.source_message_id,
            status: OrderStatus::New,
            assigned_technician: None,
            dispatcher,
            refuse_reason: None,
            estimated_completion: None,
            prepayment: None,
            reschedule_count: 0,
            last_rescheduled_at: None,
            reschedule_reason: None,
            settlement: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            version: 1,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Check the per-order invariants.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        match (self.status.requires_technician(), self.assigned_technician) {
            (true, None) => {
                return Err(InvariantViolation::MissingTechnician {
                    status: self.status,
                });
            }
            (false, Some(_)) => {
                return Err(InvariantViolation::UnexpectedTechnician {
                    status: self.status,
                });
            }
            _ => {}
        }
        match (self.status == OrderStatus::Closed, &self.settlement) {
            (true, Some(settlement)) => {
                let split = settlement.technician_share + settlement.company_share;
                if (split - settlement.net()).abs() > share_tolerance() {
                    return Err(InvariantViolation::UnbalancedShares);
                }
            }
            (false, None) => {}
            _ => return Err(InvariantViolation::SettlementMismatch),
        }
        if self.version < 1 {
            return Err(InvariantViolation::InvalidVersion);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use rust_decimal_macros::dec;

    use super::*;

    #[fixture]
    fn draft() -> OrderDraft {
        OrderDraft {
            equipment_type: "Washing machine".to_owned(),
            problem_description: " not spinning ".to_owned(),
            client_name: Some("I.P.".to_owned()),
            client_address: "Lenina 5-10".to_owned(),
            client_phone: Some("8 900 123 45 67".to_owned()),
            ..OrderDraft::default()
        }
    }

    #[rstest]
    fn validation_trims_and_normalises(draft: OrderDraft) {
        let valid = draft.validate().expect("valid draft");
        assert_eq!(valid.problem_description, "not spinning");
        assert_eq!(valid.client_phone.as_deref(), Some("+79001234567"));
    }

    #[rstest]
    fn missing_client_name_defaults(mut draft: OrderDraft) {
        draft.client_name = Some("  ".to_owned());
        let valid = draft.validate().expect("valid draft");
        assert_eq!(valid.client_name, DEFAULT_CLIENT_NAME);
    }

    #[rstest]
    fn empty_address_is_rejected(mut draft: OrderDraft) {
        draft.client_address = String::new();
        assert_eq!(
            draft.validate(),
            Err(DraftError::Missing("client_address"))
        );
    }

    #[rstest]
    fn invalid_phone_is_rejected(mut draft: OrderDraft) {
        draft.client_phone = Some("12-34".to_owned());
        assert!(matches!(
            draft.validate(),
            Err(DraftError::InvalidPhone(_))
        ));
    }

    #[rstest]
    fn fresh_order_satisfies_invariants(draft: OrderDraft) {
        let order = Order::from_draft(
            OrderId::new(1),
            draft.validate().expect("valid draft"),
            Some(UserId::new(100)),
            Utc::now(),
        );
        assert_eq!(order.check_invariants(), Ok(()));
    }

    #[rstest]
    fn closed_order_without_settlement_is_flagged(draft: OrderDraft) {
        let mut order = Order::from_draft(
            OrderId::new(1),
            draft.validate().expect("valid draft"),
            None,
            Utc::now(),
        );
        order.status = OrderStatus::Closed;
        order.assigned_technician = Some(TechnicianId::new(1));
        assert_eq!(
            order.check_invariants(),
            Err(InvariantViolation::SettlementMismatch)
        );

        order.settlement = Some(Settlement {
            total_amount: dec!(100),
            materials_cost: dec!(10),
            technician_share: dec!(40),
            company_share: dec!(40),
            has_review: false,
            out_of_city: false,
        });
        assert_eq!(
            order.check_invariants(),
            Err(InvariantViolation::UnbalancedShares)
        );
    }
}
