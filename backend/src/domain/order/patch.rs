//! Whitelisted field edits.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Order;
use crate::domain::normalize_phone;

/// Fields an order edit may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditableField {
    EquipmentType,
    ProblemDescription,
    ClientName,
    ClientAddress,
    ClientPhone,
    Notes,
    ScheduledTime,
    EstimatedCompletion,
    Prepayment,
    RefuseReason,
}

impl EditableField {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EquipmentType => "equipment_type",
            Self::ProblemDescription => "problem_description",
            Self::ClientName => "client_name",
            Self::ClientAddress => "client_address",
            Self::ClientPhone => "client_phone",
            Self::Notes => "notes",
            Self::ScheduledTime => "scheduled_time",
            Self::EstimatedCompletion => "estimated_completion",
            Self::Prepayment => "prepayment",
            Self::RefuseReason => "refuse_reason",
        }
    }

    /// Fields that may never be cleared.
    const fn is_required(self) -> bool {
        matches!(
            self,
            Self::EquipmentType | Self::ProblemDescription | Self::ClientName | Self::ClientAddress
        )
    }

    fn current(self, order: &Order) -> Option<String> {
        match self {
            Self::EquipmentType => Some(order.equipment_type.clone()),
            Self::ProblemDescription => Some(order.problem_description.clone()),
            Self::ClientName => Some(order.client_name.clone()),
            Self::ClientAddress => Some(order.client_address.clone()),
            Self::ClientPhone => order.client_phone.clone(),
            Self::Notes => order.notes.clone(),
            Self::ScheduledTime => order.scheduled_time.clone(),
            Self::EstimatedCompletion => order.estimated_completion.clone(),
            Self::Prepayment => order.prepayment.map(|value| value.normalize().to_string()),
            Self::RefuseReason => order.refuse_reason.clone(),
        }
    }
}

impl fmt::Display for EditableField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EditableField {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let field = match s {
            "equipment_type" | "equipmentType" => Self::EquipmentType,
            "problem_description" | "problemDescription" => Self::ProblemDescription,
            "client_name" | "clientName" => Self::ClientName,
            "client_address" | "clientAddress" => Self::ClientAddress,
            "client_phone" | "clientPhone" => Self::ClientPhone,
            "notes" => Self::Notes,
            "scheduled_time" | "scheduledTime" => Self::ScheduledTime,
            "estimated_completion" | "estimatedCompletion" => Self::EstimatedCompletion,
            "prepayment" => Self::Prepayment,
            "refuse_reason" | "refuseReason" => Self::RefuseReason,
            other => return Err(PatchError::NotEditable(other.to_owned())),
        };
        Ok(field)
    }
}

/// Rejected edit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("field `{0}` is not editable")]
    NotEditable(String),
    #[error("field `{0}` may not be cleared")]
    Required(EditableField),
    #[error("field `{field}` has an invalid value `{value}`")]
    InvalidValue { field: EditableField, value: String },
}

/// A set of field edits; `None` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderPatch {
    edits: BTreeMap<EditableField, Option<String>>,
}

impl OrderPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one edit.
    pub fn set(mut self, field: EditableField, value: Option<impl Into<String>>) -> Self {
        self.edits.insert(field, value.map(Into::into));
        self
    }

    /// Build a patch from raw field names, rejecting anything outside the
    /// whitelist.
    pub fn from_raw<I, K>(entries: I) -> Result<Self, PatchError>
    where
        I: IntoIterator<Item = (K, Option<String>)>,
        K: AsRef<str>,
    {
        let mut edits = BTreeMap::new();
        for (name, value) in entries {
            edits.insert(name.as_ref().parse::<EditableField>()?, value);
        }
        Ok(Self { edits })
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn touches(&self, field: EditableField) -> bool {
        self.edits.contains_key(&field)
    }

    /// Apply the edits and return one change per field whose value actually
    /// changed. The order is left untouched on error.
    pub fn apply(&self, order: &mut Order) -> Result<Vec<FieldChange>, PatchError> {
        let mut staged = order.clone();
        let mut changes = Vec::new();
        for (&field, value) in &self.edits {
            let normalised = normalise(field, value.as_deref())?;
            let old = field.current(&staged);
            if old == normalised {
                continue;
            }
            write(field, &mut staged, normalised.clone())?;
            changes.push(FieldChange {
                field,
                old_value: old,
                new_value: normalised.unwrap_or_default(),
            });
        }
        *order = staged;
        Ok(changes)
    }
}

fn normalise(field: EditableField, value: Option<&str>) -> Result<Option<String>, PatchError> {
    let value = value.map(str::trim).filter(|text| !text.is_empty());
    match (field, value) {
        (field, None) if field.is_required() => Err(PatchError::Required(field)),
        (_, None) => Ok(None),
        (EditableField::ClientPhone, Some(raw)) => normalize_phone(raw)
            .map(Some)
            .ok_or_else(|| PatchError::InvalidValue {
                field,
                value: raw.to_owned(),
            }),
        (EditableField::Prepayment, Some(raw)) => parse_amount(raw)
            .map(|amount| Some(amount.to_string()))
            .ok_or_else(|| PatchError::InvalidValue {
                field,
                value: raw.to_owned(),
            }),
        (_, Some(text)) => Ok(Some(text.to_owned())),
    }
}

fn parse_amount(raw: &str) -> Option<Decimal> {
    let amount = Decimal::from_str(&raw.replace(',', ".")).ok()?;
    (amount >= Decimal::ZERO).then(|| amount.round_dp(2).normalize())
}

fn write(field: EditableField, order: &mut Order, value: Option<String>) -> Result<(), PatchError> {
    match field {
        EditableField::EquipmentType => order.equipment_type = value.unwrap_or_default(),
        EditableField::ProblemDescription => order.problem_description = value.unwrap_or_default(),
        EditableField::ClientName => order.client_name = value.unwrap_or_default(),
        EditableField::ClientAddress => order.client_address = value.unwrap_or_default(),
        EditableField::ClientPhone => order.client_phone = value,
        EditableField::Notes => order.notes = value,
        EditableField::ScheduledTime => order.scheduled_time = value,
        EditableField::EstimatedCompletion => order.estimated_completion = value,
        EditableField::Prepayment => {
            order.prepayment = match value {
                Some(raw) => Some(parse_amount(&raw).ok_or(PatchError::InvalidValue {
                    field,
                    value: raw.clone(),
                })?),
                None => None,
            };
        }
        EditableField::RefuseReason => order.refuse_reason = value,
    }
    Ok(())
}

/// One recorded change of a whitelisted field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: EditableField,
    pub old_value: Option<String>,
    /// Empty when the field was cleared.
    pub new_value: String,
}
