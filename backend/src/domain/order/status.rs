//! Order lifecycle status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    Assigned,
    Accepted,
    Onsite,
    /// Long repair: the unit left with the technician.
    #[serde(rename = "DR", alias = "LONG_REPAIR")]
    Dr,
    Closed,
    Refused,
}

impl OrderStatus {
    /// Every status in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::New,
        Self::Assigned,
        Self::Accepted,
        Self::Onsite,
        Self::Dr,
        Self::Closed,
        Self::Refused,
    ];

    /// Statuses duplicate detection considers in flight.
    pub const DUPLICATE_CANDIDATES: [Self; 4] =
        [Self::New, Self::Assigned, Self::Accepted, Self::Onsite];

    /// Canonical storage value.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Assigned => "ASSIGNED",
            Self::Accepted => "ACCEPTED",
            Self::Onsite => "ONSITE",
            Self::Dr => "DR",
            Self::Closed => "CLOSED",
            Self::Refused => "REFUSED",
        }
    }

    /// ASSIGNED, ACCEPTED, ONSITE or DR.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Assigned | Self::Accepted | Self::Onsite | Self::Dr)
    }

    /// CLOSED or REFUSED.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Refused)
    }

    /// Whether an order in this status must reference a technician.
    pub const fn requires_technician(self) -> bool {
        matches!(
            self,
            Self::Assigned | Self::Accepted | Self::Onsite | Self::Dr | Self::Closed
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for status strings outside the canonical set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown order status `{0}`")]
pub struct StatusParseError(pub String);

impl FromStr for OrderStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEW" => Ok(Self::New),
            "ASSIGNED" => Ok(Self::Assigned),
            "ACCEPTED" => Ok(Self::Accepted),
            "ONSITE" => Ok(Self::Onsite),
            "DR" | "LONG_REPAIR" => Ok(Self::Dr),
            "CLOSED" => Ok(Self::Closed),
            "REFUSED" => Ok(Self::Refused),
            other => Err(StatusParseError(other.to_owned())),
        }
    }
}
