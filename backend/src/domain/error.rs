//! Domain-level error types.
//!
//! These errors are transport agnostic. Inbound adapters map them to HTTP
//! responses or any other protocol-specific envelope via [`ErrorCode`].

use serde::{Deserialize, Serialize};

use super::finance::FinanceError;
use super::state_machine::InvalidTransition;
use super::{DraftError, OrderStatus, PatchError, RoleSet, TechnicianId, UnavailableReason};

/// Stable machine-readable error code describing the failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The request is malformed or fails validation.
    InvalidRequest,
    /// Authenticated but not permitted to perform this action.
    Forbidden,
    /// The requested resource does not exist.
    NotFound,
    /// The request conflicts with the current state of the resource.
    Conflict,
    /// A dependency is temporarily unavailable.
    ServiceUnavailable,
    /// An unexpected error occurred inside the domain.
    InternalError,
}

/// Entity named by [`DispatchError::NotFound`] and
/// [`DispatchError::ConcurrentModification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Order,
    User,
    Technician,
    Report,
    Confirmation,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Order => "order",
            Self::User => "user",
            Self::Technician => "technician",
            Self::Report => "report",
            Self::Confirmation => "confirmation",
        };
        f.write_str(name)
    }
}

/// Structured failure of a core operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("transition {from:?} -> {to} is not allowed for [{roles}]")]
    InvalidTransition {
        from: Option<OrderStatus>,
        to: OrderStatus,
        roles: RoleSet,
    },
    #[error("{entity} {id} was modified concurrently (expected version {expected_version})")]
    ConcurrentModification {
        entity: Entity,
        id: i64,
        expected_version: i64,
    },
    #[error("technician {technician_id} is unavailable: {reason}")]
    TechnicianUnavailable {
        technician_id: TechnicianId,
        reason: UnavailableReason,
    },
    #[error("net amount is negative")]
    NegativeNet,
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: String },
    #[error("{message}")]
    Validation { message: String },
    #[error("{message}")]
    Forbidden { message: String },
    #[error("{message}")]
    Unavailable { message: String },
    #[error("{message}")]
    Internal { message: String },
}

impl DispatchError {
    pub fn not_found(entity: Entity, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn concurrent(entity: Entity, id: i64, expected_version: i64) -> Self {
        Self::ConcurrentModification {
            entity,
            id,
            expected_version,
        }
    }

    /// Stable machine-readable error code.
    ///
    /// # Examples
    /// ```
    /// use dispatch_backend::domain::{DispatchError, Entity, ErrorCode};
    ///
    /// let err = DispatchError::concurrent(Entity::Order, 7, 4);
    /// assert_eq!(err.code(), ErrorCode::Conflict);
    /// ```
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidTransition { .. }
            | Self::ConcurrentModification { .. }
            | Self::TechnicianUnavailable { .. } => ErrorCode::Conflict,
            Self::NegativeNet | Self::Validation { .. } => ErrorCode::InvalidRequest,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Forbidden { .. } => ErrorCode::Forbidden,
            Self::Unavailable { .. } => ErrorCode::ServiceUnavailable,
            Self::Internal { .. } => ErrorCode::InternalError,
        }
    }
}

impl From<InvalidTransition> for DispatchError {
    fn from(value: InvalidTransition) -> Self {
        Self::InvalidTransition {
            from: value.from,
            to: value.to,
            roles: value.roles,
        }
    }
}

impl From<FinanceError> for DispatchError {
    fn from(value: FinanceError) -> Self {
        match value {
            FinanceError::NegativeNet { .. } => Self::NegativeNet,
        }
    }
}

impl From<DraftError> for DispatchError {
    fn from(value: DraftError) -> Self {
        Self::validation(value.to_string())
    }
}

impl From<PatchError> for DispatchError {
    fn from(value: PatchError) -> Self {
        Self::validation(value.to_string())
    }
}
