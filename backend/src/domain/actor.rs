//! Who is driving an operation.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Role, RoleSet, UserId};

/// Resolved actor of a core operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    /// The platform itself (ingest confirmations, schedulers).
    System,
    /// A resolved platform user.
    User { id: UserId, roles: RoleSet },
}

impl Actor {
    /// Convenience constructor for a user actor.
    pub fn user(id: UserId, roles: RoleSet) -> Self {
        Self::User { id, roles }
    }

    /// Principal id, absent for the system actor.
    pub fn principal(&self) -> Option<UserId> {
        match self {
            Self::System => None,
            Self::User { id, .. } => Some(*id),
        }
    }

    /// Role tags carried by the actor; the system actor has none.
    pub fn roles(&self) -> RoleSet {
        match self {
            Self::System => RoleSet::unknown(),
            Self::User { roles, .. } => roles.clone(),
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Self::System)
    }

    /// ADMIN or DISPATCHER.
    pub fn is_staff(&self) -> bool {
        matches!(self, Self::User { roles, .. } if roles.is_staff())
    }

    pub fn has_role(&self, role: Role) -> bool {
        matches!(self, Self::User { roles, .. } if roles.contains(role))
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("system"),
            Self::User { id, roles } => write!(f, "{id} [{roles}]"),
        }
    }
}
