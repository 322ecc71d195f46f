//! Legal order transitions and who may drive them.
//!
//! The transition graph is a fixed table keyed by `(from, to)`. Each row names
//! the actor classes allowed to take the edge: back-office staff, the system
//! itself, or the technician holding the order. [`validate`] is pure; the
//! "holding the order" part of a technician permit is checked by the caller,
//! which is the only place that knows who the assigned technician is.

use std::fmt;

use super::{Actor, OrderStatus, RoleSet};

/// Actor classes a table row may admit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Allowed {
    staff: bool,
    system: bool,
    technician: bool,
}

const STAFF: Allowed = Allowed {
    staff: true,
    system: false,
    technician: false,
};
const STAFF_OR_SYSTEM: Allowed = Allowed {
    staff: true,
    system: true,
    technician: false,
};
const TECHNICIAN: Allowed = Allowed {
    staff: false,
    system: false,
    technician: true,
};
const STAFF_OR_TECHNICIAN: Allowed = Allowed {
    staff: true,
    system: false,
    technician: true,
};

fn allowed(from: Option<OrderStatus>, to: OrderStatus) -> Option<Allowed> {
    use OrderStatus::{Accepted, Assigned, Closed, Dr, New, Onsite, Refused};

    match (from, to) {
        (None, New) => Some(STAFF_OR_SYSTEM),
        (Some(New), Assigned) => Some(STAFF),
        (Some(Assigned), Accepted) => Some(TECHNICIAN),
        (Some(Assigned), New) => Some(STAFF_OR_TECHNICIAN),
        (Some(Accepted), Onsite) => Some(TECHNICIAN),
        (Some(Accepted), New) => Some(STAFF_OR_TECHNICIAN),
        (Some(Onsite), Closed) => Some(TECHNICIAN),
        (Some(Onsite), Dr) => Some(TECHNICIAN),
        (Some(Onsite), Refused) => Some(STAFF_OR_TECHNICIAN),
        (Some(Dr), Closed) => Some(TECHNICIAN),
        (Some(Dr), Refused) => Some(STAFF),
        _ => None,
    }
}

/// Capacity in which a validated transition was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    /// ADMIN or DISPATCHER.
    Staff,
    /// The platform itself.
    System,
    /// A MASTER or SENIOR_MASTER; only valid for the technician holding the
    /// order.
    AssignedTechnician,
}

/// Rejected transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transition {} -> {to} is not allowed for [{roles}]", display_from(.from))]
pub struct InvalidTransition {
    pub from: Option<OrderStatus>,
    pub to: OrderStatus,
    pub roles: RoleSet,
}

fn display_from(from: &Option<OrderStatus>) -> DisplayFrom {
    DisplayFrom(*from)
}

struct DisplayFrom(Option<OrderStatus>);

impl fmt::Display for DisplayFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(status) => status.fmt(f),
            None => f.write_str("(none)"),
        }
    }
}

/// Validate a proposed transition against the table.
///
/// # Examples
/// ```
/// use dispatch_backend::domain::state_machine::{validate, Permit};
/// use dispatch_backend::domain::{Actor, OrderStatus, Role, RoleSet, UserId};
///
/// let dispatcher = Actor::user(UserId::new(100), RoleSet::new([Role::Dispatcher]));
/// assert_eq!(
///     validate(Some(OrderStatus::New), OrderStatus::Assigned, &dispatcher),
///     Ok(Permit::Staff)
/// );
/// assert!(validate(Some(OrderStatus::New), OrderStatus::Closed, &dispatcher).is_err());
/// ```
pub fn validate(
    from: Option<OrderStatus>,
    to: OrderStatus,
    actor: &Actor,
) -> Result<Permit, InvalidTransition> {
    let reject = || InvalidTransition {
        from,
        to,
        roles: actor.roles(),
    };
    let Some(row) = allowed(from, to) else {
        return Err(reject());
    };

    match actor {
        Actor::System if row.system => Ok(Permit::System),
        Actor::System => Err(reject()),
        Actor::User { roles, .. } => {
            if row.staff && roles.is_staff() {
                Ok(Permit::Staff)
            } else if row.technician && roles.is_technician() {
                Ok(Permit::AssignedTechnician)
            } else {
                Err(reject())
            }
        }
    }
}

/// Whether the edge exists for some actor.
pub fn is_edge(from: Option<OrderStatus>, to: OrderStatus) -> bool {
    allowed(from, to).is_some()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::domain::{Role, UserId};

    fn user(roles: &[Role]) -> Actor {
        Actor::user(UserId::new(1), RoleSet::new(roles.iter().copied()))
    }

    #[rstest]
    #[case(None, OrderStatus::New, &[Role::Dispatcher], Some(Permit::Staff))]
    #[case(None, OrderStatus::New, &[Role::Master], None)]
    #[case(Some(OrderStatus::New), OrderStatus::Assigned, &[Role::Admin], Some(Permit::Staff))]
    #[case(Some(OrderStatus::New), OrderStatus::Assigned, &[Role::Master], None)]
    #[case(Some(OrderStatus::Assigned), OrderStatus::Accepted, &[Role::Master], Some(Permit::AssignedTechnician))]
    #[case(Some(OrderStatus::Assigned), OrderStatus::Accepted, &[Role::Dispatcher], None)]
    #[case(Some(OrderStatus::Assigned), OrderStatus::New, &[Role::SeniorMaster], Some(Permit::AssignedTechnician))]
    #[case(Some(OrderStatus::Accepted), OrderStatus::New, &[Role::Dispatcher], Some(Permit::Staff))]
    #[case(Some(OrderStatus::Accepted), OrderStatus::Onsite, &[Role::Master], Some(Permit::AssignedTechnician))]
    #[case(Some(OrderStatus::Onsite), OrderStatus::Closed, &[Role::Master], Some(Permit::AssignedTechnician))]
    #[case(Some(OrderStatus::Onsite), OrderStatus::Closed, &[Role::Admin], None)]
    #[case(Some(OrderStatus::Onsite), OrderStatus::Dr, &[Role::Master], Some(Permit::AssignedTechnician))]
    #[case(Some(OrderStatus::Onsite), OrderStatus::Refused, &[Role::Dispatcher], Some(Permit::Staff))]
    #[case(Some(OrderStatus::Dr), OrderStatus::Closed, &[Role::SeniorMaster], Some(Permit::AssignedTechnician))]
    #[case(Some(OrderStatus::Dr), OrderStatus::Refused, &[Role::Master], None)]
    #[case(Some(OrderStatus::Dr), OrderStatus::Refused, &[Role::Admin], Some(Permit::Staff))]
    #[case(Some(OrderStatus::New), OrderStatus::Closed, &[Role::Dispatcher], None)]
    #[case(Some(OrderStatus::Closed), OrderStatus::New, &[Role::Admin], None)]
    #[case(Some(OrderStatus::Refused), OrderStatus::Assigned, &[Role::Admin], None)]
    #[case(Some(OrderStatus::Onsite), OrderStatus::Onsite, &[Role::Master], None)]
    fn table_rows(
        #[case] from: Option<OrderStatus>,
        #[case] to: OrderStatus,
        #[case] roles: &[Role],
        #[case] expected: Option<Permit>,
    ) {
        assert_eq!(validate(from, to, &user(roles)).ok(), expected);
    }

    #[rstest]
    fn staff_permit_wins_for_mixed_roles() {
        let actor = user(&[Role::Dispatcher, Role::Master]);
        assert_eq!(
            validate(Some(OrderStatus::Onsite), OrderStatus::Refused, &actor),
            Ok(Permit::Staff)
        );
    }

    #[rstest]
    fn system_may_only_create() {
        assert_eq!(
            validate(None, OrderStatus::New, &Actor::System),
            Ok(Permit::System)
        );
        assert!(validate(Some(OrderStatus::New), OrderStatus::Assigned, &Actor::System).is_err());
    }

    #[rstest]
    fn rejection_carries_actor_roles() {
        let err = validate(
            Some(OrderStatus::New),
            OrderStatus::Closed,
            &user(&[Role::Dispatcher]),
        )
        .expect_err("illegal edge");
        assert_eq!(err.from, Some(OrderStatus::New));
        assert_eq!(err.to, OrderStatus::Closed);
        assert_eq!(err.roles.to_string(), "DISPATCHER");
        assert_eq!(
            err.to_string(),
            "transition NEW -> CLOSED is not allowed for [DISPATCHER]"
        );
    }

    #[rstest]
    fn terminal_states_have_no_exits() {
        for to in OrderStatus::ALL {
            assert!(!is_edge(Some(OrderStatus::Closed), to));
            assert!(!is_edge(Some(OrderStatus::Refused), to));
        }
    }
}
