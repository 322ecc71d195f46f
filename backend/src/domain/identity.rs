//! Principal resolution and technician lifecycle.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::ports::{EventPublisher, IdentityRepository, IdentityRepositoryError};
use super::{
    Actor, AuditAction, AuditLogEntry, CivilClock, DispatchError, DomainEvent, Entity, Role,
    RoleSet, Technician, TechnicianId, User, UserId,
};

pub(crate) fn map_identity_error(error: IdentityRepositoryError) -> DispatchError {
    match error {
        IdentityRepositoryError::Connection { message } => {
            DispatchError::unavailable(format!("identity repository unavailable: {message}"))
        }
        IdentityRepositoryError::Query { message } => {
            DispatchError::internal(format!("identity repository error: {message}"))
        }
        IdentityRepositoryError::VersionConflict {
            user_id,
            expected_version,
        } => DispatchError::concurrent(Entity::User, user_id.get(), expected_version),
        IdentityRepositoryError::Missing { message } => DispatchError::NotFound {
            entity: Entity::User,
            id: message,
        },
    }
}

/// Resolves principals and manages roles and technician activation.
#[derive(Clone)]
pub struct IdentityService {
    identity: Arc<dyn IdentityRepository>,
    events: Arc<dyn EventPublisher>,
    clock: CivilClock,
}

impl IdentityService {
    pub fn new(
        identity: Arc<dyn IdentityRepository>,
        events: Arc<dyn EventPublisher>,
        clock: CivilClock,
    ) -> Self {
        Self {
            identity,
            events,
            clock,
        }
    }

    /// Resolve a principal to an actor. Unknown and tombstoned principals
    /// resolve to `{UNKNOWN}`.
    pub async fn resolve(&self, principal: UserId) -> Result<Actor, DispatchError> {
        let user = self
            .identity
            .find_user(principal)
            .await
            .map_err(map_identity_error)?;
        let roles = user
            .filter(|user| !user.is_deleted())
            .map(|user| user.roles)
            .unwrap_or_default();
        Ok(Actor::user(principal, roles))
    }

    /// Replace a user's roles. ADMIN only.
    #[instrument(skip(self, roles), fields(roles = %roles))]
    pub async fn set_roles(
        &self,
        principal: UserId,
        roles: RoleSet,
        actor: &Actor,
        expected_version: i64,
    ) -> Result<User, DispatchError> {
        if !actor.has_role(Role::Admin) {
            return Err(DispatchError::forbidden("only administrators may change roles"));
        }
        let audit = AuditLogEntry::new(
            actor.principal(),
            AuditAction::RolesChanged,
            format!("user {principal} roles set to {roles}"),
            self.clock.now(),
        );
        let user = self
            .identity
            .update_user_roles(principal, roles, expected_version, audit)
            .await
            .map_err(map_identity_error)?;
        info!(user_id = %principal, version = user.version, "roles updated");
        Ok(user)
    }

    /// Deactivate a technician and announce it so the archive can snapshot
    /// its orders. Staff only; deactivating an inactive technician is a
    /// no-op.
    #[instrument(skip(self, actor), fields(actor = %actor))]
    pub async fn deactivate_technician(
        &self,
        technician_id: TechnicianId,
        actor: &Actor,
    ) -> Result<Technician, DispatchError> {
        if !actor.is_staff() {
            return Err(DispatchError::forbidden(
                "only staff may deactivate technicians",
            ));
        }
        let profile = self
            .identity
            .find_technician(technician_id)
            .await
            .map_err(map_identity_error)?
            .ok_or_else(|| DispatchError::not_found(Entity::Technician, technician_id))?;
        if !profile.technician.is_active {
            return Ok(profile.technician);
        }

        let audit = AuditLogEntry::new(
            actor.principal(),
            AuditAction::TechnicianDeactivated,
            format!("technician {technician_id} deactivated"),
            self.clock.now(),
        );
        let technician = self
            .identity
            .set_technician_active(technician_id, false, audit)
            .await
            .map_err(map_identity_error)?;

        if let Err(error) = self
            .events
            .publish(DomainEvent::TechnicianDeactivated {
                technician_id,
                actor: actor.principal(),
            })
            .await
        {
            warn!(%error, "could not publish technician deactivation");
        }
        Ok(technician)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mockall::predicate::eq;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::domain::ports::{MockEventPublisher, MockIdentityRepository};
    use crate::domain::{ChatId, TechnicianProfile};
    use crate::test_support::fixed_clock;

    #[fixture]
    fn clock() -> CivilClock {
        fixed_clock("2026-03-02T09:00:00Z")
    }

    fn user(id: i64, roles: &[Role], deleted: bool) -> User {
        User {
            id: UserId::new(id),
            username: None,
            display_name: None,
            roles: RoleSet::new(roles.iter().copied()),
            deleted_at: deleted.then(chrono::Utc::now),
            version: 1,
        }
    }

    fn technician(active: bool) -> Technician {
        Technician {
            id: TechnicianId::new(1),
            user_id: UserId::new(10),
            phone: None,
            specialty: None,
            is_active: active,
            is_approved: true,
            work_chat_id: Some(ChatId::new(10)),
        }
    }

    #[rstest]
    #[case(Some(user(5, &[Role::Dispatcher], false)), "DISPATCHER")]
    #[case(Some(user(5, &[Role::Dispatcher], true)), "UNKNOWN")]
    #[case(None, "UNKNOWN")]
    #[tokio::test]
    async fn resolve_maps_missing_and_deleted_users_to_unknown(
        clock: CivilClock,
        #[case] stored: Option<User>,
        #[case] expected: &str,
    ) {
        let mut repo = MockIdentityRepository::new();
        repo.expect_find_user()
            .with(eq(UserId::new(5)))
            .return_once(move |_| Ok(stored));
        let service = IdentityService::new(Arc::new(repo), Arc::new(MockEventPublisher::new()), clock);

        let actor = service.resolve(UserId::new(5)).await.expect("resolved");
        assert_eq!(actor.roles().to_string(), expected);
    }

    #[rstest]
    #[tokio::test]
    async fn set_roles_requires_admin(clock: CivilClock) {
        let service = IdentityService::new(
            Arc::new(MockIdentityRepository::new()),
            Arc::new(MockEventPublisher::new()),
            clock,
        );
        let dispatcher = Actor::user(UserId::new(1), RoleSet::new([Role::Dispatcher]));
        let err = service
            .set_roles(UserId::new(2), RoleSet::new([Role::Master]), &dispatcher, 1)
            .await
            .expect_err("forbidden");
        assert_eq!(err, DispatchError::forbidden("only administrators may change roles"));
    }

    #[rstest]
    #[tokio::test]
    async fn set_roles_surfaces_version_conflicts(clock: CivilClock) {
        let mut repo = MockIdentityRepository::new();
        repo.expect_update_user_roles()
            .return_once(|id, _, version, _| {
                Err(IdentityRepositoryError::version_conflict(id, version))
            });
        let service = IdentityService::new(Arc::new(repo), Arc::new(MockEventPublisher::new()), clock);
        let admin = Actor::user(UserId::new(1), RoleSet::new([Role::Admin]));

        let err = service
            .set_roles(UserId::new(2), RoleSet::new([Role::Master]), &admin, 3)
            .await
            .expect_err("conflict");
        assert_eq!(err, DispatchError::concurrent(Entity::User, 2, 3));
    }

    #[rstest]
    #[tokio::test]
    async fn deactivation_writes_audit_and_publishes(clock: CivilClock) {
        let mut repo = MockIdentityRepository::new();
        repo.expect_find_technician().return_once(|_| {
            Ok(Some(TechnicianProfile {
                technician: technician(true),
                roles: RoleSet::new([Role::Master]),
            }))
        });
        repo.expect_set_technician_active()
            .withf(|id, active, audit| {
                *id == TechnicianId::new(1)
                    && !*active
                    && audit.action == AuditAction::TechnicianDeactivated
            })
            .return_once(|_, _, _| Ok(technician(false)));
        let mut events = MockEventPublisher::new();
        events
            .expect_publish()
            .withf(|event| {
                matches!(
                    event,
                    DomainEvent::TechnicianDeactivated { technician_id, .. }
                        if *technician_id == TechnicianId::new(1)
                )
            })
            .times(1)
            .returning(|_| Ok(()));
        let service = IdentityService::new(Arc::new(repo), Arc::new(events), clock);
        let dispatcher = Actor::user(UserId::new(100), RoleSet::new([Role::Dispatcher]));

        let updated = service
            .deactivate_technician(TechnicianId::new(1), &dispatcher)
            .await
            .expect("deactivated");
        assert!(!updated.is_active);
    }

    #[rstest]
    #[tokio::test]
    async fn deactivating_an_inactive_technician_is_a_no_op(clock: CivilClock) {
        let mut repo = MockIdentityRepository::new();
        repo.expect_find_technician().return_once(|_| {
            Ok(Some(TechnicianProfile {
                technician: technician(false),
                roles: RoleSet::new([Role::Master]),
            }))
        });
        repo.expect_set_technician_active().never();
        let mut events = MockEventPublisher::new();
        events.expect_publish().never();
        let service = IdentityService::new(Arc::new(repo), Arc::new(events), clock);
        let admin = Actor::user(UserId::new(1), RoleSet::new([Role::Admin]));

        service
            .deactivate_technician(TechnicianId::new(1), &admin)
            .await
            .expect("no-op");
    }
}
