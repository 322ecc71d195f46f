//! PostgreSQL-backed `IdentityRepository`.
//!
//! Role sets are stored as a comma-separated sorted list. Role changes and
//! technician activation both bump the owning user's version under a CAS so
//! concurrent administrators cannot silently overwrite each other.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};

use crate::domain::ports::{IdentityRepository, IdentityRepositoryError};
use crate::domain::{
    AuditLogEntry, ChatId, RoleSet, Technician, TechnicianId, TechnicianProfile, User, UserId,
};

use super::diesel_audit_log_repository::insert_audit_rows;
use super::error_mapping;
use super::models::{TechnicianRow, UserRow};
use super::pool::{DbPool, PoolError};
use super::schema::{technicians, users};

/// Diesel-backed implementation of the identity port.
#[derive(Clone)]
pub struct DieselIdentityRepository {
    pool: DbPool,
}

impl DieselIdentityRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> IdentityRepositoryError {
    error_mapping::map_pool_error(error, IdentityRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> IdentityRepositoryError {
    error_mapping::map_diesel_error(
        error,
        IdentityRepositoryError::query,
        IdentityRepositoryError::connection,
    )
}

/// Failure inside an identity transaction.
#[derive(Debug)]
enum TxError {
    Diesel(diesel::result::Error),
    Repository(IdentityRepositoryError),
}

impl From<diesel::result::Error> for TxError {
    fn from(error: diesel::result::Error) -> Self {
        Self::Diesel(error)
    }
}

impl From<TxError> for IdentityRepositoryError {
    fn from(error: TxError) -> Self {
        match error {
            TxError::Diesel(error) => map_diesel_error(error),
            TxError::Repository(error) => error,
        }
    }
}

fn row_to_user(row: UserRow) -> Result<User, IdentityRepositoryError> {
    let roles = row
        .roles
        .parse::<RoleSet>()
        .map_err(|err| IdentityRepositoryError::query(err.to_string()))?;
    Ok(User {
        id: UserId::new(row.id),
        username: row.username,
        display_name: row.display_name,
        roles,
        deleted_at: row.deleted_at,
        version: row.version,
    })
}

impl From<TechnicianRow> for Technician {
    fn from(row: TechnicianRow) -> Self {
        Self {
            id: TechnicianId::new(row.id),
            user_id: UserId::new(row.user_id),
            phone: row.phone,
            specialty: row.specialty,
            is_active: row.is_active,
            is_approved: row.is_approved,
            work_chat_id: row.work_chat_id.map(ChatId::new),
        }
    }
}

/// Roles of a technician's user; a missing or tombstoned user has none.
fn profile_roles(user: Option<UserRow>) -> Result<RoleSet, IdentityRepositoryError> {
    match user {
        Some(row) if row.deleted_at.is_none() => row_to_user(row).map(|user| user.roles),
        _ => Ok(RoleSet::unknown()),
    }
}

#[async_trait]
impl IdentityRepository for DieselIdentityRepository {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, IdentityRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = users::table
            .filter(users::id.eq(id.get()))
            .select(UserRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_user).transpose()
    }

    async fn find_technician(
        &self,
        id: TechnicianId,
    ) -> Result<Option<TechnicianProfile>, IdentityRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = technicians::table
            .left_join(users::table)
            .filter(technicians::id.eq(id.get()))
            .select((
                TechnicianRow::as_select(),
                Option::<UserRow>::as_select(),
            ))
            .first::<(TechnicianRow, Option<UserRow>)>(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        row.map(|(technician, user)| {
            Ok(TechnicianProfile {
                technician: technician.into(),
                roles: profile_roles(user)?,
            })
        })
        .transpose()
    }

    async fn find_technician_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<Technician>, IdentityRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = technicians::table
            .filter(technicians::user_id.eq(user_id.get()))
            .select(TechnicianRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        Ok(row.map(Technician::from))
    }

    async fn staff_principals(&self) -> Result<Vec<UserId>, IdentityRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = users::table
            .filter(users::deleted_at.is_null())
            .order_by(users::id.asc())
            .select(UserRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        let mut staff = Vec::new();
        for row in rows {
            let user = row_to_user(row)?;
            if user.roles.is_staff() {
                staff.push(user.id);
            }
        }
        Ok(staff)
    }

    async fn update_user_roles(
        &self,
        id: UserId,
        roles: RoleSet,
        expected_version: i64,
        audit: AuditLogEntry,
    ) -> Result<User, IdentityRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = conn
            .transaction(|conn| {
                async move {
                    let updated = diesel::update(
                        users::table
                            .filter(users::id.eq(id.get()))
                            .filter(users::version.eq(expected_version)),
                    )
                    .set((
                        users::roles.eq(roles.to_string()),
                        users::version.eq(users::version + 1),
                    ))
                    .returning(UserRow::as_returning())
                    .get_result::<UserRow>(conn)
                    .await
                    .optional()?;

                    let Some(row) = updated else {
                        let exists = users::table
                            .filter(users::id.eq(id.get()))
                            .select(users::id)
                            .first::<i64>(conn)
                            .await
                            .optional()?
                            .is_some();
                        return Err(TxError::Repository(if exists {
                            IdentityRepositoryError::version_conflict(id, expected_version)
                        } else {
                            IdentityRepositoryError::missing(format!("user {id}"))
                        }));
                    };
                    insert_audit_rows(conn, std::slice::from_ref(&audit)).await?;
                    Ok(row)
                }
                .scope_boxed()
            })
            .await?;
        row_to_user(row)
    }

    async fn set_technician_active(
        &self,
        id: TechnicianId,
        active: bool,
        audit: AuditLogEntry,
    ) -> Result<Technician, IdentityRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = conn
            .transaction(|conn| {
                async move {
                    let technician = technicians::table
                        .filter(technicians::id.eq(id.get()))
                        .select(TechnicianRow::as_select())
                        .first::<TechnicianRow>(conn)
                        .await
                        .optional()?
                        .ok_or_else(|| {
                            TxError::Repository(IdentityRepositoryError::missing(format!(
                                "technician {id}"
                            )))
                        })?;

                    let current_version = users::table
                        .filter(users::id.eq(technician.user_id))
                        .select(users::version)
                        .first::<i64>(conn)
                        .await
                        .optional()?;
                    if let Some(version) = current_version {
                        let bumped = diesel::update(
                            users::table
                                .filter(users::id.eq(technician.user_id))
                                .filter(users::version.eq(version)),
                        )
                        .set(users::version.eq(version + 1))
                        .execute(conn)
                        .await?;
                        if bumped == 0 {
                            return Err(TxError::Repository(
                                IdentityRepositoryError::version_conflict(
                                    UserId::new(technician.user_id),
                                    version,
                                ),
                            ));
                        }
                    }

                    let updated = diesel::update(technicians::table.find(id.get()))
                        .set(technicians::is_active.eq(active))
                        .returning(TechnicianRow::as_returning())
                        .get_result::<TechnicianRow>(conn)
                        .await?;
                    insert_audit_rows(conn, std::slice::from_ref(&audit)).await?;
                    Ok(updated)
                }
                .scope_boxed()
            })
            .await?;
        Ok(row.into())
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::domain::Role;

    #[fixture]
    fn user_row() -> UserRow {
        UserRow {
            id: 11,
            username: Some("ivan".to_owned()),
            display_name: Some("Ivan".to_owned()),
            roles: "MASTER".to_owned(),
            deleted_at: None,
            version: 3,
        }
    }

    #[rstest]
    fn pool_error_maps_to_connection_error() {
        let error = map_pool_error(PoolError::checkout("connection refused"));

        assert!(matches!(error, IdentityRepositoryError::Connection { .. }));
        assert!(error.to_string().contains("connection refused"));
    }

    #[rstest]
    fn diesel_error_maps_to_query_error() {
        let error = IdentityRepositoryError::from(TxError::Diesel(diesel::result::Error::NotFound));
        assert!(matches!(error, IdentityRepositoryError::Query { .. }));
    }

    #[rstest]
    fn repository_errors_pass_through_transactions() {
        let conflict = IdentityRepositoryError::version_conflict(UserId::new(11), 3_i64);
        let error = IdentityRepositoryError::from(TxError::Repository(conflict.clone()));
        assert_eq!(error, conflict);
    }

    #[rstest]
    fn stored_role_lists_parse(mut user_row: UserRow) {
        user_row.roles = "DISPATCHER,SENIOR_MASTER".to_owned();

        let user = row_to_user(user_row).expect("valid roles");
        assert!(user.roles.contains(Role::Dispatcher));
        assert!(user.roles.contains(Role::SeniorMaster));
        assert_eq!(user.version, 3);
    }

    #[rstest]
    fn unknown_roles_are_query_errors(mut user_row: UserRow) {
        user_row.roles = "OWNER".to_owned();

        let error = row_to_user(user_row).expect_err("unknown role");
        assert!(matches!(error, IdentityRepositoryError::Query { .. }));
    }

    #[rstest]
    fn tombstoned_users_lend_no_roles(mut user_row: UserRow) {
        user_row.deleted_at = Some(chrono::Utc::now());

        let roles = profile_roles(Some(user_row)).expect("roles");
        assert_eq!(roles, RoleSet::unknown());
        assert_eq!(profile_roles(None).expect("roles"), RoleSet::unknown());
    }
}
