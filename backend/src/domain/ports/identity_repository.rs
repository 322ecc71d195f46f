//! Port for users and technicians.

use async_trait::async_trait;

use crate::domain::{
    AuditLogEntry, RoleSet, Technician, TechnicianId, TechnicianProfile, User, UserId,
};

use super::define_port_error;

define_port_error! {
    /// Errors raised by identity repository adapters.
    pub enum IdentityRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "identity repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "identity repository query failed: {message}",
        /// The user version no longer matches the expected one.
        VersionConflict { user_id: UserId, expected_version: i64 } =>
            "user {user_id} no longer has version {expected_version}",
        /// No row matched the mutation.
        Missing { message: String } =>
            "identity record not found: {message}",
    }
}

/// Port for reading and mutating principals.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    /// Any user, tombstoned ones included.
    async fn find_user(&self, id: UserId) -> Result<Option<User>, IdentityRepositoryError>;

    /// Technician with the roles of its user.
    async fn find_technician(
        &self,
        id: TechnicianId,
    ) -> Result<Option<TechnicianProfile>, IdentityRepositoryError>;

    async fn find_technician_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<Technician>, IdentityRepositoryError>;

    /// Live users holding ADMIN or DISPATCHER.
    async fn staff_principals(&self) -> Result<Vec<UserId>, IdentityRepositoryError>;

    /// Replace the role set under the user version CAS and append the audit
    /// entry in the same transaction.
    async fn update_user_roles(
        &self,
        id: UserId,
        roles: RoleSet,
        expected_version: i64,
        audit: AuditLogEntry,
    ) -> Result<User, IdentityRepositoryError>;

    /// Flip the active flag, bump the bound user's version and append the
    /// audit entry in one transaction.
    async fn set_technician_active(
        &self,
        id: TechnicianId,
        active: bool,
        audit: AuditLogEntry,
    ) -> Result<Technician, IdentityRepositoryError>;
}
