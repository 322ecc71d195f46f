//! Port for the append-only audit log.

use async_trait::async_trait;

use crate::domain::AuditLogEntry;

use super::define_port_error;

define_port_error! {
    /// Errors raised when appending audit entries.
    pub enum AuditLogRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "audit log connection failed: {message}",
        /// Insert failed during execution.
        Query { message: String } =>
            "audit log write failed: {message}",
    }
}

/// Port for writing audit entries outside an order transaction.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn append(&self, entry: AuditLogEntry) -> Result<(), AuditLogRepositoryError>;
}
