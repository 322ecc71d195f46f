//! Port for immutable technician archive records.

use async_trait::async_trait;

use crate::domain::ArchiveRecord;

use super::define_port_error;

define_port_error! {
    /// Errors raised by archive adapters.
    pub enum ArchiveRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "archive repository connection failed: {message}",
        /// Insert failed during execution.
        Query { message: String } =>
            "archive repository write failed: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArchiveRepository: Send + Sync {
    /// Store the record as a single row; either all of it persists or none.
    async fn save_archive(&self, record: ArchiveRecord) -> Result<(), ArchiveRepositoryError>;
}
