//! Port for the specialty-rate override table.

use async_trait::async_trait;

use crate::domain::finance::SpecialtyRate;

use super::define_port_error;

define_port_error! {
    /// Errors raised by specialty rate adapters.
    pub enum SpecialtyRateRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "specialty rate repository connection failed: {message}",
        /// Query failed during execution.
        Query { message: String } =>
            "specialty rate repository query failed: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpecialtyRateRepository: Send + Sync {
    /// Rates without a tombstone.
    async fn list_active(&self) -> Result<Vec<SpecialtyRate>, SpecialtyRateRepositoryError>;
}

/// Fixture implementation with an empty rate table.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureSpecialtyRateRepository;

#[async_trait]
impl SpecialtyRateRepository for FixtureSpecialtyRateRepository {
    async fn list_active(&self) -> Result<Vec<SpecialtyRate>, SpecialtyRateRepositoryError> {
        Ok(Vec::new())
    }
}
