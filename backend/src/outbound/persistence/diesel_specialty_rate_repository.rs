//! PostgreSQL-backed `SpecialtyRateRepository`.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::finance::SpecialtyRate;
use crate::domain::ports::{SpecialtyRateRepository, SpecialtyRateRepositoryError};

use super::error_mapping;
use super::models::SpecialtyRateRow;
use super::pool::{DbPool, PoolError};
use super::schema::specialty_rates;

/// Diesel-backed implementation of the specialty rate port.
#[derive(Clone)]
pub struct DieselSpecialtyRateRepository {
    pool: DbPool,
}

impl DieselSpecialtyRateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> SpecialtyRateRepositoryError {
    error_mapping::map_pool_error(error, SpecialtyRateRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> SpecialtyRateRepositoryError {
    error_mapping::map_diesel_error(
        error,
        SpecialtyRateRepositoryError::query,
        SpecialtyRateRepositoryError::connection,
    )
}

impl From<SpecialtyRateRow> for SpecialtyRate {
    fn from(row: SpecialtyRateRow) -> Self {
        Self {
            specialty_name: row.specialty_name,
            technician_percentage: row.technician_percentage,
            company_percentage: row.company_percentage,
            is_default: row.is_default,
            deleted_at: row.deleted_at,
        }
    }
}

#[async_trait]
impl SpecialtyRateRepository for DieselSpecialtyRateRepository {
    async fn list_active(&self) -> Result<Vec<SpecialtyRate>, SpecialtyRateRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = specialty_rates::table
            .filter(specialty_rates::deleted_at.is_null())
            .order_by(specialty_rates::specialty_name.asc())
            .select(SpecialtyRateRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(rows.into_iter().map(SpecialtyRate::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use rust_decimal_macros::dec;

    use super::*;

    #[rstest]
    fn pool_error_maps_to_connection_error() {
        let error = map_pool_error(PoolError::checkout("connection refused"));
        assert!(matches!(
            error,
            SpecialtyRateRepositoryError::Connection { .. }
        ));
    }

    #[rstest]
    fn rows_keep_their_percentages() {
        let rate = SpecialtyRate::from(SpecialtyRateRow {
            specialty_name: "Refrigerators".to_owned(),
            technician_percentage: dec!(60),
            company_percentage: dec!(40),
            is_default: false,
            deleted_at: None,
        });

        assert!(rate.is_balanced());
        assert_eq!(rate.technician_percentage, dec!(60));
    }
}
