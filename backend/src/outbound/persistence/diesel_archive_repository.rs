//! PostgreSQL-backed `ArchiveRepository`.

use async_trait::async_trait;
use diesel_async::RunQueryDsl;

use crate::domain::ArchiveRecord;
use crate::domain::ports::{ArchiveRepository, ArchiveRepositoryError};

use super::error_mapping;
use super::models::NewArchiveRow;
use super::pool::{DbPool, PoolError};
use super::schema::technician_archives;

/// Diesel-backed implementation of the archive port.
#[derive(Clone)]
pub struct DieselArchiveRepository {
    pool: DbPool,
}

impl DieselArchiveRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> ArchiveRepositoryError {
    error_mapping::map_pool_error(error, ArchiveRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> ArchiveRepositoryError {
    error_mapping::map_diesel_error(
        error,
        ArchiveRepositoryError::query,
        ArchiveRepositoryError::connection,
    )
}

impl From<ArchiveRecord> for NewArchiveRow {
    fn from(record: ArchiveRecord) -> Self {
        Self {
            id: record.id,
            technician_id: record.technician_id.get(),
            snapshot_at: record.snapshot_at,
            payload: record.payload,
            order_count: record.order_count,
        }
    }
}

#[async_trait]
impl ArchiveRepository for DieselArchiveRepository {
    async fn save_archive(&self, record: ArchiveRecord) -> Result<(), ArchiveRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(technician_archives::table)
            .values(NewArchiveRow::from(record))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn pool_error_maps_to_connection_error() {
        let error = map_pool_error(PoolError::checkout("connection refused"));

        assert!(matches!(error, ArchiveRepositoryError::Connection { .. }));
        assert!(error.to_string().contains("connection refused"));
    }

    #[rstest]
    fn diesel_error_maps_to_query_error() {
        let error = map_diesel_error(diesel::result::Error::NotFound);
        assert!(matches!(error, ArchiveRepositoryError::Query { .. }));
    }
}
