//! PostgreSQL-backed ingest telemetry and configuration.
//!
//! Configuration lives in a single row; a missing row reads as the default
//! (enabled, any chat).

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{
    IngestConfigRepository, IngestRepositoryError, IngestTelemetryRepository,
};
use crate::domain::{ChatId, IngestConfig, IngestTelemetry};

use super::error_mapping;
use super::models::{IngestConfigRow, NewTelemetryRow};
use super::pool::{DbPool, PoolError};
use super::schema::{ingest_config, ingest_telemetry};

/// Diesel-backed implementation of both ingest ports.
#[derive(Clone)]
pub struct DieselIngestRepository {
    pool: DbPool,
}

impl DieselIngestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> IngestRepositoryError {
    error_mapping::map_pool_error(error, IngestRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> IngestRepositoryError {
    error_mapping::map_diesel_error(
        error,
        IngestRepositoryError::query,
        IngestRepositoryError::connection,
    )
}

impl<'a> From<&'a IngestTelemetry> for NewTelemetryRow<'a> {
    fn from(event: &'a IngestTelemetry) -> Self {
        Self {
            message_id: event.message_id.get(),
            outcome: event.outcome.as_str(),
            failure_kind: event.failure_kind.map(|kind| kind.as_str()),
            elapsed_micros: event.elapsed_micros,
            recorded_at: event.recorded_at,
        }
    }
}

fn row_to_config(row: Option<IngestConfigRow>) -> IngestConfig {
    row.map_or_else(IngestConfig::default, |row| IngestConfig {
        enabled: row.enabled,
        source_chat_id: row.source_chat_id.map(ChatId::new),
    })
}

#[async_trait]
impl IngestTelemetryRepository for DieselIngestRepository {
    async fn record(&self, event: IngestTelemetry) -> Result<(), IngestRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(ingest_telemetry::table)
            .values(NewTelemetryRow::from(&event))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(())
    }
}

#[async_trait]
impl IngestConfigRepository for DieselIngestRepository {
    async fn load(&self) -> Result<IngestConfig, IngestRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = ingest_config::table
            .select(IngestConfigRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        Ok(row_to_config(row))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rstest::rstest;

    use super::*;
    use crate::domain::{MessageId, ParseFailureKind, TelemetryOutcome};

    #[rstest]
    fn pool_error_maps_to_connection_error() {
        let error = map_pool_error(PoolError::checkout("connection refused"));
        assert!(matches!(error, IngestRepositoryError::Connection { .. }));
    }

    #[rstest]
    fn missing_config_row_reads_as_default() {
        assert_eq!(row_to_config(None), IngestConfig::default());
    }

    #[rstest]
    fn stored_config_restricts_the_source_chat() {
        let config = row_to_config(Some(IngestConfigRow {
            enabled: false,
            source_chat_id: Some(-200),
        }));

        assert!(!config.enabled);
        assert_eq!(config.source_chat_id, Some(ChatId::new(-200)));
    }

    #[rstest]
    fn telemetry_rows_use_storage_tags() {
        let event = IngestTelemetry {
            message_id: MessageId::new(12345),
            outcome: TelemetryOutcome::Failure,
            failure_kind: Some(ParseFailureKind::MissingFields),
            elapsed_micros: 420,
            recorded_at: Utc::now(),
        };

        let row = NewTelemetryRow::from(&event);

        assert_eq!(row.outcome, "failure");
        assert_eq!(row.failure_kind, Some("missing_fields"));
    }
}
