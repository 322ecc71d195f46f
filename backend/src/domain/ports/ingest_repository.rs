//! Ports for ingest telemetry and the ingest source configuration.

use async_trait::async_trait;

use crate::domain::{IngestConfig, IngestTelemetry};

use super::define_port_error;

define_port_error! {
    /// Errors raised by ingest persistence adapters.
    pub enum IngestRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "ingest repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "ingest repository query failed: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IngestTelemetryRepository: Send + Sync {
    async fn record(&self, event: IngestTelemetry) -> Result<(), IngestRepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IngestConfigRepository: Send + Sync {
    /// The singleton configuration row; defaults when absent.
    async fn load(&self) -> Result<IngestConfig, IngestRepositoryError>;
}

/// Fixture configuration: ingest enabled for any source.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureIngestConfigRepository;

#[async_trait]
impl IngestConfigRepository for FixtureIngestConfigRepository {
    async fn load(&self) -> Result<IngestConfig, IngestRepositoryError> {
        Ok(IngestConfig {
            enabled: true,
            source_chat_id: None,
        })
    }
}
