//! Technician archive snapshots.
//!
//! When a technician is deactivated every order they ever held is frozen into
//! one immutable [`ArchiveRecord`]. The record is written in a single call so
//! it either exists in full or not at all.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::order_service::map_order_error;
use super::ports::{
    ArchiveRepository, ArchiveRepositoryError, AuditLogRepository, DomainEventHandler,
    OrderRepository,
};
use super::{
    AuditAction, AuditLogEntry, CivilClock, DispatchError, DomainEvent, TechnicianId, UserId,
};

/// Immutable snapshot of one technician's orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRecord {
    pub id: Uuid,
    pub technician_id: TechnicianId,
    pub snapshot_at: DateTime<Utc>,
    /// JSON array of the order images.
    pub payload: serde_json::Value,
    pub order_count: i64,
}

fn map_archive_error(error: ArchiveRepositoryError) -> DispatchError {
    match error {
        ArchiveRepositoryError::Connection { message } => {
            DispatchError::unavailable(format!("archive repository unavailable: {message}"))
        }
        ArchiveRepositoryError::Query { message } => {
            DispatchError::internal(format!("archive repository error: {message}"))
        }
    }
}

pub struct ArchiveService {
    orders: Arc<dyn OrderRepository>,
    archives: Arc<dyn ArchiveRepository>,
    audit: Arc<dyn AuditLogRepository>,
    clock: CivilClock,
}

impl ArchiveService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        archives: Arc<dyn ArchiveRepository>,
        audit: Arc<dyn AuditLogRepository>,
        clock: CivilClock,
    ) -> Self {
        Self {
            orders,
            archives,
            audit,
            clock,
        }
    }

    /// Snapshot all orders of a technician, tombstoned ones included.
    pub async fn archive_technician(
        &self,
        technician_id: TechnicianId,
        actor: Option<UserId>,
    ) -> Result<ArchiveRecord, DispatchError> {
        let mut orders = self
            .orders
            .orders_for_technician(technician_id)
            .await
            .map_err(map_order_error)?;
        orders.sort_by_key(|order| order.id);
        let order_count = i64::try_from(orders.len()).unwrap_or(i64::MAX);
        let payload = serde_json::to_value(&orders)
            .map_err(|error| DispatchError::internal(format!("archive encoding failed: {error}")))?;
        let record = ArchiveRecord {
            id: Uuid::new_v4(),
            technician_id,
            snapshot_at: self.clock.now(),
            payload,
            order_count,
        };
        self.archives
            .save_archive(record.clone())
            .await
            .map_err(map_archive_error)?;

        info!(archive_id = %record.id, %technician_id, order_count, "technician archived");
        let entry = AuditLogEntry::new(
            actor,
            AuditAction::ArchiveCreated,
            format!("archived {order_count} order(s) of technician {technician_id}"),
            record.snapshot_at,
        );
        if let Err(error) = self.audit.append(entry).await {
            warn!(%error, "could not record archive creation");
        }
        Ok(record)
    }
}

#[async_trait]
impl DomainEventHandler for ArchiveService {
    async fn handle(&self, event: &DomainEvent) {
        if let DomainEvent::TechnicianDeactivated {
            technician_id,
            actor,
        } = event
        {
            if let Err(error) = self.archive_technician(*technician_id, *actor).await {
                warn!(%error, %technician_id, "technician archive failed");
            }
        }
    }
}
