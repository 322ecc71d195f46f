//! PostgreSQL-backed `AuditLogRepository`.
//!
//! Other adapters append audit rows inside their own transactions through
//! [`insert_audit_rows`]; the port itself serves standalone entries.

use async_trait::async_trait;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::domain::ports::{AuditLogRepository, AuditLogRepositoryError};
use crate::domain::{AuditLogEntry, OrderId, UserId};

use super::error_mapping;
use super::models::NewAuditLogRow;
use super::pool::{DbPool, PoolError};
use super::schema::audit_log;

/// Diesel-backed implementation of the audit log port.
#[derive(Clone)]
pub struct DieselAuditLogRepository {
    pool: DbPool,
}

impl DieselAuditLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> AuditLogRepositoryError {
    error_mapping::map_pool_error(error, AuditLogRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> AuditLogRepositoryError {
    error_mapping::map_diesel_error(
        error,
        AuditLogRepositoryError::query,
        AuditLogRepositoryError::connection,
    )
}

impl<'a> From<&'a AuditLogEntry> for NewAuditLogRow<'a> {
    fn from(entry: &'a AuditLogEntry) -> Self {
        Self {
            actor_id: entry.actor.map(UserId::get),
            action: entry.action.as_str(),
            order_id: entry.order_id.map(OrderId::get),
            details: &entry.details,
            created_at: entry.created_at,
        }
    }
}

/// Append audit rows on an open connection, usually inside a transaction.
pub(super) async fn insert_audit_rows(
    conn: &mut AsyncPgConnection,
    entries: &[AuditLogEntry],
) -> diesel::QueryResult<()> {
    if entries.is_empty() {
        return Ok(());
    }
    let rows: Vec<NewAuditLogRow<'_>> = entries.iter().map(NewAuditLogRow::from).collect();
    diesel::insert_into(audit_log::table)
        .values(&rows)
        .execute(conn)
        .await?;
    Ok(())
}

#[async_trait]
impl AuditLogRepository for DieselAuditLogRepository {
    async fn append(&self, entry: AuditLogEntry) -> Result<(), AuditLogRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        insert_audit_rows(&mut conn, std::slice::from_ref(&entry))
            .await
            .map_err(map_diesel_error)
    }
}
