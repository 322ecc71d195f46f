//! PostgreSQL-backed `MirrorBindingRepository`.
//!
//! `(order_id, chat_id)` is unique; a second insert for the same pair is
//! reported as `Duplicate` so the coordinator can reactivate instead.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::debug;

use crate::domain::ports::{MirrorBindingRepository, MirrorBindingRepositoryError};
use crate::domain::{ChatId, MessageId, MirrorBinding, NewMirrorBinding, OrderId, TechnicianId};

use super::error_mapping::{self, is_unique_violation};
use super::models::{MirrorBindingRow, NewMirrorBindingRow};
use super::pool::{DbPool, PoolError};
use super::schema::order_group_messages;

/// Diesel-backed implementation of the mirror binding port.
#[derive(Clone)]
pub struct DieselMirrorBindingRepository {
    pool: DbPool,
}

impl DieselMirrorBindingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> MirrorBindingRepositoryError {
    error_mapping::map_pool_error(error, MirrorBindingRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> MirrorBindingRepositoryError {
    error_mapping::map_diesel_error(
        error,
        MirrorBindingRepositoryError::query,
        MirrorBindingRepositoryError::connection,
    )
}

fn map_insert_error(
    error: diesel::result::Error,
    binding: &NewMirrorBinding,
) -> MirrorBindingRepositoryError {
    if is_unique_violation(&error) {
        debug!(order_id = %binding.order_id, chat_id = %binding.chat_id, "binding already exists");
        MirrorBindingRepositoryError::duplicate(binding.order_id, binding.chat_id)
    } else {
        map_diesel_error(error)
    }
}

impl From<MirrorBindingRow> for MirrorBinding {
    fn from(row: MirrorBindingRow) -> Self {
        Self {
            order_id: OrderId::new(row.order_id),
            technician_id: TechnicianId::new(row.technician_id),
            chat_id: ChatId::new(row.chat_id),
            message_id: MessageId::new(row.message_id),
            is_active: row.is_active,
            created_at: row.created_at,
            deactivated_at: row.deactivated_at,
        }
    }
}

impl From<&NewMirrorBinding> for NewMirrorBindingRow {
    fn from(binding: &NewMirrorBinding) -> Self {
        Self {
            order_id: binding.order_id.get(),
            technician_id: binding.technician_id.get(),
            chat_id: binding.chat_id.get(),
            message_id: binding.message_id.get(),
            is_active: true,
            created_at: binding.created_at,
        }
    }
}

#[async_trait]
impl MirrorBindingRepository for DieselMirrorBindingRepository {
    async fn bindings_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<MirrorBinding>, MirrorBindingRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = order_group_messages::table
            .filter(order_group_messages::order_id.eq(order_id.get()))
            .order_by(order_group_messages::id.asc())
            .select(MirrorBindingRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(rows.into_iter().map(MirrorBinding::from).collect())
    }

    async fn insert_binding(
        &self,
        binding: NewMirrorBinding,
    ) -> Result<MirrorBinding, MirrorBindingRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = diesel::insert_into(order_group_messages::table)
            .values(NewMirrorBindingRow::from(&binding))
            .returning(MirrorBindingRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(|err| map_insert_error(err, &binding))?;
        Ok(row.into())
    }

    async fn deactivate_binding(
        &self,
        order_id: OrderId,
        chat_id: ChatId,
        at: DateTime<Utc>,
    ) -> Result<(), MirrorBindingRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::update(
            order_group_messages::table
                .filter(order_group_messages::order_id.eq(order_id.get()))
                .filter(order_group_messages::chat_id.eq(chat_id.get())),
        )
        .set((
            order_group_messages::is_active.eq(false),
            order_group_messages::deactivated_at.eq(Some(at)),
        ))
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        Ok(())
    }

    async fn reactivate_binding(
        &self,
        order_id: OrderId,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), MirrorBindingRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::update(
            order_group_messages::table
                .filter(order_group_messages::order_id.eq(order_id.get()))
                .filter(order_group_messages::chat_id.eq(chat_id.get())),
        )
        .set((
            order_group_messages::is_active.eq(true),
            order_group_messages::deactivated_at.eq(None::<DateTime<Utc>>),
            order_group_messages::message_id.eq(message_id.get()),
        ))
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use diesel::result::{DatabaseErrorKind, Error as DieselError};
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn binding() -> NewMirrorBinding {
        NewMirrorBinding {
            order_id: OrderId::new(5),
            technician_id: TechnicianId::new(1),
            chat_id: ChatId::new(-1001),
            message_id: MessageId::new(77),
            created_at: Utc
                .with_ymd_and_hms(2026, 3, 2, 9, 0, 0)
                .single()
                .expect("valid"),
        }
    }

    #[rstest]
    fn pool_error_maps_to_connection_error() {
        let error = map_pool_error(PoolError::checkout("connection refused"));
        assert!(matches!(
            error,
            MirrorBindingRepositoryError::Connection { .. }
        ));
    }

    #[rstest]
    fn unique_violations_become_duplicates(binding: NewMirrorBinding) {
        let error = DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            Box::new("order_group_messages_order_chat_key".to_owned()),
        );

        assert_eq!(
            map_insert_error(error, &binding),
            MirrorBindingRepositoryError::duplicate(OrderId::new(5), ChatId::new(-1001))
        );
    }

    #[rstest]
    fn other_insert_failures_are_query_errors(binding: NewMirrorBinding) {
        let error = map_insert_error(DieselError::NotFound, &binding);
        assert!(matches!(error, MirrorBindingRepositoryError::Query { .. }));
    }

    #[rstest]
    fn new_rows_start_active(binding: NewMirrorBinding) {
        let row = NewMirrorBindingRow::from(&binding);
        assert!(row.is_active);
        assert_eq!(row.chat_id, -1001);
    }
}
