//! PostgreSQL-backed `OrderRepository`.
//!
//! Every mutation writes the order row and its history rows in one
//! transaction. Changes are guarded by `UPDATE … WHERE id = ? AND version = ?`;
//! zero affected rows means another writer committed first.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use tracing::debug;

use crate::domain::ports::{
    ClosedOrdersPage, NewOrder, OrderChange, OrderRepository, OrderRepositoryError, Visibility,
};
use crate::domain::{
    FieldHistoryEntry, MessageId, Order, OrderId, OrderStatus, Settlement, StatusHistoryEntry,
    TechnicianId, UserId,
};

use super::diesel_audit_log_repository::insert_audit_rows;
use super::error_mapping;
use super::models::{FieldHistoryRow, OrderImage, OrderRow, StatusHistoryRow};
use super::pool::{DbPool, PoolError};
use super::schema::{order_field_history, order_group_messages, order_status_history, orders};

diesel::define_sql_function! {
    /// SQL `lower(text)`.
    fn lower(value: Text) -> Text;
}

diesel::define_sql_function! {
    /// SQL `btrim(text)`.
    fn btrim(value: Text) -> Text;
}

/// Diesel-backed implementation of the order repository port.
#[derive(Clone)]
pub struct DieselOrderRepository {
    pool: DbPool,
}

impl DieselOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> OrderRepositoryError {
    error_mapping::map_pool_error(error, OrderRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> OrderRepositoryError {
    error_mapping::map_diesel_error(
        error,
        OrderRepositoryError::query,
        OrderRepositoryError::connection,
    )
}

/// Failure inside a guarded change transaction.
#[derive(Debug)]
enum ChangeError {
    Diesel(diesel::result::Error),
    StaleVersion,
}

impl From<diesel::result::Error> for ChangeError {
    fn from(error: diesel::result::Error) -> Self {
        Self::Diesel(error)
    }
}

fn parse_status(raw: &str) -> Result<OrderStatus, OrderRepositoryError> {
    raw.parse::<OrderStatus>()
        .map_err(|err| OrderRepositoryError::query(err.to_string()))
}

/// Rebuild the settlement from the six money columns.
///
/// The columns are written together, so a partial set means the row was
/// edited outside the service.
fn settlement_from_row(row: &OrderRow) -> Result<Option<Settlement>, OrderRepositoryError> {
    match (
        row.total_amount,
        row.materials_cost,
        row.technician_share,
        row.company_share,
        row.has_review,
        row.out_of_city,
    ) {
        (
            Some(total_amount),
            Some(materials_cost),
            Some(technician_share),
            Some(company_share),
            Some(has_review),
            Some(out_of_city),
        ) => Ok(Some(Settlement {
            total_amount,
            materials_cost,
            technician_share,
            company_share,
            has_review,
            out_of_city,
        })),
        (None, None, None, None, None, None) => Ok(None),
        _ => Err(OrderRepositoryError::query(format!(
            "order {} has a partial settlement",
            row.id
        ))),
    }
}

fn row_to_order(row: OrderRow) -> Result<Order, OrderRepositoryError> {
    let status = parse_status(&row.status)?;
    let settlement = settlement_from_row(&row)?;
    Ok(Order {
        id: OrderId::new(row.id),
        equipment_type: row.equipment_type,
        problem_description: row.problem_description,
        client_name: row.client_name,
        client_address: row.client_address,
        client_phone: row.client_phone,
        notes: row.notes,
        scheduled_time: row.scheduled_time,
        scheduled_at: row.scheduled_at,
        source_message_id: row.source_message_id.map(MessageId::new),
        status,
        assigned_technician: row.assigned_technician_id.map(TechnicianId::new),
        dispatcher: row.dispatcher_id.map(UserId::new),
        refuse_reason: row.refuse_reason,
        estimated_completion: row.estimated_completion,
        prepayment: row.prepayment,
        reschedule_count: row.reschedule_count,
        last_rescheduled_at: row.last_rescheduled_at,
        reschedule_reason: row.reschedule_reason,
        settlement,
        created_at: row.created_at,
        updated_at: row.updated_at,
        deleted_at: row.deleted_at,
        version: row.version,
    })
}

fn rows_to_orders(rows: Vec<OrderRow>) -> Result<Vec<Order>, OrderRepositoryError> {
    rows.into_iter().map(row_to_order).collect()
}

impl<'a> OrderImage<'a> {
    fn from_order(order: &'a Order) -> Self {
        let settlement = order.settlement.as_ref();
        Self {
            equipment_type: &order.equipment_type,
            problem_description: &order.problem_description,
            client_name: &order.client_name,
            client_address: &order.client_address,
            client_phone: order.client_phone.as_deref(),
            notes: order.notes.as_deref(),
            scheduled_time: order.scheduled_time.as_deref(),
            scheduled_at: order.scheduled_at,
            source_message_id: order.source_message_id.map(MessageId::get),
            status: order.status.as_str(),
            assigned_technician_id: order.assigned_technician.map(TechnicianId::get),
            dispatcher_id: order.dispatcher.map(UserId::get),
            refuse_reason: order.refuse_reason.as_deref(),
            estimated_completion: order.estimated_completion.as_deref(),
            prepayment: order.prepayment,
            reschedule_count: order.reschedule_count,
            last_rescheduled_at: order.last_rescheduled_at,
            reschedule_reason: order.reschedule_reason.as_deref(),
            total_amount: settlement.map(|s| s.total_amount),
            materials_cost: settlement.map(|s| s.materials_cost),
            technician_share: settlement.map(|s| s.technician_share),
            company_share: settlement.map(|s| s.company_share),
            has_review: settlement.map(|s| s.has_review),
            out_of_city: settlement.map(|s| s.out_of_city),
            created_at: order.created_at,
            updated_at: order.updated_at,
            deleted_at: order.deleted_at,
            version: order.version,
        }
    }
}

impl From<&StatusHistoryEntry> for StatusHistoryRow {
    fn from(entry: &StatusHistoryEntry) -> Self {
        Self {
            order_id: entry.order_id.get(),
            old_status: entry.old_status.map(|status| status.as_str().to_owned()),
            new_status: entry.new_status.as_str().to_owned(),
            changed_by: entry.changed_by.map(UserId::get),
            changed_at: entry.changed_at,
            note: entry.note.clone(),
        }
    }
}

fn row_to_status_entry(row: StatusHistoryRow) -> Result<StatusHistoryEntry, OrderRepositoryError> {
    Ok(StatusHistoryEntry {
        order_id: OrderId::new(row.order_id),
        old_status: row.old_status.as_deref().map(parse_status).transpose()?,
        new_status: parse_status(&row.new_status)?,
        changed_by: row.changed_by.map(UserId::new),
        changed_at: row.changed_at,
        note: row.note,
    })
}

impl From<&FieldHistoryEntry> for FieldHistoryRow {
    fn from(entry: &FieldHistoryEntry) -> Self {
        Self {
            order_id: entry.order_id.get(),
            field_name: entry.field_name.clone(),
            old_value: entry.old_value.clone(),
            new_value: entry.new_value.clone(),
            changed_by: entry.changed_by.map(UserId::get),
            changed_at: entry.changed_at,
        }
    }
}

impl From<FieldHistoryRow> for FieldHistoryEntry {
    fn from(row: FieldHistoryRow) -> Self {
        Self {
            order_id: OrderId::new(row.order_id),
            field_name: row.field_name,
            old_value: row.old_value,
            new_value: row.new_value,
            changed_by: row.changed_by.map(UserId::new),
            changed_at: row.changed_at,
        }
    }
}

fn page_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl OrderRepository for DieselOrderRepository {
    async fn insert_order(&self, new: NewOrder) -> Result<Order, OrderRepositoryError> {
        let NewOrder {
            draft,
            dispatcher,
            created_by,
            created_at,
            audit,
        } = new;
        // The store assigns the id; the placeholder never reaches the table.
        let mut order = Order::from_draft(OrderId::new(0), draft, dispatcher, created_at);
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let stored = conn
            .transaction(|conn| {
                async move {
                    let id: i64 = diesel::insert_into(orders::table)
                        .values(OrderImage::from_order(&order))
                        .returning(orders::id)
                        .get_result(conn)
                        .await?;
                    order.id = OrderId::new(id);

                    let created = StatusHistoryEntry {
                        order_id: order.id,
                        old_status: None,
                        new_status: OrderStatus::New,
                        changed_by: created_by,
                        changed_at: created_at,
                        note: None,
                    };
                    diesel::insert_into(order_status_history::table)
                        .values(StatusHistoryRow::from(&created))
                        .execute(conn)
                        .await?;
                    insert_audit_rows(conn, &[audit.for_order(order.id)]).await?;
                    Ok::<_, diesel::result::Error>(order)
                }
                .scope_boxed()
            })
            .await
            .map_err(map_diesel_error)?;

        debug!(order_id = %stored.id, "order inserted");
        Ok(stored)
    }

    async fn find_order(
        &self,
        id: OrderId,
        visibility: Visibility,
    ) -> Result<Option<Order>, OrderRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let mut query = orders::table.filter(orders::id.eq(id.get())).into_boxed();
        if visibility == Visibility::Live {
            query = query.filter(orders::deleted_at.is_null());
        }
        let row = query
            .select(OrderRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_order).transpose()
    }

    async fn commit_order_change(&self, change: OrderChange) -> Result<Order, OrderRepositoryError> {
        let OrderChange {
            order,
            expected_version,
            status_entry,
            field_entries,
            audit_entries,
        } = change;
        let order_id = order.id;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let result = conn
            .transaction(|conn| {
                async move {
                    let updated = diesel::update(
                        orders::table
                            .filter(orders::id.eq(order.id.get()))
                            .filter(orders::version.eq(expected_version)),
                    )
                    .set(OrderImage::from_order(&order))
                    .execute(conn)
                    .await?;
                    if updated == 0 {
                        return Err(ChangeError::StaleVersion);
                    }

                    if let Some(entry) = &status_entry {
                        diesel::insert_into(order_status_history::table)
                            .values(StatusHistoryRow::from(entry))
                            .execute(conn)
                            .await?;
                    }
                    if !field_entries.is_empty() {
                        let rows: Vec<FieldHistoryRow> =
                            field_entries.iter().map(FieldHistoryRow::from).collect();
                        diesel::insert_into(order_field_history::table)
                            .values(&rows)
                            .execute(conn)
                            .await?;
                    }
                    insert_audit_rows(conn, &audit_entries).await?;
                    Ok(order)
                }
                .scope_boxed()
            })
            .await;

        match result {
            Ok(order) => Ok(order),
            Err(ChangeError::StaleVersion) => {
                debug!(%order_id, expected_version, "order version conflict");
                Err(OrderRepositoryError::version_conflict(
                    order_id,
                    expected_version,
                ))
            }
            Err(ChangeError::Diesel(error)) => Err(map_diesel_error(error)),
        }
    }

    async fn status_history(
        &self,
        id: OrderId,
    ) -> Result<Vec<StatusHistoryEntry>, OrderRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = order_status_history::table
            .filter(order_status_history::order_id.eq(id.get()))
            .order_by(order_status_history::id.asc())
            .select(StatusHistoryRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_status_entry).collect()
    }

    async fn field_history(
        &self,
        id: OrderId,
    ) -> Result<Vec<FieldHistoryEntry>, OrderRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = order_field_history::table
            .filter(order_field_history::order_id.eq(id.get()))
            .order_by(order_field_history::id.asc())
            .select(FieldHistoryRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(rows.into_iter().map(FieldHistoryEntry::from).collect())
    }

    async fn find_active_duplicate(
        &self,
        phone: &str,
        address: &str,
        equipment_type: &str,
    ) -> Result<Option<OrderId>, OrderRepositoryError> {
        let statuses: Vec<&str> = OrderStatus::DUPLICATE_CANDIDATES
            .iter()
            .map(|status| status.as_str())
            .collect();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let id = orders::table
            .filter(orders::deleted_at.is_null())
            .filter(orders::status.eq_any(statuses))
            .filter(orders::client_phone.eq(phone.trim()))
            .filter(lower(btrim(orders::client_address)).eq(address.trim().to_lowercase()))
            .filter(lower(btrim(orders::equipment_type)).eq(equipment_type.trim().to_lowercase()))
            .order_by(orders::id.asc())
            .select(orders::id)
            .first::<i64>(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        Ok(id.map(OrderId::new))
    }

    async fn client_history(
        &self,
        phone: Option<String>,
        address: String,
        limit: usize,
    ) -> Result<Vec<Order>, OrderRepositoryError> {
        let address_key = address.trim().to_lowercase();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let mut query = orders::table
            .filter(orders::deleted_at.is_null())
            .into_boxed();
        query = match phone {
            Some(phone) => query.filter(
                orders::client_phone
                    .eq(phone)
                    .or(lower(btrim(orders::client_address)).eq(address_key)),
            ),
            None => query.filter(lower(btrim(orders::client_address)).eq(address_key)),
        };
        let rows = query
            .order_by((orders::created_at.desc(), orders::id.desc()))
            .limit(page_limit(limit))
            .select(OrderRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows_to_orders(rows)
    }

    async fn orders_for_technician(
        &self,
        technician_id: TechnicianId,
    ) -> Result<Vec<Order>, OrderRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let mirrored = order_group_messages::table
            .filter(order_group_messages::technician_id.eq(technician_id.get()))
            .select(order_group_messages::order_id);
        let rows = orders::table
            .filter(
                orders::assigned_technician_id
                    .eq(technician_id.get())
                    .or(orders::id.eq_any(mirrored)),
            )
            .order_by(orders::id.asc())
            .select(OrderRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows_to_orders(rows)
    }

    async fn closed_orders_page(
        &self,
        page: ClosedOrdersPage,
    ) -> Result<Vec<Order>, OrderRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let mut query = orders::table
            .filter(orders::deleted_at.is_null())
            .filter(orders::status.eq(OrderStatus::Closed.as_str()))
            .filter(orders::updated_at.ge(page.from))
            .filter(orders::updated_at.lt(page.until))
            .into_boxed();
        if let Some(after) = page.after {
            query = query.filter(orders::id.gt(after.get()));
        }
        let rows = query
            .order_by(orders::id.asc())
            .limit(page_limit(page.limit))
            .select(OrderRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows_to_orders(rows)
    }
}

#[cfg(test)]
mod tests {
    //! Error mapping and row conversion coverage; queries are exercised
    //! against the in-memory store in service tests.

    use chrono::{DateTime, Utc};
    use rstest::{fixture, rstest};
    use rust_decimal_macros::dec;

    use super::*;

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .expect("valid timestamp")
            .with_timezone(&Utc)
    }

    #[fixture]
    fn closed_row() -> OrderRow {
        OrderRow {
            id: 7,
            equipment_type: "Washing machine".to_owned(),
            problem_description: "drum does not spin".to_owned(),
            client_name: "Client".to_owned(),
            client_address: "Lenina 5-10".to_owned(),
            client_phone: Some("+79001234567".to_owned()),
            notes: None,
            scheduled_time: Some("tomorrow 14:00".to_owned()),
            scheduled_at: None,
            source_message_id: Some(12345),
            status: "CLOSED".to_owned(),
            assigned_technician_id: Some(1),
            dispatcher_id: Some(100),
            refuse_reason: None,
            estimated_completion: None,
            prepayment: None,
            reschedule_count: 0,
            last_rescheduled_at: None,
            reschedule_reason: None,
            total_amount: Some(dec!(10000)),
            materials_cost: Some(dec!(2000)),
            technician_share: Some(dec!(4000)),
            company_share: Some(dec!(4000)),
            has_review: Some(false),
            out_of_city: Some(false),
            created_at: at("2026-03-01T09:00:00Z"),
            updated_at: at("2026-03-01T12:00:00Z"),
            deleted_at: None,
            version: 5,
        }
    }

    #[rstest]
    fn pool_error_maps_to_connection_error() {
        let error = map_pool_error(PoolError::checkout("connection refused"));

        assert!(matches!(error, OrderRepositoryError::Connection { .. }));
        assert!(error.to_string().contains("connection refused"));
    }

    #[rstest]
    fn diesel_error_maps_to_query_error() {
        let error = map_diesel_error(diesel::result::Error::NotFound);

        assert!(matches!(error, OrderRepositoryError::Query { .. }));
        assert!(error.to_string().contains("record not found"));
    }

    #[rstest]
    fn closed_rows_carry_their_settlement(closed_row: OrderRow) {
        let order = row_to_order(closed_row).expect("valid row");

        assert_eq!(order.status, OrderStatus::Closed);
        assert_eq!(order.assigned_technician, Some(TechnicianId::new(1)));
        let settlement = order.settlement.expect("settlement");
        assert_eq!(settlement.net(), dec!(8000));
        assert_eq!(settlement.technician_share, dec!(4000));
    }

    #[rstest]
    fn partial_settlements_are_rejected(mut closed_row: OrderRow) {
        closed_row.company_share = None;

        let error = row_to_order(closed_row).expect_err("partial settlement");
        assert!(error.to_string().contains("partial settlement"));
    }

    #[rstest]
    #[case("LONG_REPAIR", OrderStatus::Dr)]
    #[case("DR", OrderStatus::Dr)]
    #[case("REFUSED", OrderStatus::Refused)]
    fn stored_statuses_parse(#[case] raw: &str, #[case] expected: OrderStatus) {
        assert_eq!(parse_status(raw).expect("known status"), expected);
    }

    #[rstest]
    fn unknown_statuses_are_query_errors() {
        let error = parse_status("PAUSED").expect_err("unknown status");
        assert!(matches!(error, OrderRepositoryError::Query { .. }));
    }

    #[rstest]
    fn images_flatten_the_settlement(closed_row: OrderRow) {
        let order = row_to_order(closed_row).expect("valid row");
        let image = OrderImage::from_order(&order);

        assert_eq!(image.status, "CLOSED");
        assert_eq!(image.total_amount, Some(dec!(10000)));
        assert_eq!(image.has_review, Some(false));
        assert_eq!(image.version, 5);
    }
}
