//! Internal Diesel row structs for database operations.
//!
//! These types are implementation details of the persistence layer and must
//! never be exposed to the domain. They exist solely to satisfy Diesel's
//! type requirements for queries and mutations; conversion to and from
//! domain records lives with each repository.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::schema::{
    audit_log, ingest_config, ingest_telemetry, order_field_history, order_group_messages,
    order_status_history, orders, period_reports, specialty_rates, technician_archives,
    technician_period_reports, technicians, users,
};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Row struct for reading from the users table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct UserRow {
    pub id: i64,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub roles: String,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
}

/// Row struct for reading from the technicians table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = technicians)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct TechnicianRow {
    pub id: i64,
    pub user_id: i64,
    pub phone: Option<String>,
    pub specialty: Option<String>,
    pub is_active: bool,
    pub is_approved: bool,
    pub work_chat_id: Option<i64>,
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Row struct for reading from the orders table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct OrderRow {
    pub id: i64,
    pub equipment_type: String,
    pub problem_description: String,
    pub client_name: String,
    pub client_address: String,
    pub client_phone: Option<String>,
    pub notes: Option<String>,
    pub scheduled_time: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub source_message_id: Option<i64>,
    pub status: String,
    pub assigned_technician_id: Option<i64>,
    pub dispatcher_id: Option<i64>,
    pub refuse_reason: Option<String>,
    pub estimated_completion: Option<String>,
    pub prepayment: Option<Decimal>,
    pub reschedule_count: i32,
    pub last_rescheduled_at: Option<DateTime<Utc>>,
    pub reschedule_reason: Option<String>,
    pub total_amount: Option<Decimal>,
    pub materials_cost: Option<Decimal>,
    pub technician_share: Option<Decimal>,
    pub company_share: Option<Decimal>,
    pub has_review: Option<bool>,
    pub out_of_city: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
}

/// Full order image written on insert and on every committed change.
///
/// `None` is written as `NULL` so cleared fields do not keep stale values.
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = orders)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct OrderImage<'a> {
    pub equipment_type: &'a str,
    pub problem_description: &'a str,
    pub client_name: &'a str,
    pub client_address: &'a str,
    pub client_phone: Option<&'a str>,
    pub notes: Option<&'a str>,
    pub scheduled_time: Option<&'a str>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub source_message_id: Option<i64>,
    pub status: &'a str,
    pub assigned_technician_id: Option<i64>,
    pub dispatcher_id: Option<i64>,
    pub refuse_reason: Option<&'a str>,
    pub estimated_completion: Option<&'a str>,
    pub prepayment: Option<Decimal>,
    pub reschedule_count: i32,
    pub last_rescheduled_at: Option<DateTime<Utc>>,
    pub reschedule_reason: Option<&'a str>,
    pub total_amount: Option<Decimal>,
    pub materials_cost: Option<Decimal>,
    pub technician_share: Option<Decimal>,
    pub company_share: Option<Decimal>,
    pub has_review: Option<bool>,
    pub out_of_city: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
}

/// Status history row; the surrogate key is only used for ordering.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = order_status_history)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct StatusHistoryRow {
    pub order_id: i64,
    pub old_status: Option<String>,
    pub new_status: String,
    pub changed_by: Option<i64>,
    pub changed_at: DateTime<Utc>,
    pub note: Option<String>,
}

/// Field history row.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = order_field_history)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct FieldHistoryRow {
    pub order_id: i64,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: String,
    pub changed_by: Option<i64>,
    pub changed_at: DateTime<Utc>,
}

/// Insertable audit log entry.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = audit_log)]
pub(crate) struct NewAuditLogRow<'a> {
    pub actor_id: Option<i64>,
    pub action: &'a str,
    pub order_id: Option<i64>,
    pub details: &'a str,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Mirror bindings
// ---------------------------------------------------------------------------

/// Row struct for reading from the order_group_messages table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = order_group_messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct MirrorBindingRow {
    pub order_id: i64,
    pub technician_id: i64,
    pub chat_id: i64,
    pub message_id: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
}

/// Insertable mirror binding; new bindings start active.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = order_group_messages)]
pub(crate) struct NewMirrorBindingRow {
    pub order_id: i64,
    pub technician_id: i64,
    pub chat_id: i64,
    pub message_id: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Finance and reports
// ---------------------------------------------------------------------------

/// Row struct for reading from the specialty_rates table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = specialty_rates)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct SpecialtyRateRow {
    pub specialty_name: String,
    pub technician_percentage: Decimal,
    pub company_percentage: Decimal,
    pub is_default: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Period report header row.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = period_reports)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct PeriodReportRow {
    pub id: i64,
    pub kind: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub total_orders: i64,
    pub total_amount: Decimal,
    pub total_materials_cost: Decimal,
    pub total_net_profit: Decimal,
    pub total_company_profit: Decimal,
    pub total_technician_profit: Decimal,
    pub average_check: Decimal,
    pub generated_at: DateTime<Utc>,
}

/// Insertable period report header.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = period_reports)]
pub(crate) struct NewPeriodReportRow<'a> {
    pub kind: &'a str,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub total_orders: i64,
    pub total_amount: Decimal,
    pub total_materials_cost: Decimal,
    pub total_net_profit: Decimal,
    pub total_company_profit: Decimal,
    pub total_technician_profit: Decimal,
    pub average_check: Decimal,
    pub generated_at: DateTime<Utc>,
}

/// Per-technician report slice, read and written with the same shape.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = technician_period_reports)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct TechnicianPeriodReportRow {
    pub report_id: i64,
    pub technician_id: i64,
    pub total_orders: i64,
    pub total_amount: Decimal,
    pub total_materials_cost: Decimal,
    pub total_net_profit: Decimal,
    pub total_company_profit: Decimal,
    pub total_technician_profit: Decimal,
    pub average_check: Decimal,
    pub reviews_count: i64,
    pub out_of_city_count: i64,
}

/// Insertable technician archive snapshot.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = technician_archives)]
pub(crate) struct NewArchiveRow {
    pub id: Uuid,
    pub technician_id: i64,
    pub snapshot_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub order_count: i64,
}

// ---------------------------------------------------------------------------
// Ingest
// ---------------------------------------------------------------------------

/// Insertable telemetry row.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = ingest_telemetry)]
pub(crate) struct NewTelemetryRow<'a> {
    pub message_id: i64,
    pub outcome: &'a str,
    pub failure_kind: Option<&'a str>,
    pub elapsed_micros: i64,
    pub recorded_at: DateTime<Utc>,
}

/// The ingest switchboard row.
#[derive(Debug, Clone, Copy, Queryable, Selectable)]
#[diesel(table_name = ingest_config)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct IngestConfigRow {
    pub enabled: bool,
    pub source_chat_id: Option<i64>,
}
