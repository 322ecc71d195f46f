//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match `migrations/` exactly. They are used by
//! Diesel for compile-time query validation and type-safe SQL generation.
//!
//! # Maintenance
//!
//! When migrations change the schema, this file should be regenerated or
//! manually updated to reflect those changes. The `diesel print-schema`
//! command can generate these definitions from a live database.

diesel::table! {
    /// Platform principals keyed by their external id.
    users (id) {
        id -> Int8,
        username -> Nullable<Text>,
        display_name -> Nullable<Text>,
        /// Comma-separated sorted role set, `UNKNOWN` when empty.
        roles -> Text,
        created_at -> Timestamptz,
        deleted_at -> Nullable<Timestamptz>,
        version -> Int8,
    }
}

diesel::table! {
    /// Technician records, one per MASTER user.
    technicians (id) {
        id -> Int8,
        user_id -> Int8,
        phone -> Nullable<Text>,
        specialty -> Nullable<Text>,
        is_active -> Bool,
        is_approved -> Bool,
        /// Private conversation used to reach the technician.
        work_chat_id -> Nullable<Int8>,
    }
}

diesel::table! {
    /// Orders and their lifecycle, long-repair, rescheduling and money
    /// columns. Money columns are `NUMERIC(14,2)`.
    orders (id) {
        id -> Int8,
        equipment_type -> Text,
        problem_description -> Text,
        client_name -> Text,
        client_address -> Text,
        client_phone -> Nullable<Text>,
        notes -> Nullable<Text>,
        scheduled_time -> Nullable<Text>,
        scheduled_at -> Nullable<Timestamptz>,
        source_message_id -> Nullable<Int8>,
        status -> Text,
        assigned_technician_id -> Nullable<Int8>,
        dispatcher_id -> Nullable<Int8>,
        refuse_reason -> Nullable<Text>,
        estimated_completion -> Nullable<Text>,
        prepayment -> Nullable<Numeric>,
        reschedule_count -> Int4,
        last_rescheduled_at -> Nullable<Timestamptz>,
        reschedule_reason -> Nullable<Text>,
        total_amount -> Nullable<Numeric>,
        materials_cost -> Nullable<Numeric>,
        technician_share -> Nullable<Numeric>,
        company_share -> Nullable<Numeric>,
        has_review -> Nullable<Bool>,
        out_of_city -> Nullable<Bool>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        /// Tombstone; set rows are hidden from non-archival reads.
        deleted_at -> Nullable<Timestamptz>,
        /// Optimistic concurrency counter.
        version -> Int8,
    }
}

diesel::table! {
    /// Append-only status transitions.
    order_status_history (id) {
        id -> Int8,
        order_id -> Int8,
        old_status -> Nullable<Text>,
        new_status -> Text,
        changed_by -> Nullable<Int8>,
        changed_at -> Timestamptz,
        note -> Nullable<Text>,
    }
}

diesel::table! {
    /// Append-only edits of whitelisted order fields.
    order_field_history (id) {
        id -> Int8,
        order_id -> Int8,
        field_name -> Text,
        old_value -> Nullable<Text>,
        new_value -> Text,
        changed_by -> Nullable<Int8>,
        changed_at -> Timestamptz,
    }
}

diesel::table! {
    /// Platform-wide audit trail.
    audit_log (id) {
        id -> Int8,
        actor_id -> Nullable<Int8>,
        action -> Text,
        order_id -> Nullable<Int8>,
        details -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Order cards mirrored into external chats, unique per order and chat.
    order_group_messages (id) {
        id -> Int8,
        order_id -> Int8,
        technician_id -> Int8,
        chat_id -> Int8,
        message_id -> Int8,
        is_active -> Bool,
        created_at -> Timestamptz,
        deactivated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Per-specialty share overrides.
    specialty_rates (id) {
        id -> Int8,
        specialty_name -> Text,
        technician_percentage -> Numeric,
        company_percentage -> Numeric,
        is_default -> Bool,
        deleted_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Immutable period report headers with company-wide totals.
    period_reports (id) {
        id -> Int8,
        kind -> Text,
        period_start -> Date,
        period_end -> Date,
        total_orders -> Int8,
        total_amount -> Numeric,
        total_materials_cost -> Numeric,
        total_net_profit -> Numeric,
        total_company_profit -> Numeric,
        total_technician_profit -> Numeric,
        average_check -> Numeric,
        generated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Per-technician slices of a period report.
    technician_period_reports (id) {
        id -> Int8,
        report_id -> Int8,
        technician_id -> Int8,
        total_orders -> Int8,
        total_amount -> Numeric,
        total_materials_cost -> Numeric,
        total_net_profit -> Numeric,
        total_company_profit -> Numeric,
        total_technician_profit -> Numeric,
        average_check -> Numeric,
        reviews_count -> Int8,
        out_of_city_count -> Int8,
    }
}

diesel::table! {
    /// JSON snapshots of a deactivated technician's orders.
    technician_archives (id) {
        id -> Uuid,
        technician_id -> Int8,
        snapshot_at -> Timestamptz,
        payload -> Jsonb,
        order_count -> Int8,
    }
}

diesel::table! {
    /// One row per processed feed message.
    ingest_telemetry (id) {
        id -> Int8,
        message_id -> Int8,
        outcome -> Text,
        failure_kind -> Nullable<Text>,
        elapsed_micros -> Int8,
        recorded_at -> Timestamptz,
    }
}

diesel::table! {
    /// Single-row ingest switchboard.
    ingest_config (id) {
        id -> Int2,
        enabled -> Bool,
        source_chat_id -> Nullable<Int8>,
    }
}

diesel::joinable!(technicians -> users (user_id));
diesel::joinable!(order_status_history -> orders (order_id));
diesel::joinable!(order_field_history -> orders (order_id));
diesel::joinable!(order_group_messages -> orders (order_id));
diesel::joinable!(technician_period_reports -> period_reports (report_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    technicians,
    orders,
    order_status_history,
    order_field_history,
    audit_log,
    order_group_messages,
    specialty_rates,
    period_reports,
    technician_period_reports,
    technician_archives,
    ingest_telemetry,
    ingest_config,
);
