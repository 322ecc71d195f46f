//! OpenAPI schema definitions for domain types.
//!
//! Domain types remain framework-agnostic by not deriving `ToSchema`. This
//! module provides the schema definitions required for OpenAPI documentation
//! using utoipa's external schema registration.
//!
//! The schema wrappers mirror the serialised shape of their domain types but
//! live in the inbound adapter layer where framework concerns belong.

use utoipa::ToSchema;

/// OpenAPI schema for [`crate::domain::ErrorCode`].
///
/// Stable machine-readable error codes returned in API error responses.
#[derive(ToSchema)]
#[schema(as = crate::domain::ErrorCode)]
pub enum ErrorCodeSchema {
    /// The request is malformed or fails validation.
    #[schema(rename = "invalid_request")]
    InvalidRequest,
    /// Authenticated but not permitted to perform this action.
    #[schema(rename = "forbidden")]
    Forbidden,
    /// The requested resource does not exist.
    #[schema(rename = "not_found")]
    NotFound,
    /// The request conflicts with the current state of the resource.
    #[schema(rename = "conflict")]
    Conflict,
    /// A dependency is temporarily unavailable.
    #[schema(rename = "service_unavailable")]
    ServiceUnavailable,
    /// An unexpected error occurred on the server.
    #[schema(rename = "internal_error")]
    InternalError,
}

/// OpenAPI schema for [`crate::domain::OrderStatus`].
#[derive(ToSchema)]
#[schema(as = crate::domain::OrderStatus)]
pub enum OrderStatusSchema {
    #[schema(rename = "NEW")]
    New,
    #[schema(rename = "ASSIGNED")]
    Assigned,
    #[schema(rename = "ACCEPTED")]
    Accepted,
    #[schema(rename = "ONSITE")]
    Onsite,
    /// Long repair. `LONG_REPAIR` is accepted on input.
    #[schema(rename = "DR")]
    Dr,
    #[schema(rename = "CLOSED")]
    Closed,
    #[schema(rename = "REFUSED")]
    Refused,
}

/// OpenAPI schema for [`crate::domain::Settlement`].
///
/// Money recorded when an order closes. Amounts are decimal strings.
#[derive(ToSchema)]
#[schema(as = crate::domain::Settlement, rename_all = "camelCase")]
#[expect(
    dead_code,
    reason = "Used only for OpenAPI schema generation via utoipa"
)]
pub struct SettlementSchema {
    #[schema(example = "10000")]
    total_amount: String,
    #[schema(example = "2000")]
    materials_cost: String,
    #[schema(example = "4000")]
    technician_share: String,
    #[schema(example = "4000")]
    company_share: String,
    has_review: bool,
    out_of_city: bool,
}

/// OpenAPI schema for [`crate::domain::Order`].
#[derive(ToSchema)]
#[schema(as = crate::domain::Order, rename_all = "camelCase")]
#[expect(
    dead_code,
    reason = "Used only for OpenAPI schema generation via utoipa"
)]
pub struct OrderSchema {
    #[schema(example = 1)]
    id: i64,
    #[schema(example = "Washing machine")]
    equipment_type: String,
    problem_description: String,
    #[schema(example = "Client")]
    client_name: String,
    client_address: String,
    #[schema(example = "+79001234567")]
    client_phone: Option<String>,
    notes: Option<String>,
    scheduled_time: Option<String>,
    #[schema(value_type = Option<String>, format = DateTime)]
    scheduled_at: Option<String>,
    source_message_id: Option<i64>,
    status: OrderStatusSchema,
    assigned_technician: Option<i64>,
    /// Creator principal; absent for ingested orders.
    dispatcher: Option<i64>,
    refuse_reason: Option<String>,
    estimated_completion: Option<String>,
    prepayment: Option<String>,
    reschedule_count: i32,
    #[schema(value_type = Option<String>, format = DateTime)]
    last_rescheduled_at: Option<String>,
    reschedule_reason: Option<String>,
    settlement: Option<SettlementSchema>,
    #[schema(value_type = String, format = DateTime)]
    created_at: String,
    #[schema(value_type = String, format = DateTime)]
    updated_at: String,
    #[schema(value_type = Option<String>, format = DateTime)]
    deleted_at: Option<String>,
    /// CAS version; send it back as `expectedVersion`.
    #[schema(example = 1)]
    version: i64,
}

/// OpenAPI schema for [`crate::domain::Technician`].
#[derive(ToSchema)]
#[schema(as = crate::domain::Technician)]
#[expect(
    dead_code,
    reason = "Used only for OpenAPI schema generation via utoipa"
)]
pub struct TechnicianSchema {
    id: i64,
    user_id: i64,
    phone: Option<String>,
    specialty: Option<String>,
    is_active: bool,
    is_approved: bool,
    work_chat_id: Option<i64>,
}

/// OpenAPI schema for [`crate::domain::PeriodReport`].
#[derive(ToSchema)]
#[schema(as = crate::domain::PeriodReport, rename_all = "camelCase")]
#[expect(
    dead_code,
    reason = "Used only for OpenAPI schema generation via utoipa"
)]
pub struct PeriodReportSchema {
    id: i64,
    #[schema(example = "DAILY")]
    kind: String,
    #[schema(value_type = String, format = Date)]
    period_start: String,
    #[schema(value_type = String, format = Date)]
    period_end: String,
    /// Aggregated money over the period's closed orders.
    #[schema(value_type = Object)]
    totals: serde_json::Value,
    /// Per-technician aggregates.
    #[schema(value_type = Vec<Object>)]
    technicians: Vec<serde_json::Value>,
    #[schema(value_type = String, format = DateTime)]
    generated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use utoipa::PartialSchema;

    fn schema_to_json<T: PartialSchema>() -> String {
        serde_json::to_string(&T::schema()).expect("schema serialises to JSON")
    }

    #[test]
    fn error_code_schema_variants_match_domain() {
        let schema_json = schema_to_json::<ErrorCodeSchema>();
        assert_eq!(ErrorCodeSchema::name(), "crate.domain.ErrorCode");
        for code in [
            "invalid_request",
            "forbidden",
            "not_found",
            "conflict",
            "service_unavailable",
            "internal_error",
        ] {
            assert!(schema_json.contains(code), "missing {code}");
        }
    }

    #[test]
    fn order_status_schema_uses_storage_values() {
        let schema_json = schema_to_json::<OrderStatusSchema>();
        assert!(schema_json.contains("\"DR\""));
        assert!(schema_json.contains("\"ONSITE\""));
        assert!(!schema_json.contains("Onsite"));
    }

    #[test]
    fn order_schema_uses_camel_case_fields() {
        let schema_json = schema_to_json::<OrderSchema>();
        assert_eq!(OrderSchema::name(), "crate.domain.Order");
        assert!(schema_json.contains("equipmentType"));
        assert!(schema_json.contains("assignedTechnician"));
        assert!(!schema_json.contains("equipment_type"));
    }
}
