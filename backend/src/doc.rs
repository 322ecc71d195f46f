//! OpenAPI documentation configuration.
//!
//! This module defines the [`ApiDoc`] struct which generates the OpenAPI
//! specification for the REST API. It registers:
//!
//! - **Paths**: every HTTP endpoint of the inbound layer (orders, ingest,
//!   reports, technicians, health)
//! - **Schemas**: domain type wrappers ([`OrderSchema`], [`SettlementSchema`],
//!   [`ErrorCodeSchema`] and friends) that provide OpenAPI definitions without
//!   coupling domain types to the utoipa framework
//! - **Security**: the `X-Actor-Id` caller header
//!
//! The generated specification is served by Swagger UI in debug builds.

use crate::inbound::http::error::ErrorBody;
use crate::inbound::http::ingest::{ConfirmRequest, IngestMessageRequest};
use crate::inbound::http::orders::{
    AssignRequest, CloseRequest, CreateOrderRequest, LongRepairRequest, RescheduleRequest,
    TransitionRequest, UnassignRequest, UpdateOrderRequest,
};
use crate::inbound::http::reports::GenerateReportRequest;
use crate::inbound::http::schemas::{
    ErrorCodeSchema, OrderSchema, OrderStatusSchema, PeriodReportSchema, SettlementSchema,
    TechnicianSchema,
};
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// Enrich the generated document with the caller header security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::default);

        components.add_security_scheme(
            "ActorHeader",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                "X-Actor-Id",
                "Principal id of the caller; roles are read from the store.",
            ))),
        );
    }
}

/// OpenAPI document for the REST API.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Dispatch backend API",
        description = "Order lifecycle, feed ingestion and period reports for field-service dispatch."
    ),
    servers(
        (url = "/", description = "Relative to the deployment base URL")
    ),
    security(("ActorHeader" = [])),
    paths(
        crate::inbound::http::orders::create_order,
        crate::inbound::http::orders::get_order,
        crate::inbound::http::orders::update_order,
        crate::inbound::http::orders::delete_order,
        crate::inbound::http::orders::restore_order,
        crate::inbound::http::orders::transition_order,
        crate::inbound::http::orders::assign_order,
        crate::inbound::http::orders::unassign_order,
        crate::inbound::http::orders::close_order,
        crate::inbound::http::orders::move_to_long_repair,
        crate::inbound::http::orders::reschedule_order,
        crate::inbound::http::orders::order_history,
        crate::inbound::http::ingest::ingest_message,
        crate::inbound::http::ingest::confirm_ingested,
        crate::inbound::http::reports::generate_report,
        crate::inbound::http::reports::render_report,
        crate::inbound::http::technicians::deactivate_technician,
        crate::inbound::http::health::ready,
        crate::inbound::http::health::live,
    ),
    components(schemas(
        OrderSchema,
        OrderStatusSchema,
        SettlementSchema,
        TechnicianSchema,
        PeriodReportSchema,
        ErrorCodeSchema,
        ErrorBody,
        CreateOrderRequest,
        UpdateOrderRequest,
        TransitionRequest,
        AssignRequest,
        UnassignRequest,
        CloseRequest,
        LongRepairRequest,
        RescheduleRequest,
        IngestMessageRequest,
        ConfirmRequest,
        GenerateReportRequest,
    )),
    tags(
        (name = "orders", description = "Order lifecycle"),
        (name = "ingest", description = "Feed message ingestion"),
        (name = "reports", description = "Period reports"),
        (name = "technicians", description = "Technician administration"),
        (name = "health", description = "Endpoints for health checks")
    )
)]
pub struct ApiDoc;
