//! Order lifecycle handlers.
//!
//! ```text
//! POST   /api/v1/orders
//! GET    /api/v1/orders/{id}
//! PATCH  /api/v1/orders/{id}
//! DELETE /api/v1/orders/{id}
//! POST   /api/v1/orders/{id}/restore
//! POST   /api/v1/orders/{id}/transitions
//! POST   /api/v1/orders/{id}/assignment
//! POST   /api/v1/orders/{id}/unassignment
//! POST   /api/v1/orders/{id}/close
//! POST   /api/v1/orders/{id}/long-repair
//! POST   /api/v1/orders/{id}/reschedule
//! GET    /api/v1/orders/{id}/history
//! ```
//!
//! Every mutation carries the `expectedVersion` the caller last read; a stale
//! version answers `409 conflict`.

use std::collections::BTreeMap;

use actix_web::{HttpResponse, delete, get, patch, post, web};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::domain::{
    CloseFlags, DispatchError, FieldHistoryEntry, LongRepairTerms, Money, Order, OrderDraft,
    OrderId, OrderPatch, OrderStatus, StatusHistoryEntry, TechnicianId,
};
use crate::inbound::http::ApiResult;
use crate::inbound::http::actor::ActorId;
use crate::inbound::http::error::ErrorBody;
use crate::inbound::http::schemas::OrderSchema;
use crate::inbound::http::state::HttpState;

/// Body of `POST /api/v1/orders`.
#[derive(Debug, Clone, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[schema(example = "Washing machine")]
    pub equipment_type: String,
    #[schema(example = "not spinning")]
    pub problem_description: String,
    #[serde(default)]
    pub client_name: Option<String>,
    #[schema(example = "Lenina 5-10")]
    pub client_address: String,
    #[serde(default)]
    #[schema(example = "+79001234567")]
    pub client_phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Free-form arrival phrase, e.g. "завтра к 14:00".
    #[serde(default)]
    pub scheduled_time: Option<String>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl From<CreateOrderRequest> for OrderDraft {
    fn from(value: CreateOrderRequest) -> Self {
        Self {
            equipment_type: value.equipment_type,
            problem_description: value.problem_description,
            client_name: value.client_name,
            client_address: value.client_address,
            client_phone: value.client_phone,
            notes: value.notes,
            scheduled_time: value.scheduled_time,
            scheduled_at: value.scheduled_at,
            source_message_id: None,
        }
    }
}

/// Body of `PATCH /api/v1/orders/{id}`. A `null` value clears the field.
#[derive(Debug, Clone, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderRequest {
    pub expected_version: i64,
    pub fields: BTreeMap<String, Option<String>>,
}

/// Body of `POST /api/v1/orders/{id}/transitions`.
#[derive(Debug, Clone, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    #[schema(value_type = String, example = "ACCEPTED")]
    pub to: OrderStatus,
    #[serde(default)]
    pub notes: Option<String>,
    pub expected_version: i64,
}

/// Body of `POST /api/v1/orders/{id}/assignment`.
#[derive(Debug, Clone, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    #[schema(value_type = i64)]
    pub technician_id: TechnicianId,
    pub expected_version: i64,
}

/// Body of `POST /api/v1/orders/{id}/unassignment`.
#[derive(Debug, Clone, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnassignRequest {
    #[serde(default)]
    pub reason: Option<String>,
    pub expected_version: i64,
}

/// Body of `POST /api/v1/orders/{id}/close`.
#[derive(Debug, Clone, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloseRequest {
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "10000.00")]
    pub total_amount: Option<Decimal>,
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "2000.00")]
    pub materials_cost: Option<Decimal>,
    #[serde(default)]
    pub has_review: bool,
    #[serde(default)]
    pub out_of_city: bool,
    pub expected_version: i64,
}

impl CloseRequest {
    fn money(&self) -> Result<Money, DispatchError> {
        match (self.total_amount, self.materials_cost) {
            (Some(total_amount), Some(materials_cost)) => Ok(Money {
                total_amount,
                materials_cost,
            }),
            _ => Err(DispatchError::validation(
                "totalAmount and materialsCost are required to close an order",
            )),
        }
    }
}

/// Body of `POST /api/v1/orders/{id}/long-repair`.
#[derive(Debug, Clone, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LongRepairRequest {
    #[schema(example = "2026-03-20")]
    pub estimated_completion: String,
    #[schema(value_type = String, example = "1500.00")]
    pub prepayment: Decimal,
    pub expected_version: i64,
}

/// Body of `POST /api/v1/orders/{id}/reschedule`.
#[derive(Debug, Clone, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleRequest {
    #[schema(example = "послезавтра в 10:00")]
    pub scheduled_time: String,
    #[serde(default)]
    pub reason: Option<String>,
    pub expected_version: i64,
}

/// Response of `GET /api/v1/orders/{id}/history`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderHistoryResponse {
    pub status_history: Vec<StatusHistoryEntry>,
    pub field_history: Vec<FieldHistoryEntry>,
}

fn order_id(path: web::Path<i64>) -> OrderId {
    OrderId::new(path.into_inner())
}

/// Create a NEW order. Staff only.
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    params(("X-Actor-Id" = i64, Header, description = "Calling principal")),
    responses(
        (status = 201, description = "Order created", body = OrderSchema),
        (status = 400, description = "Invalid draft", body = ErrorBody),
        (status = 409, description = "Actor may not create orders", body = ErrorBody)
    ),
    tags = ["orders"],
    operation_id = "createOrder"
)]
#[post("/orders")]
#[instrument(skip_all, fields(actor = %actor.0))]
pub async fn create_order(
    state: web::Data<HttpState>,
    actor: ActorId,
    payload: web::Json<CreateOrderRequest>,
) -> ApiResult<HttpResponse> {
    let actor = actor.resolve(&state).await?;
    let order = state
        .orders
        .create(payload.into_inner().into(), &actor)
        .await?;
    Ok(HttpResponse::Created().json(order))
}

/// Fetch a live order.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(
        ("id" = i64, Path, description = "Order id"),
        ("X-Actor-Id" = i64, Header, description = "Calling principal")
    ),
    responses(
        (status = 200, description = "Order", body = OrderSchema),
        (status = 404, description = "Unknown or deleted order", body = ErrorBody)
    ),
    tags = ["orders"],
    operation_id = "getOrder"
)]
#[get("/orders/{id}")]
#[instrument(skip_all, fields(order_id = %path))]
pub async fn get_order(
    state: web::Data<HttpState>,
    _actor: ActorId,
    path: web::Path<i64>,
) -> ApiResult<web::Json<Order>> {
    let order = state.orders.get(order_id(path)).await?;
    Ok(web::Json(order))
}

/// Edit whitelisted descriptive fields.
#[utoipa::path(
    patch,
    path = "/api/v1/orders/{id}",
    request_body = UpdateOrderRequest,
    params(
        ("id" = i64, Path, description = "Order id"),
        ("X-Actor-Id" = i64, Header, description = "Calling principal")
    ),
    responses(
        (status = 200, description = "Updated order", body = OrderSchema),
        (status = 400, description = "Field not editable or invalid", body = ErrorBody),
        (status = 403, description = "Actor may not edit this order", body = ErrorBody),
        (status = 409, description = "Stale expected version", body = ErrorBody)
    ),
    tags = ["orders"],
    operation_id = "updateOrder"
)]
#[patch("/orders/{id}")]
#[instrument(skip_all, fields(actor = %actor.0, order_id = %path))]
pub async fn update_order(
    state: web::Data<HttpState>,
    actor: ActorId,
    path: web::Path<i64>,
    payload: web::Json<UpdateOrderRequest>,
) -> ApiResult<web::Json<Order>> {
    let actor = actor.resolve(&state).await?;
    let UpdateOrderRequest {
        expected_version,
        fields,
    } = payload.into_inner();
    let patch = OrderPatch::from_raw(fields)?;
    let order = state
        .orders
        .update_fields(order_id(path), patch, &actor, expected_version)
        .await?;
    Ok(web::Json(order))
}

/// Tombstone an order. Idempotent.
#[utoipa::path(
    delete,
    path = "/api/v1/orders/{id}",
    params(
        ("id" = i64, Path, description = "Order id"),
        ("X-Actor-Id" = i64, Header, description = "Calling principal")
    ),
    responses(
        (status = 200, description = "Tombstoned order", body = OrderSchema),
        (status = 403, description = "Staff only", body = ErrorBody),
        (status = 404, description = "Unknown order", body = ErrorBody)
    ),
    tags = ["orders"],
    operation_id = "deleteOrder"
)]
#[delete("/orders/{id}")]
#[instrument(skip_all, fields(actor = %actor.0, order_id = %path))]
pub async fn delete_order(
    state: web::Data<HttpState>,
    actor: ActorId,
    path: web::Path<i64>,
) -> ApiResult<web::Json<Order>> {
    let actor = actor.resolve(&state).await?;
    let order = state.orders.soft_delete(order_id(path), &actor).await?;
    Ok(web::Json(order))
}

/// Clear an order's tombstone.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/restore",
    params(
        ("id" = i64, Path, description = "Order id"),
        ("X-Actor-Id" = i64, Header, description = "Calling principal")
    ),
    responses(
        (status = 200, description = "Restored order", body = OrderSchema),
        (status = 403, description = "Staff only", body = ErrorBody),
        (status = 404, description = "Unknown order", body = ErrorBody)
    ),
    tags = ["orders"],
    operation_id = "restoreOrder"
)]
#[post("/orders/{id}/restore")]
#[instrument(skip_all, fields(actor = %actor.0, order_id = %path))]
pub async fn restore_order(
    state: web::Data<HttpState>,
    actor: ActorId,
    path: web::Path<i64>,
) -> ApiResult<web::Json<Order>> {
    let actor = actor.resolve(&state).await?;
    let order = state.orders.restore(order_id(path), &actor).await?;
    Ok(web::Json(order))
}

/// Propose a status transition.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/transitions",
    request_body = TransitionRequest,
    params(
        ("id" = i64, Path, description = "Order id"),
        ("X-Actor-Id" = i64, Header, description = "Calling principal")
    ),
    responses(
        (status = 200, description = "Transitioned order", body = OrderSchema),
        (status = 409, description = "Transition not allowed or stale version", body = ErrorBody)
    ),
    tags = ["orders"],
    operation_id = "transitionOrder"
)]
#[post("/orders/{id}/transitions")]
#[instrument(skip_all, fields(actor = %actor.0, order_id = %path, to = %payload.to))]
pub async fn transition_order(
    state: web::Data<HttpState>,
    actor: ActorId,
    path: web::Path<i64>,
    payload: web::Json<TransitionRequest>,
) -> ApiResult<web::Json<Order>> {
    let actor = actor.resolve(&state).await?;
    let TransitionRequest {
        to,
        notes,
        expected_version,
    } = payload.into_inner();
    let order = state
        .orders
        .transition(order_id(path), to, &actor, notes, expected_version)
        .await?;
    Ok(web::Json(order))
}

/// Assign an order to a technician.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/assignment",
    request_body = AssignRequest,
    params(
        ("id" = i64, Path, description = "Order id"),
        ("X-Actor-Id" = i64, Header, description = "Calling principal")
    ),
    responses(
        (status = 200, description = "Assigned order", body = OrderSchema),
        (status = 409, description = "Technician unavailable or stale version", body = ErrorBody)
    ),
    tags = ["orders"],
    operation_id = "assignOrder"
)]
#[post("/orders/{id}/assignment")]
#[instrument(skip_all, fields(actor = %actor.0, order_id = %path, technician_id = %payload.technician_id))]
pub async fn assign_order(
    state: web::Data<HttpState>,
    actor: ActorId,
    path: web::Path<i64>,
    payload: web::Json<AssignRequest>,
) -> ApiResult<web::Json<Order>> {
    let actor = actor.resolve(&state).await?;
    let order = state
        .orders
        .assign(
            order_id(path),
            payload.technician_id,
            &actor,
            payload.expected_version,
        )
        .await?;
    Ok(web::Json(order))
}

/// Return an order to NEW, recording why.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/unassignment",
    request_body = UnassignRequest,
    params(
        ("id" = i64, Path, description = "Order id"),
        ("X-Actor-Id" = i64, Header, description = "Calling principal")
    ),
    responses(
        (status = 200, description = "Unassigned order", body = OrderSchema),
        (status = 409, description = "Transition not allowed or stale version", body = ErrorBody)
    ),
    tags = ["orders"],
    operation_id = "unassignOrder"
)]
#[post("/orders/{id}/unassignment")]
#[instrument(skip_all, fields(actor = %actor.0, order_id = %path))]
pub async fn unassign_order(
    state: web::Data<HttpState>,
    actor: ActorId,
    path: web::Path<i64>,
    payload: web::Json<UnassignRequest>,
) -> ApiResult<web::Json<Order>> {
    let actor = actor.resolve(&state).await?;
    let UnassignRequest {
        reason,
        expected_version,
    } = payload.into_inner();
    let order = state
        .orders
        .unassign(order_id(path), &actor, reason, expected_version)
        .await?;
    Ok(web::Json(order))
}

/// Close an order and settle the money split.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/close",
    request_body = CloseRequest,
    params(
        ("id" = i64, Path, description = "Order id"),
        ("X-Actor-Id" = i64, Header, description = "Calling principal")
    ),
    responses(
        (status = 200, description = "Closed order", body = OrderSchema),
        (status = 400, description = "Missing money fields or negative net", body = ErrorBody),
        (status = 409, description = "Transition not allowed or stale version", body = ErrorBody)
    ),
    tags = ["orders"],
    operation_id = "closeOrder"
)]
#[post("/orders/{id}/close")]
#[instrument(skip_all, fields(actor = %actor.0, order_id = %path))]
pub async fn close_order(
    state: web::Data<HttpState>,
    actor: ActorId,
    path: web::Path<i64>,
    payload: web::Json<CloseRequest>,
) -> ApiResult<web::Json<Order>> {
    let money = payload.money()?;
    let actor = actor.resolve(&state).await?;
    let flags = CloseFlags {
        has_review: payload.has_review,
        out_of_city: payload.out_of_city,
    };
    let order = state
        .orders
        .close(order_id(path), money, flags, &actor, payload.expected_version)
        .await?;
    Ok(web::Json(order))
}

/// Record long-repair terms and move an ONSITE order to DR.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/long-repair",
    request_body = LongRepairRequest,
    params(
        ("id" = i64, Path, description = "Order id"),
        ("X-Actor-Id" = i64, Header, description = "Calling principal")
    ),
    responses(
        (status = 200, description = "Order in long repair", body = OrderSchema),
        (status = 409, description = "Transition not allowed or stale version", body = ErrorBody)
    ),
    tags = ["orders"],
    operation_id = "moveToLongRepair"
)]
#[post("/orders/{id}/long-repair")]
#[instrument(skip_all, fields(actor = %actor.0, order_id = %path))]
pub async fn move_to_long_repair(
    state: web::Data<HttpState>,
    actor: ActorId,
    path: web::Path<i64>,
    payload: web::Json<LongRepairRequest>,
) -> ApiResult<web::Json<Order>> {
    let actor = actor.resolve(&state).await?;
    let LongRepairRequest {
        estimated_completion,
        prepayment,
        expected_version,
    } = payload.into_inner();
    let terms = LongRepairTerms {
        estimated_completion,
        prepayment,
    };
    let order = state
        .orders
        .move_to_long_repair(order_id(path), terms, &actor, expected_version)
        .await?;
    Ok(web::Json(order))
}

/// Move the scheduled arrival.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/reschedule",
    request_body = RescheduleRequest,
    params(
        ("id" = i64, Path, description = "Order id"),
        ("X-Actor-Id" = i64, Header, description = "Calling principal")
    ),
    responses(
        (status = 200, description = "Rescheduled order", body = OrderSchema),
        (status = 400, description = "Terminal order", body = ErrorBody),
        (status = 409, description = "Stale expected version", body = ErrorBody)
    ),
    tags = ["orders"],
    operation_id = "rescheduleOrder"
)]
#[post("/orders/{id}/reschedule")]
#[instrument(skip_all, fields(actor = %actor.0, order_id = %path))]
pub async fn reschedule_order(
    state: web::Data<HttpState>,
    actor: ActorId,
    path: web::Path<i64>,
    payload: web::Json<RescheduleRequest>,
) -> ApiResult<web::Json<Order>> {
    let actor = actor.resolve(&state).await?;
    let RescheduleRequest {
        scheduled_time,
        reason,
        expected_version,
    } = payload.into_inner();
    let order = state
        .orders
        .reschedule(
            order_id(path),
            &scheduled_time,
            reason,
            &actor,
            expected_version,
        )
        .await?;
    Ok(web::Json(order))
}

/// Status and field history of a live order.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/history",
    params(
        ("id" = i64, Path, description = "Order id"),
        ("X-Actor-Id" = i64, Header, description = "Calling principal")
    ),
    responses(
        (status = 200, description = "Status and field history"),
        (status = 404, description = "Unknown or deleted order", body = ErrorBody)
    ),
    tags = ["orders"],
    operation_id = "orderHistory"
)]
#[get("/orders/{id}/history")]
#[instrument(skip_all, fields(order_id = %path))]
pub async fn order_history(
    state: web::Data<HttpState>,
    _actor: ActorId,
    path: web::Path<i64>,
) -> ApiResult<web::Json<OrderHistoryResponse>> {
    let id = order_id(path);
    let status_history = state.orders.status_history(id).await?;
    let field_history = state.orders.field_history(id).await?;
    Ok(web::Json(OrderHistoryResponse {
        status_history,
        field_history,
    }))
}

#[cfg(test)]
#[path = "orders_tests.rs"]
mod tests;
