//! Feed ingestion handlers.
//!
//! ```text
//! POST /api/v1/ingest/messages
//! POST /api/v1/ingest/confirmations/{id}
//! ```
//!
//! The chat gateway forwards every feed message to the first route; the
//! sender travels in the body, so no `X-Actor-Id` is needed there. Staff
//! answer the resulting confirmation request through the second route.

use actix_web::{post, web};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::domain::{
    ChatId, ConfirmationDecision, ConfirmationOutcome, IncomingMessage, IngestOutcome, MessageId,
    UserId,
};
use crate::inbound::http::ApiResult;
use crate::inbound::http::actor::ActorId;
use crate::inbound::http::error::ErrorBody;
use crate::inbound::http::state::HttpState;

/// Body of `POST /api/v1/ingest/messages`.
#[derive(Debug, Clone, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngestMessageRequest {
    #[schema(example = "С/м не крутит барабан. ул. Ленина 5-10. +79001234567 завтра к 14:00")]
    pub text: String,
    #[schema(value_type = i64, example = 12345)]
    pub message_id: MessageId,
    #[schema(value_type = i64, example = 999)]
    pub sender_id: UserId,
    #[schema(value_type = i64, example = -200)]
    pub chat_id: ChatId,
}

impl From<IngestMessageRequest> for IncomingMessage {
    fn from(value: IngestMessageRequest) -> Self {
        Self {
            text: value.text,
            message_id: value.message_id,
            sender_id: value.sender_id,
            chat_id: value.chat_id,
        }
    }
}

/// Body of `POST /api/v1/ingest/confirmations/{id}`.
#[derive(Debug, Clone, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    #[schema(value_type = String, example = "yes")]
    pub decision: ConfirmationDecision,
}

/// Parse one feed message into a pending confirmation.
#[utoipa::path(
    post,
    path = "/api/v1/ingest/messages",
    request_body = IngestMessageRequest,
    responses(
        (status = 200, description = "Tagged ingest outcome: ignored, parse_failed, duplicate or awaiting_confirmation"),
        (status = 503, description = "Store unavailable", body = ErrorBody)
    ),
    tags = ["ingest"],
    operation_id = "ingestMessage"
)]
#[post("/ingest/messages")]
#[instrument(skip_all, fields(message_id = %payload.message_id, chat_id = %payload.chat_id))]
pub async fn ingest_message(
    state: web::Data<HttpState>,
    payload: web::Json<IngestMessageRequest>,
) -> ApiResult<web::Json<IngestOutcome>> {
    let outcome = state.ingest.on_message(payload.into_inner().into()).await?;
    Ok(web::Json(outcome))
}

/// Accept or decline a pending confirmation.
#[utoipa::path(
    post,
    path = "/api/v1/ingest/confirmations/{id}",
    request_body = ConfirmRequest,
    params(
        ("id" = i64, Path, description = "Confirmation id (source message id)"),
        ("X-Actor-Id" = i64, Header, description = "Calling principal")
    ),
    responses(
        (status = 200, description = "Tagged outcome: created (with the order) or declined"),
        (status = 403, description = "Staff only", body = ErrorBody),
        (status = 404, description = "Unknown or expired confirmation", body = ErrorBody)
    ),
    tags = ["ingest"],
    operation_id = "confirmIngested"
)]
#[post("/ingest/confirmations/{id}")]
#[instrument(skip_all, fields(actor = %actor.0, confirmation_id = %path))]
pub async fn confirm_ingested(
    state: web::Data<HttpState>,
    actor: ActorId,
    path: web::Path<i64>,
    payload: web::Json<ConfirmRequest>,
) -> ApiResult<web::Json<ConfirmationOutcome>> {
    let actor = actor.resolve(&state).await?;
    let outcome = state
        .ingest
        .confirm(MessageId::new(path.into_inner()), payload.decision, &actor)
        .await?;
    Ok(web::Json(outcome))
}
