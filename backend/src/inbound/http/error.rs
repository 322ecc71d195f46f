//! HTTP adapter mapping for domain errors.
//!
//! Purpose: keep [`DispatchError`] HTTP-agnostic while letting Actix handlers
//! turn core failures into a consistent `{ code, message }` JSON envelope and
//! a status code chosen from [`ErrorCode`].

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::domain::{DispatchError, ErrorCode};

/// Convenient result alias for HTTP handlers.
pub type ApiResult<T> = Result<T, DispatchError>;

/// Wire form of a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Stable machine-readable error code.
    #[schema(value_type = crate::inbound::http::schemas::ErrorCodeSchema, example = "conflict")]
    pub code: ErrorCode,
    /// Human-readable message returned to clients.
    #[schema(example = "order 7 was modified concurrently (expected version 4)")]
    pub message: String,
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<&DispatchError> for ErrorBody {
    fn from(error: &DispatchError) -> Self {
        let code = error.code();
        let message = if matches!(code, ErrorCode::InternalError) {
            "Internal server error".to_owned()
        } else {
            error.to_string()
        };
        Self { code, message }
    }
}

impl ResponseError for DispatchError {
    fn status_code(&self) -> StatusCode {
        status_for(self.code())
    }

    fn error_response(&self) -> HttpResponse {
        if matches!(self.code(), ErrorCode::InternalError) {
            error!(error = %self, "request failed with an internal error");
        }
        HttpResponse::build(self.status_code()).json(ErrorBody::from(self))
    }
}

impl From<actix_web::Error> for DispatchError {
    fn from(err: actix_web::Error) -> Self {
        // Do not leak implementation details to clients.
        error!(error = %err, "actix error promoted to domain error");
        Self::internal("Internal server error")
    }
}

#[cfg(test)]
mod tests {
    //! Tests for HTTP error mapping.

    use actix_web::body::to_bytes;
    use rstest::rstest;

    use super::*;
    use crate::domain::{Entity, OrderStatus, RoleSet};

    async fn body_of(error: &DispatchError) -> ErrorBody {
        let response = ResponseError::error_response(error);
        let bytes = to_bytes(response.into_body())
            .await
            .expect("reading response body succeeds");
        serde_json::from_slice(&bytes).expect("error body deserialises")
    }

    #[rstest]
    #[case(DispatchError::NegativeNet, StatusCode::BAD_REQUEST)]
    #[case(DispatchError::validation("bad"), StatusCode::BAD_REQUEST)]
    #[case(DispatchError::forbidden("denied"), StatusCode::FORBIDDEN)]
    #[case(DispatchError::not_found(Entity::Order, 3), StatusCode::NOT_FOUND)]
    #[case(DispatchError::concurrent(Entity::Order, 3, 2), StatusCode::CONFLICT)]
    #[case(
        DispatchError::InvalidTransition {
            from: Some(OrderStatus::New),
            to: OrderStatus::Closed,
            roles: RoleSet::unknown(),
        },
        StatusCode::CONFLICT
    )]
    #[case(DispatchError::unavailable("db down"), StatusCode::SERVICE_UNAVAILABLE)]
    #[case(DispatchError::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR)]
    fn status_code_matches_error_code(#[case] error: DispatchError, #[case] status: StatusCode) {
        assert_eq!(ResponseError::status_code(&error), status);
    }

    #[rstest]
    #[actix_web::test]
    async fn conflicts_carry_code_and_message() {
        let body = body_of(&DispatchError::concurrent(Entity::Order, 7, 4)).await;

        assert_eq!(body.code, ErrorCode::Conflict);
        assert_eq!(
            body.message,
            "order 7 was modified concurrently (expected version 4)"
        );
    }

    #[rstest]
    #[actix_web::test]
    async fn internal_errors_are_redacted() {
        let body = body_of(&DispatchError::internal("relation \"orders\" is locked")).await;

        assert_eq!(body.code, ErrorCode::InternalError);
        assert_eq!(body.message, "Internal server error");
    }

    #[rstest]
    fn actix_errors_become_internal() {
        let actix = actix_web::error::ErrorBadGateway("upstream");
        let error = DispatchError::from(actix);
        assert_eq!(error.code(), ErrorCode::InternalError);
    }
}
