//! Test helpers for inbound HTTP components.

use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::StatusCode;
use actix_web::{test, web};
use serde_json::Value;

use crate::inbound::http::actor::ACTOR_HEADER;
use crate::inbound::http::health::HealthState;
use crate::server::build_app;
use crate::test_support::TestDeployment;

/// Instant the HTTP tests run at (Monday, 12:00 in the default zone).
pub const NOW: &str = "2026-03-02T09:00:00Z";

/// Initialise the full application over a test deployment.
pub async fn init_app(
    deployment: &TestDeployment,
) -> impl Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error> {
    test::init_service(build_app(
        web::Data::new(HealthState::new()),
        web::Data::new(deployment.core.http.clone()),
    ))
    .await
}

/// Attach the `X-Actor-Id` header.
pub fn as_actor(request: test::TestRequest, actor: i64) -> test::TestRequest {
    request.insert_header((ACTOR_HEADER, actor.to_string()))
}

/// Send `request` and decode the JSON body (`Null` when empty).
pub async fn send<S>(app: &S, request: test::TestRequest) -> (StatusCode, Value)
where
    S: Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error>,
{
    let response = test::call_service(app, request.to_request()).await;
    let status = response.status();
    let body = test::read_body(response).await;
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).expect("response body is JSON")
    };
    (status, json)
}
