//! Technician administration.
//!
//! ```text
//! POST /api/v1/technicians/{id}/deactivation
//! ```

use actix_web::{post, web};
use tracing::instrument;

use crate::domain::{Technician, TechnicianId};
use crate::inbound::http::ApiResult;
use crate::inbound::http::actor::ActorId;
use crate::inbound::http::error::ErrorBody;
use crate::inbound::http::schemas::TechnicianSchema;
use crate::inbound::http::state::HttpState;

/// Deactivate a technician. Their orders are archived once the event is
/// delivered; repeating the call is a no-op.
#[utoipa::path(
    post,
    path = "/api/v1/technicians/{id}/deactivation",
    params(
        ("id" = i64, Path, description = "Technician id"),
        ("X-Actor-Id" = i64, Header, description = "Calling principal")
    ),
    responses(
        (status = 200, description = "Deactivated technician", body = TechnicianSchema),
        (status = 403, description = "Staff only", body = ErrorBody),
        (status = 404, description = "Unknown technician", body = ErrorBody)
    ),
    tags = ["technicians"],
    operation_id = "deactivateTechnician"
)]
#[post("/technicians/{id}/deactivation")]
#[instrument(skip_all, fields(actor = %actor.0, technician_id = %path))]
pub async fn deactivate_technician(
    state: web::Data<HttpState>,
    actor: ActorId,
    path: web::Path<i64>,
) -> ApiResult<web::Json<Technician>> {
    let actor = actor.resolve(&state).await?;
    let technician = state
        .identity
        .deactivate_technician(TechnicianId::new(path.into_inner()), &actor)
        .await?;
    Ok(web::Json(technician))
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::test::TestRequest;
    use rstest::rstest;

    use super::*;
    use crate::domain::DomainEvent;
    use crate::inbound::http::test_utils::{NOW, as_actor, init_app, send};
    use crate::test_support::TestDeployment;

    #[rstest]
    #[actix_web::test]
    async fn admins_deactivate_technicians() {
        let deployment = TestDeployment::seeded(NOW);
        let app = init_app(&deployment).await;

        let (status, body) = send(
            &app,
            as_actor(
                TestRequest::post().uri("/api/v1/technicians/1/deactivation"),
                1,
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let technician: Technician = serde_json::from_value(body).expect("technician body");
        assert!(!technician.is_active);
        let events = deployment.drain_events().await;
        assert!(events.iter().any(|event| matches!(
            event,
            DomainEvent::TechnicianDeactivated { technician_id, .. }
                if *technician_id == TechnicianId::new(1)
        )));
    }

    #[rstest]
    #[case(11)]
    #[case(12)]
    #[actix_web::test]
    async fn masters_cannot_deactivate(#[case] actor: i64) {
        let deployment = TestDeployment::seeded(NOW);
        let app = init_app(&deployment).await;

        let (status, _) = send(
            &app,
            as_actor(
                TestRequest::post().uri("/api/v1/technicians/2/deactivation"),
                actor,
            ),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            deployment
                .store
                .technician(TechnicianId::new(2))
                .map(|technician| technician.is_active),
            Some(true)
        );
    }
}
