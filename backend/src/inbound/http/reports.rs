//! Period report handlers.
//!
//! ```text
//! POST /api/v1/reports
//! GET  /api/v1/reports/{id}
//! ```

use actix_web::http::header::ContentType;
use actix_web::{HttpResponse, get, post, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::domain::{PeriodReport, ReportId, ReportKind};
use crate::inbound::http::ApiResult;
use crate::inbound::http::actor::ActorId;
use crate::inbound::http::error::ErrorBody;
use crate::inbound::http::schemas::PeriodReportSchema;
use crate::inbound::http::state::HttpState;

/// Body of `POST /api/v1/reports`.
#[derive(Debug, Clone, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReportRequest {
    #[schema(value_type = String, example = "DAILY")]
    pub kind: ReportKind,
    /// First civil day of the period.
    #[schema(value_type = String, format = Date, example = "2026-03-01")]
    pub period_start: NaiveDate,
}

/// Aggregate the closed orders of one period and store the report.
#[utoipa::path(
    post,
    path = "/api/v1/reports",
    request_body = GenerateReportRequest,
    params(("X-Actor-Id" = i64, Header, description = "Calling principal")),
    responses(
        (status = 201, description = "Report stored", body = PeriodReportSchema),
        (status = 403, description = "Staff only", body = ErrorBody)
    ),
    tags = ["reports"],
    operation_id = "generateReport"
)]
#[post("/reports")]
#[instrument(skip_all, fields(actor = %actor.0, kind = %payload.kind))]
pub async fn generate_report(
    state: web::Data<HttpState>,
    actor: ActorId,
    payload: web::Json<GenerateReportRequest>,
) -> ApiResult<HttpResponse> {
    let actor = actor.resolve(&state).await?;
    let report: PeriodReport = state
        .reports
        .generate(payload.kind, payload.period_start, &actor)
        .await?;
    Ok(HttpResponse::Created().json(report))
}

/// Render a stored report as a JSON document.
#[utoipa::path(
    get,
    path = "/api/v1/reports/{id}",
    params(
        ("id" = i64, Path, description = "Report id"),
        ("X-Actor-Id" = i64, Header, description = "Calling principal")
    ),
    responses(
        (status = 200, description = "Rendered report", body = PeriodReportSchema),
        (status = 404, description = "Unknown report", body = ErrorBody)
    ),
    tags = ["reports"],
    operation_id = "renderReport"
)]
#[get("/reports/{id}")]
#[instrument(skip_all, fields(report_id = %path))]
pub async fn render_report(
    state: web::Data<HttpState>,
    _actor: ActorId,
    path: web::Path<i64>,
) -> ApiResult<HttpResponse> {
    let document = state
        .reports
        .render(ReportId::new(path.into_inner()))
        .await?;
    Ok(HttpResponse::Ok()
        .content_type(ContentType::json())
        .body(document))
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::test::TestRequest;
    use rstest::rstest;
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;
    use crate::inbound::http::test_utils::{NOW, as_actor, init_app, send};
    use crate::test_support::TestDeployment;
    use crate::test_support::clock::instant;
    use crate::test_support::fixtures::closed_order;

    #[rstest]
    #[actix_web::test]
    async fn generated_reports_can_be_rendered() {
        let deployment = TestDeployment::seeded(NOW);
        deployment.store.add_order(closed_order(
            1,
            1,
            dec!(10000),
            dec!(2000),
            instant("2026-03-01T10:00:00Z"),
        ));
        let app = init_app(&deployment).await;

        let (status, created) = send(
            &app,
            as_actor(TestRequest::post().uri("/api/v1/reports"), 100)
                .set_json(json!({ "kind": "DAILY", "periodStart": "2026-03-01" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{created}");
        let report: PeriodReport = serde_json::from_value(created).expect("report body");
        assert_eq!(report.kind, ReportKind::Daily);
        assert_eq!(report.totals.total_orders, 1);

        let (status, rendered) = send(
            &app,
            as_actor(
                TestRequest::get().uri(&format!("/api/v1/reports/{}", report.id)),
                100,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let rendered: PeriodReport = serde_json::from_value(rendered).expect("rendered report");
        assert_eq!(rendered, report);
    }

    #[rstest]
    #[actix_web::test]
    async fn masters_cannot_generate_reports() {
        let deployment = TestDeployment::seeded(NOW);
        let app = init_app(&deployment).await;

        let (status, body) = send(
            &app,
            as_actor(TestRequest::post().uri("/api/v1/reports"), 11)
                .set_json(json!({ "kind": "WEEKLY", "periodStart": "2026-02-23" })),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "forbidden");
    }

    #[rstest]
    #[actix_web::test]
    async fn unknown_reports_are_not_found() {
        let deployment = TestDeployment::seeded(NOW);
        let app = init_app(&deployment).await;

        let (status, _) = send(
            &app,
            as_actor(TestRequest::get().uri("/api/v1/reports/404"), 100),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
