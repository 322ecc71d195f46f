//! Server construction, background tasks and wiring.

mod config;
mod wiring;

pub use config::{AppSettings, SettingsError};
pub use wiring::{Core, CorePorts, build_core};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use actix_web::dev::{Server, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, HttpServer, web};
use tokio::task::JoinHandle;
use tracing::info;
#[cfg(debug_assertions)]
use utoipa::OpenApi;
#[cfg(debug_assertions)]
use utoipa_swagger_ui::SwaggerUi;

#[cfg(debug_assertions)]
use crate::doc::ApiDoc;
use crate::domain::ReportScheduler;
use crate::inbound::http::health::{HealthState, live, ready};
use crate::inbound::http::ingest::{confirm_ingested, ingest_message};
use crate::inbound::http::orders::{
    assign_order, close_order, create_order, delete_order, get_order, move_to_long_repair,
    order_history, reschedule_order, restore_order, transition_order, unassign_order,
    update_order,
};
use crate::inbound::http::reports::{generate_report, render_report};
use crate::inbound::http::request_span::RequestSpan;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::technicians::deactivate_technician;

/// How often the report scheduler checks for a new civil day.
pub const REPORT_TICK: Duration = Duration::from_secs(60);

/// Build the Actix application over the given state.
pub fn build_app(
    health_state: web::Data<HealthState>,
    http_state: web::Data<HttpState>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let api = web::scope("/api/v1")
        .service(create_order)
        .service(get_order)
        .service(update_order)
        .service(delete_order)
        .service(restore_order)
        .service(transition_order)
        .service(assign_order)
        .service(unassign_order)
        .service(close_order)
        .service(move_to_long_repair)
        .service(reschedule_order)
        .service(order_history)
        .service(ingest_message)
        .service(confirm_ingested)
        .service(generate_report)
        .service(render_report)
        .service(deactivate_technician);

    let app = App::new()
        .app_data(health_state)
        .app_data(http_state)
        .wrap(RequestSpan)
        .service(api)
        .service(ready)
        .service(live);

    #[cfg(debug_assertions)]
    let app = app.service(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));

    app
}

/// Construct an Actix HTTP server bound to `bind_addr`.
///
/// # Errors
/// Propagates [`std::io::Error`] when binding the socket fails.
pub fn create_server(
    health_state: web::Data<HealthState>,
    http_state: HttpState,
    bind_addr: SocketAddr,
) -> std::io::Result<Server> {
    let server_health_state = health_state.clone();
    let http_state = web::Data::new(http_state);
    let server = HttpServer::new(move || build_app(server_health_state.clone(), http_state.clone()))
        .bind(bind_addr)?
        .run();

    health_state.mark_ready();
    info!(%bind_addr, "http server listening");
    Ok(server)
}

/// Run the report scheduler every `period` until the runtime shuts down.
pub fn spawn_report_scheduler(scheduler: ReportScheduler, period: Duration) -> JoinHandle<()> {
    let scheduler = Arc::new(scheduler);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let generated = scheduler.tick().await;
            if !generated.is_empty() {
                info!(count = generated.len(), "period reports generated");
            }
        }
    })
}
