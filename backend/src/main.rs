//! Backend entry-point: loads settings, migrates the store and serves the API.

use std::sync::Arc;

use actix_web::web;
use color_eyre::eyre::{WrapErr, eyre};
use mockable::DefaultClock;
use ortho_config::OrthoConfig;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use dispatch_backend::domain::ports::{IngestNotifier, MirrorTransport};
use dispatch_backend::domain::{AttemptJitter, CivilClock, RetryRunner, TokioSleeper};
use dispatch_backend::inbound::http::health::HealthState;
use dispatch_backend::outbound::chat::{ChatGateway, LoggingChatGateway};
use dispatch_backend::outbound::event_bus::{EVENT_BUS_CAPACITY, event_channel};
use dispatch_backend::outbound::persistence::{DbPool, PostgresStore, run_migrations};
use dispatch_backend::server::{
    AppSettings, CorePorts, REPORT_TICK, build_core, create_server, spawn_report_scheduler,
};

/// Application bootstrap.
#[actix_web::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings = AppSettings::load_from_iter(std::env::args_os())
        .map_err(|err| eyre!("failed to load settings: {err}"))?;
    let database_url = settings.database_url()?;
    let bind_addr = settings.bind_addr()?;

    run_migrations(database_url)
        .await
        .wrap_err("failed to apply migrations")?;
    let pool = DbPool::new(settings.pool_config()?)
        .await
        .wrap_err("failed to build database pool")?;
    let store = PostgresStore::new(pool);

    let clock = CivilClock::with_offset_minutes(
        Arc::new(DefaultClock),
        settings.utc_offset_minutes(),
    )?;
    let retry_config = settings.mirror_retry();
    let (transport, notifier) = chat_adapters(&settings, retry_config.call_timeout)?;
    let retry = RetryRunner::new(
        retry_config,
        clock.clone(),
        Arc::new(TokioSleeper),
        Arc::new(AttemptJitter),
    );

    let (publisher, events) = event_channel(EVENT_BUS_CAPACITY);
    let ports = CorePorts {
        orders: Arc::new(store.orders),
        identity: Arc::new(store.identity),
        rates: Arc::new(store.rates),
        audit: Arc::new(store.audit),
        bindings: Arc::new(store.bindings),
        reports: Arc::new(store.reports),
        archives: Arc::new(store.archives),
        ingest_config: Arc::new(store.ingest.clone()),
        telemetry: Arc::new(store.ingest),
        transport,
        notifier,
        events: Arc::new(publisher),
    };
    let core = build_core(ports, settings.ingest(), retry, clock);

    tokio::spawn(core.dispatcher.run(events));
    if settings.reports_enabled {
        spawn_report_scheduler(core.scheduler, REPORT_TICK);
        info!("report scheduler started");
    }

    let health_state = web::Data::new(HealthState::new());
    create_server(health_state, core.http, bind_addr)?.await?;
    Ok(())
}

type ChatAdapters = (Arc<dyn MirrorTransport>, Arc<dyn IngestNotifier>);

/// Chat gateway for the configured API, or a logging stand-in without one.
fn chat_adapters(
    settings: &AppSettings,
    timeout: std::time::Duration,
) -> color_eyre::Result<ChatAdapters> {
    let Some(raw_url) = settings.chat_api_url.as_deref() else {
        warn!("chat_api_url is not set; mirror cards and ingest replies are only logged");
        let gateway = Arc::new(LoggingChatGateway);
        return Ok((gateway.clone(), gateway));
    };
    let base_url = url::Url::parse(raw_url).wrap_err("chat_api_url is not a valid URL")?;
    let gateway = Arc::new(
        ChatGateway::new(base_url, settings.chat_api_token.clone(), timeout)
            .wrap_err("failed to build chat client")?,
    );
    Ok((gateway.clone(), gateway))
}
