//! Assembly of the core services from a set of port implementations.
//!
//! The binary feeds PostgreSQL and chat-gateway adapters in here; integration
//! tests feed the in-memory doubles, so both exercise the same wiring.

use std::sync::Arc;

use crate::domain::ports::{
    ArchiveRepository, AuditLogRepository, EventPublisher, IdentityRepository,
    IngestConfigRepository, IngestNotifier, IngestTelemetryRepository, MirrorBindingRepository,
    MirrorTransport, OrderRepository, ReportRepository, SpecialtyRateRepository,
};
use crate::domain::{
    ArchiveService, CivilClock, IdentityService, IngestPipeline, IngestPorts, IngestSettings,
    MirrorCoordinator, MirrorPorts, OrderService, OrderServicePorts, ReportScheduler,
    ReportService, RetryRunner, WorkChannelPolicy,
};
use crate::inbound::events::EventDispatcher;
use crate::inbound::http::state::HttpState;

/// Port implementations consumed by the core.
#[derive(Clone)]
pub struct CorePorts {
    pub orders: Arc<dyn OrderRepository>,
    pub identity: Arc<dyn IdentityRepository>,
    pub rates: Arc<dyn SpecialtyRateRepository>,
    pub audit: Arc<dyn AuditLogRepository>,
    pub bindings: Arc<dyn MirrorBindingRepository>,
    pub reports: Arc<dyn ReportRepository>,
    pub archives: Arc<dyn ArchiveRepository>,
    pub ingest_config: Arc<dyn IngestConfigRepository>,
    pub telemetry: Arc<dyn IngestTelemetryRepository>,
    pub transport: Arc<dyn MirrorTransport>,
    pub notifier: Arc<dyn IngestNotifier>,
    pub events: Arc<dyn EventPublisher>,
}

/// Wired core: HTTP-facing services, event subscribers and the scheduler.
pub struct Core {
    pub http: HttpState,
    pub dispatcher: EventDispatcher,
    pub scheduler: ReportScheduler,
}

/// Build every service over `ports`.
///
/// The dispatcher delivers each event to the mirror coordinator before the
/// archive service.
pub fn build_core(
    ports: CorePorts,
    ingest: IngestSettings,
    retry: RetryRunner,
    clock: CivilClock,
) -> Core {
    let orders = OrderService::new(
        OrderServicePorts {
            orders: ports.orders.clone(),
            identity: ports.identity.clone(),
            rates: ports.rates,
            audit: ports.audit.clone(),
            events: ports.events.clone(),
        },
        clock.clone(),
    );
    let identity = IdentityService::new(ports.identity.clone(), ports.events, clock.clone());
    let pipeline = IngestPipeline::new(
        IngestPorts {
            orders: ports.orders.clone(),
            identity: ports.identity.clone(),
            config: ports.ingest_config,
            telemetry: ports.telemetry,
            notifier: ports.notifier,
        },
        orders.clone(),
        ingest,
        clock.clone(),
    );
    let reports = ReportService::new(ports.orders.clone(), ports.reports, clock.clone());

    let mirror = MirrorCoordinator::new(
        MirrorPorts {
            orders: ports.orders.clone(),
            bindings: ports.bindings,
            transport: ports.transport,
            policy: Arc::new(WorkChannelPolicy::new(ports.identity)),
            audit: ports.audit.clone(),
        },
        clock.clone(),
        retry,
    );
    let archive = ArchiveService::new(ports.orders, ports.archives, ports.audit, clock.clone());
    let dispatcher = EventDispatcher::new()
        .with_handler(Arc::new(mirror))
        .with_handler(Arc::new(archive));

    Core {
        http: HttpState::new(orders, identity, Arc::new(pipeline), reports.clone()),
        dispatcher,
        scheduler: ReportScheduler::new(reports, clock),
    }
}
