//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod archive_repository;
mod audit_log_repository;
mod event_publisher;
mod identity_repository;
mod ingest_notifier;
mod ingest_repository;
mod mirror_binding_repository;
mod mirror_target_policy;
mod mirror_transport;
mod order_repository;
mod report_repository;
mod specialty_rate_repository;

#[cfg(test)]
pub use archive_repository::MockArchiveRepository;
pub use archive_repository::{ArchiveRepository, ArchiveRepositoryError};
#[cfg(test)]
pub use audit_log_repository::MockAuditLogRepository;
pub use audit_log_repository::{AuditLogRepository, AuditLogRepositoryError};
#[cfg(test)]
pub use event_publisher::{MockDomainEventHandler, MockEventPublisher};
pub use event_publisher::{
    DomainEventHandler, EventPublisher, EventPublisherError, NoOpEventPublisher,
};
#[cfg(test)]
pub use identity_repository::MockIdentityRepository;
pub use identity_repository::{IdentityRepository, IdentityRepositoryError};
#[cfg(test)]
pub use ingest_notifier::MockIngestNotifier;
pub use ingest_notifier::{IngestNotifier, IngestNotifierError};
#[cfg(test)]
pub use ingest_repository::{MockIngestConfigRepository, MockIngestTelemetryRepository};
pub use ingest_repository::{
    FixtureIngestConfigRepository, IngestConfigRepository, IngestRepositoryError,
    IngestTelemetryRepository,
};
#[cfg(test)]
pub use mirror_binding_repository::MockMirrorBindingRepository;
pub use mirror_binding_repository::{MirrorBindingRepository, MirrorBindingRepositoryError};
#[cfg(test)]
pub use mirror_target_policy::MockMirrorTargetPolicy;
pub use mirror_target_policy::{MirrorTargetPolicy, MirrorTargetPolicyError};
#[cfg(test)]
pub use mirror_transport::MockMirrorTransport;
pub use mirror_transport::{MirrorTransport, MirrorTransportError};
#[cfg(test)]
pub use order_repository::MockOrderRepository;
pub use order_repository::{
    ClosedOrdersPage, NewOrder, OrderChange, OrderRepository, OrderRepositoryError, Visibility,
};
#[cfg(test)]
pub use report_repository::MockReportRepository;
pub use report_repository::{ReportRepository, ReportRepositoryError};
#[cfg(test)]
pub use specialty_rate_repository::MockSpecialtyRateRepository;
pub use specialty_rate_repository::{
    FixtureSpecialtyRateRepository, SpecialtyRateRepository, SpecialtyRateRepositoryError,
};
