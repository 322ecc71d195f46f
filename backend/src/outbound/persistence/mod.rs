//! PostgreSQL store adapters using Diesel ORM.
//!
//! Every store port of the dispatch core has one adapter here, backed by
//! PostgreSQL via `diesel-async` with `bb8` pooling.
//!
//! # Architecture
//!
//! - **Thin adapters**: repositories only translate between Diesel rows and
//!   domain records. Lifecycle rules stay in the domain services.
//! - **Internal models**: row structs (`models.rs`) and table definitions
//!   (`schema.rs`) never leave this module.
//! - **Atomic changes**: an order change, its history rows and its audit
//!   rows commit in one transaction guarded by the order's version.
//! - **Strongly typed errors**: database failures map to each port's
//!   `Connection` or `Query` variant; raw database messages are logged, not
//!   returned.
//!
//! # Example
//!
//! ```ignore
//! use dispatch_backend::outbound::persistence::{DbPool, DieselOrderRepository, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/dispatch")).await?;
//! let orders = DieselOrderRepository::new(pool.clone());
//! ```

mod diesel_archive_repository;
mod diesel_audit_log_repository;
mod diesel_identity_repository;
mod diesel_ingest_repository;
mod diesel_mirror_binding_repository;
mod diesel_order_repository;
mod diesel_report_repository;
mod diesel_specialty_rate_repository;
mod error_mapping;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_archive_repository::DieselArchiveRepository;
pub use diesel_audit_log_repository::DieselAuditLogRepository;
pub use diesel_identity_repository::DieselIdentityRepository;
pub use diesel_ingest_repository::DieselIngestRepository;
pub use diesel_mirror_binding_repository::DieselMirrorBindingRepository;
pub use diesel_order_repository::DieselOrderRepository;
pub use diesel_report_repository::DieselReportRepository;
pub use diesel_specialty_rate_repository::DieselSpecialtyRateRepository;
pub use migrations::{MIGRATIONS, MigrationError, run_migrations};
pub use pool::{DbPool, PoolConfig, PoolError};

/// One adapter per store port, all sharing a pool.
#[derive(Clone)]
pub struct PostgresStore {
    pub orders: DieselOrderRepository,
    pub identity: DieselIdentityRepository,
    pub audit: DieselAuditLogRepository,
    pub bindings: DieselMirrorBindingRepository,
    pub reports: DieselReportRepository,
    pub archives: DieselArchiveRepository,
    pub rates: DieselSpecialtyRateRepository,
    pub ingest: DieselIngestRepository,
}

impl PostgresStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            orders: DieselOrderRepository::new(pool.clone()),
            identity: DieselIdentityRepository::new(pool.clone()),
            audit: DieselAuditLogRepository::new(pool.clone()),
            bindings: DieselMirrorBindingRepository::new(pool.clone()),
            reports: DieselReportRepository::new(pool.clone()),
            archives: DieselArchiveRepository::new(pool.clone()),
            rates: DieselSpecialtyRateRepository::new(pool.clone()),
            ingest: DieselIngestRepository::new(pool),
        }
    }
}
