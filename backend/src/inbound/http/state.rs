//! Shared HTTP adapter state.
//!
//! Handlers accept this state via `actix_web::web::Data` so they only depend
//! on the core services and remain testable against in-memory ports.

use std::sync::Arc;

use crate::domain::{IdentityService, IngestPipeline, OrderService, ReportService};

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub orders: OrderService,
    pub identity: IdentityService,
    /// Shared because it owns the process-local pending confirmations.
    pub ingest: Arc<IngestPipeline>,
    pub reports: ReportService,
}

impl HttpState {
    pub fn new(
        orders: OrderService,
        identity: IdentityService,
        ingest: Arc<IngestPipeline>,
        reports: ReportService,
    ) -> Self {
        Self {
            orders,
            identity,
            ingest,
            reports,
        }
    }
}
