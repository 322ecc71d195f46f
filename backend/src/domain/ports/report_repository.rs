//! Port for stored period reports.

use async_trait::async_trait;

use chrono::NaiveDate;

use crate::domain::{NewPeriodReport, PeriodReport, ReportId, ReportKind};

use super::define_port_error;

define_port_error! {
    /// Errors raised by report repository adapters.
    pub enum ReportRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "report repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "report repository query failed: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Persist the report and its technician rows in one transaction.
    async fn save_period_report(
        &self,
        report: NewPeriodReport,
    ) -> Result<ReportId, ReportRepositoryError>;

    async fn find_period_report(
        &self,
        id: ReportId,
    ) -> Result<Option<PeriodReport>, ReportRepositoryError>;

    /// Whether a report of `kind` starting on `period_start` is stored.
    async fn period_report_exists(
        &self,
        kind: ReportKind,
        period_start: NaiveDate,
    ) -> Result<bool, ReportRepositoryError>;
}
