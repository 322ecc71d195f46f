//! PostgreSQL-backed `ReportRepository`.
//!
//! A report header and its per-technician rows are written in one
//! transaction; stored reports are never updated.

use async_trait::async_trait;
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use tracing::debug;

use crate::domain::ports::{ReportRepository, ReportRepositoryError};
use crate::domain::{
    NewPeriodReport, PeriodReport, PeriodTotals, ReportId, ReportKind, TechnicianId,
    TechnicianPeriodReport,
};

use super::error_mapping;
use super::models::{NewPeriodReportRow, PeriodReportRow, TechnicianPeriodReportRow};
use super::pool::{DbPool, PoolError};
use super::schema::{period_reports, technician_period_reports};

/// Diesel-backed implementation of the report port.
#[derive(Clone)]
pub struct DieselReportRepository {
    pool: DbPool,
}

impl DieselReportRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> ReportRepositoryError {
    error_mapping::map_pool_error(error, ReportRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> ReportRepositoryError {
    error_mapping::map_diesel_error(
        error,
        ReportRepositoryError::query,
        ReportRepositoryError::connection,
    )
}

impl<'a> NewPeriodReportRow<'a> {
    fn from_report(report: &'a NewPeriodReport) -> Self {
        let totals = &report.totals;
        Self {
            kind: report.kind.as_str(),
            period_start: report.period_start,
            period_end: report.period_end,
            total_orders: totals.total_orders,
            total_amount: totals.total_amount,
            total_materials_cost: totals.total_materials_cost,
            total_net_profit: totals.total_net_profit,
            total_company_profit: totals.total_company_profit,
            total_technician_profit: totals.total_technician_profit,
            average_check: totals.average_check,
            generated_at: report.generated_at,
        }
    }
}

impl TechnicianPeriodReportRow {
    fn from_slice(report_id: i64, slice: &TechnicianPeriodReport) -> Self {
        let totals = &slice.totals;
        Self {
            report_id,
            technician_id: slice.technician_id.get(),
            total_orders: totals.total_orders,
            total_amount: totals.total_amount,
            total_materials_cost: totals.total_materials_cost,
            total_net_profit: totals.total_net_profit,
            total_company_profit: totals.total_company_profit,
            total_technician_profit: totals.total_technician_profit,
            average_check: totals.average_check,
            reviews_count: slice.reviews_count,
            out_of_city_count: slice.out_of_city_count,
        }
    }
}

impl From<TechnicianPeriodReportRow> for TechnicianPeriodReport {
    fn from(row: TechnicianPeriodReportRow) -> Self {
        Self {
            technician_id: TechnicianId::new(row.technician_id),
            totals: PeriodTotals {
                total_orders: row.total_orders,
                total_amount: row.total_amount,
                total_materials_cost: row.total_materials_cost,
                total_net_profit: row.total_net_profit,
                total_company_profit: row.total_company_profit,
                total_technician_profit: row.total_technician_profit,
                average_check: row.average_check,
            },
            reviews_count: row.reviews_count,
            out_of_city_count: row.out_of_city_count,
        }
    }
}

fn rows_to_report(
    header: PeriodReportRow,
    technicians: Vec<TechnicianPeriodReportRow>,
) -> Result<PeriodReport, ReportRepositoryError> {
    let kind = header
        .kind
        .parse::<ReportKind>()
        .map_err(ReportRepositoryError::query)?;
    Ok(PeriodReport {
        id: ReportId::new(header.id),
        kind,
        period_start: header.period_start,
        period_end: header.period_end,
        totals: PeriodTotals {
            total_orders: header.total_orders,
            total_amount: header.total_amount,
            total_materials_cost: header.total_materials_cost,
            total_net_profit: header.total_net_profit,
            total_company_profit: header.total_company_profit,
            total_technician_profit: header.total_technician_profit,
            average_check: header.average_check,
        },
        technicians: technicians
            .into_iter()
            .map(TechnicianPeriodReport::from)
            .collect(),
        generated_at: header.generated_at,
    })
}

#[async_trait]
impl ReportRepository for DieselReportRepository {
    async fn save_period_report(
        &self,
        report: NewPeriodReport,
    ) -> Result<ReportId, ReportRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let id = conn
            .transaction(|conn| {
                async move {
                    let id: i64 = diesel::insert_into(period_reports::table)
                        .values(NewPeriodReportRow::from_report(&report))
                        .returning(period_reports::id)
                        .get_result(conn)
                        .await?;
                    if !report.technicians.is_empty() {
                        let rows: Vec<TechnicianPeriodReportRow> = report
                            .technicians
                            .iter()
                            .map(|slice| TechnicianPeriodReportRow::from_slice(id, slice))
                            .collect();
                        diesel::insert_into(technician_period_reports::table)
                            .values(&rows)
                            .execute(conn)
                            .await?;
                    }
                    Ok::<_, diesel::result::Error>(id)
                }
                .scope_boxed()
            })
            .await
            .map_err(map_diesel_error)?;
        debug!(report_id = id, "period report stored");
        Ok(ReportId::new(id))
    }

    async fn find_period_report(
        &self,
        id: ReportId,
    ) -> Result<Option<PeriodReport>, ReportRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let Some(header) = period_reports::table
            .find(id.get())
            .select(PeriodReportRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?
        else {
            return Ok(None);
        };
        let technicians = technician_period_reports::table
            .filter(technician_period_reports::report_id.eq(header.id))
            .order_by(technician_period_reports::technician_id.asc())
            .select(TechnicianPeriodReportRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows_to_report(header, technicians).map(Some)
    }

    async fn period_report_exists(
        &self,
        kind: ReportKind,
        period_start: NaiveDate,
    ) -> Result<bool, ReportRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::select(diesel::dsl::exists(
            period_reports::table
                .filter(period_reports::kind.eq(kind.as_str()))
                .filter(period_reports::period_start.eq(period_start)),
        ))
        .get_result(&mut conn)
        .await
        .map_err(map_diesel_error)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use rstest::{fixture, rstest};
    use rust_decimal_macros::dec;

    use super::*;

    #[fixture]
    fn header() -> PeriodReportRow {
        PeriodReportRow {
            id: 3,
            kind: "DAILY".to_owned(),
            period_start: NaiveDate::from_ymd_opt(2026, 3, 1).expect("valid date"),
            period_end: NaiveDate::from_ymd_opt(2026, 3, 2).expect("valid date"),
            total_orders: 1,
            total_amount: dec!(12000),
            total_materials_cost: dec!(2000),
            total_net_profit: dec!(8000),
            total_company_profit: dec!(4000),
            total_technician_profit: dec!(4000),
            average_check: dec!(10000),
            generated_at: Utc
                .with_ymd_and_hms(2026, 3, 2, 0, 5, 0)
                .single()
                .expect("valid"),
        }
    }

    #[rstest]
    fn pool_error_maps_to_connection_error() {
        let error = map_pool_error(PoolError::checkout("connection refused"));
        assert!(matches!(error, ReportRepositoryError::Connection { .. }));
    }

    #[rstest]
    fn diesel_error_maps_to_query_error() {
        let error = map_diesel_error(diesel::result::Error::NotFound);
        assert!(matches!(error, ReportRepositoryError::Query { .. }));
    }

    #[rstest]
    fn rows_rebuild_the_report(header: PeriodReportRow) {
        let slice = TechnicianPeriodReportRow {
            report_id: 3,
            technician_id: 1,
            total_orders: 1,
            total_amount: dec!(12000),
            total_materials_cost: dec!(2000),
            total_net_profit: dec!(8000),
            total_company_profit: dec!(4000),
            total_technician_profit: dec!(4000),
            average_check: dec!(10000),
            reviews_count: 0,
            out_of_city_count: 1,
        };

        let report = rows_to_report(header, vec![slice]).expect("valid rows");

        assert_eq!(report.id, ReportId::new(3));
        assert_eq!(report.kind, ReportKind::Daily);
        assert_eq!(report.totals.total_net_profit, dec!(8000));
        assert_eq!(report.technicians.len(), 1);
        assert_eq!(report.technicians[0].technician_id, TechnicianId::new(1));
        assert_eq!(report.technicians[0].out_of_city_count, 1);
    }

    #[rstest]
    fn unknown_kinds_are_query_errors(mut header: PeriodReportRow) {
        header.kind = "HOURLY".to_owned();
        let error = rows_to_report(header, Vec::new()).expect_err("unknown kind");
        assert!(matches!(error, ReportRepositoryError::Query { .. }));
    }
}
