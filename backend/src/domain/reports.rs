//! Period reports over closed orders.
//!
//! A report covers the civil days `[period_start, period_end)` and is built
//! from live CLOSED orders whose `updated_at` falls in that window. Stored
//! reports are immutable snapshots; generating the same period twice stores
//! two reports with equal aggregates.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::order_service::map_order_error;
use super::ports::{ClosedOrdersPage, OrderRepository, ReportRepository, ReportRepositoryError};
use super::{Actor, CivilClock, DispatchError, Entity, Order, ReportId, TechnicianId};

/// Orders fetched per keyset page.
const PAGE_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportKind {
    Daily,
    Weekly,
    Monthly,
}

impl ReportKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Monthly => "MONTHLY",
        }
    }

    /// Exclusive end of a period starting on `start`.
    ///
    /// # Examples
    /// ```
    /// use chrono::NaiveDate;
    /// use dispatch_backend::domain::ReportKind;
    ///
    /// let start = NaiveDate::from_ymd_opt(2026, 1, 31).expect("date");
    /// assert_eq!(
    ///     ReportKind::Monthly.period_end(start),
    ///     NaiveDate::from_ymd_opt(2026, 2, 28)
    /// );
    /// ```
    pub fn period_end(self, start: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Daily => start.checked_add_days(Days::new(1)),
            Self::Weekly => start.checked_add_days(Days::new(7)),
            Self::Monthly => start.checked_add_months(Months::new(1)),
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Ok(Self::Daily),
            "WEEKLY" => Ok(Self::Weekly),
            "MONTHLY" => Ok(Self::Monthly),
            other => Err(format!("unknown report kind: {other}")),
        }
    }
}

/// Money aggregates over a set of closed orders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodTotals {
    pub total_orders: i64,
    /// Sum of `total_amount + materials_cost` per order.
    pub total_amount: Decimal,
    pub total_materials_cost: Decimal,
    pub total_net_profit: Decimal,
    pub total_company_profit: Decimal,
    pub total_technician_profit: Decimal,
    pub average_check: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicianPeriodReport {
    pub technician_id: TechnicianId,
    pub totals: PeriodTotals,
    pub reviews_count: i64,
    pub out_of_city_count: i64,
}

/// Report ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPeriodReport {
    pub kind: ReportKind,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub totals: PeriodTotals,
    pub technicians: Vec<TechnicianPeriodReport>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodReport {
    pub id: ReportId,
    pub kind: ReportKind,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub totals: PeriodTotals,
    pub technicians: Vec<TechnicianPeriodReport>,
    pub generated_at: DateTime<Utc>,
}

impl PeriodReport {
    pub fn from_new(id: ReportId, report: NewPeriodReport) -> Self {
        Self {
            id,
            kind: report.kind,
            period_start: report.period_start,
            period_end: report.period_end,
            totals: report.totals,
            technicians: report.technicians,
            generated_at: report.generated_at,
        }
    }
}

#[derive(Debug, Default)]
struct Accumulator {
    orders: i64,
    amount: Decimal,
    materials: Decimal,
    company: Decimal,
    technician: Decimal,
    reviews: i64,
    out_of_city: i64,
}

impl Accumulator {
    fn add(&mut self, order: &Order) {
        let Some(settlement) = order.settlement else {
            return;
        };
        self.orders += 1;
        self.amount += settlement.total_amount + settlement.materials_cost;
        self.materials += settlement.materials_cost;
        self.company += settlement.company_share;
        self.technician += settlement.technician_share;
        self.reviews += i64::from(settlement.has_review);
        self.out_of_city += i64::from(settlement.out_of_city);
    }

    fn totals(&self) -> PeriodTotals {
        let divisor = Decimal::from(self.orders.max(1));
        PeriodTotals {
            total_orders: self.orders,
            total_amount: self.amount,
            total_materials_cost: self.materials,
            total_net_profit: self.amount - self.materials,
            total_company_profit: self.company,
            total_technician_profit: self.technician,
            average_check: (self.amount / divisor).round_dp(2),
        }
    }
}

/// Running aggregates of one period.
///
/// Orders are folded in one at a time, so a report never needs the whole
/// period in memory. Orders without a settlement are skipped.
#[derive(Debug, Default)]
pub struct PeriodAggregator {
    overall: Accumulator,
    per_technician: BTreeMap<TechnicianId, Accumulator>,
}

impl PeriodAggregator {
    pub fn add(&mut self, order: &Order) {
        self.overall.add(order);
        if let Some(technician_id) = order.assigned_technician {
            self.per_technician
                .entry(technician_id)
                .or_default()
                .add(order);
        }
    }

    pub fn finish(
        self,
        kind: ReportKind,
        period_start: NaiveDate,
        period_end: NaiveDate,
        generated_at: DateTime<Utc>,
    ) -> NewPeriodReport {
        NewPeriodReport {
            kind,
            period_start,
            period_end,
            totals: self.overall.totals(),
            technicians: self
                .per_technician
                .into_iter()
                .map(|(technician_id, acc)| TechnicianPeriodReport {
                    technician_id,
                    totals: acc.totals(),
                    reviews_count: acc.reviews,
                    out_of_city_count: acc.out_of_city,
                })
                .collect(),
            generated_at,
        }
    }
}

/// Aggregate closed orders into a report body.
pub fn aggregate<'a>(
    kind: ReportKind,
    period_start: NaiveDate,
    period_end: NaiveDate,
    orders: impl IntoIterator<Item = &'a Order>,
    generated_at: DateTime<Utc>,
) -> NewPeriodReport {
    let mut aggregator = PeriodAggregator::default();
    for order in orders {
        aggregator.add(order);
    }
    aggregator.finish(kind, period_start, period_end, generated_at)
}

/// Reports the scheduler should generate on civil day `today`.
///
/// # Examples
/// ```
/// use chrono::NaiveDate;
/// use dispatch_backend::domain::{ReportKind, due_reports};
///
/// // 2026-06-01 is a Monday and the first of the month.
/// let today = NaiveDate::from_ymd_opt(2026, 6, 1).expect("date");
/// let due = due_reports(today);
/// assert_eq!(due.len(), 3);
/// assert_eq!(due[2], (ReportKind::Monthly, NaiveDate::from_ymd_opt(2026, 5, 1).expect("date")));
/// ```
pub fn due_reports(today: NaiveDate) -> Vec<(ReportKind, NaiveDate)> {
    let mut due = Vec::new();
    if let Some(yesterday) = today.checked_sub_days(Days::new(1)) {
        due.push((ReportKind::Daily, yesterday));
    }
    if today.weekday() == Weekday::Mon {
        if let Some(last_week) = today.checked_sub_days(Days::new(7)) {
            due.push((ReportKind::Weekly, last_week));
        }
    }
    if today.day() == 1 {
        if let Some(last_month) = today.checked_sub_months(Months::new(1)) {
            due.push((ReportKind::Monthly, last_month));
        }
    }
    due
}

fn map_report_error(error: ReportRepositoryError) -> DispatchError {
    match error {
        ReportRepositoryError::Connection { message } => {
            DispatchError::unavailable(format!("report repository unavailable: {message}"))
        }
        ReportRepositoryError::Query { message } => {
            DispatchError::internal(format!("report repository error: {message}"))
        }
    }
}

/// Builds, stores and renders period reports.
#[derive(Clone)]
pub struct ReportService {
    orders: Arc<dyn OrderRepository>,
    reports: Arc<dyn ReportRepository>,
    clock: CivilClock,
}

impl ReportService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        reports: Arc<dyn ReportRepository>,
        clock: CivilClock,
    ) -> Self {
        Self {
            orders,
            reports,
            clock,
        }
    }

    /// Generate and store the report of one period. Staff and the system may
    /// generate reports.
    #[instrument(skip(self, actor), fields(actor = %actor))]
    pub async fn generate(
        &self,
        kind: ReportKind,
        period_start: NaiveDate,
        actor: &Actor,
    ) -> Result<PeriodReport, DispatchError> {
        if !(actor.is_staff() || actor.is_system()) {
            return Err(DispatchError::forbidden("only staff may generate reports"));
        }
        let period_end = kind
            .period_end(period_start)
            .ok_or_else(|| DispatchError::validation("report period is out of range"))?;
        let from = self.clock.start_of_day(period_start);
        let until = self.clock.start_of_day(period_end);

        let mut aggregator = PeriodAggregator::default();
        let mut after = None;
        loop {
            let page = self
                .orders
                .closed_orders_page(ClosedOrdersPage {
                    from,
                    until,
                    after,
                    limit: PAGE_SIZE,
                })
                .await
                .map_err(map_order_error)?;
            let full = page.len() >= PAGE_SIZE;
            after = page.last().map(|order| order.id);
            for order in &page {
                aggregator.add(order);
            }
            if !full || after.is_none() {
                break;
            }
        }

        let report = aggregator.finish(kind, period_start, period_end, self.clock.now());
        let id = self
            .reports
            .save_period_report(report.clone())
            .await
            .map_err(map_report_error)?;
        info!(
            report_id = %id,
            orders = report.totals.total_orders,
            technicians = report.technicians.len(),
            "period report stored"
        );
        Ok(PeriodReport::from_new(id, report))
    }

    pub async fn find(&self, id: ReportId) -> Result<PeriodReport, DispatchError> {
        self.reports
            .find_period_report(id)
            .await
            .map_err(map_report_error)?
            .ok_or_else(|| DispatchError::not_found(Entity::Report, id))
    }

    /// Stored report as a JSON document.
    pub async fn render(&self, id: ReportId) -> Result<Vec<u8>, DispatchError> {
        let report = self.find(id).await?;
        serde_json::to_vec(&report)
            .map_err(|error| DispatchError::internal(format!("report encoding failed: {error}")))
    }
}

/// Generates due reports once per civil day.
pub struct ReportScheduler {
    service: ReportService,
    clock: CivilClock,
    last_run: Mutex<Option<NaiveDate>>,
}

impl ReportScheduler {
    pub fn new(service: ReportService, clock: CivilClock) -> Self {
        Self {
            service,
            clock,
            last_run: Mutex::new(None),
        }
    }

    /// Generate the reports due today unless today was already handled.
    ///
    /// Periods that already have a stored report are skipped, so a restart
    /// catches up on the day's reports without duplicating them.
    pub async fn tick(&self) -> Vec<PeriodReport> {
        let today = self.clock.civil_date(self.clock.now());
        let previous = {
            let mut last_run = self.last_run.lock().unwrap_or_else(PoisonError::into_inner);
            last_run.replace(today)
        };
        if previous == Some(today) {
            return Vec::new();
        }

        let mut generated = Vec::new();
        for (kind, start) in due_reports(today) {
            match self.service.reports.period_report_exists(kind, start).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(error) => {
                    warn!(%error, %kind, %start, "could not check for a stored report");
                    continue;
                }
            }
            match self.service.generate(kind, start, &Actor::System).await {
                Ok(report) => generated.push(report),
                Err(error) => warn!(%error, %kind, %start, "scheduled report failed"),
            }
        }
        generated
    }
}

#[cfg(test)]
#[path = "reports_tests.rs"]
mod tests;
