//! Wall clock in the fixed civil zone.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use mockable::Clock;

/// Default civil zone offset (UTC+3).
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 180;

/// Sole source of "now" for the core.
///
/// Instants are read from an injected [`mockable::Clock`] and stored as UTC;
/// calendar arithmetic uses the fixed civil offset.
#[derive(Clone)]
pub struct CivilClock {
    source: Arc<dyn Clock + Send + Sync>,
    zone: FixedOffset,
}

impl std::fmt::Debug for CivilClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CivilClock")
            .field("zone", &self.zone)
            .finish_non_exhaustive()
    }
}

/// Offset outside the representable range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("utc offset of {0} minutes is out of range")]
pub struct InvalidOffset(pub i32);

impl CivilClock {
    pub fn new(source: Arc<dyn Clock + Send + Sync>, zone: FixedOffset) -> Self {
        Self { source, zone }
    }

    /// Build a clock from an offset in minutes east of UTC.
    ///
    /// # Examples
    /// ```
    /// use std::sync::Arc;
    /// use dispatch_backend::domain::CivilClock;
    ///
    /// let clock = CivilClock::with_offset_minutes(Arc::new(mockable::DefaultClock), 180)
    ///     .expect("valid offset");
    /// assert_eq!(clock.zone().local_minus_utc(), 3 * 3600);
    /// ```
    pub fn with_offset_minutes(
        source: Arc<dyn Clock + Send + Sync>,
        minutes: i32,
    ) -> Result<Self, InvalidOffset> {
        let zone = minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or(InvalidOffset(minutes))?;
        Ok(Self::new(source, zone))
    }

    pub fn zone(&self) -> FixedOffset {
        self.zone
    }

    /// Current instant.
    pub fn now(&self) -> DateTime<Utc> {
        self.source.utc()
    }

    /// Current instant in the civil zone.
    pub fn civil_now(&self) -> DateTime<FixedOffset> {
        self.now().with_timezone(&self.zone)
    }

    /// Civil calendar date of an instant.
    pub fn civil_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.zone).date_naive()
    }

    /// Start of a civil day as a UTC instant.
    pub fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
        self.zone
            .from_local_datetime(&midnight)
            .single()
            .map(|local| local.with_timezone(&Utc))
            .unwrap_or_else(|| midnight.and_utc())
    }
}
