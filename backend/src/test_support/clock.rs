//! Clock doubles.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta, Utc};
use mockable::Clock;

use crate::domain::{CivilClock, DEFAULT_UTC_OFFSET_MINUTES};

/// Parse an RFC 3339 timestamp, panicking on malformed input.
pub fn instant(raw: &str) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => parsed.with_timezone(&Utc),
        Err(error) => panic!("invalid test timestamp `{raw}`: {error}"),
    }
}

/// Clock whose instant only moves when told to.
pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.lock_clock() = now;
    }

    pub fn advance(&self, delta: Duration) {
        let delta = match TimeDelta::from_std(delta) {
            Ok(delta) => delta,
            Err(error) => {
                panic!("failed to convert Duration to TimeDelta: {error}; delta={delta:?}",)
            }
        };
        *self.lock_clock() += delta;
    }

    pub fn advance_seconds(&self, seconds: i64) {
        *self.lock_clock() += TimeDelta::seconds(seconds);
    }

    fn lock_clock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("clock mutex"),
        }
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.lock_clock()
    }
}

/// Civil clock (UTC+3) frozen at `raw`.
pub fn fixed_clock(raw: &str) -> CivilClock {
    mutable_clock(raw).1
}

/// Civil clock (UTC+3) plus the handle that moves it.
pub fn mutable_clock(raw: &str) -> (Arc<MutableClock>, CivilClock) {
    let source = Arc::new(MutableClock::new(instant(raw)));
    let clock = match CivilClock::with_offset_minutes(source.clone(), DEFAULT_UTC_OFFSET_MINUTES)
    {
        Ok(clock) => clock,
        Err(error) => panic!("default offset must be valid: {error}"),
    };
    (source, clock)
}
