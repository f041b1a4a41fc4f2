//! Modified Julian Date time base.
//!
//! MJD counts days since 1858-11-17T00:00:00 UTC. The day count is split
//! into whole days and the fractional day using integer arithmetic on the
//! Unix timestamp, so only the final combination is done in `f64`.

use crate::error::ClockError;
use chrono::{DateTime, Utc};
use std::fmt;

/// MJD of the Unix epoch (1970-01-01T00:00:00Z).
pub const UNIX_EPOCH_MJD: i64 = 40_587;

/// Seconds in one (UTC, leap-second free) day.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// A Modified Julian Date in fractional days.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Mjd(pub f64);

impl Mjd {
    /// Raw day count.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Mjd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Forward so callers can pick the precision, e.g. `{:.5}`.
        fmt::Display::fmt(&self.0, f)
    }
}

/// Source of UTC wall-clock readings.
pub trait Clock: Send {
    /// Read the current UTC time.
    fn now_utc(&self) -> Result<DateTime<Utc>, ClockError>;
}

/// The operating system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> Result<DateTime<Utc>, ClockError> {
        Ok(Utc::now())
    }
}

/// Convert a UTC instant to MJD.
#[must_use]
pub fn mjd_at(instant: DateTime<Utc>) -> Mjd {
    let since_mjd_epoch = instant.timestamp() + UNIX_EPOCH_MJD * SECONDS_PER_DAY;
    let whole_days = since_mjd_epoch.div_euclid(SECONDS_PER_DAY);
    let seconds_in_day = since_mjd_epoch.rem_euclid(SECONDS_PER_DAY);
    let subsec = f64::from(instant.timestamp_subsec_nanos()) / 1e9;

    #[allow(clippy::cast_precision_loss)]
    let day_fraction = (seconds_in_day as f64 + subsec) / SECONDS_PER_DAY as f64;

    #[allow(clippy::cast_precision_loss)]
    Mjd(whole_days as f64 + day_fraction)
}

/// Read `clock` and return the current MJD. Never cached.
pub fn now_mjd<C: Clock + ?Sized>(clock: &C) -> Result<Mjd, ClockError> {
    clock.now_utc().map(mjd_at)
}
