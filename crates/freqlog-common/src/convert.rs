//! Frequency to period conversion and canonical period rendering.

use crate::error::DomainError;
use std::fmt;

/// Number of mantissa digits after the decimal point in a [`PeriodString`].
pub const PERIOD_FRACTION_DIGITS: usize = 20;

/// Canonical text form of a period in seconds, e.g. `2.50000000000000000000E-07`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeriodString(String);

impl PeriodString {
    /// Borrow the rendered text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the rendered text back into seconds.
    #[must_use]
    pub fn seconds(&self) -> Option<f64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for PeriodString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PeriodString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Convert a frequency in Hz into its period rendered as a [`PeriodString`].
///
/// # Errors
///
/// Returns [`DomainError::NonPositiveFrequency`] for `frequency <= 0` and
/// [`DomainError::NonFinite`] for NaN, infinite input, or a period that
/// overflows.
pub fn to_period_string(frequency: f64) -> Result<PeriodString, DomainError> {
    if frequency.is_nan() {
        return Err(DomainError::NonFinite(frequency));
    }
    if frequency <= 0.0 {
        return Err(DomainError::NonPositiveFrequency(frequency));
    }

    let period = 1.0 / frequency;
    if !frequency.is_finite() || !period.is_finite() {
        return Err(DomainError::NonFinite(frequency));
    }

    Ok(PeriodString(format_scientific(period, PERIOD_FRACTION_DIGITS)))
}

/// Render `value` as `d.<fraction_digits>E±dd`.
///
/// The mantissa digits are the shortest decimal expansion that round-trips
/// to `value`, zero-padded on the right. Only when that expansion is longer
/// than `fraction_digits` is the value rounded (half to even on the exact
/// binary value).
#[must_use]
pub fn format_scientific(value: f64, fraction_digits: usize) -> String {
    let mut rendered = format!("{value:e}");
    if fraction_len(&rendered) > fraction_digits {
        rendered = format!("{value:.fraction_digits$e}");
    }

    let (mantissa, exponent) = rendered.split_once('e').unwrap_or((rendered.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let sign = if exponent < 0 { '-' } else { '+' };
    let magnitude = exponent.unsigned_abs();

    if fraction_digits == 0 {
        format!("{whole}E{sign}{magnitude:02}")
    } else {
        format!("{whole}.{fraction:0<fraction_digits$}E{sign}{magnitude:02}")
    }
}

fn fraction_len(rendered: &str) -> usize {
    let mantissa = rendered.split('e').next().unwrap_or(rendered);
    mantissa.split_once('.').map_or(0, |(_, fraction)| fraction.len())
}
