//! Line-protocol records emitted once per measurement cycle.
//!
//! Wire format:
//!
//! ```text
//! measurements counter=<period>,gate=<elapsed_ms:.2> <mjd:.5>
//! ```

use crate::convert::PeriodString;
use crate::time::Mjd;
use std::fmt;
use std::str::FromStr;

/// Measurement name leading every record line.
pub const MEASUREMENT_NAME: &str = "measurements";

/// Prefix for human-readable lines interleaved with records.
///
/// Line-protocol consumers skip lines starting with `#`.
pub const COMMENT_PREFIX: &str = "# ";

/// One completed measurement cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleRecord {
    period: PeriodString,
    elapsed_ms: f64,
    mjd: Mjd,
}

impl CycleRecord {
    /// Build a record from its three fields.
    #[must_use]
    pub fn new(period: PeriodString, elapsed_ms: f64, mjd: Mjd) -> Self {
        Self {
            period,
            elapsed_ms,
            mjd,
        }
    }

    /// Rendered period.
    #[must_use]
    pub fn period(&self) -> &PeriodString {
        &self.period
    }

    /// Wall time spent sampling, in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    /// Timestamp taken after sampling.
    #[must_use]
    pub fn mjd(&self) -> Mjd {
        self.mjd
    }
}

impl fmt::Display for CycleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{MEASUREMENT_NAME} counter={},gate={:.2} {:.5}",
            self.period, self.elapsed_ms, self.mjd
        )
    }
}

/// Fields recovered from a record line.
///
/// Gate time and MJD come back at their rendered precision.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    /// Period text exactly as written.
    pub counter: String,
    /// Gate time in milliseconds.
    pub gate_ms: f64,
    /// Timestamp in MJD.
    pub mjd: f64,
}

/// Reasons a line is not a valid record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordParseError {
    /// Line does not start with the measurement name.
    #[error("line does not start with the measurement name")]
    WrongMeasurement,
    /// Field set or timestamp is missing.
    #[error("missing {0}")]
    Missing(&'static str),
    /// A numeric field failed to parse.
    #[error("invalid {field}: {value:?}")]
    Invalid {
        /// Field name.
        field: &'static str,
        /// Offending text.
        value: String,
    },
}

impl FromStr for ParsedRecord {
    type Err = RecordParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let rest = line
            .strip_prefix(MEASUREMENT_NAME)
            .and_then(|r| r.strip_prefix(' '))
            .ok_or(RecordParseError::WrongMeasurement)?;
        let (fields, timestamp) = rest
            .split_once(' ')
            .ok_or(RecordParseError::Missing("timestamp"))?;
        let (counter, gate) = fields
            .split_once(',')
            .ok_or(RecordParseError::Missing("gate field"))?;
        let counter = counter
            .strip_prefix("counter=")
            .ok_or(RecordParseError::Missing("counter field"))?;
        let gate = gate
            .strip_prefix("gate=")
            .ok_or(RecordParseError::Missing("gate field"))?;

        let invalid = |field: &'static str, value: &str| RecordParseError::Invalid {
            field,
            value: value.to_string(),
        };
        counter
            .parse::<f64>()
            .map_err(|_| invalid("counter", counter))?;

        Ok(Self {
            counter: counter.to_string(),
            gate_ms: gate.parse().map_err(|_| invalid("gate", gate))?,
            mjd: timestamp
                .parse()
                .map_err(|_| invalid("timestamp", timestamp))?,
        })
    }
}

/// Human-readable digest of a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSummary<'a> {
    /// Samples averaged per cycle.
    pub samples_per_cycle: usize,
    /// Averaged frequency in Hz.
    pub frequency_hz: f64,
    /// The cycle's record.
    pub record: &'a CycleRecord,
}

impl CycleSummary<'_> {
    /// Render the summary as comment lines (without trailing newlines).
    #[must_use]
    pub fn lines(&self) -> [String; 3] {
        [
            format!("{COMMENT_PREFIX}Number of samples: {}", self.samples_per_cycle),
            format!(
                "{COMMENT_PREFIX}[MJD: {:.5}] Averaged frequency: {:.6} MHz, period: {}",
                self.record.mjd,
                self.frequency_hz / 1e6,
                self.record.period
            ),
            format!(
                "{COMMENT_PREFIX}Elapsed time: {:.2} ms",
                self.record.elapsed_ms
            ),
        ]
    }
}
