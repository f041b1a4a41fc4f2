use thiserror::Error;

/// Failures talking to the measurement instrument.
///
/// Payloads are pre-rendered strings so the error stays `Clone` and
/// comparable in tests, mirroring how transport errors are surfaced.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InstrumentError {
    /// The instrument could not be reached.
    #[error("failed to connect to {address}: {reason}")]
    Connect {
        /// Address that was dialled.
        address: String,
        /// Underlying reason.
        reason: String,
    },

    /// Transport-level read/write failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// The instrument did not answer within the I/O timeout.
    #[error("timed out waiting for reply to {command:?}")]
    Timeout {
        /// Command that was pending.
        command: String,
    },

    /// The reply could not be parsed as a finite decimal number.
    #[error("malformed reply to {command:?}: {reply:?}")]
    MalformedReply {
        /// Command that was issued.
        command: String,
        /// Raw reply text.
        reply: String,
    },

    /// The instrument reported that no valid measurement is available.
    #[error("no valid measurement for {command:?} (instrument returned 9.9E+37)")]
    NoMeasurement {
        /// Command that was issued.
        command: String,
    },

    /// The handle was used after it had been released.
    #[error("instrument connection is closed")]
    Closed,
}

/// Invalid numeric input to the period converter.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum DomainError {
    /// Frequency was zero or negative.
    #[error("frequency must be greater than zero, got {0}")]
    NonPositiveFrequency(f64),

    /// Frequency or resulting period was NaN or infinite.
    #[error("frequency {0} does not yield a finite period")]
    NonFinite(f64),
}

/// Wall-clock read failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClockError {
    /// The clock value cannot be represented as a UTC date.
    #[error("clock value out of range")]
    OutOfRange,
}

/// Invalid run-state transition.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid state transition from {from} to {to}")]
pub struct StateError {
    /// Source state.
    pub from: String,
    /// Attempted target state.
    pub to: String,
}

/// Convenience alias for instrument operations.
pub type InstrumentResult<T> = Result<T, InstrumentError>;
