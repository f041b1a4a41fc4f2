//! Averaging of repeated frequency readings.

use freqlog_common::error::{InstrumentError, InstrumentResult};
use freqlog_common::shutdown::ShutdownFlag;
use freqlog_instrument::{Instrument, FREQUENCY_QUERY};
use std::fmt;
use thiserror::Error;
use tracing::trace;

/// Value SCPI instruments return when no measurement is available.
pub const NO_MEASUREMENT_SENTINEL: f64 = 9.9e37;

/// Arithmetic mean of one cycle's frequency readings, in Hz.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct AveragedFrequency(f64);

impl AveragedFrequency {
    /// Frequency in Hz.
    #[must_use]
    pub fn hz(self) -> f64 {
        self.0
    }
}

impl fmt::Display for AveragedFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.0)
    }
}

/// Sampling failure.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SampleError {
    /// Zero samples were requested.
    #[error("at least one sample is required")]
    NoSamples,

    /// The shutdown flag was raised before all readings were taken.
    #[error("sampling interrupted after {completed} reading(s)")]
    Interrupted {
        /// Readings taken before the flag was seen.
        completed: usize,
    },

    /// A query failed or returned an unusable reply.
    #[error(transparent)]
    Instrument(#[from] InstrumentError),
}

/// Parse one frequency reply.
///
/// # Errors
///
/// [`InstrumentError::MalformedReply`] if the reply is not a finite number,
/// [`InstrumentError::NoMeasurement`] for the overflow sentinel.
pub fn parse_frequency_reply(command: &str, reply: &str) -> InstrumentResult<f64> {
    let malformed = || InstrumentError::MalformedReply {
        command: command.to_string(),
        reply: reply.to_string(),
    };

    let value: f64 = reply.trim().parse().map_err(|_| malformed())?;
    if !value.is_finite() {
        return Err(malformed());
    }
    if value.abs() >= NO_MEASUREMENT_SENTINEL {
        return Err(InstrumentError::NoMeasurement {
            command: command.to_string(),
        });
    }
    Ok(value)
}

/// Query the instrument `samples` times and average the readings.
///
/// Queries are issued sequentially. The first failure aborts the whole
/// average; nothing is retried. `shutdown` is checked before every query,
/// so an interrupt costs at most the query already on the wire.
///
/// # Errors
///
/// [`SampleError::NoSamples`] when `samples == 0`,
/// [`SampleError::Interrupted`] once `shutdown` is raised, otherwise the
/// first instrument error encountered.
pub fn average_frequency<I>(
    instrument: &mut I,
    samples: usize,
    shutdown: &ShutdownFlag,
) -> Result<AveragedFrequency, SampleError>
where
    I: Instrument + ?Sized,
{
    if samples == 0 {
        return Err(SampleError::NoSamples);
    }

    let mut sum = 0.0;
    for index in 0..samples {
        if shutdown.is_requested() {
            return Err(SampleError::Interrupted { completed: index });
        }
        let reply = instrument.query(FREQUENCY_QUERY)?;
        let value = parse_frequency_reply(FREQUENCY_QUERY, &reply)?;
        trace!(index, value, "Frequency sample");
        sum += value;
    }

    Ok(AveragedFrequency(sum / samples as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use freqlog_instrument::SimulatedInstrument;

    fn replies(values: &[&str]) -> Vec<InstrumentResult<String>> {
        values.iter().map(|v| Ok((*v).to_string())).collect()
    }

    #[test]
    fn test_average_of_identical_samples() {
        let mut sim = SimulatedInstrument::new(1e6);
        let avg = average_frequency(&mut sim, 5, &ShutdownFlag::new()).unwrap();
        assert_eq!(avg.hz(), 1e6);
        assert_eq!(sim.query_count(), 5);
    }

    #[test]
    fn test_average_is_arithmetic_mean() {
        let mut sim = SimulatedInstrument::new(0.0)
            .with_replies(replies(&["1.0E+06", "2.0E+06", "3.0E+06", "6.0E+06"]));
        let avg = average_frequency(&mut sim, 4, &ShutdownFlag::new()).unwrap();
        assert_eq!(avg.hz(), 3e6);
    }

    #[test]
    fn test_single_sample() {
        let mut sim = SimulatedInstrument::new(0.0).with_replies(replies(&["12.5"]));
        let avg = average_frequency(&mut sim, 1, &ShutdownFlag::new()).unwrap();
        assert_eq!(avg.hz(), 12.5);
    }

    #[test]
    fn test_zero_samples_rejected() {
        let mut sim = SimulatedInstrument::new(1e6);
        assert_eq!(
            average_frequency(&mut sim, 0, &ShutdownFlag::new()),
            Err(SampleError::NoSamples)
        );
        assert_eq!(sim.query_count(), 0);
    }

    #[test]
    fn test_failure_aborts_without_retry() {
        let timeout = InstrumentError::Timeout {
            command: FREQUENCY_QUERY.into(),
        };
        let mut sim = SimulatedInstrument::new(1e6).with_replies(vec![
            Ok("1.0E+06".to_string()),
            Err(timeout.clone()),
        ]);
        assert_eq!(
            average_frequency(&mut sim, 5, &ShutdownFlag::new()),
            Err(SampleError::Instrument(timeout))
        );
        assert_eq!(sim.query_count(), 2);
    }

    #[test]
    fn test_malformed_reply() {
        let mut sim = SimulatedInstrument::new(0.0).with_replies(replies(&["1.0E+06", "abc"]));
        let err = average_frequency(&mut sim, 3, &ShutdownFlag::new()).unwrap_err();
        assert!(matches!(
            err,
            SampleError::Instrument(InstrumentError::MalformedReply { ref reply, .. }) if reply == "abc"
        ));
    }

    #[test]
    fn test_no_measurement_sentinel() {
        let mut sim = SimulatedInstrument::new(0.0).with_replies(replies(&["9.9E+37"]));
        let err = average_frequency(&mut sim, 1, &ShutdownFlag::new()).unwrap_err();
        assert!(matches!(
            err,
            SampleError::Instrument(InstrumentError::NoMeasurement { .. })
        ));
    }

    /// Simulator that raises a flag while answering query `raise_on`.
    struct RaisingInstrument {
        inner: SimulatedInstrument,
        flag: ShutdownFlag,
        raise_on: usize,
    }

    impl Instrument for RaisingInstrument {
        fn write(&mut self, command: &str) -> InstrumentResult<()> {
            self.inner.write(command)
        }

        fn query(&mut self, command: &str) -> InstrumentResult<String> {
            let reply = self.inner.query(command);
            if self.inner.query_count() == self.raise_on {
                self.flag.request();
            }
            reply
        }

        fn close(&mut self) -> InstrumentResult<()> {
            self.inner.close()
        }

        fn is_connected(&self) -> bool {
            self.inner.is_connected()
        }
    }

    #[test]
    fn test_raised_flag_issues_no_query() {
        let mut sim = SimulatedInstrument::new(1e6);
        let shutdown = ShutdownFlag::new();
        shutdown.request();
        assert_eq!(
            average_frequency(&mut sim, 19, &shutdown),
            Err(SampleError::Interrupted { completed: 0 })
        );
        assert_eq!(sim.query_count(), 0);
    }

    #[test]
    fn test_interrupt_stops_remaining_queries() {
        let shutdown = ShutdownFlag::new();
        let mut instrument = RaisingInstrument {
            inner: SimulatedInstrument::new(1e6),
            flag: shutdown.clone(),
            raise_on: 2,
        };
        assert_eq!(
            average_frequency(&mut instrument, 19, &shutdown),
            Err(SampleError::Interrupted { completed: 2 })
        );
        assert_eq!(instrument.inner.query_count(), 2);
    }

    #[test]
    fn test_parse_reply_trims_whitespace() {
        assert_eq!(parse_frequency_reply("q", " +1.00000E+06\r\n").unwrap(), 1e6);
    }

    #[test]
    fn test_parse_reply_rejects_non_finite() {
        assert!(matches!(
            parse_frequency_reply("q", "inf"),
            Err(InstrumentError::MalformedReply { .. })
        ));
        assert!(matches!(
            parse_frequency_reply("q", "NaN"),
            Err(InstrumentError::MalformedReply { .. })
        ));
        assert!(matches!(
            parse_frequency_reply("q", ""),
            Err(InstrumentError::MalformedReply { .. })
        ));
    }

    #[test]
    fn test_parse_reply_accepts_negative() {
        // The converter, not the sampler, rejects non-positive values.
        assert_eq!(parse_frequency_reply("q", "-5").unwrap(), -5.0);
    }
}
