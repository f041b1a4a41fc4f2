//! Instrument abstractions for frequency acquisition.
//!
//! This crate provides:
//! - [`Instrument`] trait for abstracting the measurement transport
//! - [`scpi`] module with a raw SCPI-over-TCP client
//! - [`address`] module parsing instrument addresses and VISA resources
//! - [`SimulatedInstrument`] for dry runs and tests

pub mod address;
pub mod scpi;

pub use address::{AddressError, InstrumentAddress, DEFAULT_SCPI_PORT};
pub use scpi::{ScpiTcpConfig, ScpiTcpInstrument};

use freqlog_common::config::InstrumentConfig;
use freqlog_common::error::{InstrumentError, InstrumentResult};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info};

/// Query returning the instrument's current frequency reading in Hz.
pub const FREQUENCY_QUERY: &str = ":MEASure:FREQuency?";

/// IEEE 488.2 identification query.
pub const IDENTIFY_QUERY: &str = "*IDN?";

/// Measurement instrument abstraction.
///
/// The acquisition loop only talks to instruments through this trait, so
/// any transport (socket, USBTMC, simulation) can be plugged in. Calls are
/// blocking and strictly sequential.
pub trait Instrument: Send {
    /// Identification string (`*IDN?`).
    fn identify(&mut self) -> InstrumentResult<String> {
        self.query(IDENTIFY_QUERY)
    }

    /// Send a command that produces no reply.
    fn write(&mut self, command: &str) -> InstrumentResult<()>;

    /// Send a query and return its reply with the terminator removed.
    fn query(&mut self, command: &str) -> InstrumentResult<String>;

    /// Release the connection.
    ///
    /// Returns [`InstrumentError::Closed`] when called on an already
    /// released handle.
    fn close(&mut self) -> InstrumentResult<()>;

    /// Whether the transport is currently usable.
    fn is_connected(&self) -> bool;
}

impl<T: Instrument + ?Sized> Instrument for Box<T> {
    fn identify(&mut self) -> InstrumentResult<String> {
        (**self).identify()
    }

    fn write(&mut self, command: &str) -> InstrumentResult<()> {
        (**self).write(command)
    }

    fn query(&mut self, command: &str) -> InstrumentResult<String> {
        (**self).query(command)
    }

    fn close(&mut self) -> InstrumentResult<()> {
        (**self).close()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

/// Front-end setup needed before frequency readings are meaningful.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementSetup {
    /// Analog input channel.
    pub channel: u8,
    /// Edge trigger level in volts.
    pub trigger_level: f64,
    /// Channel bandwidth limit.
    pub bandwidth_limit: bool,
    /// Horizontal scale in seconds per division, left untouched when `None`.
    pub timebase_scale: Option<f64>,
}

impl Default for MeasurementSetup {
    fn default() -> Self {
        Self::from(&InstrumentConfig::default())
    }
}

impl From<&InstrumentConfig> for MeasurementSetup {
    fn from(config: &InstrumentConfig) -> Self {
        Self {
            channel: config.channel,
            trigger_level: config.trigger_level,
            bandwidth_limit: config.bandwidth_limit,
            timebase_scale: config.timebase_scale,
        }
    }
}

impl MeasurementSetup {
    /// SCPI commands, in the order they are issued.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        let source = format!("CHANnel{}", self.channel);
        let bwl = if self.bandwidth_limit { "ON" } else { "OFF" };

        let mut commands = vec![
            format!(":MEASure:SOURce {source}"),
            ":MEASure:FREQuency".to_string(),
            format!(":{source}:BWL {bwl}"),
            format!(":TRIGger:EDGE:SOURce {source}"),
            format!(":TRIGger:EDGE:LEVel {}", self.trigger_level),
        ];
        if let Some(scale) = self.timebase_scale {
            commands.push(format!(":TIMebase:SCALe {scale:E}"));
        }
        commands
    }
}

/// Put the instrument into frequency-measurement mode.
///
/// # Errors
///
/// Propagates the first failing write; later commands are not sent.
pub fn configure_frequency_measurement(
    instrument: &mut (impl Instrument + ?Sized),
    setup: &MeasurementSetup,
) -> InstrumentResult<()> {
    for command in setup.commands() {
        debug!(command = %command, "Configuring instrument");
        instrument.write(&command)?;
    }
    info!(channel = setup.channel, "Frequency measurement configured");
    Ok(())
}

/// In-memory instrument.
///
/// Answers [`FREQUENCY_QUERY`] from a scripted reply queue first and from
/// a fixed frequency once the queue is empty. Useful for dry runs and
/// testing without hardware.
#[derive(Debug)]
pub struct SimulatedInstrument {
    frequency_hz: f64,
    replies: VecDeque<InstrumentResult<String>>,
    latency: Duration,
    written: Vec<String>,
    queries: usize,
    connected: bool,
}

impl SimulatedInstrument {
    /// Identification string reported by the simulator.
    pub const IDENTITY: &'static str = "FREQLOG,SIMULATED,0,0.1.0";

    /// Create a simulator that always reads `frequency_hz`.
    #[must_use]
    pub fn new(frequency_hz: f64) -> Self {
        Self {
            frequency_hz,
            replies: VecDeque::new(),
            latency: Duration::ZERO,
            written: Vec::new(),
            queries: 0,
            connected: true,
        }
    }

    /// Queue scripted frequency replies, consumed before the fixed value.
    #[must_use]
    pub fn with_replies<I>(mut self, replies: I) -> Self
    where
        I: IntoIterator<Item = InstrumentResult<String>>,
    {
        self.replies.extend(replies);
        self
    }

    /// Delay applied to every frequency query.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Commands received through [`Instrument::write`].
    #[must_use]
    pub fn written_commands(&self) -> &[String] {
        &self.written
    }

    /// Number of frequency queries answered.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.queries
    }
}

impl Instrument for SimulatedInstrument {
    fn write(&mut self, command: &str) -> InstrumentResult<()> {
        if !self.connected {
            return Err(InstrumentError::Closed);
        }
        self.written.push(command.to_string());
        Ok(())
    }

    fn query(&mut self, command: &str) -> InstrumentResult<String> {
        if !self.connected {
            return Err(InstrumentError::Closed);
        }
        match command {
            IDENTIFY_QUERY => Ok(Self::IDENTITY.to_string()),
            FREQUENCY_QUERY => {
                if !self.latency.is_zero() {
                    std::thread::sleep(self.latency);
                }
                self.queries += 1;
                self.replies
                    .pop_front()
                    .unwrap_or_else(|| Ok(format!("{:E}", self.frequency_hz)))
            }
            other => Err(InstrumentError::Io(format!(
                "simulated instrument does not answer {other:?}"
            ))),
        }
    }

    fn close(&mut self) -> InstrumentResult<()> {
        if !self.connected {
            return Err(InstrumentError::Closed);
        }
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
