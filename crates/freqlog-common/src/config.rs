//! Configuration structures for an acquisition run.
//!
//! Supports TOML deserialization with defaults matching the bench setup
//! the logger was written for (oscilloscope at 192.168.1.100, 19 samples
//! per cycle, 30 000 cycles, log to `timedata.txt`).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FreqlogConfig {
    /// Instrument connection and measurement setup.
    pub instrument: InstrumentConfig,

    /// Sampling and cycle counts.
    pub acquisition: AcquisitionConfig,

    /// Record sink.
    pub output: OutputConfig,
}

/// Supported instrument drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentDriver {
    /// Raw SCPI over a TCP socket.
    #[default]
    ScpiTcp,
    /// In-memory instrument for dry runs.
    Simulated,
}

/// Instrument connection and measurement setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Driver to use.
    pub driver: InstrumentDriver,

    /// Network address: `host`, `host:port` or a VISA TCPIP resource string.
    pub address: String,

    /// Timeout for establishing the connection.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Timeout for each read or write. Bounds how long an interrupt waits
    /// for the query in flight.
    #[serde(with = "humantime_serde")]
    pub io_timeout: Duration,

    /// Analog channel carrying the signal (1-4).
    pub channel: u8,

    /// Edge trigger level in volts.
    pub trigger_level: f64,

    /// Enable the channel's bandwidth limit filter.
    pub bandwidth_limit: bool,

    /// Optional horizontal scale in seconds per division.
    pub timebase_scale: Option<f64>,

    /// Frequency reported by the simulated driver, in Hz.
    pub simulated_frequency_hz: f64,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            driver: InstrumentDriver::ScpiTcp,
            address: String::from("192.168.1.100"),
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(2),
            channel: 1,
            trigger_level: 2.0,
            bandwidth_limit: false,
            timebase_scale: None,
            simulated_frequency_hz: 10_000_000.0,
        }
    }
}

/// Sampling and cycle counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Frequency queries averaged into one record (N).
    pub samples_per_cycle: usize,

    /// Records to produce before stopping (M).
    pub total_cycles: u64,

    /// Emit the human-readable summary every this many cycles.
    /// `0` writes it for the first cycle only.
    pub summary_every: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            samples_per_cycle: 19,
            total_cycles: 30_000,
            summary_every: 0,
        }
    }
}

/// Where records are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PathBuf", into = "PathBuf")]
pub enum OutputTarget {
    /// Process standard output (`-`).
    Stdout,
    /// Append to a file, creating it if needed.
    File(PathBuf),
}

impl From<PathBuf> for OutputTarget {
    fn from(path: PathBuf) -> Self {
        if path.as_os_str() == std::ffi::OsStr::new("-") {
            Self::Stdout
        } else {
            Self::File(path)
        }
    }
}

impl From<OutputTarget> for PathBuf {
    fn from(target: OutputTarget) -> Self {
        match target {
            OutputTarget::Stdout => PathBuf::from("-"),
            OutputTarget::File(path) => path,
        }
    }
}

/// Record sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Destination path, or `-` for stdout.
    pub path: OutputTarget,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: OutputTarget::File(PathBuf::from("timedata.txt")),
        }
    }
}

impl FreqlogConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.acquisition.samples_per_cycle == 0 {
            return invalid("acquisition.samples_per_cycle must be at least 1");
        }
        if self.acquisition.total_cycles == 0 {
            return invalid("acquisition.total_cycles must be at least 1");
        }
        if self.instrument.address.trim().is_empty() {
            return invalid("instrument.address must not be empty");
        }
        if !(1..=4).contains(&self.instrument.channel) {
            return invalid("instrument.channel must be between 1 and 4");
        }
        if !self.instrument.trigger_level.is_finite() {
            return invalid("instrument.trigger_level must be finite");
        }
        if let Some(scale) = self.instrument.timebase_scale {
            if !(scale.is_finite() && scale > 0.0) {
                return invalid("instrument.timebase_scale must be positive");
            }
        }
        if self.instrument.driver == InstrumentDriver::Simulated
            && !(self.instrument.simulated_frequency_hz.is_finite()
                && self.instrument.simulated_frequency_hz > 0.0)
        {
            return invalid("instrument.simulated_frequency_hz must be positive");
        }
        Ok(())
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is outside its allowed range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
