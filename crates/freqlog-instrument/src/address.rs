//! Instrument network addresses.
//!
//! Accepted forms:
//! - `192.168.1.100` (default SCPI socket port)
//! - `192.168.1.100:5025`, `scope.lab:5025`, `[fe80::1]:5025`
//! - `TCPIP0::192.168.1.100::INSTR`
//! - `TCPIP0::192.168.1.100::5025::SOCKET`

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use thiserror::Error;

/// Port of the raw SCPI socket service on LAN instruments.
pub const DEFAULT_SCPI_PORT: u16 = 5025;

/// Host and port of a networked instrument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstrumentAddress {
    host: String,
    port: u16,
}

/// Address parse failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Empty input.
    #[error("instrument address is empty")]
    Empty,
    /// Port is not a number in 1..=65535.
    #[error("invalid port {0:?}")]
    InvalidPort(String),
    /// VISA resource string that is not a TCPIP INSTR or SOCKET resource.
    #[error("unsupported resource string {0:?}")]
    UnsupportedResource(String),
}

impl InstrumentAddress {
    /// Build from parts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host`, `host:port` or a VISA `TCPIP` resource string.
    ///
    /// # Errors
    ///
    /// See [`AddressError`].
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        s.parse()
    }

    /// Host name or IP literal.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    fn parse_visa(resource: &str) -> Result<Self, AddressError> {
        let unsupported = || AddressError::UnsupportedResource(resource.to_string());
        let parts: Vec<&str> = resource.split("::").collect();

        let board = parts[0].to_ascii_uppercase();
        let board_index = board.strip_prefix("TCPIP").ok_or_else(unsupported)?;
        if !board_index.chars().all(|c| c.is_ascii_digit()) {
            return Err(unsupported());
        }

        match parts.as_slice() {
            [_, host, class] if class.eq_ignore_ascii_case("INSTR") && !host.is_empty() => {
                Ok(Self::new(*host, DEFAULT_SCPI_PORT))
            }
            [_, host, port, class] if class.eq_ignore_ascii_case("SOCKET") && !host.is_empty() => {
                Ok(Self::new(*host, parse_port(port)?))
            }
            _ => Err(unsupported()),
        }
    }
}

fn parse_port(text: &str) -> Result<u16, AddressError> {
    match text.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(AddressError::InvalidPort(text.to_string())),
    }
}

impl FromStr for InstrumentAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AddressError::Empty);
        }
        if s.contains("::") && s.to_ascii_uppercase().starts_with("TCPIP") {
            return Self::parse_visa(s);
        }
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(Self::new(addr.ip().to_string(), addr.port()));
        }
        if s.parse::<IpAddr>().is_ok() {
            return Ok(Self::new(s, DEFAULT_SCPI_PORT));
        }
        match s.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => Ok(Self::new(host, parse_port(port)?)),
            Some(_) => Err(AddressError::Empty),
            None => Ok(Self::new(s, DEFAULT_SCPI_PORT)),
        }
    }
}

impl fmt::Display for InstrumentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl From<SocketAddr> for InstrumentAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}
