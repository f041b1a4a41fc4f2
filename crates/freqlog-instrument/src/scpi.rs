//! SCPI over a raw TCP socket.
//!
//! LAN oscilloscopes and counters expose a socket service (port 5025 by
//! convention) that accepts newline-terminated SCPI commands and answers
//! queries with a single newline-terminated line. The protocol is strictly
//! request/response, so exactly one query is outstanding at a time.

use crate::address::InstrumentAddress;
use crate::Instrument;
use freqlog_common::error::{InstrumentError, InstrumentResult};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Transport settings for [`ScpiTcpInstrument`].
#[derive(Debug, Clone)]
pub struct ScpiTcpConfig {
    /// Timeout for establishing the connection.
    pub connect_timeout: Duration,
    /// Read/write timeout for each command.
    pub io_timeout: Duration,
    /// Longest accepted reply line in bytes.
    pub max_reply_len: usize,
}

impl Default for ScpiTcpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(2),
            max_reply_len: 4096,
        }
    }
}

/// Connection to an instrument's SCPI socket.
pub struct ScpiTcpInstrument {
    address: InstrumentAddress,
    config: ScpiTcpConfig,
    /// Write half (None once closed or after a transport failure).
    stream: Option<TcpStream>,
    /// Buffered read half of the same socket.
    reader: Option<BufReader<TcpStream>>,
    /// Set by `close()`; distinguishes release from a lost link.
    released: bool,
}

impl ScpiTcpInstrument {
    /// Open a connection to `address`.
    ///
    /// # Errors
    ///
    /// Returns [`InstrumentError::Connect`] if the name does not resolve or
    /// no resolved address accepts the connection in time.
    pub fn connect(address: &InstrumentAddress, config: &ScpiTcpConfig) -> InstrumentResult<Self> {
        info!(%address, "Connecting to instrument");

        let connect_err = |reason: String| InstrumentError::Connect {
            address: address.to_string(),
            reason,
        };

        let candidates: Vec<_> = (address.host(), address.port())
            .to_socket_addrs()
            .map_err(|e| connect_err(format!("address resolution failed: {e}")))?
            .collect();

        let mut last_error = String::from("no addresses resolved");
        let mut stream = None;
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, config.connect_timeout) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => {
                    debug!(%candidate, error = %e, "Connection attempt failed");
                    last_error = e.to_string();
                }
            }
        }
        let stream = stream.ok_or_else(|| connect_err(last_error))?;

        stream
            .set_read_timeout(Some(config.io_timeout))
            .map_err(|e| connect_err(format!("failed to set read timeout: {e}")))?;
        stream
            .set_write_timeout(Some(config.io_timeout))
            .map_err(|e| connect_err(format!("failed to set write timeout: {e}")))?;
        stream
            .set_nodelay(true)
            .map_err(|e| connect_err(format!("failed to set TCP_NODELAY: {e}")))?;

        let reader = stream
            .try_clone()
            .map(BufReader::new)
            .map_err(|e| connect_err(format!("failed to clone socket: {e}")))?;

        info!(%address, "Connected to instrument");
        Ok(Self {
            address: address.clone(),
            config: config.clone(),
            stream: Some(stream),
            reader: Some(reader),
            released: false,
        })
    }

    /// Address this instrument was opened with.
    #[must_use]
    pub fn address(&self) -> &InstrumentAddress {
        &self.address
    }

    fn not_connected(&self) -> InstrumentError {
        if self.released {
            InstrumentError::Closed
        } else {
            InstrumentError::Io("connection to instrument lost".into())
        }
    }

    /// Drop the socket after a transport failure; a late reply would
    /// otherwise be matched to the next query.
    fn disconnect(&mut self) {
        self.reader = None;
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn map_io(&mut self, command: &str, e: &io::Error) -> InstrumentError {
        self.disconnect();
        match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => InstrumentError::Timeout {
                command: command.to_string(),
            },
            _ => InstrumentError::Io(format!("{command}: {e}")),
        }
    }

    fn send_line(&mut self, command: &str) -> InstrumentResult<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(self.not_connected());
        };

        trace!(command, "Sending SCPI command");
        let mut frame = Vec::with_capacity(command.len() + 1);
        frame.extend_from_slice(command.as_bytes());
        frame.push(b'\n');

        let written = stream.write_all(&frame);
        let flushed = written.and_then(|()| stream.flush());
        if let Err(e) = flushed {
            return Err(self.map_io(command, &e));
        }
        Ok(())
    }

    fn read_line(&mut self, command: &str) -> InstrumentResult<String> {
        let limit = self.config.max_reply_len;
        let Some(reader) = self.reader.as_mut() else {
            return Err(self.not_connected());
        };

        let mut raw = Vec::new();
        let result = reader.by_ref().take(limit as u64).read_until(b'\n', &mut raw);
        match result {
            Ok(0) => {
                self.disconnect();
                return Err(InstrumentError::Io(format!(
                    "{command}: connection closed by instrument"
                )));
            }
            Ok(_) => {}
            Err(e) => return Err(self.map_io(command, &e)),
        }

        if raw.last() != Some(&b'\n') {
            self.disconnect();
            return Err(InstrumentError::Io(format!(
                "{command}: reply not terminated within {limit} bytes"
            )));
        }

        let reply = String::from_utf8_lossy(&raw)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        trace!(command, reply = %reply, "Received SCPI reply");
        Ok(reply)
    }
}

impl Instrument for ScpiTcpInstrument {
    fn write(&mut self, command: &str) -> InstrumentResult<()> {
        self.send_line(command)
    }

    fn query(&mut self, command: &str) -> InstrumentResult<String> {
        self.send_line(command)?;
        self.read_line(command)
    }

    fn close(&mut self) -> InstrumentResult<()> {
        if self.released {
            return Err(InstrumentError::Closed);
        }
        self.released = true;

        if self.stream.is_none() {
            warn!(address = %self.address, "Instrument link was already down at release");
            return Ok(());
        }
        self.disconnect();
        info!(address = %self.address, "Instrument connection closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

impl std::fmt::Debug for ScpiTcpInstrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScpiTcpInstrument")
            .field("address", &self.address)
            .field("connected", &self.stream.is_some())
            .field("released", &self.released)
            .finish()
    }
}
