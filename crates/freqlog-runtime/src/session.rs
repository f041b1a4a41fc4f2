//! Exactly-once ownership of the instrument connection.

use freqlog_common::error::InstrumentResult;
use freqlog_instrument::Instrument;
use tracing::{debug, warn};

/// Owns an instrument and releases it exactly once.
///
/// Release happens on the first call to [`InstrumentSession::release`] or
/// on drop, whichever comes first. Later calls are no-ops, so every exit
/// path of the run can call `release` unconditionally.
#[derive(Debug)]
pub struct InstrumentSession<T: Instrument> {
    instrument: T,
    released: bool,
}

impl<T: Instrument> InstrumentSession<T> {
    /// Take ownership of an open instrument.
    pub fn new(instrument: T) -> Self {
        Self {
            instrument,
            released: false,
        }
    }

    /// The wrapped instrument.
    pub fn instrument(&self) -> &T {
        &self.instrument
    }

    /// Mutable access for issuing commands.
    pub fn instrument_mut(&mut self) -> &mut T {
        &mut self.instrument
    }

    /// Whether the instrument has been released.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Release the instrument.
    ///
    /// Returns `Ok(true)` if this call performed the release and `Ok(false)`
    /// if it had already happened.
    ///
    /// # Errors
    ///
    /// Propagates the instrument's close error. The session still counts
    /// as released; close is never attempted twice.
    pub fn release(&mut self) -> InstrumentResult<bool> {
        if self.released {
            return Ok(false);
        }
        self.released = true;
        debug!("Releasing instrument");
        self.instrument.close()?;
        Ok(true)
    }
}

impl<T: Instrument> Drop for InstrumentSession<T> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "Failed to release instrument on drop");
        }
    }
}
