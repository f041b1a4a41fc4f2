//! Signal handling for interrupting a run.
//!
//! SIGINT and SIGTERM only set an atomic from the async handler. A
//! forwarder thread copies them into the run's [`ShutdownFlag`]; the cycle
//! loop then stops and releases the instrument on its own thread.
//!
//! Handlers are installed with `libc::signal`, which restarts interrupted
//! system calls on glibc. A query already waiting on the instrument is not
//! cut short: the worst-case stop latency is one `io_timeout` plus the
//! forwarder poll interval. The sampler checks the flag before every
//! query, so no further queries are issued.

use freqlog_common::shutdown::ShutdownFlag;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Poll interval of the forwarder thread.
const FORWARD_INTERVAL: Duration = Duration::from_millis(10);

/// Signals that interrupt a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// SIGINT - Interrupt (Ctrl+C).
    Interrupt,
    /// SIGTERM - Termination request.
    Terminate,
}

impl SignalKind {
    fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Interrupt),
            2 => Some(Self::Terminate),
            _ => None,
        }
    }

    const fn code(self) -> u32 {
        match self {
            Self::Interrupt => 1,
            Self::Terminate => 2,
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::Interrupt => write!(f, "SIGINT"),
            SignalKind::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Signal handler setup failure.
#[derive(Debug, Error)]
pub enum SignalError {
    /// Another handler is already active in this process.
    #[error("signal handlers are already installed")]
    AlreadyInstalled,

    /// The OS refused the handler.
    #[error("failed to install handler for {signal}: {source}")]
    Install {
        /// Signal being installed.
        signal: SignalKind,
        /// OS error.
        source: std::io::Error,
    },

    /// The forwarder thread could not be started.
    #[error("failed to spawn signal forwarder: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Latest signal not yet forwarded (0 = none). Written by the async handler.
static PENDING_SIGNAL: AtomicU32 = AtomicU32::new(0);

/// Guards against more than one active handler per process.
static ACTIVE: AtomicBool = AtomicBool::new(false);

/// Process-wide SIGINT/SIGTERM handling bound to a [`ShutdownFlag`].
///
/// Dropping the handler stops the forwarder; the OS-level handlers stay
/// installed and keep recording into the pending slot.
pub struct SignalHandler {
    running: Arc<AtomicBool>,
    last_signal: Arc<AtomicU32>,
    forwarder: Option<JoinHandle<()>>,
}

impl SignalHandler {
    /// Install handlers that raise `flag`.
    ///
    /// # Errors
    ///
    /// Fails if a handler is already active or the OS rejects the
    /// registration.
    pub fn new(flag: ShutdownFlag) -> Result<Self, SignalError> {
        if ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SignalError::AlreadyInstalled);
        }

        match Self::start(flag) {
            Ok(handler) => Ok(handler),
            Err(e) => {
                ACTIVE.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    fn start(flag: ShutdownFlag) -> Result<Self, SignalError> {
        // Signals that arrived while no handler was active are stale.
        PENDING_SIGNAL.store(0, Ordering::SeqCst);

        #[cfg(unix)]
        register_unix_handlers()?;

        let running = Arc::new(AtomicBool::new(true));
        let last_signal = Arc::new(AtomicU32::new(0));

        let forwarder = {
            let running = Arc::clone(&running);
            let last_signal = Arc::clone(&last_signal);
            std::thread::Builder::new()
                .name("signal-forwarder".into())
                .spawn(move || forward_signals(&flag, &running, &last_signal))
                .map_err(SignalError::Spawn)?
        };

        Ok(Self {
            running,
            last_signal,
            forwarder: Some(forwarder),
        })
    }

    /// Most recent signal forwarded to the flag.
    pub fn last_signal(&self) -> Option<SignalKind> {
        SignalKind::from_code(self.last_signal.load(Ordering::Relaxed))
    }
}

impl Drop for SignalHandler {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.forwarder.take() {
            let _ = handle.join();
        }
        ACTIVE.store(false, Ordering::SeqCst);
    }
}

fn forward_signals(flag: &ShutdownFlag, running: &AtomicBool, last_signal: &AtomicU32) {
    while running.load(Ordering::SeqCst) {
        let code = PENDING_SIGNAL.swap(0, Ordering::SeqCst);
        if let Some(kind) = SignalKind::from_code(code) {
            last_signal.store(kind.code(), Ordering::Relaxed);
            if flag.is_requested() {
                warn!(signal = %kind, "Interrupt already pending, waiting for the current cycle to stop");
            } else {
                info!(signal = %kind, "Interrupt received, stopping after the current query");
            }
            flag.request();
        }
        std::thread::sleep(FORWARD_INTERVAL);
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn register_unix_handlers() -> Result<(), SignalError> {
    use std::os::raw::c_int;

    extern "C" fn on_sigint(_: c_int) {
        PENDING_SIGNAL.store(SignalKind::Interrupt.code(), Ordering::SeqCst);
    }

    extern "C" fn on_sigterm(_: c_int) {
        PENDING_SIGNAL.store(SignalKind::Terminate.code(), Ordering::SeqCst);
    }

    let handlers: [(c_int, SignalKind, extern "C" fn(c_int)); 2] = [
        (libc::SIGINT, SignalKind::Interrupt, on_sigint),
        (libc::SIGTERM, SignalKind::Terminate, on_sigterm),
    ];

    for (signum, kind, handler) in handlers {
        // SAFETY: the handler only performs an atomic store, which is
        // async-signal-safe.
        let previous = unsafe { libc::signal(signum, handler as libc::sighandler_t) };
        if previous == libc::SIG_ERR {
            return Err(SignalError::Install {
                signal: kind,
                source: std::io::Error::last_os_error(),
            });
        }
    }

    debug!("Unix signal handlers registered");
    Ok(())
}
