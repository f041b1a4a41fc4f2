//! Shutdown flag shared between the signal plumbing and the cycle loop.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag.
///
/// Cloning yields another handle to the same flag. Raising it is
/// idempotent; only the run loop acts on it.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    inner: Arc<FlagState>,
}

#[derive(Debug, Default)]
struct FlagState {
    requested: AtomicBool,
    raise_count: AtomicU32,
}

impl ShutdownFlag {
    /// Create a lowered flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Safe to call from any thread, any number of times.
    pub fn request(&self) {
        self.inner.raise_count.fetch_add(1, Ordering::Relaxed);
        self.inner.requested.store(true, Ordering::SeqCst);
    }

    /// Whether shutdown has been requested.
    #[inline]
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Number of times the flag was raised.
    #[must_use]
    pub fn raise_count(&self) -> u32 {
        self.inner.raise_count.load(Ordering::Relaxed)
    }
}
