//! Gate-time statistics for acquisition cycles.
//!
//! The gate time of a cycle is the wall time spent in the sampler. A
//! bounded ring buffer keeps recent samples for percentile reporting while
//! running totals cover the whole run.

use serde::Serialize;
use std::time::Duration;

/// Gate-time metrics with a ring buffer of recent samples.
#[derive(Debug)]
pub struct GateMetrics {
    /// Ring buffer of gate durations in nanoseconds.
    samples: Box<[u64]>,
    write_pos: usize,
    /// Number of samples held (saturates at buffer size).
    sample_count: usize,
    total_cycles: u64,
    min_ns: u64,
    max_ns: u64,
    sum_ns: u128,
}

impl Default for GateMetrics {
    fn default() -> Self {
        Self::new(GateMetrics::DEFAULT_HISTORY)
    }
}

impl GateMetrics {
    /// Default ring buffer length.
    pub const DEFAULT_HISTORY: usize = 4096;

    /// Create a collector retaining `history` recent samples.
    #[must_use]
    pub fn new(history: usize) -> Self {
        let size = history.max(1);
        Self {
            samples: vec![0u64; size].into_boxed_slice(),
            write_pos: 0,
            sample_count: 0,
            total_cycles: 0,
            min_ns: u64::MAX,
            max_ns: 0,
            sum_ns: 0,
        }
    }

    /// Record the gate time of one cycle.
    pub fn record(&mut self, gate: Duration) {
        let ns = u64::try_from(gate.as_nanos()).unwrap_or(u64::MAX);

        self.samples[self.write_pos] = ns;
        self.write_pos = (self.write_pos + 1) % self.samples.len();
        self.sample_count = self.sample_count.saturating_add(1).min(self.samples.len());

        self.total_cycles += 1;
        self.min_ns = self.min_ns.min(ns);
        self.max_ns = self.max_ns.max(ns);
        self.sum_ns += u128::from(ns);
    }

    /// Number of cycles recorded.
    #[must_use]
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Shortest gate time seen.
    #[must_use]
    pub fn min(&self) -> Option<Duration> {
        (self.total_cycles > 0).then(|| Duration::from_nanos(self.min_ns))
    }

    /// Longest gate time seen.
    #[must_use]
    pub fn max(&self) -> Option<Duration> {
        (self.total_cycles > 0).then(|| Duration::from_nanos(self.max_ns))
    }

    /// Mean gate time over the whole run.
    #[must_use]
    pub fn mean(&self) -> Option<Duration> {
        if self.total_cycles == 0 {
            return None;
        }
        let mean = self.sum_ns / u128::from(self.total_cycles);
        Some(Duration::from_nanos(u64::try_from(mean).unwrap_or(u64::MAX)))
    }

    /// Percentile (0.0 to 100.0) over the retained samples.
    ///
    /// Returns `None` with no samples or an out-of-range percentile.
    #[must_use]
    pub fn percentile(&self, percentile: f64) -> Option<Duration> {
        if self.sample_count == 0 || !(0.0..=100.0).contains(&percentile) {
            return None;
        }

        let mut sorted: Vec<u64> = self.samples[..self.sample_count].to_vec();
        sorted.sort_unstable();

        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let idx = ((percentile / 100.0) * (sorted.len() - 1) as f64).round() as usize;
        Some(Duration::from_nanos(sorted[idx.min(sorted.len() - 1)]))
    }

    /// Get a snapshot of current metrics.
    #[must_use]
    pub fn snapshot(&self) -> GateMetricsSnapshot {
        #[allow(clippy::cast_precision_loss)]
        let ms = |d: Duration| d.as_nanos() as f64 / 1e6;
        GateMetricsSnapshot {
            cycles: self.total_cycles,
            min_ms: self.min().map(ms),
            max_ms: self.max().map(ms),
            mean_ms: self.mean().map(ms),
            median_ms: self.percentile(50.0).map(ms),
        }
    }
}

/// Immutable snapshot of gate metrics for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct GateMetricsSnapshot {
    /// Cycles recorded.
    pub cycles: u64,
    /// Minimum gate time in milliseconds.
    pub min_ms: Option<f64>,
    /// Maximum gate time in milliseconds.
    pub max_ms: Option<f64>,
    /// Mean gate time in milliseconds.
    pub mean_ms: Option<f64>,
    /// Median gate time over retained samples, in milliseconds.
    pub median_ms: Option<f64>,
}
