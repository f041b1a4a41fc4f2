//! Cyclic acquisition loop.
//!
//! Each cycle:
//! 1. Check the shutdown flag
//! 2. Average N frequency readings, timing the gate
//! 3. Convert the average into a period string
//! 4. Timestamp the cycle as MJD
//! 5. Write and flush one record, plus the summary when due
//!
//! The instrument is released exactly once when `run` returns, whatever
//! the outcome.

use crate::sampler::{average_frequency, SampleError};
use crate::session::InstrumentSession;
use freqlog_common::config::AcquisitionConfig;
use freqlog_common::convert::to_period_string;
use freqlog_common::error::{ClockError, DomainError, InstrumentError, StateError};
use freqlog_common::metrics::{GateMetrics, GateMetricsSnapshot};
use freqlog_common::record::{CycleRecord, CycleSummary};
use freqlog_common::shutdown::ShutdownFlag;
use freqlog_common::state::{RunState, StateMachine};
use freqlog_common::time::{now_mjd, Clock};
use freqlog_instrument::Instrument;
use std::io::{self, Write};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

/// Loop parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    /// Readings averaged per cycle (N).
    pub samples_per_cycle: usize,
    /// Cycles to run (M).
    pub total_cycles: u64,
    /// Summary interval in cycles; `0` means first cycle only.
    pub summary_every: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from(&AcquisitionConfig::default())
    }
}

impl From<&AcquisitionConfig> for RunSettings {
    fn from(config: &AcquisitionConfig) -> Self {
        Self {
            samples_per_cycle: config.samples_per_cycle,
            total_cycles: config.total_cycles,
            summary_every: config.summary_every,
        }
    }
}

impl RunSettings {
    /// Whether the summary is written after cycle `index` (0-based).
    #[must_use]
    pub fn summary_due(&self, index: u64) -> bool {
        index == 0 || (self.summary_every > 0 && index % self.summary_every == 0)
    }
}

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// All configured cycles were written.
    Completed,
    /// The shutdown flag stopped the run early.
    Interrupted,
}

/// Result of a run that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Records written.
    pub cycles_completed: u64,
    /// Gate-time statistics over the written records.
    pub gate: GateMetricsSnapshot,
}

/// Root cause of a failed run.
#[derive(Debug, Error)]
pub enum RunErrorKind {
    /// Loop parameters are unusable.
    #[error("invalid run settings: {0}")]
    Settings(String),

    /// Instrument query or reply failure.
    #[error("instrument error: {0}")]
    Instrument(#[from] InstrumentError),

    /// The averaged frequency could not be converted to a period.
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    /// The wall clock could not be read.
    #[error("clock error: {0}")]
    Clock(#[from] ClockError),

    /// Writing a record failed.
    #[error("sink error: {0}")]
    Sink(#[from] io::Error),

    /// The runner was driven out of order.
    #[error(transparent)]
    State(#[from] StateError),
}

impl RunErrorKind {
    /// Short name of the failure class.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Settings(_) => "settings",
            Self::Instrument(_) => "instrument",
            Self::Domain(_) => "domain",
            Self::Clock(_) => "clock",
            Self::Sink(_) => "sink",
            Self::State(_) => "state",
        }
    }
}

/// A failed run.
#[derive(Debug, Error)]
#[error("run failed after {cycles_completed} cycle(s) with {} error", .kind.name())]
pub struct RunError {
    /// Root cause.
    #[source]
    pub kind: RunErrorKind,
    /// Records written before the failure.
    pub cycles_completed: u64,
}

/// Drives acquisition cycles against one instrument.
pub struct CycleRunner<I: Instrument, C: Clock> {
    session: InstrumentSession<I>,
    clock: C,
    settings: RunSettings,
    shutdown: ShutdownFlag,
    state: StateMachine,
    metrics: GateMetrics,
    cycles_completed: u64,
}

impl<I: Instrument, C: Clock> CycleRunner<I, C> {
    /// Create a runner owning `session`.
    pub fn new(
        session: InstrumentSession<I>,
        clock: C,
        settings: RunSettings,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            session,
            clock,
            settings,
            shutdown,
            state: StateMachine::new(),
            metrics: GateMetrics::default(),
            cycles_completed: 0,
        }
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        self.state.state()
    }

    /// Records written so far.
    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed
    }

    /// Gate-time metrics.
    pub fn metrics(&self) -> &GateMetrics {
        &self.metrics
    }

    /// The owned instrument session.
    pub fn session(&self) -> &InstrumentSession<I> {
        &self.session
    }

    /// Run until all cycles are written, the shutdown flag is raised, or
    /// an error occurs.
    ///
    /// The instrument is released before this returns on every path.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] for instrument, domain, clock and sink
    /// failures, and when called on a runner that already ran.
    pub fn run<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<RunSummary, RunError> {
        info!(
            samples_per_cycle = self.settings.samples_per_cycle,
            total_cycles = self.settings.total_cycles,
            "Starting acquisition"
        );

        let result = self.drive(sink);

        match self.session.release() {
            Ok(true) => info!("Instrument released"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Instrument release failed"),
        }

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(kind) => {
                self.state.enter_failed();
                error!(
                    kind = kind.name(),
                    error = %kind,
                    cycles = self.cycles_completed,
                    "Acquisition failed"
                );
                return Err(RunError {
                    kind,
                    cycles_completed: self.cycles_completed,
                });
            }
        };

        let terminal = match outcome {
            RunOutcome::Completed => RunState::Completed,
            RunOutcome::Interrupted => RunState::Interrupted,
        };
        self.state.transition(terminal).map_err(|e| RunError {
            kind: e.into(),
            cycles_completed: self.cycles_completed,
        })?;

        let gate = self.metrics.snapshot();
        info!(
            outcome = ?outcome,
            cycles = self.cycles_completed,
            gate_mean_ms = gate.mean_ms,
            gate_max_ms = gate.max_ms,
            "Acquisition finished"
        );

        Ok(RunSummary {
            outcome,
            cycles_completed: self.cycles_completed,
            gate,
        })
    }

    fn drive<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<RunOutcome, RunErrorKind> {
        if self.state.state() != RunState::NotStarted {
            return Err(StateError {
                from: self.state.state().to_string(),
                to: RunState::Running.to_string(),
            }
            .into());
        }
        if self.settings.samples_per_cycle == 0 {
            return Err(RunErrorKind::Settings(SampleError::NoSamples.to_string()));
        }
        if self.shutdown.is_requested() {
            info!("Interrupt received before the first cycle");
            return Ok(RunOutcome::Interrupted);
        }

        self.state.transition(RunState::Running)?;

        for index in 0..self.settings.total_cycles {
            if self.shutdown.is_requested() {
                info!(cycles = self.cycles_completed, "Interrupt received, stopping");
                return Ok(RunOutcome::Interrupted);
            }
            if !self.run_cycle(index, sink)? {
                return Ok(RunOutcome::Interrupted);
            }
        }

        Ok(RunOutcome::Completed)
    }

    /// Run one cycle. Returns `false` if it was abandoned because of an
    /// interrupt.
    fn run_cycle<W: Write + ?Sized>(&mut self, index: u64, sink: &mut W) -> Result<bool, RunErrorKind> {
        let start = Instant::now();
        let sampled = average_frequency(
            self.session.instrument_mut(),
            self.settings.samples_per_cycle,
            &self.shutdown,
        );
        let gate = start.elapsed();

        // The flag is never lowered, so `Interrupted` always lands here.
        if self.shutdown.is_requested() {
            if let Err(e) = &sampled {
                debug!(error = %e, "Sampling aborted by interrupt");
            }
            info!(cycle = index, "Interrupt received mid-cycle, record discarded");
            return Ok(false);
        }
        let average = match sampled {
            Ok(average) => average,
            Err(SampleError::Instrument(e)) => return Err(e.into()),
            Err(e) => return Err(RunErrorKind::Settings(e.to_string())),
        };

        let elapsed_ms = gate.as_secs_f64() * 1000.0;
        let period = to_period_string(average.hz())?;
        let mjd = now_mjd(&self.clock)?;
        let record = CycleRecord::new(period, elapsed_ms, mjd);

        writeln!(sink, "{record}")?;
        sink.flush()?;
        self.metrics.record(gate);
        self.cycles_completed += 1;

        if self.settings.summary_due(index) {
            let summary = CycleSummary {
                samples_per_cycle: self.settings.samples_per_cycle,
                frequency_hz: average.hz(),
                record: &record,
            };
            for line in summary.lines() {
                writeln!(sink, "{line}")?;
            }
            sink.flush()?;
            info!(
                cycle = index,
                samples = self.settings.samples_per_cycle,
                frequency_mhz = average.hz() / 1e6,
                period = %record.period(),
                mjd = record.mjd().value(),
                elapsed_ms,
                "Cycle summary"
            );
        }

        trace!(cycle = index, elapsed_ms, "Cycle complete");
        Ok(true)
    }
}
