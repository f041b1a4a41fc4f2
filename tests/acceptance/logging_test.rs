//! Record logging acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - Five 1 MHz readings yield the period `1.00000000000000000000E-06`
//! - A three-cycle run writes three records in time order, then stops
//! - Records are appended, never truncating an earlier run
//! - The instrument is released exactly once

use super::common::{assert_record_shape, data_lines, read_log, CountingInstrument};
use chrono::{DateTime, Utc};
use freqlog_common::config::OutputTarget;
use freqlog_common::error::ClockError;
use freqlog_common::shutdown::ShutdownFlag;
use freqlog_common::time::{Clock, SystemClock};
use freqlog_instrument::{configure_frequency_measurement, MeasurementSetup, SimulatedInstrument};
use freqlog_runtime::{open_sink, CycleRunner, InstrumentSession, RunOutcome, RunSettings};
use std::sync::atomic::{AtomicI64, Ordering};

/// Clock advancing by `step_secs` on each reading.
struct SteppingClock {
    next: AtomicI64,
    step_secs: i64,
}

impl Clock for SteppingClock {
    fn now_utc(&self) -> Result<DateTime<Utc>, ClockError> {
        let secs = self.next.fetch_add(self.step_secs, Ordering::SeqCst);
        DateTime::from_timestamp(secs, 0).ok_or(ClockError::OutOfRange)
    }
}

#[test]
fn test_one_megahertz_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("timedata.txt");
    let mut sink = open_sink(&OutputTarget::File(path.clone())).unwrap();

    let (instrument, closes) = CountingInstrument::new(SimulatedInstrument::new(1e6));
    let mut session = InstrumentSession::new(instrument);
    configure_frequency_measurement(session.instrument_mut(), &MeasurementSetup::default())
        .unwrap();

    let settings = RunSettings {
        samples_per_cycle: 5,
        total_cycles: 1,
        summary_every: 0,
    };
    let mut runner = CycleRunner::new(session, SystemClock, settings, ShutdownFlag::new());
    let summary = runner.run(&mut sink).unwrap();
    drop(sink);

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    let lines = data_lines(&path);
    assert_eq!(lines.len(), 1);
    assert_record_shape(&lines[0]);
    assert!(lines[0].starts_with("measurements counter=1.00000000000000000000E-06,gate="));

    let (records, comments) = read_log(&path);
    assert!(records[0].mjd > 60_000.0, "MJD should be in the 21st century");
    assert_eq!(comments[0], "# Number of samples: 5");
    assert!(comments[1].contains("Averaged frequency: 1.000000 MHz"));
    assert!(comments[1].ends_with("period: 1.00000000000000000000E-06"));
}

#[test]
fn test_three_cycles_then_exit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("timedata.txt");
    let mut sink = open_sink(&OutputTarget::File(path.clone())).unwrap();

    let (instrument, closes) = CountingInstrument::new(SimulatedInstrument::new(4e6));
    let clock = SteppingClock {
        next: AtomicI64::new(1_700_000_000),
        step_secs: 60,
    };
    let settings = RunSettings {
        samples_per_cycle: 2,
        total_cycles: 3,
        summary_every: 0,
    };
    let mut runner = CycleRunner::new(
        InstrumentSession::new(instrument),
        clock,
        settings,
        ShutdownFlag::new(),
    );
    let summary = runner.run(&mut sink).unwrap();
    drop(sink);

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.cycles_completed, 3);
    assert_eq!(summary.gate.cycles, 3);
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    let (records, comments) = read_log(&path);
    assert_eq!(records.len(), 3);
    assert!(records.windows(2).all(|w| w[0].mjd < w[1].mjd));
    assert!(records
        .iter()
        .all(|r| r.counter == "2.50000000000000000000E-07"));
    // Summary only for the first cycle
    assert_eq!(comments.len(), 3);

    for line in data_lines(&path) {
        assert_record_shape(&line);
    }
}

#[test]
fn test_system_clock_records_non_decreasing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("timedata.txt");
    let mut sink = open_sink(&OutputTarget::File(path.clone())).unwrap();

    let settings = RunSettings {
        samples_per_cycle: 1,
        total_cycles: 20,
        summary_every: 0,
    };
    let mut runner = CycleRunner::new(
        InstrumentSession::new(SimulatedInstrument::new(1e7)),
        SystemClock,
        settings,
        ShutdownFlag::new(),
    );
    runner.run(&mut sink).unwrap();
    drop(sink);

    let (records, _) = read_log(&path);
    assert_eq!(records.len(), 20);
    assert!(records.windows(2).all(|w| w[0].mjd <= w[1].mjd));
}

#[test]
fn test_runs_append_to_existing_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("timedata.txt");
    let settings = RunSettings {
        samples_per_cycle: 1,
        total_cycles: 2,
        summary_every: 0,
    };

    for frequency in [1e6, 2e6] {
        let mut sink = open_sink(&OutputTarget::File(path.clone())).unwrap();
        let mut runner = CycleRunner::new(
            InstrumentSession::new(SimulatedInstrument::new(frequency)),
            SystemClock,
            settings,
            ShutdownFlag::new(),
        );
        runner.run(&mut sink).unwrap();
    }

    let (records, comments) = read_log(&path);
    assert_eq!(records.len(), 4);
    assert_eq!(comments.len(), 6);
    assert_eq!(records[0].counter, "1.00000000000000000000E-06");
    assert_eq!(records[3].counter, "5.00000000000000000000E-07");
}
