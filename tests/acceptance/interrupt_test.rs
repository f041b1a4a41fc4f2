//! Interrupt and failure acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - An interrupt while a query is pending ends the run successfully
//! - After an interrupt at most the pending query completes
//! - The in-flight cycle leaves no partial record
//! - The instrument is released exactly once on interrupt and on failure

use super::common::{assert_record_shape, data_lines, read_log, CountingInstrument};
use freqlog_common::config::OutputTarget;
use freqlog_common::error::InstrumentError;
use freqlog_common::shutdown::ShutdownFlag;
use freqlog_common::time::SystemClock;
use freqlog_instrument::{SimulatedInstrument, FREQUENCY_QUERY};
use freqlog_runtime::{open_sink, CycleRunner, InstrumentSession, RunErrorKind, RunOutcome, RunSettings};
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_interrupt_during_pending_query() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("timedata.txt");
    let mut sink = open_sink(&OutputTarget::File(path.clone())).unwrap();

    let slow = SimulatedInstrument::new(1e6).with_latency(Duration::from_millis(20));
    let (instrument, closes) = CountingInstrument::new(slow);
    let shutdown = ShutdownFlag::new();
    let settings = RunSettings {
        samples_per_cycle: 5,
        total_cycles: 1_000,
        summary_every: 0,
    };
    let mut runner = CycleRunner::new(
        InstrumentSession::new(instrument),
        SystemClock,
        settings,
        shutdown.clone(),
    );

    let interrupter = {
        let shutdown = shutdown.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(250));
            shutdown.request();
        })
    };

    let summary = runner.run(&mut sink).unwrap();
    interrupter.join().unwrap();
    drop(sink);

    assert_eq!(summary.outcome, RunOutcome::Interrupted);
    assert!(summary.cycles_completed < 1_000);
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    let lines = data_lines(&path);
    assert_eq!(lines.len() as u64, summary.cycles_completed);
    for line in &lines {
        assert_record_shape(line);
    }
}

#[test]
fn test_interrupt_waits_for_one_query_at_most() {
    let latency = Duration::from_millis(200);
    let slow = SimulatedInstrument::new(1e6).with_latency(latency);
    let (instrument, closes) = CountingInstrument::new(slow);
    let shutdown = ShutdownFlag::new();
    let settings = RunSettings {
        samples_per_cycle: 19,
        total_cycles: 10,
        summary_every: 0,
    };
    let mut runner = CycleRunner::new(
        InstrumentSession::new(instrument),
        SystemClock,
        settings,
        shutdown.clone(),
    );

    let (raised_tx, raised_rx) = mpsc::channel();
    let interrupter = {
        let shutdown = shutdown.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            shutdown.request();
            raised_tx.send(Instant::now()).unwrap();
        })
    };

    let mut out = Vec::new();
    let summary = runner.run(&mut out).unwrap();
    let finished = Instant::now();
    interrupter.join().unwrap();
    let raised = raised_rx.recv().unwrap();

    assert_eq!(summary.outcome, RunOutcome::Interrupted);
    assert_eq!(summary.cycles_completed, 0);
    assert!(out.is_empty());
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    // Remaining 17 queries of the cycle would take 3.4 s.
    let stop_latency = finished.saturating_duration_since(raised);
    assert!(
        stop_latency < latency * 2,
        "stopped {stop_latency:?} after the interrupt"
    );
}

#[test]
fn test_interrupt_before_first_cycle_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("timedata.txt");
    let mut sink = open_sink(&OutputTarget::File(path.clone())).unwrap();

    let (instrument, closes) = CountingInstrument::new(SimulatedInstrument::new(1e6));
    let shutdown = ShutdownFlag::new();
    shutdown.request();

    let mut runner = CycleRunner::new(
        InstrumentSession::new(instrument),
        SystemClock,
        RunSettings::default(),
        shutdown,
    );
    let summary = runner.run(&mut sink).unwrap();
    drop(sink);

    assert_eq!(summary.outcome, RunOutcome::Interrupted);
    assert_eq!(summary.cycles_completed, 0);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert!(std::fs::read_to_string(&path).unwrap().is_empty());
}

#[test]
fn test_instrument_failure_releases_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("timedata.txt");
    let mut sink = open_sink(&OutputTarget::File(path.clone())).unwrap();

    let flaky = SimulatedInstrument::new(1e6).with_replies(vec![
        Ok("1.0E+06".to_string()),
        Ok("1.0E+06".to_string()),
        Ok("9.9E+37".to_string()),
    ]);
    let (instrument, closes) = CountingInstrument::new(flaky);
    let settings = RunSettings {
        samples_per_cycle: 2,
        total_cycles: 10,
        summary_every: 0,
    };
    let mut runner = CycleRunner::new(
        InstrumentSession::new(instrument),
        SystemClock,
        settings,
        ShutdownFlag::new(),
    );
    let err = runner.run(&mut sink).unwrap_err();
    drop(sink);

    assert!(matches!(
        err.kind,
        RunErrorKind::Instrument(InstrumentError::NoMeasurement { ref command }) if command == FREQUENCY_QUERY
    ));
    assert_eq!(err.cycles_completed, 1);
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    let (records, _) = read_log(&path);
    assert_eq!(records.len(), 1);
}
