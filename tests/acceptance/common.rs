//! Common utilities for acceptance tests.

#![allow(dead_code)] // Not every helper is used by every test module

use freqlog_common::error::InstrumentResult;
use freqlog_common::record::ParsedRecord;
use freqlog_instrument::Instrument;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Wraps an instrument and counts close calls.
pub struct CountingInstrument<I> {
    inner: I,
    closes: Arc<AtomicUsize>,
}

impl<I: Instrument> CountingInstrument<I> {
    /// Wrap `inner`; the returned counter tracks its close calls.
    pub fn new(inner: I) -> (Self, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        let wrapped = Self {
            inner,
            closes: Arc::clone(&closes),
        };
        (wrapped, closes)
    }
}

impl<I: Instrument> Instrument for CountingInstrument<I> {
    fn write(&mut self, command: &str) -> InstrumentResult<()> {
        self.inner.write(command)
    }

    fn query(&mut self, command: &str) -> InstrumentResult<String> {
        self.inner.query(command)
    }

    fn close(&mut self) -> InstrumentResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close()
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }
}

/// Read a record file, split into data records and comment lines.
pub fn read_log(path: &Path) -> (Vec<ParsedRecord>, Vec<String>) {
    let content = std::fs::read_to_string(path).expect("failed to read record file");
    let mut records = Vec::new();
    let mut comments = Vec::new();
    for line in content.lines() {
        if line.starts_with('#') {
            comments.push(line.to_string());
        } else {
            records.push(line.parse().expect("malformed record line"));
        }
    }
    (records, comments)
}

/// Raw data lines of a record file.
pub fn data_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .expect("failed to read record file")
        .lines()
        .filter(|l| !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Check a data line against `measurements counter=<P>,gate=<g.2> <mjd.5>`.
pub fn assert_record_shape(line: &str) {
    let rest = line
        .strip_prefix("measurements counter=")
        .unwrap_or_else(|| panic!("bad prefix: {line}"));
    let (counter, rest) = rest.split_once(",gate=").expect("missing gate field");
    let (gate, mjd) = rest.split_once(' ').expect("missing timestamp");

    let (mantissa, exponent) = counter.split_once('E').expect("missing exponent");
    let (whole, fraction) = mantissa.split_once('.').expect("missing decimal point");
    assert_eq!(whole.len(), 1, "{line}");
    assert_eq!(fraction.len(), 20, "{line}");
    assert!(exponent.starts_with('+') || exponent.starts_with('-'), "{line}");
    assert!(exponent.len() >= 3, "{line}");

    assert_eq!(gate.split_once('.').map(|(_, d)| d.len()), Some(2), "{line}");
    assert_eq!(mjd.split_once('.').map(|(_, d)| d.len()), Some(5), "{line}");
}
