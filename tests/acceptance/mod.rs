//! End-to-end acceptance tests.
//!
//! All tests run against in-process instruments and temporary files; no
//! hardware is required.

mod common;
mod interrupt_test;
mod logging_test;
