//! Test utility functions for integration tests
//!
//! Provides common utilities for test setup, logging, and slot driving.

use nrsl_common::SfnSf;
use nrsl_mac::{SidelinkUeMac, SlotTick};
use tracing_subscriber::{fmt, EnvFilter};

/// Result type for integration tests
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Initialize logging for tests with optional filter
///
/// Uses RUST_LOG environment variable if set, otherwise defaults to "info"
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Ticks `mac` for `count` consecutive slots starting at `start`
pub fn run_slots(mac: &mut SidelinkUeMac, start: SfnSf, count: u64) -> TestResult<Vec<SlotTick>> {
    let mut now = start;
    let mut ticks = Vec::with_capacity(count as usize);
    for _ in 0..count {
        ticks.push(mac.tick(now)?);
        now.add(1);
    }
    Ok(ticks)
}
