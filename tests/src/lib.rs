//! Integration test framework for nrsl
#![allow(missing_docs)]
//!
//! Shared fixtures for the cross-crate sidelink tests.
//!
//! # Components
//!
//! - [`test_fixtures`] - Reference pool, requirements and sensed traffic
//! - [`test_utils`] - Logging setup and slot-driving helpers
//!
//! # Test Categories
//!
//! 1. **Sensing scenarios** - Candidate generation against the reference pool
//! 2. **MAC scenarios** - Grants, own-transmission exclusion and the MAC task

pub mod test_fixtures;
pub mod test_utils;

pub use test_fixtures::{
    lc_config, partial_occupancy_records, reference_config, reference_now, reference_pool,
    requirement, REFERENCE_NUMEROLOGY, TEST_DST,
};
pub use test_utils::{init_test_logging, run_slots, TestResult};
