//! Common types and utilities for nrsl
//!
//! This crate provides the slot time base, configuration structures and
//! logging setup shared by the sidelink MAC and the simulator binary.

pub mod config;
pub mod error;
pub mod logging;
pub mod sfn;

pub use config::{
    PeerConfig, ResourcePoolConfig, ScenarioConfig, SchedulerConfig, SchedulerKind,
    SensingConfig, SidelinkConfig, TddSlotType, TrafficConfig, MAX_MCS, SYMBOLS_PER_SLOT,
};
pub use error::Error;
pub use logging::{init_logging, init_logging_with_filter, log_sidelink_event, Direction, LogLevel};
pub use sfn::{ms_to_slots, slot_period, slots_per_subframe, SfnSf, SlotClock};
