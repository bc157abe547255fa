//! NR sidelink mode-2 MAC
//!
//! This crate implements UE-autonomous sidelink resource selection per
//! 3GPP TS 38.214 section 8.1.4 and TS 38.321 section 5.22.1.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐   ┌────────────────┐   ┌──────────────────┐   ┌───────────┐
//! │ ResourcePool   │──▶│ SensingAlgo    │──▶│ candidate list   │──▶│ Scheduler │──▶ SlotAllocationPlan
//! │ (geometry)     │   │ steps 4 to 7   │   │ (width-L tiles)  │   │           │
//! └────────────────┘   └───────▲────────┘   └──────────────────┘   └───────────┘
//!                              │
//!                      ┌───────┴────────┐
//!                      │ SensingStore   │◀── sensed SCIs, own transmissions
//!                      └────────────────┘
//! ```
//!
//! [`SidelinkUeMac`] ties the pieces together for one UE and
//! [`SidelinkMacTask`] drives it from a tokio channel.
//!
//! # Example Usage
//!
//! ```
//! use nrsl_common::{SfnSf, SidelinkConfig};
//! use nrsl_mac::{LogicalChannelConfig, SidelinkUeMac};
//!
//! let mut mac = SidelinkUeMac::from_config(&SidelinkConfig::default()).unwrap();
//! mac.configure_logical_channel(
//!     255,
//!     LogicalChannelConfig { lc_id: 4, lcg_id: 0, priority: 1, pdb_ms: 20, rsvp_ms: 100 },
//! );
//! mac.report_buffer_status(255, 4, 300).unwrap();
//!
//! let plan = mac.schedule(SfnSf::new(211, 0, 0, 2), 255).unwrap();
//! assert!(plan.is_some());
//! ```

pub mod amc;
pub mod buffer;
pub mod candidate;
pub mod error;
pub mod mac;
pub mod messages;
pub mod pool;
pub mod scheduler;
pub mod sensing;
pub mod task;
pub mod trace;

// Re-export main types
pub use amc::Amc;
pub use buffer::{DestinationBuffer, LogicalChannel, LogicalChannelConfig};
pub use candidate::{
    free_runs, CandidateResource, CandidateSelection, SensingAlgorithm, SensingParams,
    TransmissionRequirement,
};
pub use error::{MacError, MacResult};
pub use mac::{reselection_counter_range, SidelinkUeMac, SlotTick, SpsGrant};
pub use messages::MacMessage;
pub use pool::{physical_pool, PoolRegistry, ResourcePool, SlotLayout, SlotOpportunity};
pub use scheduler::{
    FirstFitScheduler, RlcPduInfo, SchedulerParams, SidelinkScheduler, SimpleScheduler,
    SlotAllocation, SlotAllocationPlan,
};
pub use sensing::{
    remove_old_sensing_data, remove_old_transmit_history, ReservedRetx, SensingRecord,
    SensingStore, TransmitHistoryEntry,
};
pub use task::SidelinkMacTask;
pub use trace::{CollectingObserver, SensingObserver, SensingReport};
