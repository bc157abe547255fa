//! Message types for MAC task communication

use tokio::sync::oneshot;

use nrsl_common::SfnSf;

use crate::buffer::LogicalChannelConfig;
use crate::candidate::{CandidateResource, TransmissionRequirement};
use crate::error::MacResult;
use crate::mac::SlotTick;
use crate::sensing::SensingRecord;

/// Messages for the sidelink MAC task
#[derive(Debug)]
pub enum MacMessage {
    // ========================================================================
    // PHY indications
    // ========================================================================

    /// SCI decoded by the PHY
    SensingData {
        /// Sensed record
        record: SensingRecord,
    },

    /// Start of a slot; the MAC schedules and returns what to transmit
    SlotIndication {
        /// Current slot
        sfn: SfnSf,
        /// Response channel
        response_tx: oneshot::Sender<MacResult<SlotTick>>,
    },

    // ========================================================================
    // RLC / RRC
    // ========================================================================

    /// Logical channel setup towards a destination
    ConfigureLogicalChannel {
        /// Destination layer-2 id
        dst_l2_id: u32,
        /// Channel configuration
        config: LogicalChannelConfig,
    },

    /// RLC queue size report
    BufferStatusReport {
        /// Destination layer-2 id
        dst_l2_id: u32,
        /// Logical channel id
        lc_id: u8,
        /// Queued bytes
        bytes: u32,
    },

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Runs the sensing algorithm without granting anything
    CandidateQuery {
        /// Current slot
        sfn: SfnSf,
        /// Resource shape
        requirement: TransmissionRequirement,
        /// Response channel
        response_tx: oneshot::Sender<MacResult<Vec<CandidateResource>>>,
    },

    /// Stops the task
    Shutdown,
}
