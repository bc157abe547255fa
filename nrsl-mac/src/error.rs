//! Error types for the sidelink MAC

use thiserror::Error;

/// Sidelink MAC error types
///
/// Every variant is a configuration or programming mistake. Conditions that
/// are merely unschedulable (no candidates, empty buffers) are reported as
/// empty results instead.
#[derive(Error, Debug)]
pub enum MacError {
    /// Pool id not present in the registry
    #[error("Unknown sidelink pool id {pool_id}")]
    UnknownPool {
        /// Requested pool id
        pool_id: u16,
    },

    /// Reservation period does not realign with the physical pool
    #[error("Reservation period of {period_slots} slots is not a multiple of the {pool_len}-slot physical pool")]
    InvalidReservationPeriod {
        /// Reservation period in slots
        period_slots: u64,
        /// Physical pool length in slots
        pool_len: u64,
    },

    /// Selection window does not fit in the reservation period
    #[error("Selection window of {window_slots} slots exceeds the reservation period of {period_slots} slots")]
    SelectionWindowTooLong {
        /// Selection window length (T2 - T1 + 1)
        window_slots: u64,
        /// Reservation period in slots
        period_slots: u64,
    },

    /// Subchannel range exceeds the pool width
    #[error("Subchannel range [{start}, {end}) out of bounds for {total} subchannels")]
    SubchannelOutOfRange {
        /// First subchannel
        start: u16,
        /// One past the last subchannel
        end: u32,
        /// Subchannels in the pool
        total: u16,
    },

    /// MCS outside of MCS table 1
    #[error("Invalid MCS {mcs}")]
    InvalidMcs {
        /// Requested MCS
        mcs: u8,
    },

    /// Logical channel not configured for the destination
    #[error("Logical channel {lc_id} not configured for destination {dst_l2_id}")]
    UnknownLogicalChannel {
        /// Destination layer-2 id
        dst_l2_id: u32,
        /// Logical channel id
        lc_id: u8,
    },

    /// Malformed transmission requirement
    #[error("Invalid transmission requirement: {0}")]
    InvalidRequirement(String),

    /// SL bitmap does not tile the uplink slots of the TDD pattern
    #[error("SL bitmap of length {bitmap_len} is not a multiple of the {ul_slots} UL slots per TDD period")]
    InvalidBitmap {
        /// SL bitmap length
        bitmap_len: usize,
        /// UL slots in one TDD period
        ul_slots: usize,
    },

    /// Pool construction failed
    #[error("Invalid resource pool {pool_id}: {reason}")]
    InvalidPool {
        /// Pool id
        pool_id: u16,
        /// Failure reason
        reason: String,
    },

    /// Error from the common crate
    #[error(transparent)]
    Common(#[from] nrsl_common::Error),
}

/// Result type for sidelink MAC operations
pub type MacResult<T> = Result<T, MacError>;
