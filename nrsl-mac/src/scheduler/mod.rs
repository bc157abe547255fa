//! Sidelink schedulers
//!
//! A scheduler turns the candidate resources of one selection pass and the
//! buffer state of a destination into a [`SlotAllocationPlan`]. The shared
//! steps (transport block sizing, logical channel multiplexing, SCI and HARQ
//! fields) live here; implementations only decide which slots and which
//! starting subchannels to use.

pub mod first_fit;
pub mod simple;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use nrsl_common::SfnSf;

use crate::amc::Amc;
use crate::buffer::DestinationBuffer;
use crate::candidate::{free_runs, CandidateResource};
use crate::error::{MacError, MacResult};
use crate::pool::SlotLayout;

pub use first_fit::FirstFitScheduler;
pub use simple::SimpleScheduler;

/// Bytes reserved for SCI stage 2 and the SL MAC header
pub const SL_MAC_OVERHEAD_BYTES: u32 = 5;

/// Redundancy versions cycled through the transmissions of one TB
pub const RV_SEQUENCE: [u8; 4] = [0, 2, 3, 1];

/// Redundancy version of the `n`-th transmission of a TB
pub fn redundancy_version(n: usize) -> u8 {
    RV_SEQUENCE[n % RV_SEQUENCE.len()]
}

/// Bytes of one logical channel carried in a TB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RlcPduInfo {
    /// Logical channel id
    pub lc_id: u8,
    /// Bytes assigned to the channel
    pub size: u32,
}

/// One PSSCH transmission of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAllocation {
    /// Transmission slot
    pub sfn: SfnSf,
    /// Destination layer-2 id
    pub dst_l2_id: u32,
    /// Priority announced in the SCI
    pub priority: u8,
    /// MCS of the TB
    pub mcs: u8,
    /// New data indicator, set on the initial transmission only
    pub ndi: bool,
    /// Redundancy version
    pub rv: u8,
    /// Whether the slot carries SCI stage 1-A
    pub tx_sci1a: bool,
    /// Slots announced by the SCI 1-A of this slot (0 when none is sent)
    pub slot_num_ind: u8,
    /// First subchannel
    pub sb_ch_start: u16,
    /// Number of subchannels
    pub sb_ch_length: u16,
    /// Layout of the slot
    pub layout: SlotLayout,
    /// PSSCH symbols used, common to every slot of the plan
    pub pssch_symbols: u8,
    /// Reservations per SCI configured in the pool
    pub max_num_per_reserve: u8,
    /// Transport block size in bytes
    pub tb_size: u32,
    /// Resource reservation period announced in the SCI, in ms
    pub rsvp_ms: u16,
    /// Logical channel multiplexing of the TB
    pub pdus: Vec<RlcPduInfo>,
}

impl SlotAllocation {
    /// Absolute slot of the transmission
    pub fn abs_slot(&self) -> u64 {
        self.sfn.normalize()
    }
}

/// All transmissions of one TB towards a destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAllocationPlan {
    /// Destination layer-2 id
    pub dst_l2_id: u32,
    /// Priority of the TB
    pub priority: u8,
    /// Transport block size in bytes
    pub tb_size: u32,
    /// Subchannels per transmission
    pub sb_ch_length: u16,
    /// Reservation period in ms, 0 for a one-shot plan
    pub rsvp_ms: u16,
    /// Transmissions in time order
    pub allocations: Vec<SlotAllocation>,
}

impl SlotAllocationPlan {
    /// Logical channel multiplexing of the TB
    pub fn pdus(&self) -> &[RlcPduInfo] {
        self.allocations
            .first()
            .map(|a| a.pdus.as_slice())
            .unwrap_or_default()
    }

    /// Absolute slot of the first transmission
    pub fn first_slot(&self) -> Option<u64> {
        self.allocations.first().map(SlotAllocation::abs_slot)
    }

    /// Absolute slot of the last transmission
    pub fn last_slot(&self) -> Option<u64> {
        self.allocations.last().map(SlotAllocation::abs_slot)
    }

    /// Replaces the TB contents of every transmission
    pub fn set_pdus(&mut self, pdus: &[RlcPduInfo]) {
        for allocation in &mut self.allocations {
            allocation.pdus = pdus.to_vec();
        }
    }

    /// Moves every transmission `slots` later, keeping the SCI fields
    pub fn shift(&mut self, slots: u64) {
        for allocation in &mut self.allocations {
            allocation.sfn = allocation.sfn.future(slots);
        }
    }
}

/// Static scheduler parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerParams {
    /// Fixed-MCS link adaptation
    pub amc: Amc,
    /// Transmissions per TB, initial one included
    pub max_tx_trans_num_pssch: u8,
    /// Reservations one SCI announces
    pub max_num_per_reserve: u8,
}

impl SchedulerParams {
    /// Builds the parameters, rejecting an MCS outside table 1
    pub fn new(mcs: u8, max_tx_trans_num_pssch: u8, max_num_per_reserve: u8) -> MacResult<Self> {
        Ok(Self {
            amc: Amc::new(mcs)?,
            max_tx_trans_num_pssch: max_tx_trans_num_pssch.max(1),
            max_num_per_reserve: max_num_per_reserve.max(1),
        })
    }
}

/// Turns candidates and buffer state into an allocation plan
pub trait SidelinkScheduler: Send {
    /// Scheduler name for logs
    fn name(&self) -> &'static str;

    /// Builds a plan, or `None` when nothing can or needs to be sent.
    fn compute_allocation(
        &mut self,
        candidates: &[CandidateResource],
        buffer: &DestinationBuffer,
    ) -> MacResult<Option<SlotAllocationPlan>>;
}

/// Free subchannels of one slot, rebuilt from its candidates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotAvailability {
    /// The slot
    pub sfn: SfnSf,
    /// Its layout
    pub layout: SlotLayout,
    /// Free flag per subchannel
    pub free: Vec<bool>,
}

impl SlotAvailability {
    /// Widest contiguous free run
    pub fn longest_run(&self) -> u16 {
        free_runs(&self.free)
            .iter()
            .map(|(_, len)| *len)
            .max()
            .unwrap_or(0)
    }

    /// Starting subchannels of every contiguous free range of `width`
    pub fn valid_starts(&self, width: u16) -> Vec<u16> {
        free_runs(&self.free)
            .into_iter()
            .filter(|(_, len)| *len >= width)
            .flat_map(|(start, len)| start..=start + len - width)
            .collect()
    }
}

/// Groups candidates by slot, in time order
pub fn slots_from_candidates(candidates: &[CandidateResource]) -> MacResult<Vec<SlotAvailability>> {
    let mut slots: BTreeMap<u64, SlotAvailability> = BTreeMap::new();
    for candidate in candidates {
        let total = candidate.layout.num_subchannels;
        let end = candidate.sb_ch_start as u32 + candidate.sb_ch_length as u32;
        if end > total as u32 {
            return Err(MacError::SubchannelOutOfRange {
                start: candidate.sb_ch_start,
                end,
                total,
            });
        }
        let slot = slots
            .entry(candidate.abs_slot())
            .or_insert_with(|| SlotAvailability {
                sfn: candidate.sfn,
                layout: candidate.layout,
                free: vec![false; total as usize],
            });
        for free in &mut slot.free[candidate.sb_ch_start as usize..end as usize] {
            *free = true;
        }
    }
    Ok(slots.into_values().collect())
}

/// Grows the subchannel count from 1 until the TB fits the buffered bytes
/// plus the MAC overhead, or until `max_subchannels` is reached.
///
/// Returns the subchannel count and the TB size left for RLC data.
pub fn size_transport_block(
    amc: &Amc,
    subchannel_size_rbs: u16,
    max_subchannels: u16,
    symbols: u8,
    buffered_bytes: u32,
) -> (u16, u32) {
    let mut subchannels = 0;
    let mut tb_size;
    loop {
        subchannels += 1;
        tb_size = amc.tb_size(subchannel_size_rbs, subchannels, symbols);
        if tb_size >= buffered_bytes + SL_MAC_OVERHEAD_BYTES || subchannels >= max_subchannels {
            break;
        }
    }
    (subchannels, tb_size.saturating_sub(SL_MAC_OVERHEAD_BYTES))
}

/// Serves logical channels in priority order until the TB is full.
///
/// The last served channel is split when the TB is too small; bytes left
/// over once every channel is served pad the last channel.
pub fn assign_pdus(buffer: &DestinationBuffer, tb_size: u32) -> Vec<RlcPduInfo> {
    let mut remaining = tb_size;
    let mut pdus: Vec<RlcPduInfo> = Vec::new();
    for channel in buffer.by_priority() {
        if remaining == 0 {
            break;
        }
        let size = channel.buffered_bytes.min(remaining);
        remaining -= size;
        pdus.push(RlcPduInfo {
            lc_id: channel.config.lc_id,
            size,
        });
    }
    if let Some(last) = pdus.last_mut() {
        last.size += remaining;
    }
    pdus
}

/// Shared allocation steps once the slots are chosen.
///
/// `slots` must be in time order. `choose_start` picks one of the valid
/// starting subchannels of a slot.
pub(crate) fn allocate(
    params: &SchedulerParams,
    buffer: &DestinationBuffer,
    slots: &[&SlotAvailability],
    mut choose_start: impl FnMut(&[u16]) -> Option<u16>,
) -> Option<SlotAllocationPlan> {
    let head = buffer.highest_priority()?;
    let priority = head.config.priority;
    let rsvp_ms = head.config.rsvp_ms;
    let first = slots.first()?;
    let symbols = slots.iter().map(|s| s.layout.pssch_symbols).min()?;
    let max_subchannels = slots.iter().map(|s| s.longest_run()).min()?;
    if max_subchannels == 0 {
        return None;
    }

    let total = buffer.total_bytes();
    let (sb_ch_length, tb_size) = size_transport_block(
        &params.amc,
        first.layout.subchannel_size_rbs,
        max_subchannels,
        symbols,
        total,
    );
    if tb_size == 0 {
        debug!(symbols, sb_ch_length, "Transport block too small for any data");
        return None;
    }
    let pdus = assign_pdus(buffer, tb_size);

    let selected = slots.len();
    let per_reserve = params.max_num_per_reserve as usize;
    let mut allocations = Vec::with_capacity(selected);
    for (n, slot) in slots.iter().enumerate() {
        let sb_ch_start = choose_start(&slot.valid_starts(sb_ch_length))?;
        let tx_sci1a = n % per_reserve == 0;
        let slot_num_ind = match (tx_sci1a, n + per_reserve <= selected) {
            (false, _) => 0,
            (true, true) => per_reserve as u8,
            (true, false) => (selected - n) as u8,
        };
        allocations.push(SlotAllocation {
            sfn: slot.sfn,
            dst_l2_id: buffer.dst_l2_id(),
            priority,
            mcs: params.amc.mcs(),
            ndi: n == 0,
            rv: redundancy_version(n),
            tx_sci1a,
            slot_num_ind,
            sb_ch_start,
            sb_ch_length,
            layout: slot.layout,
            pssch_symbols: symbols,
            max_num_per_reserve: params.max_num_per_reserve,
            tb_size,
            rsvp_ms,
            pdus: pdus.clone(),
        });
    }

    debug!(
        dst = buffer.dst_l2_id(),
        slots = selected,
        sb_ch_length,
        tb_size,
        buffered = total,
        "Built slot allocation plan"
    );
    Some(SlotAllocationPlan {
        dst_l2_id: buffer.dst_l2_id(),
        priority,
        tb_size,
        sb_ch_length,
        rsvp_ms,
        allocations,
    })
}
