//! NR slot time base
//!
//! A slot is addressed by (frame, subframe, slot) under a numerology `mu`.
//! Every frame has 10 subframes of 1 ms and every subframe has `2^mu` slots.
//! All sidelink bookkeeping is done on the normalized (absolute) slot index.

use std::cmp::Ordering;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Number of subframes in one NR frame
pub const SUBFRAMES_PER_FRAME: u64 = 10;

/// Highest numerology supported by the time base
pub const MAX_NUMEROLOGY: u8 = 4;

/// Number of slots in one subframe (1 ms) for the given numerology
pub fn slots_per_subframe(numerology: u8) -> u64 {
    1u64 << numerology
}

/// Converts a duration in milliseconds into a number of slots
pub fn ms_to_slots(ms: u64, numerology: u8) -> u64 {
    ms * slots_per_subframe(numerology)
}

/// Duration of one slot for the given numerology
pub fn slot_period(numerology: u8) -> Duration {
    Duration::from_micros(1000 / slots_per_subframe(numerology))
}

/// Frame / subframe / slot triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SfnSf {
    frame: u32,
    subframe: u8,
    slot: u8,
    numerology: u8,
}

impl SfnSf {
    /// Creates a new slot address.
    ///
    /// Out-of-range subframe or slot values are carried into the higher
    /// fields, so `SfnSf::new(0, 10, 0, 0)` equals `SfnSf::new(1, 0, 0, 0)`.
    pub fn new(frame: u32, subframe: u8, slot: u8, numerology: u8) -> Self {
        let base = Self {
            frame,
            subframe: 0,
            slot: 0,
            numerology,
        };
        let offset = subframe as u64 * slots_per_subframe(numerology) + slot as u64;
        base.future(offset)
    }

    /// Rebuilds a slot address from an absolute slot index
    pub fn from_normalized(abs_slot: u64, numerology: u8) -> Self {
        let per_subframe = slots_per_subframe(numerology);
        let per_frame = per_subframe * SUBFRAMES_PER_FRAME;
        Self {
            frame: (abs_slot / per_frame) as u32,
            subframe: ((abs_slot % per_frame) / per_subframe) as u8,
            slot: (abs_slot % per_subframe) as u8,
            numerology,
        }
    }

    /// Returns the frame number
    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Returns the subframe number
    pub fn subframe(&self) -> u8 {
        self.subframe
    }

    /// Returns the slot number inside the subframe
    pub fn slot(&self) -> u8 {
        self.slot
    }

    /// Returns the numerology
    pub fn numerology(&self) -> u8 {
        self.numerology
    }

    /// Number of slots per frame under this numerology
    pub fn slots_per_frame(&self) -> u64 {
        slots_per_subframe(self.numerology) * SUBFRAMES_PER_FRAME
    }

    /// Absolute slot index
    pub fn normalize(&self) -> u64 {
        let per_subframe = slots_per_subframe(self.numerology);
        self.frame as u64 * self.slots_per_frame()
            + self.subframe as u64 * per_subframe
            + self.slot as u64
    }

    /// Advances by `slots` slots
    pub fn add(&mut self, slots: u64) {
        *self = self.future(slots);
    }

    /// Returns the slot address `slots` slots later without mutating
    pub fn future(&self, slots: u64) -> Self {
        Self::from_normalized(self.normalize() + slots, self.numerology)
    }

    /// Returns the slot address `slots` slots earlier, saturating at slot 0
    pub fn past(&self, slots: u64) -> Self {
        Self::from_normalized(self.normalize().saturating_sub(slots), self.numerology)
    }

    /// Number of slots from `earlier` up to `self` (zero if `earlier` is later)
    pub fn slots_since(&self, earlier: &SfnSf) -> u64 {
        self.normalize().saturating_sub(earlier.normalize())
    }
}

/// Orders by absolute slot; equal slot indices of different numerologies
/// are told apart by the numerology so that `Ord` agrees with `Eq`.
impl Ord for SfnSf {
    fn cmp(&self, other: &Self) -> Ordering {
        self.normalize()
            .cmp(&other.normalize())
            .then(self.numerology.cmp(&other.numerology))
    }
}

impl PartialOrd for SfnSf {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for SfnSf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SfnSf({}/{}/{} mu={})",
            self.frame, self.subframe, self.slot, self.numerology
        )
    }
}

/// Slot clock used to drive scenario runs one slot at a time
#[derive(Debug, Clone)]
pub struct SlotClock {
    current: SfnSf,
    end_abs_slot: u64,
}

impl SlotClock {
    /// Creates a clock starting at `start` that completes after `num_slots` slots
    pub fn new(start: SfnSf, num_slots: u64) -> Self {
        Self {
            current: start,
            end_abs_slot: start.normalize() + num_slots,
        }
    }

    /// Returns the current slot
    pub fn now(&self) -> SfnSf {
        self.current
    }

    /// Advances the clock by one slot
    pub fn tick(&mut self) {
        self.current.add(1);
    }

    /// Returns true once the configured number of slots has elapsed
    pub fn is_complete(&self) -> bool {
        self.current.normalize() >= self.end_abs_slot
    }

    /// Simulated time elapsed since slot 0
    pub fn elapsed(&self) -> Duration {
        slot_period(self.current.numerology) * self.current.normalize() as u32
    }
}
