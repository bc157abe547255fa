//! Sidelink resource pool descriptor
//!
//! A pool is built once from its [`ResourcePoolConfig`]: the SL bitmap is laid
//! over the uplink slots of the TDD pattern to obtain the physical pool, a
//! periodic bitmap over absolute slots. The pool is immutable afterwards and
//! only answers geometry questions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use nrsl_common::{ms_to_slots, ResourcePoolConfig, TddSlotType};

use crate::error::{MacError, MacResult};

/// PSSCH symbols lost in a slot carrying PSFCH (PSFCH, its AGC copy and a guard)
pub const PSFCH_OVERHEAD_SYMBOLS: u8 = 3;

/// Physical layout of one sidelink slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotLayout {
    /// First PSCCH symbol
    pub pscch_start_symbol: u8,
    /// PSCCH length in symbols
    pub pscch_symbols: u8,
    /// PSCCH bandwidth in RBs
    pub pscch_rbs: u16,
    /// First PSSCH symbol
    pub pssch_start_symbol: u8,
    /// PSSCH length in symbols
    pub pssch_symbols: u8,
    /// Subchannel size in RBs
    pub subchannel_size_rbs: u16,
    /// Subchannels in the pool
    pub num_subchannels: u16,
    /// Whether the slot carries PSFCH
    pub has_psfch: bool,
}

/// A sidelink slot inside a selection window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotOpportunity {
    /// Absolute slot index
    pub abs_slot: u64,
    /// Layout of the slot
    pub layout: SlotLayout,
}

/// Lays the SL bitmap over the uplink slots of a repeating TDD pattern.
///
/// Every UL slot consumes the next bitmap bit; all other slots are never
/// sidelink. The result covers `bitmap.len() / ul_slots` TDD periods.
pub fn physical_pool(bitmap: &[bool], tdd: &[TddSlotType]) -> MacResult<Vec<bool>> {
    let ul_slots = tdd.iter().filter(|t| **t == TddSlotType::Ul).count();
    if ul_slots == 0 || bitmap.is_empty() || bitmap.len() % ul_slots != 0 {
        return Err(MacError::InvalidBitmap {
            bitmap_len: bitmap.len(),
            ul_slots,
        });
    }

    let periods = bitmap.len() / ul_slots;
    let mut bits = bitmap.iter();
    let mut pool = Vec::with_capacity(periods * tdd.len());
    for _ in 0..periods {
        for slot_type in tdd {
            let is_sl = match slot_type {
                TddSlotType::Ul => bits.next().copied().unwrap_or(false),
                TddSlotType::Dl | TddSlotType::F => false,
            };
            pool.push(is_sl);
        }
    }
    Ok(pool)
}

/// Immutable resource pool descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct ResourcePool {
    id: u16,
    numerology: u8,
    slots: Vec<bool>,
    /// SL slots strictly before each position of the physical pool
    prefix_sl: Vec<u64>,
    sl_slots_per_period: u64,
    base_layout: SlotLayout,
    sensing_window_ms: u16,
    selection_window_slots: u16,
    max_num_per_reserve: u8,
    reservation_periods_ms: Vec<u16>,
    psfch_period: u8,
    min_time_gap_psfch: u8,
}

impl ResourcePool {
    /// Builds the pool, rejecting any configured reservation period that
    /// does not realign with the physical pool.
    pub fn from_config(config: &ResourcePoolConfig, numerology: u8) -> MacResult<Self> {
        config.validate()?;
        let slots = physical_pool(&config.bitmap()?, &config.tdd()?)?;

        let mut prefix_sl = Vec::with_capacity(slots.len());
        let mut count = 0u64;
        for is_sl in &slots {
            prefix_sl.push(count);
            if *is_sl {
                count += 1;
            }
        }
        if count == 0 {
            return Err(MacError::InvalidPool {
                pool_id: config.id,
                reason: "physical pool has no sidelink slot".to_string(),
            });
        }

        let pssch_symbols = config.sl_length_symbols - config.pscch_symbols - 1;
        if config.psfch_period > 0 && pssch_symbols <= PSFCH_OVERHEAD_SYMBOLS {
            return Err(MacError::InvalidPool {
                pool_id: config.id,
                reason: format!("{pssch_symbols} PSSCH symbols cannot host PSFCH"),
            });
        }

        let base_layout = SlotLayout {
            pscch_start_symbol: config.sl_start_symbol,
            pscch_symbols: config.pscch_symbols,
            pscch_rbs: config.pscch_rbs,
            pssch_start_symbol: config.sl_start_symbol + config.pscch_symbols,
            pssch_symbols,
            subchannel_size_rbs: config.subchannel_size_rbs,
            num_subchannels: config.num_subchannels,
            has_psfch: false,
        };

        let pool = Self {
            id: config.id,
            numerology,
            slots,
            prefix_sl,
            sl_slots_per_period: count,
            base_layout,
            sensing_window_ms: config.sensing_window_ms,
            selection_window_slots: config.selection_window_slots,
            max_num_per_reserve: config.max_num_per_reserve,
            reservation_periods_ms: config.reservation_periods_ms.clone(),
            psfch_period: config.psfch_period,
            min_time_gap_psfch: config.min_time_gap_psfch,
        };

        for period_ms in &pool.reservation_periods_ms {
            pool.validate_reservation_period(pool.resv_period_in_slots(*period_ms))?;
        }

        debug!(
            pool_id = pool.id,
            len = pool.slots.len(),
            sl_slots = pool.sl_slots_per_period,
            "Built physical sidelink pool"
        );
        Ok(pool)
    }

    /// Pool identifier
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Numerology the pool was built for
    pub fn numerology(&self) -> u8 {
        self.numerology
    }

    /// Length of the physical pool in slots
    pub fn period_len(&self) -> u64 {
        self.slots.len() as u64
    }

    /// The physical pool bitmap
    pub fn physical_slots(&self) -> &[bool] {
        &self.slots
    }

    /// Sidelink slots in one physical pool period
    pub fn sl_slots_per_period(&self) -> u64 {
        self.sl_slots_per_period
    }

    /// Subchannels in the pool
    pub fn num_subchannels(&self) -> u16 {
        self.base_layout.num_subchannels
    }

    /// Subchannel size in RBs
    pub fn subchannel_size_rbs(&self) -> u16 {
        self.base_layout.subchannel_size_rbs
    }

    /// Slot layout of a sidelink slot without PSFCH
    pub fn layout(&self) -> SlotLayout {
        self.base_layout
    }

    /// Maps an absolute slot onto the physical pool.
    ///
    /// Returns whether the slot is a sidelink slot and its index in the pool.
    pub fn map_abs_slot(&self, abs_slot: u64) -> (bool, usize) {
        let index = (abs_slot % self.period_len()) as usize;
        (self.slots[index], index)
    }

    /// Whether the absolute slot belongs to the pool
    pub fn is_sidelink_slot(&self, abs_slot: u64) -> bool {
        self.map_abs_slot(abs_slot).0
    }

    /// Number of sidelink slots strictly before the absolute slot
    pub fn logical_slot_index(&self, abs_slot: u64) -> u64 {
        let (_, index) = self.map_abs_slot(abs_slot);
        (abs_slot / self.period_len()) * self.sl_slots_per_period + self.prefix_sl[index]
    }

    /// Whether a sidelink slot carries PSFCH
    pub fn has_psfch(&self, abs_slot: u64) -> bool {
        self.psfch_period > 0
            && self.is_sidelink_slot(abs_slot)
            && self.logical_slot_index(abs_slot) % self.psfch_period as u64 == 0
    }

    /// Layout of the given slot
    pub fn slot_layout(&self, abs_slot: u64) -> SlotLayout {
        let mut layout = self.base_layout;
        if self.has_psfch(abs_slot) {
            layout.pssch_symbols -= PSFCH_OVERHEAD_SYMBOLS;
            layout.has_psfch = true;
        }
        layout
    }

    /// Converts a reservation period in ms to slots
    pub fn resv_period_in_slots(&self, period_ms: u16) -> u64 {
        ms_to_slots(period_ms as u64, self.numerology)
    }

    /// Checks that a reservation period realigns with the physical pool
    pub fn validate_reservation_period(&self, period_slots: u64) -> MacResult<()> {
        if period_slots % self.period_len() != 0 {
            return Err(MacError::InvalidReservationPeriod {
                period_slots,
                pool_len: self.period_len(),
            });
        }
        Ok(())
    }

    /// Non-zero reservation periods of the pool catalog, in slots
    pub fn reservation_periods_slots(&self) -> Vec<u64> {
        self.reservation_periods_ms
            .iter()
            .filter(|p| **p > 0)
            .map(|p| self.resv_period_in_slots(*p))
            .collect()
    }

    /// Sensing window length in ms
    pub fn sensing_window_ms(&self) -> u16 {
        self.sensing_window_ms
    }

    /// Sensing window length in slots
    pub fn sensing_window_slots(&self) -> u64 {
        ms_to_slots(self.sensing_window_ms as u64, self.numerology)
    }

    /// Configured selection window length in slots
    pub fn selection_window_slots(&self) -> u16 {
        self.selection_window_slots
    }

    /// Maximum reservations one SCI can announce
    pub fn max_num_per_reserve(&self) -> u8 {
        self.max_num_per_reserve
    }

    /// Minimum PSSCH to PSFCH gap in slots
    pub fn min_time_gap_psfch(&self) -> u8 {
        self.min_time_gap_psfch
    }

    /// Sidelink slots in `[now + t1, now + t2]`, both ends included
    pub fn opportunities(&self, now: u64, t1: u64, t2: u64) -> Vec<SlotOpportunity> {
        (now + t1..=now + t2)
            .filter(|abs| self.is_sidelink_slot(*abs))
            .map(|abs_slot| SlotOpportunity {
                abs_slot,
                layout: self.slot_layout(abs_slot),
            })
            .collect()
    }
}

/// Pools configured for the UE, keyed by pool id
#[derive(Debug, Clone, Default)]
pub struct PoolRegistry {
    pools: HashMap<u16, ResourcePool>,
}

impl PoolRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds every configured pool
    pub fn from_configs(configs: &[ResourcePoolConfig], numerology: u8) -> MacResult<Self> {
        let mut registry = Self::new();
        for config in configs {
            registry.insert(ResourcePool::from_config(config, numerology)?);
        }
        Ok(registry)
    }

    /// Adds or replaces a pool
    pub fn insert(&mut self, pool: ResourcePool) {
        self.pools.insert(pool.id(), pool);
    }

    /// Looks up a pool
    pub fn get(&self, pool_id: u16) -> MacResult<&ResourcePool> {
        self.pools
            .get(&pool_id)
            .ok_or(MacError::UnknownPool { pool_id })
    }

    /// Physical slot layout of a pool
    pub fn layout(&self, pool_id: u16) -> MacResult<SlotLayout> {
        Ok(self.get(pool_id)?.layout())
    }

    /// Number of pools
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Whether no pool is configured
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}
