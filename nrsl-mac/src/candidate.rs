//! Candidate resource generation (TS 38.214 8.1.4)
//!
//! The selection window `[n + T1, n + T2]` is enumerated from the pool
//! bitmap (step 4). Slots colliding with a projection of this UE's own past
//! transmissions are removed whole (step 5). Sensed reservations are
//! projected forward into a per-subchannel occupancy map holding the highest
//! RSRP seen on each subchannel (step 6). The RSRP threshold is then raised
//! in 3 dB steps until enough width-`L` resources survive (step 7).
//!
//! Occupancy is tracked per subchannel. A slot whose subchannel 0 is busy
//! still offers subchannel 1 to a one-subchannel transmission.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use nrsl_common::{SensingConfig, SfnSf};

use crate::error::{MacError, MacResult};
use crate::pool::{ResourcePool, SlotLayout, SlotOpportunity};
use crate::sensing::{SensingRecord, TransmitHistoryEntry};
use crate::trace::SensingReport;

/// Threshold increase per relaxation step
pub const RSRP_THRESHOLD_STEP_DB: i32 = 3;

/// Resource shape needed for one transport block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmissionRequirement {
    /// Priority of the data
    pub priority: u8,
    /// Packet delay budget in ms
    pub pdb_ms: u32,
    /// Width in subchannels (L)
    pub sb_ch_length: u16,
    /// Reservation period in ms (0 when nothing is reserved)
    pub rsvp_ms: u16,
    /// Reselection counter: number of periodic reservations
    pub c_resel: u16,
    /// Start of the selection window in slots
    pub t1: u16,
    /// End of the selection window in slots
    pub t2: u16,
}

/// Sensing parameters in force for a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensingParams {
    /// Exclusion steps run only when true
    pub enable_sensing: bool,
    /// Observations newer than this many slots are ignored
    pub tproc0: u16,
    /// Initial PSSCH RSRP threshold
    pub rsrp_threshold_dbm: i32,
    /// Required share of surviving resources in percent
    pub resource_percentage: u8,
    /// Relaxation gives up above this threshold
    pub max_rsrp_threshold_dbm: i32,
}

impl From<&SensingConfig> for SensingParams {
    fn from(config: &SensingConfig) -> Self {
        Self {
            enable_sensing: config.enable_sensing,
            tproc0: config.tproc0,
            rsrp_threshold_dbm: config.rsrp_threshold_dbm,
            resource_percentage: config.resource_percentage,
            max_rsrp_threshold_dbm: config.max_rsrp_threshold_dbm,
        }
    }
}

impl Default for SensingParams {
    fn default() -> Self {
        Self::from(&SensingConfig::default())
    }
}

/// A width-`L` resource in one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateResource {
    /// Slot of the resource
    pub sfn: SfnSf,
    /// First subchannel
    pub sb_ch_start: u16,
    /// Number of subchannels
    pub sb_ch_length: u16,
    /// Layout of the slot
    pub layout: SlotLayout,
}

impl CandidateResource {
    /// Absolute slot of the resource
    pub fn abs_slot(&self) -> u64 {
        self.sfn.normalize()
    }
}

/// Candidates together with the diagnostic report of the pass
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSelection {
    /// Candidates in slot order, then subchannel order
    pub candidates: Vec<CandidateResource>,
    /// Report of the pass
    pub report: SensingReport,
}

/// Contiguous runs of `true` as `(start, length)` pairs
pub fn free_runs(free: &[bool]) -> Vec<(u16, u16)> {
    let mut runs = Vec::new();
    let mut start = None;
    for (i, is_free) in free.iter().enumerate() {
        match (start, *is_free) {
            (None, true) => start = Some(i),
            (Some(s), false) => {
                runs.push((s as u16, (i - s) as u16));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push((s as u16, (free.len() - s) as u16));
    }
    runs
}

/// Non-overlapping width-`width` tiles laid from the start of each free run
fn tiles(free: &[bool], width: u16) -> impl Iterator<Item = u16> {
    free_runs(free).into_iter().flat_map(move |(start, len)| {
        (0..len / width).map(move |i| start + i * width)
    })
}

fn tile_count(free: &[bool], width: u16) -> usize {
    free_runs(free)
        .iter()
        .map(|(_, len)| (len / width) as usize)
        .sum()
}

/// Per-subchannel maximum RSRP of projected reservations, keyed by slot
type OccupancyMap = BTreeMap<u64, Vec<f64>>;

/// Sensing-based candidate resource selection over one pool
#[derive(Debug, Clone, Copy)]
pub struct SensingAlgorithm<'a> {
    pool: &'a ResourcePool,
    params: SensingParams,
}

impl<'a> SensingAlgorithm<'a> {
    /// Creates the algorithm for a pool
    pub fn new(pool: &'a ResourcePool, params: SensingParams) -> Self {
        Self { pool, params }
    }

    fn validate(&self, req: &TransmissionRequirement) -> MacResult<()> {
        let total = self.pool.num_subchannels();
        if req.sb_ch_length == 0 {
            return Err(MacError::InvalidRequirement(
                "zero subchannels requested".to_string(),
            ));
        }
        if req.sb_ch_length > total {
            return Err(MacError::SubchannelOutOfRange {
                start: 0,
                end: req.sb_ch_length as u32,
                total,
            });
        }
        if req.t1 > req.t2 {
            return Err(MacError::InvalidRequirement(format!(
                "T1={} is after T2={}",
                req.t1, req.t2
            )));
        }
        let period = self.pool.resv_period_in_slots(req.rsvp_ms);
        if period > 0 {
            self.pool.validate_reservation_period(period)?;
            let window_slots = (req.t2 - req.t1) as u64 + 1;
            if window_slots > period {
                return Err(MacError::SelectionWindowTooLong {
                    window_slots,
                    period_slots: period,
                });
            }
        }
        Ok(())
    }

    /// Runs steps 4 to 7 and returns the surviving candidates.
    ///
    /// The caller is expected to have aged `records` and `history` already.
    /// An empty candidate list is a valid, unschedulable outcome.
    pub fn select(
        &self,
        now: SfnSf,
        req: &TransmissionRequirement,
        records: &[SensingRecord],
        history: &[TransmitHistoryEntry],
    ) -> MacResult<CandidateSelection> {
        self.validate(req)?;

        let now_abs = now.normalize();
        let width = req.sb_ch_length;
        let total = self.pool.num_subchannels();
        let opportunities = self.pool.opportunities(now_abs, req.t1 as u64, req.t2 as u64);
        let initial_slots = opportunities.len();
        let initial_resources = initial_slots * (total / width) as usize;

        debug!(
            now = now_abs,
            t1 = req.t1,
            t2 = req.t2,
            width,
            initial_slots,
            initial_resources,
            "Step 4: initial candidate set"
        );

        let mut report = SensingReport {
            now: now_abs,
            subchannels: width,
            initial_slots,
            initial_resources,
            final_slots: 0,
            final_resources: 0,
            final_rsrp_threshold_dbm: self.params.rsrp_threshold_dbm,
            escalations: 0,
            sensing_applied: false,
        };

        let nothing_sensed = records.is_empty() && history.is_empty();
        if !self.params.enable_sensing || nothing_sensed || initial_resources == 0 {
            let all_free = vec![true; total as usize];
            let candidates = self.emit(&opportunities, now.numerology(), width, |_| Some(&all_free[..]));
            return Ok(self.finish(candidates, report));
        }
        report.sensing_applied = true;

        let p_tx = self.pool.resv_period_in_slots(req.rsvp_ms);
        let repetitions = if p_tx > 0 { req.c_resel.max(1) as u64 } else { 1 };
        let window_end = now_abs + req.t2 as u64;
        let horizon = window_end + (repetitions - 1) * p_tx;

        // Slots whose occupancy matters: every candidate and its reservations
        let relevant: HashSet<u64> = opportunities
            .iter()
            .flat_map(|o| (0..repetitions).map(move |i| o.abs_slot + i * p_tx))
            .collect();

        let own = self.project_own_history(now_abs, history, horizon, &relevant);
        let occupancy = self.project_sensed(now_abs, records, horizon, &relevant);

        let required = initial_resources as f64 * self.params.resource_percentage as f64 / 100.0;

        // Effective occupancy of each slot: union over its reservations
        let effective_occupancy = |opportunity: &SlotOpportunity| {
            let mut effective = vec![f64::NEG_INFINITY; total as usize];
            for i in 0..repetitions {
                if let Some(rsrp) = occupancy.get(&(opportunity.abs_slot + i * p_tx)) {
                    for (e, r) in effective.iter_mut().zip(rsrp) {
                        *e = e.max(*r);
                    }
                }
            }
            (*opportunity, effective)
        };

        let mut surviving: Vec<(SlotOpportunity, Vec<f64>)> = opportunities
            .iter()
            .filter(|o| {
                let hit = (0..repetitions).any(|i| own.contains(&(o.abs_slot + i * p_tx)));
                if hit {
                    trace!(slot = o.abs_slot, "Step 5: excluded by own transmission");
                }
                !hit
            })
            .map(&effective_occupancy)
            .collect();
        let remaining_resources = surviving.len() * (total / width) as usize;
        debug!(
            excluded = initial_slots - surviving.len(),
            remaining = surviving.len(),
            "Step 5: own transmission exclusion"
        );
        // Own-history exclusion may not shrink the set below the target share
        if (remaining_resources as f64) < required {
            debug!(
                remaining_resources,
                required, "Step 5: too few resources left, exclusion skipped"
            );
            surviving = opportunities.iter().map(&effective_occupancy).collect();
        }

        let mut threshold = self.params.rsrp_threshold_dbm;
        let free_masks = loop {
            let masks: Vec<Vec<bool>> = surviving
                .iter()
                .map(|(_, effective)| effective.iter().map(|r| *r <= threshold as f64).collect())
                .collect();
            let count: usize = masks.iter().map(|m| tile_count(m, width)).sum();
            if count as f64 >= required {
                debug!(threshold, count, required, "Step 7: enough resources");
                break masks;
            }
            threshold += RSRP_THRESHOLD_STEP_DB;
            report.escalations += 1;
            if threshold > self.params.max_rsrp_threshold_dbm {
                debug!(
                    threshold,
                    max = self.params.max_rsrp_threshold_dbm,
                    "Step 7: threshold saturated, no resources"
                );
                report.final_rsrp_threshold_dbm = threshold;
                return Ok(self.finish(Vec::new(), report));
            }
            debug!(threshold, count, required, "Step 7: raising RSRP threshold");
        };
        report.final_rsrp_threshold_dbm = threshold;

        let by_slot: BTreeMap<u64, &[bool]> = surviving
            .iter()
            .zip(&free_masks)
            .map(|((o, _), mask)| (o.abs_slot, mask.as_slice()))
            .collect();
        let candidates = self.emit(&opportunities, now.numerology(), width, |slot| {
            by_slot.get(&slot).copied()
        });
        Ok(self.finish(candidates, report))
    }

    fn finish(&self, candidates: Vec<CandidateResource>, mut report: SensingReport) -> CandidateSelection {
        let slots: BTreeSet<u64> = candidates.iter().map(|c| c.abs_slot()).collect();
        report.final_slots = slots.len();
        report.final_resources = candidates.len();
        debug!(
            final_slots = report.final_slots,
            final_resources = report.final_resources,
            threshold = report.final_rsrp_threshold_dbm,
            "Candidate selection done"
        );
        CandidateSelection { candidates, report }
    }

    fn emit<'m>(
        &self,
        opportunities: &[SlotOpportunity],
        numerology: u8,
        width: u16,
        free_mask: impl Fn(u64) -> Option<&'m [bool]>,
    ) -> Vec<CandidateResource> {
        let mut candidates = Vec::new();
        for opportunity in opportunities {
            let Some(mask) = free_mask(opportunity.abs_slot) else {
                continue;
            };
            for start in tiles(mask, width) {
                candidates.push(CandidateResource {
                    sfn: SfnSf::from_normalized(opportunity.abs_slot, numerology),
                    sb_ch_start: start,
                    sb_ch_length: width,
                    layout: opportunity.layout,
                });
            }
        }
        candidates
    }

    /// Step 5: slots where a periodic repetition of an own transmission lands
    fn project_own_history(
        &self,
        now: u64,
        history: &[TransmitHistoryEntry],
        horizon: u64,
        relevant: &HashSet<u64>,
    ) -> HashSet<u64> {
        let catalog = self.pool.reservation_periods_slots();
        let tproc0 = self.params.tproc0 as u64;
        let mut own = HashSet::new();
        for entry in history.iter().filter(|h| h.abs_slot() + tproc0 < now) {
            let periods = match entry.rsvp_ms {
                Some(0) => Vec::new(),
                Some(ms) => vec![self.pool.resv_period_in_slots(ms)],
                None => catalog.clone(),
            };
            for period in periods {
                let mut slot = entry.abs_slot() + period;
                while slot <= horizon {
                    if relevant.contains(&slot) {
                        own.insert(slot);
                    }
                    slot += period;
                }
            }
        }
        own
    }

    /// Step 6: projected sensed reservations as a per-subchannel RSRP map
    fn project_sensed(
        &self,
        now: u64,
        records: &[SensingRecord],
        horizon: u64,
        relevant: &HashSet<u64>,
    ) -> OccupancyMap {
        let total = self.pool.num_subchannels();
        let tproc0 = self.params.tproc0 as u64;
        let mut occupancy = OccupancyMap::new();
        let mut mark = |slot: u64, start: u16, length: u16, rsrp: f64| {
            if !relevant.contains(&slot) {
                return;
            }
            let end = (start as u32 + length as u32).min(total as u32) as u16;
            if start >= end {
                debug!(slot, start, length, total, "Sensed range outside the pool, ignored");
                return;
            }
            if start as u32 + length as u32 > total as u32 {
                debug!(slot, start, length, total, "Sensed range clipped to the pool");
            }
            let entry = occupancy
                .entry(slot)
                .or_insert_with(|| vec![f64::NEG_INFINITY; total as usize]);
            for value in &mut entry[start as usize..end as usize] {
                *value = value.max(rsrp);
            }
        };

        for record in records.iter().filter(|r| r.abs_slot() + tproc0 < now) {
            let period = self.pool.resv_period_in_slots(record.rsvp_ms);
            let mut slot = record.abs_slot();
            loop {
                mark(slot, record.sb_ch_start, record.sb_ch_length, record.rsrp_dbm);
                for retx in &record.retx {
                    mark(
                        slot + retx.gap_slots as u64,
                        retx.sb_ch_start,
                        record.sb_ch_length,
                        record.rsrp_dbm,
                    );
                }
                if period == 0 {
                    break;
                }
                slot += period;
                if slot > horizon {
                    break;
                }
            }
        }
        trace!(slots = occupancy.len(), "Step 6: projected occupancy");
        occupancy
    }
}
