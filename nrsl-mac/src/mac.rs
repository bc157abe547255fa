//! Per-UE sidelink MAC context
//!
//! Owns everything one UE needs for mode-2 resource selection: the pools,
//! the sensing store, the logical channel buffers and the outstanding
//! grants. It is driven one slot at a time and never shares mutable state
//! with other UEs.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use nrsl_common::{log_sidelink_event, ms_to_slots, Direction, SchedulerKind, SfnSf, SidelinkConfig};

use crate::buffer::{DestinationBuffer, LogicalChannelConfig};
use crate::candidate::{CandidateResource, SensingAlgorithm, SensingParams, TransmissionRequirement};
use crate::error::{MacError, MacResult};
use crate::pool::{PoolRegistry, ResourcePool};
use crate::scheduler::{
    assign_pdus, FirstFitScheduler, RlcPduInfo, SchedulerParams, SidelinkScheduler,
    SimpleScheduler, SlotAllocation, SlotAllocationPlan,
};
use crate::sensing::{SensingRecord, SensingStore, TransmitHistoryEntry};
use crate::trace::SensingObserver;

/// Reservations per reselection counter step
const CRESEL_PER_COUNTER: u16 = 10;

/// Range of the random reselection counter for a reservation period
/// (TS 38.321 5.22.1.1).
pub fn reselection_counter_range(rsvp_ms: u16) -> (u16, u16) {
    if rsvp_ms >= 100 {
        (5, 15)
    } else {
        let factor = 100u16.div_ceil(rsvp_ms.max(20));
        (5 * factor, 15 * factor)
    }
}

/// What happened in one slot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotTick {
    /// Plans granted in this slot
    pub new_grants: Vec<SlotAllocationPlan>,
    /// Later periods of semi-persistent grants that took buffered data
    pub published: Vec<SlotAllocationPlan>,
    /// Destinations with data but no resource
    pub unschedulable: Vec<u32>,
    /// Transmissions due in this slot
    pub transmissions: Vec<SlotAllocation>,
}

/// Semi-persistent grant towards one destination.
///
/// The selected resources repeat every reservation period while the
/// reselection counter lasts. Each period is published `T1` slots ahead
/// of its first transmission and carries whatever is buffered then.
#[derive(Debug, Clone, PartialEq)]
pub struct SpsGrant {
    /// Transmissions of the current period
    pub plan: SlotAllocationPlan,
    /// Reservation period in slots, 0 for a one-shot grant
    pub period_slots: u64,
    /// Periods left before the resources are reselected
    pub resel_counter: u16,
    /// Counter drawn at selection, restored when the resources are kept
    pub initial_resel_counter: u16,
    /// Periodic reservations left
    pub c_resel: u16,
    published: bool,
}

impl SpsGrant {
    /// Wraps a freshly selected plan, first period not yet published
    pub fn new(plan: SlotAllocationPlan, period_slots: u64, resel_counter: u16, c_resel: u16) -> Self {
        Self {
            plan,
            period_slots,
            resel_counter,
            initial_resel_counter: resel_counter,
            c_resel,
            published: false,
        }
    }

    /// Whether the current period has taken its data
    pub fn is_published(&self) -> bool {
        self.published
    }

    /// Fills the current period and counts it against both counters
    pub fn publish(&mut self, pdus: &[RlcPduInfo]) {
        self.plan.set_pdus(pdus);
        self.resel_counter = self.resel_counter.saturating_sub(1);
        self.c_resel = self.c_resel.saturating_sub(1);
        self.published = true;
    }

    /// Whether every transmission of the current period is at or before `now_abs`
    pub fn period_done(&self, now_abs: u64) -> bool {
        self.plan.last_slot().map_or(true, |last| last <= now_abs)
    }

    /// Moves to the next period.
    ///
    /// Once the reselection counter is spent, `keep` decides whether the
    /// same resources are kept for another round. Returns false when the
    /// grant has to be released.
    pub fn advance(&mut self, keep: impl FnOnce() -> bool) -> bool {
        if self.period_slots == 0 {
            return false;
        }
        if self.resel_counter == 0 {
            if self.c_resel == 0 || !keep() {
                return false;
            }
            self.resel_counter = self.initial_resel_counter;
        }
        self.plan.shift(self.period_slots);
        self.plan.set_pdus(&[]);
        self.published = false;
        true
    }
}

/// Sidelink MAC of one UE
pub struct SidelinkUeMac {
    numerology: u8,
    pools: PoolRegistry,
    active_pool: u16,
    sensing: SensingParams,
    t1: u16,
    t2: u16,
    scheduler_params: SchedulerParams,
    prob_resource_keep: f64,
    store: SensingStore,
    buffers: BTreeMap<u32, DestinationBuffer>,
    grants: BTreeMap<u32, SpsGrant>,
    scheduler: Box<dyn SidelinkScheduler>,
    observer: Option<Box<dyn SensingObserver>>,
    rng: StdRng,
}

impl std::fmt::Debug for SidelinkUeMac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SidelinkUeMac")
            .field("active_pool", &self.active_pool)
            .field("scheduler", &self.scheduler.name())
            .field("records", &self.store.records().len())
            .field("grants", &self.grants.len())
            .finish()
    }
}

impl SidelinkUeMac {
    /// Builds the MAC from a validated configuration.
    ///
    /// Pool and reservation period errors surface here, before any slot
    /// is processed.
    pub fn from_config(config: &SidelinkConfig) -> MacResult<Self> {
        config.validate()?;
        let pools = PoolRegistry::from_configs(&config.pools, config.numerology)?;
        let pool = pools.get(config.active_pool)?;
        let params = SchedulerParams::new(
            config.scheduler.mcs,
            config.scheduler.max_tx_trans_num_pssch,
            pool.max_num_per_reserve(),
        )?;
        let scheduler: Box<dyn SidelinkScheduler> = match config.scheduler.kind {
            SchedulerKind::Simple => Box::new(SimpleScheduler::new(params, config.scheduler.seed)),
            SchedulerKind::FirstFit => Box::new(FirstFitScheduler::new(params)),
        };
        let t2 = config
            .t2()
            .ok_or(MacError::UnknownPool {
                pool_id: config.active_pool,
            })?;

        info!(
            pool = config.active_pool,
            scheduler = scheduler.name(),
            sensing = config.sensing.enable_sensing,
            "Sidelink MAC configured"
        );
        Ok(Self {
            numerology: config.numerology,
            active_pool: config.active_pool,
            sensing: SensingParams::from(&config.sensing),
            t1: config.sensing.t1,
            t2,
            scheduler_params: params,
            prob_resource_keep: config.scheduler.prob_resource_keep,
            pools,
            store: SensingStore::new(),
            buffers: BTreeMap::new(),
            grants: BTreeMap::new(),
            scheduler,
            observer: None,
            rng: StdRng::seed_from_u64(config.scheduler.seed.wrapping_add(1)),
        })
    }

    /// Replaces the scheduler
    pub fn with_scheduler(mut self, scheduler: Box<dyn SidelinkScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Installs an observer for sensing reports
    pub fn set_observer(&mut self, observer: Box<dyn SensingObserver>) {
        self.observer = Some(observer);
    }

    /// Active transmit pool
    pub fn active_pool(&self) -> MacResult<&ResourcePool> {
        self.pools.get(self.active_pool)
    }

    /// Pool registry
    pub fn pools(&self) -> &PoolRegistry {
        &self.pools
    }

    /// Sensing store
    pub fn store(&self) -> &SensingStore {
        &self.store
    }

    /// Current period of the grant towards a destination
    pub fn grant(&self, dst_l2_id: u32) -> Option<&SlotAllocationPlan> {
        self.grants.get(&dst_l2_id).map(|grant| &grant.plan)
    }

    /// Semi-persistent grant towards a destination
    pub fn sps_grant(&self, dst_l2_id: u32) -> Option<&SpsGrant> {
        self.grants.get(&dst_l2_id)
    }

    /// Buffer state of a destination
    pub fn buffer(&self, dst_l2_id: u32) -> Option<&DestinationBuffer> {
        self.buffers.get(&dst_l2_id)
    }

    /// Stores a sensed SCI
    pub fn receive_sensing_data(&mut self, record: SensingRecord) {
        log_sidelink_event(
            Direction::Rx,
            "SCI-1A",
            record.abs_slot(),
            record.sb_ch_start,
            record.sb_ch_length,
        );
        self.store.add_sensing_record(record);
    }

    /// Records a slot this UE transmitted in
    pub fn record_own_transmission(&mut self, sfn: SfnSf, rsvp_ms: Option<u16>) {
        self.store
            .record_own_transmission(TransmitHistoryEntry { sfn, rsvp_ms });
    }

    /// Adds or updates a logical channel towards a destination
    pub fn configure_logical_channel(&mut self, dst_l2_id: u32, config: LogicalChannelConfig) {
        debug!(dst = dst_l2_id, lc_id = config.lc_id, priority = config.priority, "Configured logical channel");
        self.buffers
            .entry(dst_l2_id)
            .or_insert_with(|| DestinationBuffer::new(dst_l2_id))
            .configure(config);
    }

    /// Sets the RLC queue size of a logical channel
    pub fn report_buffer_status(&mut self, dst_l2_id: u32, lc_id: u8, bytes: u32) -> MacResult<()> {
        self.buffers
            .get_mut(&dst_l2_id)
            .ok_or(MacError::UnknownLogicalChannel { dst_l2_id, lc_id })?
            .report(lc_id, bytes)
    }

    /// Ages the sensing store and runs the sensing algorithm.
    pub fn candidate_resources(
        &mut self,
        now: SfnSf,
        requirement: &TransmissionRequirement,
    ) -> MacResult<Vec<CandidateResource>> {
        let pool = self.pools.get(self.active_pool)?;
        self.store.trim(now.normalize(), pool.sensing_window_slots());
        let selection = SensingAlgorithm::new(pool, self.sensing).select(
            now,
            requirement,
            self.store.records(),
            self.store.history(),
        )?;
        if let Some(observer) = self.observer.as_mut() {
            observer.on_sensing_report(&selection.report);
        }
        Ok(selection.candidates)
    }

    /// Candidates minus the slots already used by outstanding grants
    pub fn available_resources(
        &mut self,
        now: SfnSf,
        requirement: &TransmissionRequirement,
    ) -> MacResult<Vec<CandidateResource>> {
        let mut candidates = self.candidate_resources(now, requirement)?;
        let busy: Vec<u64> = self
            .grants
            .values()
            .flat_map(|grant| grant.plan.allocations.iter().map(SlotAllocation::abs_slot))
            .collect();
        candidates.retain(|c| !busy.contains(&c.abs_slot()));
        Ok(candidates)
    }

    /// Smallest width whose TB carries the buffered bytes, capped at the
    /// pool width.
    ///
    /// Sized on the fewest PSSCH symbols of any slot in the window, since a
    /// PSFCH slot may end up in the plan.
    fn required_subchannels(&self, pool: &ResourcePool, now_abs: u64, t2: u16, bytes: u32) -> u16 {
        let layout = pool.layout();
        let symbols = pool
            .opportunities(now_abs, self.t1 as u64, t2 as u64)
            .iter()
            .map(|o| o.layout.pssch_symbols)
            .min()
            .unwrap_or(layout.pssch_symbols);
        let amc = &self.scheduler_params.amc;
        (1..=pool.num_subchannels())
            .find(|n| {
                amc.tb_size(layout.subchannel_size_rbs, *n, symbols)
                    >= bytes + crate::scheduler::SL_MAC_OVERHEAD_BYTES
            })
            .unwrap_or(pool.num_subchannels())
    }

    /// Builds the transmission requirement for a destination's buffer,
    /// together with the reselection counter drawn for it
    fn requirement(
        &mut self,
        now: SfnSf,
        buffer: &DestinationBuffer,
    ) -> MacResult<Option<(TransmissionRequirement, u16)>> {
        let Some(head) = buffer.highest_priority() else {
            return Ok(None);
        };
        let pool = self.pools.get(self.active_pool)?;
        let pdb_ms = buffer.min_pdb_ms().unwrap_or(head.config.pdb_ms);
        let pdb_slots = ms_to_slots(pdb_ms as u64, self.numerology);
        let t2 = (self.t2 as u64).min(pdb_slots).max(self.t1 as u64) as u16;
        let sb_ch_length = self.required_subchannels(pool, now.normalize(), t2, buffer.total_bytes());
        let rsvp_ms = head.config.rsvp_ms;
        let (resel_counter, c_resel) = if rsvp_ms == 0 {
            (1, 1)
        } else {
            let (min, max) = reselection_counter_range(rsvp_ms);
            let counter = self.rng.gen_range(min..=max);
            (counter, counter * CRESEL_PER_COUNTER)
        };
        let requirement = TransmissionRequirement {
            priority: head.config.priority,
            pdb_ms,
            sb_ch_length,
            rsvp_ms,
            c_resel,
            t1: self.t1,
            t2,
        };
        Ok(Some((requirement, resel_counter)))
    }

    /// Selects resources and builds a grant for a destination.
    ///
    /// Returns `None` when nothing is buffered, a grant is still pending, or
    /// no candidate survived. The caller retries on a later slot.
    pub fn schedule(&mut self, now: SfnSf, dst_l2_id: u32) -> MacResult<Option<SlotAllocationPlan>> {
        if self.grants.contains_key(&dst_l2_id) {
            return Ok(None);
        }
        let Some(buffer) = self.buffers.get(&dst_l2_id).cloned() else {
            return Ok(None);
        };
        let Some((requirement, resel_counter)) = self.requirement(now, &buffer)? else {
            return Ok(None);
        };

        let candidates = self.available_resources(now, &requirement)?;
        if candidates.is_empty() {
            warn!(dst = dst_l2_id, now = now.normalize(), "No sidelink resource available");
            return Ok(None);
        }
        let Some(plan) = self.scheduler.compute_allocation(&candidates, &buffer)? else {
            return Ok(None);
        };

        if let Some(buffer) = self.buffers.get_mut(&dst_l2_id) {
            for pdu in plan.pdus() {
                buffer.consume(pdu.lc_id, pdu.size);
            }
        }
        info!(
            dst = dst_l2_id,
            slots = plan.allocations.len(),
            first = plan.first_slot(),
            sb_ch_length = plan.sb_ch_length,
            tb_size = plan.tb_size,
            resel_counter,
            "New sidelink grant"
        );
        let period_slots = ms_to_slots(requirement.rsvp_ms as u64, self.numerology);
        let mut grant = SpsGrant::new(plan.clone(), period_slots, resel_counter, requirement.c_resel);
        grant.publish(plan.pdus());
        self.grants.insert(dst_l2_id, grant);
        Ok(Some(plan))
    }

    /// Destinations holding buffered data
    pub fn pending_destinations(&self) -> Vec<u32> {
        self.buffers
            .values()
            .filter(|b| b.total_bytes() > 0)
            .map(DestinationBuffer::dst_l2_id)
            .collect()
    }

    /// Publishes the grant periods starting within `T1` slots of `now`.
    ///
    /// A period takes what its destination has buffered at that moment. A
    /// period with nothing to send stays silent but still counts towards
    /// reselection. Returns the periods that took data.
    pub fn publish_due(&mut self, now: SfnSf) -> Vec<SlotAllocationPlan> {
        let horizon = now.normalize() + self.t1 as u64;
        let mut published = Vec::new();
        for (dst, grant) in self.grants.iter_mut() {
            if grant.is_published() || grant.plan.first_slot().map_or(true, |first| first > horizon) {
                continue;
            }
            let pdus = match self.buffers.get_mut(dst) {
                Some(buffer) if buffer.total_bytes() > 0 => {
                    let pdus = assign_pdus(buffer, grant.plan.tb_size);
                    for pdu in &pdus {
                        buffer.consume(pdu.lc_id, pdu.size);
                    }
                    pdus
                }
                _ => Vec::new(),
            };
            grant.publish(&pdus);
            debug!(
                dst = *dst,
                first = grant.plan.first_slot(),
                resel_counter = grant.resel_counter,
                bytes = pdus.iter().map(|p| p.size).sum::<u32>(),
                "Published grant period"
            );
            if !pdus.is_empty() {
                published.push(grant.plan.clone());
            }
        }
        published
    }

    /// Returns the transmissions due in `now` and records them as own
    /// transmissions. Grants whose period is over move to the next period
    /// or are released once their reselection counter is spent.
    pub fn slot_indication(&mut self, now: SfnSf) -> Vec<SlotAllocation> {
        self.publish_due(now);
        let now_abs = now.normalize();
        let due: Vec<SlotAllocation> = self
            .grants
            .values()
            .flat_map(|grant| grant.plan.allocations.iter())
            .filter(|a| a.abs_slot() == now_abs && !a.pdus.is_empty())
            .cloned()
            .collect();
        for allocation in &due {
            log_sidelink_event(
                Direction::Tx,
                "PSSCH",
                now_abs,
                allocation.sb_ch_start,
                allocation.sb_ch_length,
            );
            self.record_own_transmission(allocation.sfn, Some(allocation.rsvp_ms));
        }

        let prob_resource_keep = self.prob_resource_keep;
        let rng = &mut self.rng;
        self.grants.retain(|dst, grant| {
            if !grant.period_done(now_abs) {
                return true;
            }
            let kept = grant.advance(|| rng.gen::<f64>() < prob_resource_keep);
            if kept {
                debug!(dst = *dst, next = grant.plan.first_slot(), "Grant moved to next period");
            } else {
                info!(dst = *dst, "Sidelink grant released");
            }
            kept
        });
        due
    }

    /// Publishes due grant periods, schedules every destination with data
    /// and no grant, then serves the slot.
    pub fn tick(&mut self, now: SfnSf) -> MacResult<SlotTick> {
        let mut tick = SlotTick {
            published: self.publish_due(now),
            ..Default::default()
        };
        for dst in self.pending_destinations() {
            if self.grants.contains_key(&dst) {
                continue;
            }
            match self.schedule(now, dst)? {
                Some(plan) => tick.new_grants.push(plan),
                None => tick.unschedulable.push(dst),
            }
        }
        tick.transmissions = self.slot_indication(now);
        Ok(tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::CollectingObserver;
    use nrsl_common::SchedulerConfig;

    fn config(kind: SchedulerKind) -> SidelinkConfig {
        SidelinkConfig {
            scheduler: SchedulerConfig {
                kind,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn lc() -> LogicalChannelConfig {
        LogicalChannelConfig {
            lc_id: 4,
            lcg_id: 0,
            priority: 1,
            pdb_ms: 20,
            rsvp_ms: 100,
        }
    }

    #[test]
    fn test_reselection_counter_range() {
        assert_eq!(reselection_counter_range(100), (5, 15));
        assert_eq!(reselection_counter_range(1000), (5, 15));
        assert_eq!(reselection_counter_range(50), (10, 30));
        assert_eq!(reselection_counter_range(20), (25, 75));
        assert_eq!(reselection_counter_range(10), (25, 75));
    }

    #[test]
    fn test_misaligned_period_fails_at_configuration() {
        let mut config = SidelinkConfig::default();
        config.pools[0].reservation_periods_ms = vec![0, 3];
        assert!(matches!(
            SidelinkUeMac::from_config(&config),
            Err(MacError::InvalidReservationPeriod { .. })
        ));
    }

    #[test]
    fn test_unknown_channel_report_rejected() {
        let mut mac = SidelinkUeMac::from_config(&SidelinkConfig::default()).unwrap();
        assert!(mac.report_buffer_status(255, 4, 10).is_err());
    }

    #[test]
    fn test_schedule_without_data_is_no_op() {
        let mut mac = SidelinkUeMac::from_config(&SidelinkConfig::default()).unwrap();
        mac.configure_logical_channel(255, lc());
        let now = SfnSf::new(211, 0, 0, 2);
        assert!(mac.schedule(now, 255).unwrap().is_none());
        assert!(mac.pending_destinations().is_empty());
    }

    #[test]
    fn test_grant_lifecycle() {
        let mut mac = SidelinkUeMac::from_config(&config(SchedulerKind::FirstFit)).unwrap();
        let observer = CollectingObserver::new();
        mac.set_observer(Box::new(observer.clone()));
        mac.configure_logical_channel(255, lc());
        mac.report_buffer_status(255, 4, 200).unwrap();

        let mut now = SfnSf::new(211, 0, 0, 2);
        let tick = mac.tick(now).unwrap();
        assert_eq!(tick.new_grants.len(), 1);
        assert_eq!(observer.reports().len(), 1);
        assert_eq!(mac.buffer(255).unwrap().total_bytes(), 0);

        let plan = tick.new_grants[0].clone();
        // PDB of 20 ms caps T2 at 80 slots, the configured 33 stays
        assert!(plan.first_slot().unwrap() >= now.normalize() + 2);
        assert!(plan.last_slot().unwrap() <= now.normalize() + 33);

        // Only the first period has data, later ones stay silent until the
        // reselection counter runs out
        let mut sent = 0;
        let mut periods = 1;
        let mut first = plan.first_slot();
        for _ in 0..16 * 400 {
            now.add(1);
            sent += mac.slot_indication(now).len();
            match mac.grant(255) {
                Some(current) if current.first_slot() != first => {
                    assert_eq!(current.first_slot(), first.map(|f| f + 400));
                    first = current.first_slot();
                    periods += 1;
                }
                Some(_) => {}
                None => break,
            }
        }
        assert!(mac.grant(255).is_none());
        assert!((5..=15).contains(&periods));
        assert_eq!(sent, plan.allocations.len());
        assert_eq!(mac.store().history().len(), sent);
        assert!(mac
            .store()
            .history()
            .iter()
            .all(|h| h.rsvp_ms == Some(100)));
    }

    #[test]
    fn test_next_period_reuses_grant() {
        let mut mac = SidelinkUeMac::from_config(&config(SchedulerKind::FirstFit)).unwrap();
        mac.configure_logical_channel(255, lc());
        mac.report_buffer_status(255, 4, 200).unwrap();

        let mut now = SfnSf::new(211, 0, 0, 2);
        let plan = mac.tick(now).unwrap().new_grants.remove(0);
        let counter = mac.sps_grant(255).unwrap().resel_counter;
        assert_eq!(counter + 1, mac.sps_grant(255).unwrap().initial_resel_counter);

        let mut sent = Vec::new();
        let mut published = Vec::new();
        for offset in 1..440 {
            now.add(1);
            if offset == 400 {
                mac.report_buffer_status(255, 4, 200).unwrap();
            }
            let tick = mac.tick(now).unwrap();
            assert!(tick.new_grants.is_empty());
            published.extend(tick.published);
            sent.extend(tick.transmissions.iter().map(SlotAllocation::abs_slot));
        }

        let first_period: Vec<u64> = plan.allocations.iter().map(SlotAllocation::abs_slot).collect();
        let second_period: Vec<u64> = first_period.iter().map(|s| s + 400).collect();
        assert_eq!(published.len(), 1);
        assert_eq!(
            published[0].allocations.iter().map(SlotAllocation::abs_slot).collect::<Vec<_>>(),
            second_period
        );
        assert_eq!(published[0].pdus(), plan.pdus());
        assert_eq!(sent, [first_period, second_period].concat());
        assert_eq!(mac.sps_grant(255).unwrap().resel_counter, counter - 1);
    }

    #[test]
    fn test_spent_grant_kept_or_released() {
        let plan = SlotAllocationPlan {
            dst_l2_id: 255,
            priority: 1,
            tb_size: 100,
            sb_ch_length: 1,
            rsvp_ms: 100,
            allocations: Vec::new(),
        };

        let mut grant = SpsGrant::new(plan.clone(), 400, 1, 2);
        grant.publish(&[]);
        assert_eq!((grant.resel_counter, grant.c_resel), (0, 1));
        assert!(grant.advance(|| true));
        assert_eq!(grant.resel_counter, 1);
        assert!(!grant.is_published());
        grant.publish(&[]);
        // No reservation left, kept or not
        assert!(!grant.advance(|| true));

        let mut grant = SpsGrant::new(plan.clone(), 400, 1, 10);
        grant.publish(&[]);
        assert!(!grant.advance(|| false));

        let mut one_shot = SpsGrant::new(plan, 0, 1, 1);
        one_shot.publish(&[]);
        assert!(!one_shot.advance(|| true));
    }

    #[test]
    fn test_grant_kept_with_certain_keep_probability() {
        let mut config = config(SchedulerKind::FirstFit);
        config.scheduler.prob_resource_keep = 1.0;
        let mut mac = SidelinkUeMac::from_config(&config).unwrap();
        mac.configure_logical_channel(255, lc());
        mac.report_buffer_status(255, 4, 200).unwrap();

        let mut now = SfnSf::new(211, 0, 0, 2);
        mac.tick(now).unwrap();
        let initial = mac.sps_grant(255).unwrap().initial_resel_counter as u64;
        // One period past the first reselection point
        for _ in 0..(initial + 1) * 400 {
            now.add(1);
            assert!(mac.tick(now).unwrap().new_grants.is_empty());
        }
        let grant = mac.sps_grant(255).unwrap();
        assert!(grant.c_resel > 0);
        assert!(grant.resel_counter > 0);
    }

    #[test]
    fn test_second_schedule_waits_for_grant() {
        let mut mac = SidelinkUeMac::from_config(&SidelinkConfig::default()).unwrap();
        mac.configure_logical_channel(255, lc());
        mac.report_buffer_status(255, 4, 200).unwrap();
        let now = SfnSf::new(211, 0, 0, 2);
        assert!(mac.schedule(now, 255).unwrap().is_some());
        mac.report_buffer_status(255, 4, 100).unwrap();
        assert!(mac.schedule(now, 255).unwrap().is_none());
    }

    #[test]
    fn test_width_follows_buffer() {
        let mut mac = SidelinkUeMac::from_config(&config(SchedulerKind::FirstFit)).unwrap();
        mac.configure_logical_channel(255, lc());
        mac.report_buffer_status(255, 4, 2500).unwrap();
        let plan = mac
            .schedule(SfnSf::new(211, 0, 0, 2), 255)
            .unwrap()
            .unwrap();
        assert_eq!(plan.sb_ch_length, 2);
    }

    #[test]
    fn test_width_sized_on_psfch_slots() {
        let amc = crate::amc::Amc::new(14).unwrap();
        let full = amc.tb_size(50, 1, 11);
        let reduced = amc.tb_size(50, 1, 8);
        assert!(reduced < full);
        // Fits one subchannel of a plain slot, not of a PSFCH slot
        let bytes = reduced - crate::scheduler::SL_MAC_OVERHEAD_BYTES + 1;

        let now = SfnSf::new(211, 0, 0, 2);
        let mut plain = SidelinkUeMac::from_config(&config(SchedulerKind::FirstFit)).unwrap();
        plain.configure_logical_channel(255, lc());
        plain.report_buffer_status(255, 4, bytes).unwrap();
        let buffer = plain.buffer(255).unwrap().clone();
        let (req, _) = plain.requirement(now, &buffer).unwrap().unwrap();
        assert_eq!(req.sb_ch_length, 1);

        let mut config = config(SchedulerKind::FirstFit);
        config.pools[0].psfch_period = 1;
        let mut with_psfch = SidelinkUeMac::from_config(&config).unwrap();
        with_psfch.configure_logical_channel(255, lc());
        with_psfch.report_buffer_status(255, 4, bytes).unwrap();
        let (req, _) = with_psfch.requirement(now, &buffer).unwrap().unwrap();
        assert_eq!(req.sb_ch_length, 2);
    }
}
