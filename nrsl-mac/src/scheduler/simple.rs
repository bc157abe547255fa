//! Simple scheduler
//!
//! Picks the transmission slots uniformly at random among the candidate
//! slots and a random valid starting subchannel in each of them.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, trace};

use super::{allocate, slots_from_candidates, SchedulerParams, SidelinkScheduler, SlotAllocationPlan, SlotAvailability};
use crate::buffer::DestinationBuffer;
use crate::candidate::CandidateResource;
use crate::error::MacResult;

/// Uniform random slot and subchannel selection
#[derive(Debug)]
pub struct SimpleScheduler {
    params: SchedulerParams,
    rng: StdRng,
}

impl SimpleScheduler {
    /// Creates the scheduler with a seeded random stream
    pub fn new(params: SchedulerParams, seed: u64) -> Self {
        Self {
            params,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl SidelinkScheduler for SimpleScheduler {
    fn name(&self) -> &'static str {
        "simple"
    }

    fn compute_allocation(
        &mut self,
        candidates: &[CandidateResource],
        buffer: &DestinationBuffer,
    ) -> MacResult<Option<SlotAllocationPlan>> {
        let total = buffer.total_bytes();
        if total == 0 {
            trace!(dst = buffer.dst_l2_id(), "Nothing buffered");
            return Ok(None);
        }
        let slots = slots_from_candidates(candidates)?;
        if slots.is_empty() {
            debug!(dst = buffer.dst_l2_id(), "No candidate slot to schedule");
            return Ok(None);
        }

        let wanted = (self.params.max_tx_trans_num_pssch as usize).min(slots.len());
        let mut selected: Vec<&SlotAvailability> =
            slots.choose_multiple(&mut self.rng, wanted).collect();
        selected.sort_by_key(|s| s.sfn.normalize());

        Ok(allocate(&self.params, buffer, &selected, |starts| {
            starts.choose(&mut self.rng).copied()
        }))
    }
}
