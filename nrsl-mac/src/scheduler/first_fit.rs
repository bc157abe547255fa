//! First-fit scheduler
//!
//! Deterministic variant of the simple scheduler: the earliest candidate
//! slots are used, each at its lowest feasible starting subchannel.

use tracing::trace;

use super::{allocate, slots_from_candidates, SchedulerParams, SidelinkScheduler, SlotAllocationPlan, SlotAvailability};
use crate::buffer::DestinationBuffer;
use crate::candidate::CandidateResource;
use crate::error::MacResult;

/// Earliest slots, lowest subchannel
#[derive(Debug, Clone)]
pub struct FirstFitScheduler {
    params: SchedulerParams,
}

impl FirstFitScheduler {
    /// Creates the scheduler
    pub fn new(params: SchedulerParams) -> Self {
        Self { params }
    }
}

impl SidelinkScheduler for FirstFitScheduler {
    fn name(&self) -> &'static str {
        "first-fit"
    }

    fn compute_allocation(
        &mut self,
        candidates: &[CandidateResource],
        buffer: &DestinationBuffer,
    ) -> MacResult<Option<SlotAllocationPlan>> {
        if buffer.total_bytes() == 0 {
            trace!(dst = buffer.dst_l2_id(), "Nothing buffered");
            return Ok(None);
        }
        let slots = slots_from_candidates(candidates)?;
        let selected: Vec<&SlotAvailability> = slots
            .iter()
            .take(self.params.max_tx_trans_num_pssch as usize)
            .collect();
        if selected.is_empty() {
            return Ok(None);
        }
        Ok(allocate(&self.params, buffer, &selected, |starts| {
            starts.first().copied()
        }))
    }
}
