//! Test fixtures and configuration helpers
//!
//! The reference pool is two 50-RB subchannels at numerology 2 with bitmap
//! `111111000111` over TDD `DDDFUUUUUU`, which gives a 20-slot physical pool
//! with SL slots at offsets 4..=9 and 17..=19. Selection is triggered at
//! frame 211, i.e. absolute slot 8440.

use nrsl_common::{SchedulerKind, SfnSf, SidelinkConfig};
use nrsl_mac::{LogicalChannelConfig, ResourcePool, SensingRecord, TransmissionRequirement};

/// Numerology of every fixture
pub const REFERENCE_NUMEROLOGY: u8 = 2;

/// Destination used by MAC scenarios
pub const TEST_DST: u32 = 255;

/// Default configuration with the chosen scheduler
pub fn reference_config(kind: SchedulerKind) -> SidelinkConfig {
    let mut config = SidelinkConfig::default();
    config.scheduler.kind = kind;
    config
}

/// The reference resource pool
pub fn reference_pool() -> ResourcePool {
    let config = SidelinkConfig::default();
    ResourcePool::from_config(&config.pools[0], REFERENCE_NUMEROLOGY)
        .expect("reference pool is valid")
}

/// Slot at which resource selection is triggered
pub fn reference_now() -> SfnSf {
    SfnSf::new(211, 0, 0, REFERENCE_NUMEROLOGY)
}

/// Requirement of `width` subchannels, 100 ms period and 5 reservations
pub fn requirement(width: u16) -> TransmissionRequirement {
    TransmissionRequirement {
        priority: 1,
        pdb_ms: 20,
        sb_ch_length: width,
        rsvp_ms: 100,
        c_resel: 5,
        t1: 2,
        t2: 33,
    }
}

/// Logical channel 4 with a 100 ms reservation period
pub fn lc_config() -> LogicalChannelConfig {
    LogicalChannelConfig {
        lc_id: 4,
        lcg_id: 0,
        priority: 1,
        pdb_ms: 20,
        rsvp_ms: 100,
    }
}

/// A 100 ms periodic neighbour on subchannel 0 at -126 dBm, sensed in every
/// slot of the window preceding [`reference_now`].
pub fn partial_occupancy_records() -> Vec<SensingRecord> {
    (8040u64..8440)
        .map(|abs| {
            SensingRecord::new(
                SfnSf::from_normalized(abs, REFERENCE_NUMEROLOGY),
                100,
                0,
                1,
                1,
                -126.0,
            )
        })
        .collect()
}
