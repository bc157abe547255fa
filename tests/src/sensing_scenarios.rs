//! Sensing-based candidate generation against the reference pool
//!
//! These scenarios drive the full pool -> store -> algorithm chain with
//! sensed traffic around absolute slot 8440 and check which resources
//! survive exclusion.

use integration_tests::{
    init_test_logging, partial_occupancy_records, reference_now, reference_pool, requirement,
    REFERENCE_NUMEROLOGY,
};
use nrsl_common::SfnSf;
use nrsl_mac::{
    remove_old_sensing_data, SensingAlgorithm, SensingParams, SensingRecord, SensingStore,
    TransmitHistoryEntry,
};

fn at(abs: u64) -> SfnSf {
    SfnSf::from_normalized(abs, REFERENCE_NUMEROLOGY)
}

const WINDOW_SLOTS: [u64; 15] = [
    8444, 8445, 8446, 8447, 8448, 8449, 8457, 8458, 8459, 8464, 8465, 8466, 8467, 8468, 8469,
];

#[test]
fn test_selection_window_on_reference_pool() {
    init_test_logging();
    let pool = reference_pool();
    let slots: Vec<u64> = pool
        .opportunities(reference_now().normalize(), 2, 33)
        .iter()
        .map(|o| o.abs_slot)
        .collect();
    assert_eq!(slots, WINDOW_SLOTS);
}

#[test]
fn test_partial_occupancy_single_subchannel() {
    init_test_logging();
    let pool = reference_pool();
    let mut store = SensingStore::new();
    for record in partial_occupancy_records() {
        store.add_sensing_record(record);
    }
    store.trim(reference_now().normalize(), pool.sensing_window_slots());

    let selection = SensingAlgorithm::new(&pool, SensingParams::default())
        .select(reference_now(), &requirement(1), store.records(), store.history())
        .unwrap();

    // Subchannel 0 is reserved at -126 dBm in every window slot
    assert_eq!(selection.candidates.len(), 15);
    assert!(selection.candidates.iter().all(|c| c.sb_ch_start == 1));
    assert_eq!(selection.report.final_rsrp_threshold_dbm, -128);
    assert_eq!(selection.report.escalations, 0);
}

#[test]
fn test_partial_occupancy_full_width_needs_escalation() {
    init_test_logging();
    let pool = reference_pool();
    let records = partial_occupancy_records();

    let selection = SensingAlgorithm::new(&pool, SensingParams::default())
        .select(reference_now(), &requirement(2), &records, &[])
        .unwrap();

    assert_eq!(selection.candidates.len(), 15);
    assert!(selection
        .candidates
        .iter()
        .all(|c| c.sb_ch_start == 0 && c.sb_ch_length == 2));
    assert_eq!(selection.report.final_rsrp_threshold_dbm, -125);
    assert_eq!(selection.report.escalations, 1);
    assert!(selection.report.sensing_applied);
}

#[test]
fn test_two_sensed_slots_exclude_their_repetitions() {
    init_test_logging();
    let pool = reference_pool();
    let records = vec![
        SensingRecord::new(at(8045), 100, 0, 1, 1, -126.0),
        SensingRecord::new(at(8046), 100, 0, 1, 1, -126.0),
    ];

    let selection = SensingAlgorithm::new(&pool, SensingParams::default())
        .select(reference_now(), &requirement(2), &records, &[])
        .unwrap();

    let slots: Vec<u64> = selection.candidates.iter().map(|c| c.abs_slot()).collect();
    assert_eq!(slots.len(), 13);
    assert!(!slots.contains(&8445));
    assert!(!slots.contains(&8446));
    assert_eq!(selection.report.initial_resources, 15);
    assert_eq!(selection.report.final_slots, 13);
}

#[test]
fn test_own_transmission_excludes_whole_slot() {
    init_test_logging();
    let pool = reference_pool();
    let history = vec![TransmitHistoryEntry {
        sfn: at(8045),
        rsvp_ms: None,
    }];

    let selection = SensingAlgorithm::new(&pool, SensingParams::default())
        .select(reference_now(), &requirement(1), &[], &history)
        .unwrap();

    assert_eq!(selection.candidates.len(), 28);
    assert!(selection.candidates.iter().all(|c| c.abs_slot() != 8445));
}

#[test]
fn test_own_transmission_with_period_excludes_slot_at_any_width() {
    init_test_logging();
    let pool = reference_pool();
    let history = vec![TransmitHistoryEntry {
        sfn: at(8045),
        rsvp_ms: Some(100),
    }];
    let algorithm = SensingAlgorithm::new(&pool, SensingParams::default());

    let narrow = algorithm
        .select(reference_now(), &requirement(1), &[], &history)
        .unwrap();
    assert_eq!(narrow.candidates.len(), 28);
    assert!(narrow.candidates.iter().all(|c| c.abs_slot() != 8445));

    let wide = algorithm
        .select(reference_now(), &requirement(2), &[], &history)
        .unwrap();
    assert_eq!(wide.candidates.len(), 14);
    assert!(wide.candidates.iter().all(|c| c.abs_slot() != 8445));
    assert_eq!(wide.report.final_slots, 14);
}

#[test]
fn test_own_transmissions_in_every_slot_leave_window_intact() {
    init_test_logging();
    let pool = reference_pool();
    let history: Vec<TransmitHistoryEntry> = WINDOW_SLOTS
        .iter()
        .map(|abs| TransmitHistoryEntry {
            sfn: at(abs - 400),
            rsvp_ms: Some(100),
        })
        .collect();

    let selection = SensingAlgorithm::new(&pool, SensingParams::default())
        .select(reference_now(), &requirement(1), &[], &history)
        .unwrap();

    // Excluding every slot would leave nothing, so the exclusion is dropped
    assert_eq!(selection.candidates.len(), 30);
    assert_eq!(selection.report.final_slots, 15);
    assert_eq!(selection.report.escalations, 0);
}

#[test]
fn test_sensing_window_boundary() {
    let mut records: Vec<SensingRecord> = [8019u64, 8020, 8119]
        .iter()
        .map(|abs| SensingRecord::new(at(*abs), 100, 0, 1, 1, -100.0))
        .collect();

    let removed = remove_old_sensing_data(8120, 100, &mut records);
    assert_eq!(removed, 1);
    let kept: Vec<u64> = records.iter().map(SensingRecord::abs_slot).collect();
    assert_eq!(kept, vec![8020, 8119]);
}

#[test]
fn test_candidate_layout_matches_pool() {
    let pool = reference_pool();
    let selection = SensingAlgorithm::new(&pool, SensingParams::default())
        .select(reference_now(), &requirement(1), &[], &[])
        .unwrap();

    assert_eq!(selection.candidates.len(), 30);
    for candidate in &selection.candidates {
        assert_eq!(candidate.layout, pool.slot_layout(candidate.abs_slot()));
        assert_eq!(candidate.layout.num_subchannels, 2);
        assert_eq!(candidate.layout.subchannel_size_rbs, 50);
    }
}

#[test]
fn test_repeated_selection_is_stable() {
    let pool = reference_pool();
    let records = partial_occupancy_records();
    let algorithm = SensingAlgorithm::new(&pool, SensingParams::default());

    let first = algorithm
        .select(reference_now(), &requirement(1), &records, &[])
        .unwrap();
    let second = algorithm
        .select(reference_now(), &requirement(1), &records, &[])
        .unwrap();
    assert_eq!(first.candidates, second.candidates);
    assert_eq!(first.report, second.report);
}

#[test]
fn test_pool_layout_lookup_is_idempotent() {
    let config = nrsl_common::SidelinkConfig::default();
    let registry = nrsl_mac::PoolRegistry::from_configs(&config.pools, REFERENCE_NUMEROLOGY).unwrap();

    let first = registry.layout(0).unwrap();
    let second = registry.layout(0).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.pssch_symbols, 11);
    assert!(registry.layout(7).is_err());
}
