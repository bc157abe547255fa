//! UE MAC scenarios
//!
//! Exercise grants across reservation periods, the scheduler variants and
//! the async MAC task on the reference pool.

use integration_tests::{
    init_test_logging, lc_config, reference_config, reference_now, reference_pool, run_slots,
    TestResult, TEST_DST,
};
use nrsl_common::{ms_to_slots, SchedulerKind, SfnSf};
use nrsl_mac::{
    CandidateResource, DestinationBuffer, MacMessage, SchedulerParams, SidelinkMacTask,
    SidelinkScheduler, SidelinkUeMac, SimpleScheduler,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::oneshot;

fn first_fit_mac() -> SidelinkUeMac {
    let mut mac = SidelinkUeMac::from_config(&reference_config(SchedulerKind::FirstFit)).unwrap();
    mac.configure_logical_channel(TEST_DST, lc_config());
    mac
}

#[test]
fn test_first_fit_grant_on_empty_channel() {
    init_test_logging();
    let mut mac = first_fit_mac();
    mac.report_buffer_status(TEST_DST, 4, 300).unwrap();

    let plan = mac.schedule(reference_now(), TEST_DST).unwrap().unwrap();
    let slots: Vec<u64> = plan.allocations.iter().map(|a| a.abs_slot()).collect();
    assert_eq!(slots, vec![8444, 8445, 8446, 8447, 8448]);
    assert_eq!(plan.sb_ch_length, 1);
    assert_eq!(plan.tb_size, 1625);
    assert_eq!(plan.pdus().len(), 1);
    assert_eq!(plan.pdus()[0].size, 1625);

    let ndi: Vec<bool> = plan.allocations.iter().map(|a| a.ndi).collect();
    assert_eq!(ndi, vec![true, false, false, false, false]);
    let rv: Vec<u8> = plan.allocations.iter().map(|a| a.rv).collect();
    assert_eq!(rv, vec![0, 2, 3, 1, 0]);
    let sci: Vec<(bool, u8)> = plan
        .allocations
        .iter()
        .map(|a| (a.tx_sci1a, a.slot_num_ind))
        .collect();
    assert_eq!(
        sci,
        vec![(true, 3), (false, 0), (false, 0), (true, 2), (false, 0)]
    );
    assert!(plan.allocations.iter().all(|a| a.sb_ch_start == 0));
}

#[test]
fn test_sps_grant_reused_next_period() -> TestResult {
    init_test_logging();
    let mut mac = first_fit_mac();
    let start = reference_now();
    let period = ms_to_slots(100, 2);

    mac.report_buffer_status(TEST_DST, 4, 300)?;
    let ticks = run_slots(&mut mac, start, period)?;
    let sent: usize = ticks.iter().map(|t| t.transmissions.len()).sum();
    assert_eq!(sent, 5);
    assert_eq!(mac.store().history().len(), 5);
    assert_eq!(ticks.iter().map(|t| t.new_grants.len()).sum::<usize>(), 1);

    // Same traffic one period later goes out on the reserved resources
    mac.report_buffer_status(TEST_DST, 4, 300)?;
    let ticks = run_slots(&mut mac, start.future(period), 40)?;
    assert!(ticks.iter().all(|t| t.new_grants.is_empty() && t.unschedulable.is_empty()));
    let published: Vec<_> = ticks.iter().flat_map(|t| t.published.iter()).collect();
    assert_eq!(published.len(), 1);
    assert!(published[0].allocations.iter().all(|a| a.rsvp_ms == 100));

    let slots: Vec<u64> = ticks
        .iter()
        .flat_map(|t| t.transmissions.iter().map(|a| a.abs_slot()))
        .collect();
    assert_eq!(slots, vec![8844, 8845, 8846, 8847, 8848]);
    assert_eq!(mac.store().history().len(), 10);
    Ok(())
}

#[test]
fn test_spent_grant_reselects_around_own_history() -> TestResult {
    init_test_logging();
    let mut mac = first_fit_mac();
    let start = reference_now();
    let period = ms_to_slots(100, 2);

    mac.report_buffer_status(TEST_DST, 4, 300)?;
    let first = mac.tick(start)?;
    assert_eq!(first.new_grants.len(), 1);
    let periods = mac.sps_grant(TEST_DST).map(|g| g.initial_resel_counter).unwrap_or(0) as u64;
    assert!((5..=15).contains(&periods));

    // New data every period until the reselection counter is spent
    let mut transmissions = first.transmissions.len();
    let mut now = start;
    for offset in 1..periods * period {
        now.add(1);
        if offset % period == 0 {
            mac.report_buffer_status(TEST_DST, 4, 300)?;
        }
        let tick = mac.tick(now)?;
        assert!(tick.new_grants.is_empty());
        transmissions += tick.transmissions.len();
    }
    assert_eq!(transmissions as u64, 5 * periods);
    assert!(mac.grant(TEST_DST).is_none());

    // The fresh selection avoids the slots reserved by the last period
    now.add(1);
    mac.report_buffer_status(TEST_DST, 4, 300)?;
    let tick = mac.tick(now)?;
    assert_eq!(tick.new_grants.len(), 1);
    let offsets: Vec<u64> = tick.new_grants[0]
        .allocations
        .iter()
        .map(|a| a.abs_slot() - periods * period)
        .collect();
    assert_eq!(offsets, vec![8449, 8457, 8458, 8459, 8464]);
    Ok(())
}

#[test]
fn test_simple_scheduler_stays_within_candidates() {
    let mut rng = StdRng::seed_from_u64(42);
    let layout = reference_pool().layout();
    let candidates: Vec<CandidateResource> = (0..12u64)
        .map(|i| CandidateResource {
            sfn: SfnSf::from_normalized(8444 + i, 2),
            sb_ch_start: (i % 2) as u16,
            sb_ch_length: 1,
            layout,
        })
        .collect();

    for _ in 0..20 {
        let seed: u64 = rng.gen();
        let mut scheduler =
            SimpleScheduler::new(SchedulerParams::new(14, 5, 3).unwrap(), seed);
        let mut buffer = DestinationBuffer::new(TEST_DST);
        buffer.configure(lc_config());
        buffer.report(4, rng.gen_range(1..1000)).unwrap();

        let plan = scheduler
            .compute_allocation(&candidates, &buffer)
            .unwrap()
            .unwrap();
        assert_eq!(plan.allocations.len(), 5);
        for pair in plan.allocations.windows(2) {
            assert!(pair[0].abs_slot() < pair[1].abs_slot());
        }
        for allocation in &plan.allocations {
            assert!(candidates.iter().any(|c| c.abs_slot() == allocation.abs_slot()
                && c.sb_ch_start == allocation.sb_ch_start));
        }
    }
}

#[tokio::test]
async fn test_mac_task_end_to_end() {
    init_test_logging();
    let mac = SidelinkUeMac::from_config(&reference_config(SchedulerKind::Simple)).unwrap();
    let (mut task, tx, rx) = SidelinkMacTask::with_channel(mac);
    let handle = tokio::spawn(async move {
        task.run(rx).await;
        task
    });

    tx.send(MacMessage::ConfigureLogicalChannel {
        dst_l2_id: TEST_DST,
        config: lc_config(),
    })
    .await
    .unwrap();

    let mut now = SfnSf::new(200, 0, 0, 2);
    let mut grants = 0;
    let mut transmissions = 0;
    for offset in 0..800u64 {
        if offset % 400 == 0 {
            tx.send(MacMessage::BufferStatusReport {
                dst_l2_id: TEST_DST,
                lc_id: 4,
                bytes: 300,
            })
            .await
            .unwrap();
        }
        let (response_tx, response_rx) = oneshot::channel();
        tx.send(MacMessage::SlotIndication {
            sfn: now,
            response_tx,
        })
        .await
        .unwrap();
        let tick = response_rx.await.unwrap().unwrap();
        grants += tick.new_grants.len();
        assert!(tick.unschedulable.is_empty());
        transmissions += tick.transmissions.len();
        now.add(1);
    }
    tracing::info!(grants, transmissions, "MAC task run finished");
    assert_eq!(grants, 1);
    assert_eq!(transmissions, 10);

    tx.send(MacMessage::Shutdown).await.unwrap();
    let task = handle.await.unwrap();
    assert_eq!(task.mac().store().history().len(), 10);
    assert!(task.mac().sps_grant(TEST_DST).is_some());
}
