//! Single-UE sidelink scenario runner
//!
//! Drives a [`SidelinkMacTask`] slot by slot with periodic traffic and the
//! SCIs of synthetic peers, then summarizes what the MAC did.

use std::fmt;

use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tracing::{debug, info};

use nrsl_common::{ms_to_slots, PeerConfig, SfnSf, SidelinkConfig, SlotClock};
use nrsl_mac::{
    CollectingObserver, LogicalChannelConfig, MacMessage, ResourcePool, SensingRecord,
    SidelinkMacTask, SidelinkUeMac,
};

/// Outcome of a scenario run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioSummary {
    /// Slots simulated
    pub slots: u64,
    /// Bytes generated by the traffic source
    pub generated_bytes: u64,
    /// Grants created
    pub grants: usize,
    /// Later grant periods that carried data
    pub reused_periods: usize,
    /// PSSCH transmissions performed
    pub transmissions: usize,
    /// Slots in which data could not be scheduled
    pub unschedulable: usize,
    /// SCIs injected from peers
    pub sensed_records: usize,
    /// Candidate-generation passes
    pub sensing_passes: usize,
    /// Passes that raised the RSRP threshold
    pub escalated_passes: usize,
    /// Mean final RSRP threshold over all passes
    pub avg_final_threshold_dbm: Option<f64>,
}

impl fmt::Display for ScenarioSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Slots simulated:        {}", self.slots)?;
        writeln!(f, "Bytes generated:        {}", self.generated_bytes)?;
        writeln!(f, "Sensed SCIs:            {}", self.sensed_records)?;
        writeln!(f, "Grants:                 {}", self.grants)?;
        writeln!(f, "Reused grant periods:   {}", self.reused_periods)?;
        writeln!(f, "Transmissions:          {}", self.transmissions)?;
        writeln!(f, "Unschedulable attempts: {}", self.unschedulable)?;
        writeln!(
            f,
            "Sensing passes:         {} ({} escalated)",
            self.sensing_passes, self.escalated_passes
        )?;
        match self.avg_final_threshold_dbm {
            Some(avg) => write!(f, "Avg final threshold:    {avg:.1} dBm"),
            None => write!(f, "Avg final threshold:    n/a"),
        }
    }
}

/// Whether a peer transmits in the slot `offset` slots after the start
fn peer_transmits(peer: &PeerConfig, offset: u64, numerology: u8) -> bool {
    if offset < peer.first_slot_offset {
        return false;
    }
    let since_first = offset - peer.first_slot_offset;
    match ms_to_slots(peer.reservation_period_ms as u64, numerology) {
        0 => since_first == 0,
        period => since_first % period == 0,
    }
}

async fn request<T>(
    tx: &tokio::sync::mpsc::Sender<MacMessage>,
    build: impl FnOnce(oneshot::Sender<T>) -> MacMessage,
) -> Result<T> {
    let (response_tx, response_rx) = oneshot::channel();
    tx.send(build(response_tx))
        .await
        .context("MAC task stopped")?;
    response_rx.await.context("MAC task dropped the request")
}

/// Runs the scenario block of `config`.
pub async fn run_scenario(config: &SidelinkConfig) -> Result<ScenarioSummary> {
    let scenario = config
        .scenario
        .as_ref()
        .context("configuration has no scenario block")?;
    let numerology = config.numerology;

    let mut mac = SidelinkUeMac::from_config(config).context("invalid sidelink configuration")?;
    let pool: ResourcePool = mac.active_pool()?.clone();
    let observer = CollectingObserver::new();
    mac.set_observer(Box::new(observer.clone()));

    let (mut task, tx, rx) = SidelinkMacTask::with_channel(mac);
    let handle = tokio::spawn(async move {
        task.run(rx).await;
        task
    });

    let traffic = &scenario.traffic;
    tx.send(MacMessage::ConfigureLogicalChannel {
        dst_l2_id: traffic.dst_l2_id,
        config: LogicalChannelConfig {
            lc_id: traffic.lc_id,
            lcg_id: traffic.lcg_id,
            priority: traffic.priority,
            pdb_ms: traffic.pdb_ms,
            rsvp_ms: traffic.reservation_period_ms,
        },
    })
    .await
    .context("MAC task stopped")?;

    let start = SfnSf::new(scenario.start_frame, 0, 0, numerology);
    let mut clock = SlotClock::new(start, scenario.num_slots);
    let interval = ms_to_slots(traffic.interval_ms as u64, numerology);
    let mut summary = ScenarioSummary::default();
    let mut rlc_queue: u32 = 0;

    info!(
        start = %start,
        slots = scenario.num_slots,
        peers = scenario.peers.len(),
        "Scenario started"
    );

    while !clock.is_complete() {
        let now = clock.now();
        let offset = now.slots_since(&start);

        if offset % interval == 0 {
            rlc_queue = rlc_queue.saturating_add(traffic.packet_size_bytes);
            summary.generated_bytes += traffic.packet_size_bytes as u64;
            tx.send(MacMessage::BufferStatusReport {
                dst_l2_id: traffic.dst_l2_id,
                lc_id: traffic.lc_id,
                bytes: rlc_queue,
            })
            .await
            .context("MAC task stopped")?;
        }

        if pool.is_sidelink_slot(now.normalize()) {
            for peer in scenario.peers.iter().filter(|p| peer_transmits(p, offset, numerology)) {
                let record = SensingRecord::new(
                    now,
                    peer.reservation_period_ms,
                    peer.sb_ch_start,
                    peer.sb_ch_length,
                    peer.priority,
                    peer.rsrp_dbm,
                );
                tx.send(MacMessage::SensingData { record })
                    .await
                    .context("MAC task stopped")?;
                summary.sensed_records += 1;
            }
        }

        let tick = request(&tx, |response_tx| MacMessage::SlotIndication {
            sfn: now,
            response_tx,
        })
        .await??;

        for plan in tick.new_grants.iter().chain(&tick.published) {
            let granted: u32 = plan.pdus().iter().map(|p| p.size).sum();
            rlc_queue = rlc_queue.saturating_sub(granted);
        }
        if !tick.transmissions.is_empty() {
            debug!(slot = now.normalize(), count = tick.transmissions.len(), "Transmitting");
        }
        summary.grants += tick.new_grants.len();
        summary.reused_periods += tick.published.len();
        summary.unschedulable += tick.unschedulable.len();
        summary.transmissions += tick.transmissions.len();
        summary.slots += 1;
        clock.tick();
    }

    tx.send(MacMessage::Shutdown)
        .await
        .context("MAC task stopped")?;
    handle.await.context("MAC task panicked")?;

    let reports = observer.reports();
    summary.sensing_passes = reports.len();
    summary.escalated_passes = reports.iter().filter(|r| r.escalations > 0).count();
    if !reports.is_empty() {
        let sum: f64 = reports
            .iter()
            .map(|r| r.final_rsrp_threshold_dbm as f64)
            .sum();
        summary.avg_final_threshold_dbm = Some(sum / reports.len() as f64);
    }

    info!(
        grants = summary.grants,
        transmissions = summary.transmissions,
        unschedulable = summary.unschedulable,
        elapsed_ms = clock.elapsed().as_millis() as u64,
        "Scenario finished"
    );
    Ok(summary)
}
