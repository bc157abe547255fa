//! Diagnostic reports of the sensing algorithm

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Outcome of one candidate-generation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensingReport {
    /// Absolute slot the selection was triggered in
    pub now: u64,
    /// Requested width in subchannels
    pub subchannels: u16,
    /// Sidelink slots in the selection window
    pub initial_slots: usize,
    /// Width-sized resources in the selection window
    pub initial_resources: usize,
    /// Slots holding at least one candidate
    pub final_slots: usize,
    /// Candidates returned
    pub final_resources: usize,
    /// Threshold in force when the pass ended
    pub final_rsrp_threshold_dbm: i32,
    /// Number of 3 dB threshold increases
    pub escalations: u32,
    /// Whether exclusion was applied at all
    pub sensing_applied: bool,
}

/// Receives a report after every candidate-generation pass
pub trait SensingObserver: Send {
    /// Called synchronously with the report of the finished pass
    fn on_sensing_report(&mut self, report: &SensingReport);
}

/// Observer keeping every report in a shared buffer
#[derive(Debug, Clone, Default)]
pub struct CollectingObserver {
    reports: Arc<Mutex<Vec<SensingReport>>>,
}

impl CollectingObserver {
    /// Creates an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out the reports gathered so far
    pub fn reports(&self) -> Vec<SensingReport> {
        self.reports
            .lock()
            .map(|reports| reports.clone())
            .unwrap_or_default()
    }
}

impl SensingObserver for CollectingObserver {
    fn on_sensing_report(&mut self, report: &SensingReport) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report.clone());
        }
    }
}
