//! Sidelink MAC task
//!
//! Async wrapper that owns a [`SidelinkUeMac`] and processes messages one at
//! a time, so a candidate-generation pass always completes before the next
//! message is looked at.

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::MacResult;
use crate::mac::SidelinkUeMac;
use crate::messages::MacMessage;

/// Default capacity of the MAC task channel
pub const MAC_CHANNEL_CAPACITY: usize = 256;

/// Sidelink MAC task
#[derive(Debug)]
pub struct SidelinkMacTask {
    mac: SidelinkUeMac,
}

impl SidelinkMacTask {
    /// Wraps a configured MAC
    pub fn new(mac: SidelinkUeMac) -> Self {
        Self { mac }
    }

    /// Creates the task together with its sender
    pub fn with_channel(mac: SidelinkUeMac) -> (Self, mpsc::Sender<MacMessage>, mpsc::Receiver<MacMessage>) {
        let (tx, rx) = mpsc::channel(MAC_CHANNEL_CAPACITY);
        (Self::new(mac), tx, rx)
    }

    /// The wrapped MAC
    pub fn mac(&self) -> &SidelinkUeMac {
        &self.mac
    }

    /// Gives the MAC back
    pub fn into_mac(self) -> SidelinkUeMac {
        self.mac
    }

    /// Runs the MAC task main loop until shutdown or channel close
    pub async fn run(&mut self, mut rx: mpsc::Receiver<MacMessage>) {
        info!("Sidelink MAC task started");

        while let Some(msg) = rx.recv().await {
            if matches!(msg, MacMessage::Shutdown) {
                break;
            }
            if let Err(e) = self.handle_message(msg) {
                error!("Error handling MAC message: {}", e);
            }
        }

        info!("Sidelink MAC task stopped");
    }

    fn handle_message(&mut self, msg: MacMessage) -> MacResult<()> {
        match msg {
            MacMessage::SensingData { record } => {
                self.mac.receive_sensing_data(record);
                Ok(())
            }

            MacMessage::SlotIndication { sfn, response_tx } => {
                let tick = self.mac.tick(sfn);
                if response_tx.send(tick).is_err() {
                    debug!(slot = sfn.normalize(), "Slot indication requester went away");
                }
                Ok(())
            }

            MacMessage::ConfigureLogicalChannel { dst_l2_id, config } => {
                self.mac.configure_logical_channel(dst_l2_id, config);
                Ok(())
            }

            MacMessage::BufferStatusReport {
                dst_l2_id,
                lc_id,
                bytes,
            } => self.mac.report_buffer_status(dst_l2_id, lc_id, bytes),

            MacMessage::CandidateQuery {
                sfn,
                requirement,
                response_tx,
            } => {
                let candidates = self.mac.candidate_resources(sfn, &requirement);
                if response_tx.send(candidates).is_err() {
                    debug!("Candidate query requester went away");
                }
                Ok(())
            }

            MacMessage::Shutdown => Ok(()),
        }
    }
}
