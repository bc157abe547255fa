//! Sensing record store
//!
//! Rolling journal of the SCIs sensed from neighbours and of the slots this
//! UE transmitted in. Records are only ever deleted by aging, right before a
//! candidate-generation pass.

use serde::{Deserialize, Serialize};
use tracing::debug;

use nrsl_common::SfnSf;

/// Maximum number of retransmissions one SCI can reserve
pub const MAX_RESERVED_RETX: usize = 2;

/// Retransmission announced in a sensed SCI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedRetx {
    /// Slots between the sensed transmission and the retransmission
    pub gap_slots: u16,
    /// First subchannel of the retransmission
    pub sb_ch_start: u16,
}

/// One sensed SCI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensingRecord {
    /// Slot the SCI was received in
    pub sfn: SfnSf,
    /// Announced reservation period in ms (0 for a one-shot transmission)
    pub rsvp_ms: u16,
    /// First reserved subchannel
    pub sb_ch_start: u16,
    /// Number of reserved subchannels
    pub sb_ch_length: u16,
    /// Announced priority
    pub priority: u8,
    /// Measured PSSCH RSRP in dBm
    pub rsrp_dbm: f64,
    /// Announced retransmissions
    pub retx: Vec<ReservedRetx>,
}

impl SensingRecord {
    /// Creates a record without announced retransmissions
    pub fn new(
        sfn: SfnSf,
        rsvp_ms: u16,
        sb_ch_start: u16,
        sb_ch_length: u16,
        priority: u8,
        rsrp_dbm: f64,
    ) -> Self {
        Self {
            sfn,
            rsvp_ms,
            sb_ch_start,
            sb_ch_length,
            priority,
            rsrp_dbm,
            retx: Vec::new(),
        }
    }

    /// Adds an announced retransmission; an SCI carries at most two.
    pub fn with_retx(mut self, gap_slots: u16, sb_ch_start: u16) -> Self {
        if self.retx.len() < MAX_RESERVED_RETX && gap_slots > 0 {
            self.retx.push(ReservedRetx {
                gap_slots,
                sb_ch_start,
            });
        }
        self
    }

    /// Absolute slot of the record
    pub fn abs_slot(&self) -> u64 {
        self.sfn.normalize()
    }
}

/// A slot this UE transmitted in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmitHistoryEntry {
    /// Transmission slot
    pub sfn: SfnSf,
    /// Reservation period of the transmission in ms, if known
    pub rsvp_ms: Option<u16>,
}

impl TransmitHistoryEntry {
    /// Absolute slot of the transmission
    pub fn abs_slot(&self) -> u64 {
        self.sfn.normalize()
    }
}

/// Drops every item strictly older than `now - window_slots`.
fn retain_window<T>(items: &mut Vec<T>, now: u64, window_slots: u64, slot: impl Fn(&T) -> u64) -> usize {
    let before = items.len();
    items.retain(|item| slot(item) + window_slots >= now);
    before - items.len()
}

/// Removes sensing records older than the sensing window.
///
/// A record at slot `s` survives when `now - s <= window_slots`; records
/// from the future always survive. Returns the number of removed records.
pub fn remove_old_sensing_data(now: u64, window_slots: u64, records: &mut Vec<SensingRecord>) -> usize {
    retain_window(records, now, window_slots, SensingRecord::abs_slot)
}

/// Removes own transmissions older than the sensing window.
pub fn remove_old_transmit_history(
    now: u64,
    window_slots: u64,
    history: &mut Vec<TransmitHistoryEntry>,
) -> usize {
    retain_window(history, now, window_slots, TransmitHistoryEntry::abs_slot)
}

/// Per-UE sensing store
#[derive(Debug, Clone, Default)]
pub struct SensingStore {
    records: Vec<SensingRecord>,
    history: Vec<TransmitHistoryEntry>,
}

impl SensingStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sensed SCI. Duplicates are kept.
    pub fn add_sensing_record(&mut self, record: SensingRecord) {
        self.records.push(record);
    }

    /// Appends an own transmission
    pub fn record_own_transmission(&mut self, entry: TransmitHistoryEntry) {
        self.history.push(entry);
    }

    /// Ages both journals against the sensing window.
    pub fn trim(&mut self, now: u64, window_slots: u64) -> (usize, usize) {
        let records = remove_old_sensing_data(now, window_slots, &mut self.records);
        let history = remove_old_transmit_history(now, window_slots, &mut self.history);
        if records > 0 || history > 0 {
            debug!(
                now,
                window_slots,
                removed_records = records,
                removed_history = history,
                "Aged sensing data"
            );
        }
        (records, history)
    }

    /// Sensed SCIs
    pub fn records(&self) -> &[SensingRecord] {
        &self.records
    }

    /// Own transmissions
    pub fn history(&self) -> &[TransmitHistoryEntry] {
        &self.history
    }

    /// Whether the store holds nothing
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.history.is_empty()
    }
}
