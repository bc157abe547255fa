//! Sidelink configuration structures
//!
//! Plain, strongly-typed configuration for the sidelink MAC: the resource
//! pools handed down by RRC (or pre-configuration), the sensing parameters,
//! the scheduler selection and an optional scenario block used by the
//! simulator binary. Everything here is validated once at load time.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::sfn::MAX_NUMEROLOGY;

/// Highest MCS index of MCS table 1 (TS 38.214 Table 5.1.3.1-1)
pub const MAX_MCS: u8 = 28;

/// Number of OFDM symbols in a slot with normal cyclic prefix
pub const SYMBOLS_PER_SLOT: u8 = 14;

/// Slot type of a TDD pattern entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TddSlotType {
    /// Downlink slot
    Dl,
    /// Flexible (special) slot
    F,
    /// Uplink slot, the only kind usable for sidelink
    Ul,
}

impl TddSlotType {
    fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'D' => Some(TddSlotType::Dl),
            'F' | 'S' => Some(TddSlotType::F),
            'U' => Some(TddSlotType::Ul),
            _ => None,
        }
    }
}

impl fmt::Display for TddSlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TddSlotType::Dl => write!(f, "D"),
            TddSlotType::F => write!(f, "F"),
            TddSlotType::Ul => write!(f, "U"),
        }
    }
}

/// Sidelink resource pool configuration (SL-ResourcePool, TS 38.331).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePoolConfig {
    /// Pool identifier (0..15)
    pub id: u16,
    /// SL bitmap over uplink slots, e.g. "111111000111"
    pub sl_bitmap: String,
    /// TDD pattern, one character per slot: D, F or U
    pub tdd_pattern: String,
    /// First SL symbol in a slot
    #[serde(default)]
    pub sl_start_symbol: u8,
    /// Number of SL symbols in a slot
    #[serde(default = "default_sl_length_symbols")]
    pub sl_length_symbols: u8,
    /// PSCCH duration in symbols
    #[serde(default = "default_pscch_symbols")]
    pub pscch_symbols: u8,
    /// PSCCH bandwidth in RBs
    #[serde(default = "default_pscch_rbs")]
    pub pscch_rbs: u16,
    /// Subchannel size in RBs
    pub subchannel_size_rbs: u16,
    /// Number of subchannels in the pool
    pub num_subchannels: u16,
    /// Sensing window T0 in milliseconds
    #[serde(default = "default_sensing_window_ms")]
    pub sensing_window_ms: u16,
    /// Selection window length in slots, used as T2 unless overridden
    #[serde(default = "default_selection_window_slots")]
    pub selection_window_slots: u16,
    /// Maximum number of reserved resources announced by one SCI
    #[serde(default = "default_max_num_per_reserve")]
    pub max_num_per_reserve: u8,
    /// Allowed resource reservation periods in milliseconds
    #[serde(default = "default_reservation_periods")]
    pub reservation_periods_ms: Vec<u16>,
    /// PSFCH period in logical SL slots (0 disables PSFCH)
    #[serde(default)]
    pub psfch_period: u8,
    /// Minimum time gap between PSSCH and its PSFCH in slots
    #[serde(default = "default_min_time_gap_psfch")]
    pub min_time_gap_psfch: u8,
}

fn default_sl_length_symbols() -> u8 {
    SYMBOLS_PER_SLOT
}

fn default_pscch_symbols() -> u8 {
    2
}

fn default_pscch_rbs() -> u16 {
    10
}

fn default_sensing_window_ms() -> u16 {
    100
}

fn default_selection_window_slots() -> u16 {
    33
}

fn default_max_num_per_reserve() -> u8 {
    3
}

fn default_reservation_periods() -> Vec<u16> {
    vec![0, 100]
}

fn default_min_time_gap_psfch() -> u8 {
    3
}

impl Default for ResourcePoolConfig {
    fn default() -> Self {
        Self {
            id: 0,
            sl_bitmap: "111111000111".to_string(),
            tdd_pattern: "DDDFUUUUUU".to_string(),
            sl_start_symbol: 0,
            sl_length_symbols: default_sl_length_symbols(),
            pscch_symbols: default_pscch_symbols(),
            pscch_rbs: default_pscch_rbs(),
            subchannel_size_rbs: 50,
            num_subchannels: 2,
            sensing_window_ms: default_sensing_window_ms(),
            selection_window_slots: default_selection_window_slots(),
            max_num_per_reserve: default_max_num_per_reserve(),
            reservation_periods_ms: default_reservation_periods(),
            psfch_period: 0,
            min_time_gap_psfch: default_min_time_gap_psfch(),
        }
    }
}

impl ResourcePoolConfig {
    /// Parses the SL bitmap string into booleans.
    pub fn bitmap(&self) -> Result<Vec<bool>, Error> {
        if self.sl_bitmap.is_empty() {
            return Err(Error::config(format!("pool {}: empty SL bitmap", self.id)));
        }
        self.sl_bitmap
            .chars()
            .map(|c| match c {
                '1' => Ok(true),
                '0' => Ok(false),
                other => Err(Error::config(format!(
                    "pool {}: invalid SL bitmap character '{other}'",
                    self.id
                ))),
            })
            .collect()
    }

    /// Parses the TDD pattern string.
    pub fn tdd(&self) -> Result<Vec<TddSlotType>, Error> {
        let pattern = self
            .tdd_pattern
            .chars()
            .map(|c| {
                TddSlotType::from_char(c).ok_or_else(|| {
                    Error::config(format!("pool {}: invalid TDD slot type '{c}'", self.id))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if !pattern.contains(&TddSlotType::Ul) {
            return Err(Error::config(format!(
                "pool {}: TDD pattern has no uplink slot",
                self.id
            )));
        }
        Ok(pattern)
    }

    /// Checks the static consistency of the pool parameters.
    pub fn validate(&self) -> Result<(), Error> {
        self.bitmap()?;
        self.tdd()?;
        if self.id > 15 {
            return Err(Error::config(format!("pool id {} out of range 0..15", self.id)));
        }
        if self.sl_start_symbol as u16 + self.sl_length_symbols as u16 > SYMBOLS_PER_SLOT as u16 {
            return Err(Error::config(format!(
                "pool {}: SL symbols {}+{} exceed a slot",
                self.id, self.sl_start_symbol, self.sl_length_symbols
            )));
        }
        // PSCCH, at least one PSSCH symbol and the guard symbol
        if self.pscch_symbols as u16 + 2 > self.sl_length_symbols as u16 {
            return Err(Error::config(format!(
                "pool {}: {} PSCCH symbols leave no room for PSSCH",
                self.id, self.pscch_symbols
            )));
        }
        if self.subchannel_size_rbs == 0 || self.num_subchannels == 0 {
            return Err(Error::config(format!(
                "pool {}: subchannel size and count must be non-zero",
                self.id
            )));
        }
        if self.pscch_rbs > self.subchannel_size_rbs {
            return Err(Error::config(format!(
                "pool {}: {} PSCCH RBs exceed the subchannel size of {} RBs",
                self.id, self.pscch_rbs, self.subchannel_size_rbs
            )));
        }
        if self.sensing_window_ms == 0 {
            return Err(Error::config(format!("pool {}: zero sensing window", self.id)));
        }
        if !(1..=3).contains(&self.max_num_per_reserve) {
            return Err(Error::config(format!(
                "pool {}: max_num_per_reserve must be 1..3, got {}",
                self.id, self.max_num_per_reserve
            )));
        }
        if !matches!(self.psfch_period, 0 | 1 | 2 | 4) {
            return Err(Error::config(format!(
                "pool {}: PSFCH period must be 0, 1, 2 or 4, got {}",
                self.id, self.psfch_period
            )));
        }
        Ok(())
    }
}

/// Parameters of the sensing-based resource selection (TS 38.214 8.1.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensingConfig {
    /// When false the full initial candidate set is returned unfiltered
    #[serde(default = "default_true")]
    pub enable_sensing: bool,
    /// Start of the selection window in slots after the trigger
    #[serde(default = "default_t1")]
    pub t1: u16,
    /// End of the selection window in slots; falls back to the pool value
    #[serde(default)]
    pub t2: Option<u16>,
    /// Processing time in slots; newer observations are ignored
    #[serde(default = "default_tproc0")]
    pub tproc0: u16,
    /// Initial PSSCH RSRP threshold in dBm
    #[serde(default = "default_rsrp_threshold")]
    pub rsrp_threshold_dbm: i32,
    /// Minimum share of candidate resources (percent) that must survive
    #[serde(default = "default_resource_percentage")]
    pub resource_percentage: u8,
    /// Threshold at which escalation gives up
    #[serde(default)]
    pub max_rsrp_threshold_dbm: i32,
}

fn default_true() -> bool {
    true
}

fn default_t1() -> u16 {
    2
}

fn default_tproc0() -> u16 {
    1
}

fn default_rsrp_threshold() -> i32 {
    -128
}

fn default_resource_percentage() -> u8 {
    20
}

impl Default for SensingConfig {
    fn default() -> Self {
        Self {
            enable_sensing: true,
            t1: default_t1(),
            t2: None,
            tproc0: default_tproc0(),
            rsrp_threshold_dbm: default_rsrp_threshold(),
            resource_percentage: default_resource_percentage(),
            max_rsrp_threshold_dbm: 0,
        }
    }
}

/// Scheduler implementation selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SchedulerKind {
    /// Uniform random slot and subchannel choice
    #[default]
    Simple,
    /// Earliest slots, lowest subchannel
    FirstFit,
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerKind::Simple => write!(f, "simple"),
            SchedulerKind::FirstFit => write!(f, "first-fit"),
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Scheduler implementation
    #[serde(default)]
    pub kind: SchedulerKind,
    /// Fixed MCS used for every destination
    #[serde(default = "default_mcs")]
    pub mcs: u8,
    /// Maximum PSSCH transmissions per TB (initial plus blind retransmissions)
    #[serde(default = "default_max_tx")]
    pub max_tx_trans_num_pssch: u8,
    /// Seed for the scheduler and reselection random streams
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Probability of keeping a semi-persistent grant when its reselection
    /// counter expires (sl-ProbResourceKeep)
    #[serde(default)]
    pub prob_resource_keep: f64,
}

fn default_mcs() -> u8 {
    14
}

fn default_max_tx() -> u8 {
    5
}

fn default_seed() -> u64 {
    1
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            kind: SchedulerKind::default(),
            mcs: default_mcs(),
            max_tx_trans_num_pssch: default_max_tx(),
            seed: default_seed(),
            prob_resource_keep: 0.0,
        }
    }
}

/// Periodic traffic source of a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficConfig {
    /// Destination layer-2 identifier
    pub dst_l2_id: u32,
    /// Logical channel identifier
    #[serde(default = "default_lc_id")]
    pub lc_id: u8,
    /// Logical channel group
    #[serde(default)]
    pub lcg_id: u8,
    /// Logical channel priority (lower value is more important)
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Bytes generated per interval
    pub packet_size_bytes: u32,
    /// Generation interval in milliseconds
    pub interval_ms: u32,
    /// Packet delay budget in milliseconds
    #[serde(default = "default_pdb_ms")]
    pub pdb_ms: u32,
    /// Resource reservation period requested for this channel
    #[serde(default = "default_rri_ms")]
    pub reservation_period_ms: u16,
}

fn default_lc_id() -> u8 {
    4
}

fn default_priority() -> u8 {
    1
}

fn default_pdb_ms() -> u32 {
    20
}

fn default_rri_ms() -> u16 {
    100
}

/// Synthetic neighbouring transmitter whose SCIs are sensed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// First subchannel the peer occupies
    pub sb_ch_start: u16,
    /// Number of subchannels the peer occupies
    pub sb_ch_length: u16,
    /// RSRP at which the peer is received
    pub rsrp_dbm: f64,
    /// Reservation period of the peer (0 for one-shot)
    pub reservation_period_ms: u16,
    /// Slot offset of the first sensed SCI from the scenario start
    #[serde(default)]
    pub first_slot_offset: u64,
    /// Priority announced in the peer SCI
    #[serde(default = "default_priority")]
    pub priority: u8,
}

/// Scenario block used by the simulator binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Frame at which the scenario starts
    #[serde(default)]
    pub start_frame: u32,
    /// Number of slots to simulate
    pub num_slots: u64,
    /// Traffic generated by the simulated UE
    pub traffic: TrafficConfig,
    /// Sensed neighbours
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
}

/// Complete sidelink configuration of one UE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidelinkConfig {
    /// Numerology of the sidelink BWP
    #[serde(default = "default_numerology")]
    pub numerology: u8,
    /// Configured transmit pools
    pub pools: Vec<ResourcePoolConfig>,
    /// Pool used for transmissions
    #[serde(default)]
    pub active_pool: u16,
    /// Sensing parameters
    #[serde(default)]
    pub sensing: SensingConfig,
    /// Scheduler parameters
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Optional scenario description
    #[serde(default)]
    pub scenario: Option<ScenarioConfig>,
}

fn default_numerology() -> u8 {
    2
}

impl Default for SidelinkConfig {
    fn default() -> Self {
        Self {
            numerology: default_numerology(),
            pools: vec![ResourcePoolConfig::default()],
            active_pool: 0,
            sensing: SensingConfig::default(),
            scheduler: SchedulerConfig::default(),
            scenario: None,
        }
    }
}

impl SidelinkConfig {
    /// Returns the configuration of the active pool, if present.
    pub fn active_pool_config(&self) -> Option<&ResourcePoolConfig> {
        self.pools.iter().find(|p| p.id == self.active_pool)
    }

    /// End of the selection window in slots for the active pool.
    pub fn t2(&self) -> Option<u16> {
        self.sensing
            .t2
            .or_else(|| self.active_pool_config().map(|p| p.selection_window_slots))
    }

    /// Validates the configuration, failing on the first inconsistency.
    ///
    /// Checks that need the physical pool (reservation periods against the
    /// pool length) are done when the MAC builds its pools.
    pub fn validate(&self) -> Result<(), Error> {
        if self.numerology > MAX_NUMEROLOGY {
            return Err(Error::config(format!(
                "numerology {} exceeds {MAX_NUMEROLOGY}",
                self.numerology
            )));
        }
        if self.pools.is_empty() {
            return Err(Error::config("no sidelink pool configured"));
        }
        for (i, pool) in self.pools.iter().enumerate() {
            pool.validate()?;
            if self.pools[..i].iter().any(|p| p.id == pool.id) {
                return Err(Error::config(format!("duplicate pool id {}", pool.id)));
            }
        }
        if self.active_pool_config().is_none() {
            return Err(Error::config(format!(
                "active pool {} is not configured",
                self.active_pool
            )));
        }

        let sensing = &self.sensing;
        let t2 = self.t2().unwrap_or_default();
        if sensing.t1 > t2 {
            return Err(Error::config(format!(
                "selection window is empty: T1={} > T2={t2}",
                sensing.t1
            )));
        }
        if sensing.tproc0 >= self.pools.iter().map(|p| p.sensing_window_ms).min().unwrap_or(0) as u16
            * (1u16 << self.numerology)
        {
            return Err(Error::config(format!(
                "Tproc0 of {} slots covers the whole sensing window",
                sensing.tproc0
            )));
        }
        if !(1..=100).contains(&sensing.resource_percentage) {
            return Err(Error::config(format!(
                "resource percentage must be 1..100, got {}",
                sensing.resource_percentage
            )));
        }
        if sensing.max_rsrp_threshold_dbm < sensing.rsrp_threshold_dbm {
            return Err(Error::config(format!(
                "maximum RSRP threshold {} dBm is below the initial {} dBm",
                sensing.max_rsrp_threshold_dbm, sensing.rsrp_threshold_dbm
            )));
        }

        if self.scheduler.mcs > MAX_MCS {
            return Err(Error::config(format!(
                "MCS {} exceeds {MAX_MCS}",
                self.scheduler.mcs
            )));
        }
        if self.scheduler.max_tx_trans_num_pssch == 0 {
            return Err(Error::config("max_tx_trans_num_pssch must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.scheduler.prob_resource_keep) {
            return Err(Error::config(format!(
                "prob_resource_keep must be within 0..1, got {}",
                self.scheduler.prob_resource_keep
            )));
        }

        if let Some(scenario) = &self.scenario {
            if scenario.traffic.interval_ms == 0 {
                return Err(Error::config("traffic interval must be non-zero"));
            }
            let total = self
                .active_pool_config()
                .map(|p| p.num_subchannels)
                .unwrap_or_default();
            for peer in &scenario.peers {
                if peer.sb_ch_length == 0 || peer.sb_ch_start + peer.sb_ch_length > total {
                    return Err(Error::config(format!(
                        "peer subchannels [{}, {}) outside the {total} pool subchannels",
                        peer.sb_ch_start,
                        peer.sb_ch_start + peer.sb_ch_length
                    )));
                }
            }
        }
        Ok(())
    }

    /// Parses a sidelink configuration from a YAML string.
    ///
    /// # Example
    /// ```
    /// use nrsl_common::SidelinkConfig;
    ///
    /// let yaml = r#"
    /// numerology: 2
    /// pools:
    ///   - id: 0
    ///     sl_bitmap: "111111000111"
    ///     tdd_pattern: "DDDFUUUUUU"
    ///     subchannel_size_rbs: 50
    ///     num_subchannels: 2
    /// sensing:
    ///   t1: 2
    ///   t2: 33
    /// "#;
    ///
    /// let config = SidelinkConfig::from_yaml(yaml).unwrap();
    /// assert_eq!(config.pools[0].num_subchannels, 2);
    /// assert_eq!(config.sensing.rsrp_threshold_dbm, -128);
    /// ```
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Loads and validates a sidelink configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)?;
        let config = Self::from_yaml(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration to a YAML string.
    pub fn to_yaml(&self) -> Result<String, Error> {
        Ok(serde_yaml::to_string(self)?)
    }
}
