//! Transport block sizing
//!
//! Fixed-MCS link adaptation over MCS table 1 (TS 38.214 Table 5.1.3.1-1).

use crate::error::{MacError, MacResult};

/// Useful subcarriers per RB once DMRS overhead is accounted for
pub const USEFUL_SUBCARRIERS_PER_RB: u32 = 11;

/// Transport block CRC in bytes (24 bits)
pub const CRC_BYTES: u32 = 3;

/// (modulation order, code rate x 1024) per MCS index
const MCS_TABLE_1: [(u8, u16); 29] = [
    (2, 120),
    (2, 157),
    (2, 193),
    (2, 251),
    (2, 308),
    (2, 379),
    (2, 449),
    (2, 526),
    (2, 602),
    (2, 679),
    (4, 340),
    (4, 378),
    (4, 434),
    (4, 490),
    (4, 553),
    (4, 616),
    (4, 658),
    (6, 438),
    (6, 466),
    (6, 517),
    (6, 567),
    (6, 616),
    (6, 666),
    (6, 719),
    (6, 772),
    (6, 822),
    (6, 873),
    (6, 910),
    (6, 948),
];

/// Fixed-MCS AMC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amc {
    mcs: u8,
    qm: u8,
    rate_x1024: u16,
}

impl Amc {
    /// Creates an AMC for a fixed MCS, rejecting indices outside table 1
    pub fn new(mcs: u8) -> MacResult<Self> {
        let (qm, rate_x1024) = *MCS_TABLE_1
            .get(mcs as usize)
            .ok_or(MacError::InvalidMcs { mcs })?;
        Ok(Self {
            mcs,
            qm,
            rate_x1024,
        })
    }

    /// The MCS index
    pub fn mcs(&self) -> u8 {
        self.mcs
    }

    /// Modulation order
    pub fn modulation_order(&self) -> u8 {
        self.qm
    }

    /// Transport block size in bytes over `subchannels` subchannels of
    /// `subchannel_size_rbs` RBs and `symbols` PSSCH symbols.
    pub fn tb_size(&self, subchannel_size_rbs: u16, subchannels: u16, symbols: u8) -> u32 {
        let resource_elements = USEFUL_SUBCARRIERS_PER_RB as u64
            * subchannel_size_rbs as u64
            * subchannels as u64
            * symbols as u64;
        let bits = resource_elements * self.qm as u64 * self.rate_x1024 as u64 / 1024;
        ((bits / 8) as u32).saturating_sub(CRC_BYTES)
    }
}
