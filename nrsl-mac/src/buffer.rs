//! Logical channel buffer state per destination

use serde::{Deserialize, Serialize};

use crate::error::{MacError, MacResult};

/// Sidelink logical channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalChannelConfig {
    /// Logical channel id
    pub lc_id: u8,
    /// Logical channel group
    pub lcg_id: u8,
    /// Priority (lower value is served first)
    pub priority: u8,
    /// Packet delay budget in ms
    pub pdb_ms: u32,
    /// Reservation period requested for the channel in ms
    pub rsvp_ms: u16,
}

/// A logical channel and its buffered bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalChannel {
    /// Channel configuration
    pub config: LogicalChannelConfig,
    /// Bytes waiting for transmission
    pub buffered_bytes: u32,
}

/// Buffer state of all logical channels towards one destination.
///
/// Channels keep the order they were configured in, which breaks ties
/// between equal priorities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationBuffer {
    dst_l2_id: u32,
    channels: Vec<LogicalChannel>,
}

impl DestinationBuffer {
    /// Creates an empty buffer for a destination
    pub fn new(dst_l2_id: u32) -> Self {
        Self {
            dst_l2_id,
            channels: Vec::new(),
        }
    }

    /// Destination layer-2 id
    pub fn dst_l2_id(&self) -> u32 {
        self.dst_l2_id
    }

    /// Adds a channel, or updates its configuration in place
    pub fn configure(&mut self, config: LogicalChannelConfig) {
        match self.channels.iter_mut().find(|c| c.config.lc_id == config.lc_id) {
            Some(channel) => channel.config = config,
            None => self.channels.push(LogicalChannel {
                config,
                buffered_bytes: 0,
            }),
        }
    }

    /// Sets the buffered bytes reported by RLC for a channel
    pub fn report(&mut self, lc_id: u8, bytes: u32) -> MacResult<()> {
        let dst_l2_id = self.dst_l2_id;
        let channel = self
            .channels
            .iter_mut()
            .find(|c| c.config.lc_id == lc_id)
            .ok_or(MacError::UnknownLogicalChannel { dst_l2_id, lc_id })?;
        channel.buffered_bytes = bytes;
        Ok(())
    }

    /// Removes transmitted bytes from a channel
    pub fn consume(&mut self, lc_id: u8, bytes: u32) {
        if let Some(channel) = self.channels.iter_mut().find(|c| c.config.lc_id == lc_id) {
            channel.buffered_bytes = channel.buffered_bytes.saturating_sub(bytes);
        }
    }

    /// All configured channels
    pub fn channels(&self) -> &[LogicalChannel] {
        &self.channels
    }

    /// Total buffered bytes
    pub fn total_bytes(&self) -> u32 {
        self.channels.iter().map(|c| c.buffered_bytes).sum()
    }

    /// Buffered bytes of one logical channel group
    pub fn lcg_bytes(&self, lcg_id: u8) -> u32 {
        self.channels
            .iter()
            .filter(|c| c.config.lcg_id == lcg_id)
            .map(|c| c.buffered_bytes)
            .sum()
    }

    /// Channels with data, most important first, ties in configuration order
    pub fn by_priority(&self) -> Vec<&LogicalChannel> {
        let mut active: Vec<&LogicalChannel> =
            self.channels.iter().filter(|c| c.buffered_bytes > 0).collect();
        active.sort_by_key(|c| c.config.priority);
        active
    }

    /// The most important channel holding data
    pub fn highest_priority(&self) -> Option<&LogicalChannel> {
        self.by_priority().into_iter().next()
    }

    /// Tightest delay budget among channels holding data
    pub fn min_pdb_ms(&self) -> Option<u32> {
        self.channels
            .iter()
            .filter(|c| c.buffered_bytes > 0)
            .map(|c| c.config.pdb_ms)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lc(lc_id: u8, priority: u8) -> LogicalChannelConfig {
        LogicalChannelConfig {
            lc_id,
            lcg_id: 0,
            priority,
            pdb_ms: 20 + lc_id as u32,
            rsvp_ms: 100,
        }
    }

    #[test]
    fn test_priority_order_is_stable() {
        let mut buffer = DestinationBuffer::new(255);
        buffer.configure(lc(4, 3));
        buffer.configure(lc(5, 1));
        buffer.configure(lc(6, 3));
        buffer.configure(lc(7, 1));
        for id in 4..=7 {
            buffer.report(id, 100).unwrap();
        }
        let order: Vec<u8> = buffer.by_priority().iter().map(|c| c.config.lc_id).collect();
        assert_eq!(order, vec![5, 7, 4, 6]);
        assert_eq!(buffer.highest_priority().unwrap().config.lc_id, 5);
        assert_eq!(buffer.total_bytes(), 400);
    }

    #[test]
    fn test_empty_channels_skipped() {
        let mut buffer = DestinationBuffer::new(1);
        buffer.configure(lc(4, 1));
        buffer.configure(lc(5, 2));
        buffer.report(5, 10).unwrap();
        assert_eq!(buffer.highest_priority().unwrap().config.lc_id, 5);
        assert_eq!(buffer.min_pdb_ms(), Some(25));
    }

    #[test]
    fn test_unknown_channel_rejected() {
        let mut buffer = DestinationBuffer::new(9);
        assert!(matches!(
            buffer.report(3, 1),
            Err(MacError::UnknownLogicalChannel { dst_l2_id: 9, lc_id: 3 })
        ));
    }

    #[test]
    fn test_consume_and_reconfigure() {
        let mut buffer = DestinationBuffer::new(1);
        buffer.configure(lc(4, 1));
        buffer.report(4, 50).unwrap();
        buffer.consume(4, 80);
        assert_eq!(buffer.total_bytes(), 0);

        buffer.configure(LogicalChannelConfig {
            lcg_id: 2,
            ..lc(4, 7)
        });
        assert_eq!(buffer.channels().len(), 1);
        assert_eq!(buffer.channels()[0].config.priority, 7);
        buffer.report(4, 30).unwrap();
        assert_eq!(buffer.lcg_bytes(2), 30);
        assert_eq!(buffer.lcg_bytes(0), 0);
    }
}
