//! Block height tracking for data-freshness annotations

use alloy_primitives::BlockNumber;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

use crate::tokens::Pool;

/// Mainnet slot time, used until enough blocks have been observed
pub const DEFAULT_BLOCK_DURATION: Duration = Duration::from_secs(12);

/// Block metadata handed to the controls surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockMetadata {
    /// 0 until a block has been observed
    pub current_block_number: BlockNumber,
    pub last_block_timestamp: Option<DateTime<Utc>>,
    pub estimated_block_duration: Duration,
}

impl Default for BlockMetadata {
    fn default() -> Self {
        Self {
            current_block_number: 0,
            last_block_timestamp: None,
            estimated_block_duration: DEFAULT_BLOCK_DURATION,
        }
    }
}

pub struct BlockTracker {
    window: VecDeque<(BlockNumber, DateTime<Utc>)>,
    capacity: usize,
    current: BlockNumber,
    last_timestamp: Option<DateTime<Utc>>,
    default_duration: Duration,
}

impl BlockTracker {
    pub fn new(capacity: usize, default_duration: Duration) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity: capacity.max(2),
            current: 0,
            last_timestamp: None,
            default_duration,
        }
    }

    /// Record a new block. Numbers below the current head are ignored. A
    /// timestamp for the current head is still taken when the head was
    /// advanced without one, e.g. by `observe_pools`.
    /// Returns true when the head advanced.
    pub fn observe_block(&mut self, number: BlockNumber, timestamp: Option<DateTime<Utc>>) -> bool {
        if number < self.current {
            debug!(number, current = self.current, "Ignoring stale block");
            return false;
        }

        if number == self.current {
            let stamped = self.window.back().map(|&(n, _)| n);
            match timestamp {
                Some(ts) if stamped.map_or(true, |n| n < number) => {
                    debug!(number, "Timestamp attached to current block");
                    self.record_timestamp(number, ts);
                }
                _ => debug!(number, "Ignoring repeated block"),
            }
            return false;
        }

        self.current = number;
        if let Some(ts) = timestamp {
            self.record_timestamp(number, ts);
        }

        true
    }

    fn record_timestamp(&mut self, number: BlockNumber, ts: DateTime<Utc>) {
        self.last_timestamp = Some(ts);
        self.window.push_back((number, ts));
        while self.window.len() > self.capacity {
            self.window.pop_front();
        }
    }

    /// Advance the head to the newest `lastUpdatedAtBlock` among `pools`
    pub fn observe_pools<'a>(&mut self, pools: impl IntoIterator<Item = &'a Pool>) -> bool {
        let newest = pools
            .into_iter()
            .filter_map(|p| p.last_updated_at_block)
            .max();

        match newest {
            Some(block) => self.observe_block(block, None),
            None => false,
        }
    }

    pub fn current_block_number(&self) -> BlockNumber {
        self.current
    }

    /// Average block time across the observation window
    pub fn estimated_block_duration(&self) -> Duration {
        let (Some(&(first_block, first_ts)), Some(&(last_block, last_ts))) =
            (self.window.front(), self.window.back())
        else {
            return self.default_duration;
        };

        let blocks = last_block.saturating_sub(first_block);
        let elapsed_ms = (last_ts - first_ts).num_milliseconds();

        if blocks == 0 || elapsed_ms <= 0 {
            return self.default_duration;
        }

        Duration::from_millis(elapsed_ms as u64 / blocks)
    }

    pub fn metadata(&self) -> BlockMetadata {
        BlockMetadata {
            current_block_number: self.current,
            last_block_timestamp: self.last_timestamp,
            estimated_block_duration: self.estimated_block_duration(),
        }
    }
}

impl Default for BlockTracker {
    fn default() -> Self {
        Self::new(32, DEFAULT_BLOCK_DURATION)
    }
}
