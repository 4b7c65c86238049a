//! Process-local round height cache.
//!
//! Each accounting process remembers the highest share height it has seen
//! (`current`) and the height of the last shared round it closed (`minimum`)
//! per track. Both only move forward.

use crate::types::Track;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundHeights {
    pub current: u64,
    pub minimum: u64,
}

impl RoundHeights {
    /// Records a share height and returns the tracked current height.
    pub fn observe(&mut self, height: u64) -> u64 {
        if height > self.current {
            self.current = height;
        }
        self.current
    }

    /// Records the height of a closed shared round.
    pub fn close_round(&mut self, height: u64) {
        if height > self.minimum {
            self.minimum = height;
        }
    }
}

/// Accounting context of one pool, handed by reference to the engines.
#[derive(Debug, Clone)]
pub struct AccountingSession {
    pool: String,
    heights: [RoundHeights; 2],
}

impl AccountingSession {
    pub fn new(pool: impl Into<String>) -> Self {
        Self {
            pool: pool.into(),
            heights: [RoundHeights::default(); 2],
        }
    }

    pub fn pool(&self) -> &str {
        &self.pool
    }

    pub fn heights(&self, track: Track) -> RoundHeights {
        self.heights[track.index()]
    }

    pub fn heights_mut(&mut self, track: Track) -> &mut RoundHeights {
        &mut self.heights[track.index()]
    }
}
