//! Key layout of the pool's state in the store.
//!
//! ```text
//! <pool>:rounds:<track>:current:<mode>:{shares,work,counts,hashrate,previous}
//! <pool>:rounds:<track>:round-<height>:{shares,work,counts}
//! <pool>:workers:<track>:<mode>
//! <pool>:blocks:<track>:{pending,counts}
//! ```

use crate::types::{MiningMode, Track};

/// Builds the store keys of one pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    pool: String,
}

impl KeySpace {
    pub fn new(pool: impl Into<String>) -> Self {
        Self { pool: pool.into() }
    }

    pub fn pool(&self) -> &str {
        &self.pool
    }

    fn current(&self, track: Track, mode: MiningMode, suffix: &str) -> String {
        format!(
            "{}:rounds:{}:current:{}:{}",
            self.pool,
            track.as_str(),
            mode.as_str(),
            suffix
        )
    }

    fn archived(&self, track: Track, height: u64, suffix: &str) -> String {
        format!(
            "{}:rounds:{}:round-{}:{}",
            self.pool,
            track.as_str(),
            height,
            suffix
        )
    }

    /// Worker share records of the open round, field = worker
    pub fn current_shares(&self, track: Track, mode: MiningMode) -> String {
        self.current(track, mode, "shares")
    }

    /// Cumulative work of the open round, field = worker
    pub fn current_work(&self, track: Track, mode: MiningMode) -> String {
        self.current(track, mode, "work")
    }

    /// Share outcome counters and round effort of the open round
    pub fn current_counts(&self, track: Track, mode: MiningMode) -> String {
        self.current(track, mode, "counts")
    }

    /// Sorted set of hashrate samples, scored by unix seconds
    pub fn current_hashrate(&self, track: Track, mode: MiningMode) -> String {
        self.current(track, mode, "hashrate")
    }

    /// Time and height of the block that opened the current round
    pub fn current_previous(&self, track: Track, mode: MiningMode) -> String {
        self.current(track, mode, "previous")
    }

    pub fn round_shares(&self, track: Track, height: u64) -> String {
        self.archived(track, height, "shares")
    }

    pub fn round_work(&self, track: Track, height: u64) -> String {
        self.archived(track, height, "work")
    }

    pub fn round_counts(&self, track: Track, height: u64) -> String {
        self.archived(track, height, "counts")
    }

    /// Worker liveness records, field = worker
    pub fn workers(&self, track: Track, mode: MiningMode) -> String {
        format!("{}:workers:{}:{}", self.pool, track.as_str(), mode.as_str())
    }

    pub fn blocks_pending(&self, track: Track) -> String {
        format!("{}:blocks:{}:pending", self.pool, track.as_str())
    }

    pub fn blocks_counts(&self, track: Track) -> String {
        format!("{}:blocks:{}:counts", self.pool, track.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let keys = KeySpace::new("raptoreum");
        assert_eq!(
            keys.current_shares(Track::Primary, MiningMode::Shared),
            "raptoreum:rounds:primary:current:shared:shares"
        );
        assert_eq!(
            keys.current_hashrate(Track::Auxiliary, MiningMode::Solo),
            "raptoreum:rounds:auxiliary:current:solo:hashrate"
        );
        assert_eq!(
            keys.round_work(Track::Primary, 500),
            "raptoreum:rounds:primary:round-500:work"
        );
        assert_eq!(
            keys.workers(Track::Primary, MiningMode::Solo),
            "raptoreum:workers:primary:solo"
        );
        assert_eq!(
            keys.blocks_counts(Track::Auxiliary),
            "raptoreum:blocks:auxiliary:counts"
        );
    }
}
