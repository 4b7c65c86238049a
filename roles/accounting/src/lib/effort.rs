//! Round effort ("luck") calculation
//!
//! Effort is the work accumulated in a round relative to the difficulty of the
//! block being mined, as a percentage. It is always recomputed from a full
//! snapshot of the round rather than updated incrementally.

use crate::{
    snapshot::PriorShares,
    types::{MiningMode, ShareType},
};

/// Calculate the effort of a round after one submission
///
/// # Arguments
/// * `prior` - Worker records of the round the submission belongs to
/// * `worker` - The submitting worker
/// * `difficulty` - Difficulty of the submitted share
/// * `share_type` - Effective type of the submission; only valid shares add
///   their own difficulty
/// * `block_difficulty` - Difficulty of the block on the submission's track
/// * `mode` - Solo effort only counts the worker's own solo record; shared
///   effort counts every record not flagged solo
///
/// # Returns
/// The effort in percent: never negative, 0 when the block difficulty is not
/// a positive number, unbounded above.
pub fn compute_effort(
    prior: &PriorShares,
    worker: &str,
    difficulty: f64,
    share_type: ShareType,
    block_difficulty: f64,
    mode: MiningMode,
) -> f64 {
    let accumulated: f64 = prior
        .iter()
        .filter(|(name, record)| match mode {
            MiningMode::Solo => name.as_str() == worker && record.solo,
            MiningMode::Shared => !record.solo,
        })
        .map(|(_, record)| record.work)
        .sum();

    let total = if share_type.is_valid() {
        accumulated + difficulty
    } else {
        accumulated
    };

    effort_percent(total, block_difficulty)
}

/// `work / block_difficulty * 100`, guarded against non-positive divisors.
pub fn effort_percent(work: f64, block_difficulty: f64) -> f64 {
    if !(block_difficulty.is_finite() && block_difficulty > 0.0) {
        return 0.0;
    }
    let effort = work / block_difficulty * 100.0;
    if effort.is_finite() {
        effort.max(0.0)
    } else {
        0.0
    }
}
