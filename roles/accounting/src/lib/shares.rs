//! Share accounting engine.
//!
//! Turns one share event into the commands that record it: the worker's
//! round record, round counters, cumulative work, a hashrate sample and the
//! worker's liveness heartbeat.

use tracing::{debug, warn};

use crate::{
    effort::{compute_effort, effort_percent},
    keys::KeySpace,
    session::AccountingSession,
    snapshot::PriorState,
    state_store::Command,
    types::{
        MiningMode, RoundTag, ShareData, ShareType, Track, TypeCounts, WorkerActivity,
        WorkerShareRecord,
    },
    utils::{round_to, strip_port},
};

/// Gaps between two shares at or above this many seconds do not count as
/// continuous mining.
pub const DEFAULT_CONTINUOUS_GAP_SECS: f64 = 900.0;

#[derive(Debug, Clone)]
pub struct ShareEngine {
    keys: KeySpace,
    continuous_gap_secs: f64,
}

impl ShareEngine {
    pub fn new(keys: KeySpace) -> Self {
        Self {
            keys,
            continuous_gap_secs: DEFAULT_CONTINUOUS_GAP_SECS,
        }
    }

    pub fn with_continuous_gap(mut self, seconds: f64) -> Self {
        self.continuous_gap_secs = seconds;
        self
    }

    /// Commands for a share on the primary track and, when enabled, the
    /// auxiliary track. The tracks share nothing but the event itself.
    #[allow(clippy::too_many_arguments)]
    pub fn build_shares_commands(
        &self,
        session: &mut AccountingSession,
        prior: &PriorState,
        share: &ShareData,
        share_type: ShareType,
        mode: MiningMode,
        auxiliary_enabled: bool,
        now: u64,
    ) -> Vec<Command> {
        let mut commands =
            self.build_share_commands(session, prior, share, share_type, Track::Primary, mode, now);
        if auxiliary_enabled {
            if share.addr_auxiliary.is_empty() {
                debug!("Share from {} carries no auxiliary address", share.addr_primary);
            } else {
                commands.extend(self.build_share_commands(
                    session,
                    prior,
                    share,
                    share_type,
                    Track::Auxiliary,
                    mode,
                    now,
                ));
            }
        }
        commands
    }

    /// Commands recording one share on one track.
    ///
    /// `now` is in milliseconds since the epoch.
    #[allow(clippy::too_many_arguments)]
    pub fn build_share_commands(
        &self,
        session: &mut AccountingSession,
        prior: &PriorState,
        share: &ShareData,
        share_type: ShareType,
        track: Track,
        mode: MiningMode,
        now: u64,
    ) -> Vec<Command> {
        let worker = share.worker(track);
        let block_difficulty = share.block_difficulty(track);
        let prior_shares = prior.shares(track, mode);
        let last = prior_shares.get(worker);

        let heights = {
            let heights = session.heights_mut(track);
            heights.observe(share.height);
            *heights
        };

        // A share for a height the pool has already moved past can only be stale.
        let share_type = if !mode.is_solo() && share.height < heights.current {
            ShareType::Stale
        } else {
            share_type
        };
        let difficulty = if share_type.is_valid() {
            share.difficulty
        } else {
            0.0
        };

        let round_started = match mode {
            MiningMode::Shared => prior.anchor(track).block_time,
            MiningMode::Solo => None,
        };
        let times = self.continuous_time(last, round_started, now);
        let effort = compute_effort(
            prior_shares,
            worker,
            share.difficulty,
            share_type,
            block_difficulty,
            mode,
        );
        let mut types = last.map(|record| record.types).unwrap_or_default();
        types.increment(share_type);
        let prior_work = last.map(|record| record.work.max(0.0)).unwrap_or(0.0);
        if last.is_some_and(|record| record.round.is_orphan()) {
            debug!("Carrying orphaned share data of {} into round {}", worker, share.height);
        }

        let mut record = WorkerShareRecord {
            time: now,
            effort,
            identifier: share.identifier().to_string(),
            round: RoundTag::Height(share.height),
            solo: mode.is_solo(),
            times,
            types,
            share_type: Some(share_type),
            work: prior_work + difficulty,
            worker: worker.to_string(),
        };
        let mut work_increment = difficulty;

        if !mode.is_solo() && share.height < heights.minimum {
            warn!(
                "Resetting share data for {} due to rounds overlapping.",
                worker
            );
            record.effort = effort_percent(share.difficulty, block_difficulty);
            record.times = 0.0;
            record.types = TypeCounts::default();
            record.work = difficulty;
            work_increment = 0.0;
        }

        let activity = WorkerActivity {
            time: now / 1000,
            worker: worker.to_string(),
            ip: strip_port(&share.ip).to_string(),
            offline: false,
        };
        let sample = WorkerShareRecord {
            work: difficulty,
            ..record.clone()
        };

        let shares_key = self.keys.current_shares(track, mode);
        let counts_key = self.keys.current_counts(track, mode);
        let work_key = self.keys.current_work(track, mode);
        let hashrate = Command::zadd(
            self.keys.current_hashrate(track, mode),
            (now / 1000) as f64,
            encode(&sample),
        );
        let heartbeat = Command::hset(self.keys.workers(track, mode), worker, encode(&activity));
        let record_update = Command::hset(shares_key, worker, encode(&record));

        match (share_type, mode) {
            (ShareType::Valid, MiningMode::Solo) => vec![
                hashrate,
                record_update,
                Command::hincrby(work_key, worker, solo_work_delta(prior_work, work_increment)),
                heartbeat,
            ],
            (ShareType::Valid, MiningMode::Shared) => vec![
                hashrate,
                Command::hincrby(counts_key.clone(), "valid", 1),
                record_update,
                Command::hincrbyfloat(work_key, worker, work_increment),
                heartbeat,
                Command::hset(counts_key, "effort", record.effort.to_string()),
            ],
            (rejected, _) => vec![
                hashrate,
                Command::hincrby(counts_key, rejected.as_str(), 1),
                record_update,
                heartbeat,
            ],
        }
    }

    /// Continuous mining time in seconds after a share at `now`.
    ///
    /// The gap since the worker's previous share is added unless it reaches
    /// the configured threshold; the total never exceeds the age of the round.
    fn continuous_time(
        &self,
        last: Option<&WorkerShareRecord>,
        round_started: Option<u64>,
        now: u64,
    ) -> f64 {
        let last_time = last
            .map(|record| record.time)
            .filter(|time| *time > 0)
            .unwrap_or(now);
        let mut times = last.map(|record| record.times.max(0.0)).unwrap_or(0.0);

        let change = round_to(now.saturating_sub(last_time) as f64 / 1000.0, 4);
        if change < self.continuous_gap_secs {
            times += change;
        }

        if let Some(started) = round_started {
            let round_secs = now.saturating_sub(started) as f64 / 1000.0;
            if times > round_secs {
                times = round_secs;
            }
        }
        times
    }
}

/// Integer step of the solo work counter that keeps it equal to the rounded
/// cumulative work, so fractional difficulties are never dropped.
fn solo_work_delta(prior_work: f64, increment: f64) -> i64 {
    ((prior_work + increment).round() - prior_work.round()) as i64
}

/// JSON encoding of a stored record.
pub(crate) fn encode<T: serde::Serialize>(value: &T) -> String {
    // Records are plain structs of strings and numbers and always serialize.
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::PriorShares;
    use crate::types::{BlockType, RoundAnchor};

    const NOW: u64 = 1_700_000_000_000;

    fn share(worker: &str, height: u64, difficulty: f64) -> ShareData {
        ShareData {
            height,
            difficulty,
            share_diff: difficulty,
            block_diff_primary: 1000.0,
            block_diff_auxiliary: 200.0,
            addr_primary: worker.to_string(),
            addr_auxiliary: format!("aux-{}", worker),
            ip: "::ffff:10.0.0.7".to_string(),
            identifier: Some("eu".to_string()),
            block_type: BlockType::Share,
            port: None,
            hash: None,
            reward: None,
            transaction: None,
            smartnode_reward: None,
            founder_reward: None,
        }
    }

    fn engine() -> ShareEngine {
        ShareEngine::new(KeySpace::new("pool"))
    }

    fn written_record(commands: &[Command], key: &str, worker: &str) -> WorkerShareRecord {
        commands
            .iter()
            .find_map(|command| match command {
                Command::HSet { key: k, field, value } if k == key && field == worker => {
                    Some(serde_json::from_str(value).unwrap())
                }
                _ => None,
            })
            .expect("record written")
    }

    fn prior_with(track: Track, mode: MiningMode, record: WorkerShareRecord) -> PriorState {
        let mut shares = PriorShares::new();
        shares.insert(record.worker.clone(), record);
        PriorState::default().with_shares(track, mode, shares)
    }

    #[test]
    fn test_first_valid_shared_share() {
        let mut session = AccountingSession::new("pool");
        let commands = engine().build_share_commands(
            &mut session,
            &PriorState::default(),
            &share("abc.1", 500, 10.0),
            ShareType::Valid,
            Track::Primary,
            MiningMode::Shared,
            NOW,
        );

        assert_eq!(commands.len(), 6);
        let record = written_record(&commands, "pool:rounds:primary:current:shared:shares", "abc.1");
        assert_eq!(record.work, 10.0);
        assert_eq!(record.effort, 1.0);
        assert_eq!(record.types, TypeCounts { valid: 1, invalid: 0, stale: 0 });
        assert_eq!(record.share_type, Some(ShareType::Valid));
        assert_eq!(record.identifier, "eu");
        assert!(commands.contains(&Command::hincrby(
            "pool:rounds:primary:current:shared:counts",
            "valid",
            1
        )));
        assert!(commands.contains(&Command::hincrbyfloat(
            "pool:rounds:primary:current:shared:work",
            "abc.1",
            10.0
        )));
        assert!(commands.contains(&Command::hset(
            "pool:rounds:primary:current:shared:counts",
            "effort",
            "1"
        )));

        let activity = commands
            .iter()
            .find_map(|command| match command {
                Command::HSet { key, value, .. } if key == "pool:workers:primary:shared" => {
                    Some(serde_json::from_str::<WorkerActivity>(value).unwrap())
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(activity.ip, "10.0.0.7");
        assert_eq!(activity.time, NOW / 1000);
        assert!(!activity.offline);
    }

    #[test]
    fn test_second_valid_share_accumulates() {
        let mut session = AccountingSession::new("pool");
        let previous = WorkerShareRecord {
            time: NOW - 2_000,
            work: 10.0,
            times: 5.0,
            types: TypeCounts { valid: 1, invalid: 0, stale: 0 },
            round: RoundTag::Height(500),
            worker: "abc.1".to_string(),
            ..Default::default()
        };
        let prior = prior_with(Track::Primary, MiningMode::Shared, previous);

        let commands = engine().build_share_commands(
            &mut session,
            &prior,
            &share("abc.1", 500, 15.0),
            ShareType::Valid,
            Track::Primary,
            MiningMode::Shared,
            NOW,
        );
        let record = written_record(&commands, "pool:rounds:primary:current:shared:shares", "abc.1");
        assert_eq!(record.work, 25.0);
        assert_eq!(record.types.valid, 2);
        assert_eq!(record.effort, 2.5);
        assert_eq!(record.times, 7.0);
    }

    #[test]
    fn test_late_share_is_reclassified_stale() {
        let mut session = AccountingSession::new("pool");
        session.heights_mut(Track::Primary).observe(501);

        let commands = engine().build_share_commands(
            &mut session,
            &PriorState::default(),
            &share("abc.1", 499, 10.0),
            ShareType::Valid,
            Track::Primary,
            MiningMode::Shared,
            NOW,
        );
        let record = written_record(&commands, "pool:rounds:primary:current:shared:shares", "abc.1");
        assert_eq!(record.share_type, Some(ShareType::Stale));
        assert_eq!(record.work, 0.0);
        assert_eq!(record.types.stale, 1);
        assert!(commands.contains(&Command::hincrby(
            "pool:rounds:primary:current:shared:counts",
            "stale",
            1
        )));
        assert!(!commands
            .iter()
            .any(|command| matches!(command, Command::HIncrByFloat { .. })));
    }

    #[test]
    fn test_solo_share_is_never_reclassified() {
        let mut session = AccountingSession::new("pool");
        session.heights_mut(Track::Primary).observe(501);

        let commands = engine().build_share_commands(
            &mut session,
            &PriorState::default(),
            &share("xyz.1", 499, 12.0),
            ShareType::Valid,
            Track::Primary,
            MiningMode::Solo,
            NOW,
        );
        assert_eq!(commands.len(), 4);
        let record = written_record(&commands, "pool:rounds:primary:current:solo:shares", "xyz.1");
        assert_eq!(record.share_type, Some(ShareType::Valid));
        assert!(record.solo);
        assert!(commands.contains(&Command::hincrby(
            "pool:rounds:primary:current:solo:work",
            "xyz.1",
            12
        )));
    }

    #[test]
    fn test_invalid_share_keeps_work() {
        let mut session = AccountingSession::new("pool");
        let previous = WorkerShareRecord {
            time: NOW - 1_000,
            work: 40.0,
            worker: "abc.1".to_string(),
            ..Default::default()
        };
        let prior = prior_with(Track::Primary, MiningMode::Shared, previous);

        let commands = engine().build_share_commands(
            &mut session,
            &prior,
            &share("abc.1", 500, 10.0),
            ShareType::Invalid,
            Track::Primary,
            MiningMode::Shared,
            NOW,
        );
        assert_eq!(commands.len(), 4);
        let record = written_record(&commands, "pool:rounds:primary:current:shared:shares", "abc.1");
        assert_eq!(record.work, 40.0);
        assert_eq!(record.types.invalid, 1);
        assert_eq!(record.effort, 4.0);
    }

    #[test]
    fn test_overlapping_round_resets_worker() {
        let mut session = AccountingSession::new("pool");
        session.heights_mut(Track::Primary).close_round(500);
        let previous = WorkerShareRecord {
            time: NOW - 1_000,
            work: 400.0,
            times: 120.0,
            types: TypeCounts { valid: 40, invalid: 1, stale: 2 },
            worker: "abc.1".to_string(),
            ..Default::default()
        };
        let prior = prior_with(Track::Primary, MiningMode::Shared, previous);

        let commands = engine().build_share_commands(
            &mut session,
            &prior,
            &share("abc.1", 499, 10.0),
            ShareType::Stale,
            Track::Primary,
            MiningMode::Shared,
            NOW,
        );
        let record = written_record(&commands, "pool:rounds:primary:current:shared:shares", "abc.1");
        assert_eq!(record.times, 0.0);
        assert_eq!(record.work, 0.0);
        assert_eq!(record.effort, 1.0);
        assert_eq!(record.types, TypeCounts::default());
        assert!(!commands
            .iter()
            .any(|command| matches!(command, Command::HIncrByFloat { .. })));
    }

    #[test]
    fn test_continuous_time_ignores_long_gaps_and_caps_at_round_age() {
        let engine = engine();
        let previous = WorkerShareRecord {
            time: NOW - 1_000_000,
            times: 30.0,
            ..Default::default()
        };
        assert_eq!(engine.continuous_time(Some(&previous), None, NOW), 30.0);

        let recent = WorkerShareRecord {
            time: NOW - 10_000,
            times: 3_000.0,
            ..Default::default()
        };
        assert_eq!(
            engine.continuous_time(Some(&recent), Some(NOW - 60_000), NOW),
            60.0
        );
        assert_eq!(engine.continuous_time(None, None, NOW), 0.0);
    }

    #[test]
    fn test_round_anchor_caps_shared_times() {
        let mut session = AccountingSession::new("pool");
        let previous = WorkerShareRecord {
            time: NOW - 5_000,
            times: 500.0,
            worker: "abc.1".to_string(),
            ..Default::default()
        };
        let prior = prior_with(Track::Primary, MiningMode::Shared, previous).with_anchor(
            Track::Primary,
            RoundAnchor {
                block_time: Some(NOW - 20_000),
                height: Some(499),
            },
        );
        let commands = engine().build_share_commands(
            &mut session,
            &prior,
            &share("abc.1", 500, 1.0),
            ShareType::Valid,
            Track::Primary,
            MiningMode::Shared,
            NOW,
        );
        let record = written_record(&commands, "pool:rounds:primary:current:shared:shares", "abc.1");
        assert_eq!(record.times, 20.0);
    }

    #[test]
    fn test_auxiliary_track_is_accounted_independently() {
        let mut session = AccountingSession::new("pool");
        let commands = engine().build_shares_commands(
            &mut session,
            &PriorState::default(),
            &share("abc.1", 500, 10.0),
            ShareType::Valid,
            MiningMode::Shared,
            true,
            NOW,
        );
        assert_eq!(commands.len(), 12);
        let record = written_record(
            &commands,
            "pool:rounds:auxiliary:current:shared:shares",
            "aux-abc.1",
        );
        assert_eq!(record.effort, 5.0);
        assert_eq!(session.heights(Track::Auxiliary).current, 500);
    }

    #[test]
    fn test_hashrate_sample_carries_share_work_only() {
        let mut session = AccountingSession::new("pool");
        let previous = WorkerShareRecord {
            time: NOW - 1_000,
            work: 90.0,
            worker: "abc.1".to_string(),
            ..Default::default()
        };
        let prior = prior_with(Track::Primary, MiningMode::Shared, previous);
        let commands = engine().build_share_commands(
            &mut session,
            &prior,
            &share("abc.1", 500, 10.0),
            ShareType::Valid,
            Track::Primary,
            MiningMode::Shared,
            NOW,
        );
        let (score, sample) = commands
            .iter()
            .find_map(|command| match command {
                Command::ZAdd { score, member, .. } => Some((
                    *score,
                    serde_json::from_str::<WorkerShareRecord>(member).unwrap(),
                )),
                _ => None,
            })
            .unwrap();
        assert_eq!(score, (NOW / 1000) as f64);
        assert_eq!(sample.work, 10.0);
    }

    #[test]
    fn test_orphaned_record_joins_current_round() {
        let mut session = AccountingSession::new("pool");
        let previous = WorkerShareRecord {
            time: NOW - 1_000,
            work: 30.0,
            round: RoundTag::Label("orphan".to_string()),
            worker: "abc.1".to_string(),
            ..Default::default()
        };
        assert!(previous.round.is_orphan());
        let prior = prior_with(Track::Primary, MiningMode::Shared, previous);

        let commands = engine().build_share_commands(
            &mut session,
            &prior,
            &share("abc.1", 500, 10.0),
            ShareType::Valid,
            Track::Primary,
            MiningMode::Shared,
            NOW,
        );
        let record = written_record(&commands, "pool:rounds:primary:current:shared:shares", "abc.1");
        assert_eq!(record.round, RoundTag::Height(500));
        assert_eq!(record.work, 40.0);
    }

    #[test]
    fn test_solo_work_counter_follows_fractional_work() {
        assert_eq!(solo_work_delta(0.0, 0.4), 0);
        assert_eq!(solo_work_delta(0.4, 0.4), 1);
        assert_eq!(solo_work_delta(0.8, 0.4), 0);
        assert_eq!(solo_work_delta(10.0, 12.0), 12);

        let mut session = AccountingSession::new("pool");
        let previous = WorkerShareRecord {
            time: NOW - 1_000,
            work: 1.3,
            solo: true,
            worker: "xyz.1".to_string(),
            ..Default::default()
        };
        let prior = prior_with(Track::Primary, MiningMode::Solo, previous);
        let commands = engine().build_share_commands(
            &mut session,
            &prior,
            &share("xyz.1", 500, 0.4),
            ShareType::Valid,
            Track::Primary,
            MiningMode::Solo,
            NOW,
        );
        assert!(commands.contains(&Command::hincrby(
            "pool:rounds:primary:current:solo:work",
            "xyz.1",
            1
        )));
    }
}
