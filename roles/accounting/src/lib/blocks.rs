//! Round and block accounting.
//!
//! A valid shared block closes the round of its track: the open round's keys
//! are renamed to the block height in the same batch as the block record, so
//! readers never see a half-closed round. A valid solo block only rewards the
//! discovering miner and resets that miner's workers.

use tracing::debug;

use crate::{
    effort::compute_effort,
    keys::KeySpace,
    session::AccountingSession,
    shares::encode,
    snapshot::PriorState,
    state_store::Command,
    types::{
        BlockRecord, MiningMode, RoundTag, ShareData, ShareType, TypeCounts, WorkerActivity,
        WorkerShareRecord,
    },
    utils::{base_address, strip_port},
};

/// What a submission meant for the block ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Not a block, or a block submission without a transaction.
    None,
    Found,
    /// The daemon rejected a submitted block.
    Rejected,
    /// A valid shared block for a round that is already closed. Nothing is
    /// written so the archived round stays as it was.
    AlreadyClosed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockCommands {
    pub commands: Vec<Command>,
    /// A shared round was closed and a round update is due.
    pub round_closed: bool,
    pub outcome: BlockOutcome,
}

impl BlockCommands {
    fn none() -> Self {
        Self {
            commands: Vec::new(),
            round_closed: false,
            outcome: BlockOutcome::None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlockEngine {
    keys: KeySpace,
}

impl BlockEngine {
    pub fn new(keys: KeySpace) -> Self {
        Self { keys }
    }

    /// Commands recording the block outcome of a submission.
    ///
    /// `share_type` is the upstream verdict and `now` is in milliseconds.
    #[allow(clippy::too_many_arguments)]
    pub fn build_block_commands(
        &self,
        session: &mut AccountingSession,
        prior: &PriorState,
        share: &ShareData,
        share_type: ShareType,
        block_valid: bool,
        mode: MiningMode,
        now: u64,
    ) -> BlockCommands {
        let track = share.block_type.track();

        if !block_valid {
            if !share.has_transaction() {
                return BlockCommands::none();
            }
            return BlockCommands {
                commands: vec![Command::hincrby(
                    self.keys.blocks_counts(track),
                    "invalid",
                    1,
                )],
                round_closed: false,
                outcome: BlockOutcome::Rejected,
            };
        }

        if mode == MiningMode::Shared {
            let closed = session
                .heights(track)
                .minimum
                .max(prior.anchor(track).height.unwrap_or(0));
            if share.height <= closed {
                return BlockCommands {
                    commands: Vec::new(),
                    round_closed: false,
                    outcome: BlockOutcome::AlreadyClosed,
                };
            }
        }

        let worker = share.worker(track);
        let block_difficulty = share.block_difficulty(track);
        let prior_shares = prior.shares(track, mode);
        let last = prior_shares.get(worker);
        let difficulty = if share_type.is_valid() {
            share.difficulty
        } else {
            0.0
        };
        let luck = compute_effort(
            prior_shares,
            worker,
            share.difficulty,
            share_type,
            block_difficulty,
            mode,
        );

        let block = BlockRecord {
            time: now,
            height: share.height,
            hash: share.hash.clone(),
            reward: share.reward,
            node_reward: share.smartnode_reward,
            founder_reward: share.founder_reward,
            identifier: share.identifier().to_string(),
            transaction: share.transaction.clone(),
            difficulty: block_difficulty,
            luck,
            worker: worker.to_string(),
            solo: mode.is_solo(),
            round: share.height,
        };
        let pending = Command::sadd(self.keys.blocks_pending(track), encode(&block));
        let found = Command::hincrby(self.keys.blocks_counts(track), "valid", 1);

        match mode {
            MiningMode::Shared => {
                session.heights_mut(track).close_round(share.height);
                let previous = self.keys.current_previous(track, mode);
                let commands = vec![
                    pending,
                    Command::hset(previous.clone(), "blockTime", now.to_string()),
                    Command::hset(previous, "height", share.height.to_string()),
                    found,
                    Command::rename(
                        self.keys.current_counts(track, mode),
                        self.keys.round_counts(track, share.height),
                    ),
                    Command::rename(
                        self.keys.current_shares(track, mode),
                        self.keys.round_shares(track, share.height),
                    ),
                    Command::rename(
                        self.keys.current_work(track, mode),
                        self.keys.round_work(track, share.height),
                    ),
                ];
                BlockCommands {
                    commands,
                    round_closed: true,
                    outcome: BlockOutcome::Found,
                }
            }
            MiningMode::Solo => {
                let archived = WorkerShareRecord {
                    time: now,
                    effort: luck,
                    identifier: share.identifier().to_string(),
                    round: RoundTag::Height(share.height),
                    solo: true,
                    times: last.map(|record| record.times).unwrap_or(0.0),
                    types: last.map(|record| record.types).unwrap_or_default(),
                    share_type: None,
                    work: last.map(|record| record.work.max(0.0)).unwrap_or(0.0) + difficulty,
                    worker: worker.to_string(),
                };
                let mut commands = vec![
                    pending,
                    found,
                    Command::hset(
                        self.keys.round_shares(track, share.height),
                        worker,
                        encode(&archived),
                    ),
                ];

                let address = base_address(worker);
                let mut reset: Vec<&str> = prior_shares
                    .keys()
                    .map(String::as_str)
                    .filter(|name| base_address(name) == address)
                    .collect();
                if !reset.contains(&worker) {
                    reset.push(worker);
                }
                reset.sort_unstable();
                debug!("Resetting {} solo workers of {}", reset.len(), address);

                for name in reset {
                    let fresh = WorkerShareRecord {
                        time: now,
                        effort: 0.0,
                        identifier: share.identifier().to_string(),
                        round: RoundTag::Height(share.height),
                        solo: true,
                        times: 0.0,
                        types: TypeCounts::default(),
                        share_type: None,
                        work: 0.0,
                        worker: name.to_string(),
                    };
                    commands.push(Command::hset(
                        self.keys.current_shares(track, mode),
                        name,
                        encode(&fresh),
                    ));
                    commands.push(Command::hset(self.keys.current_work(track, mode), name, "0"));
                }

                let activity = WorkerActivity {
                    time: now / 1000,
                    worker: worker.to_string(),
                    ip: strip_port(&share.ip).to_string(),
                    offline: false,
                };
                commands.push(Command::hset(
                    self.keys.workers(track, mode),
                    worker,
                    encode(&activity),
                ));

                BlockCommands {
                    commands,
                    round_closed: false,
                    outcome: BlockOutcome::Found,
                }
            }
        }
    }
}
