//! Share event processing pipeline.
//!
//! For every event the processor reads the prior round state in one batch,
//! lets the share and block engines decide what to write, and applies all of
//! it as one atomic batch.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::{
    blocks::{BlockCommands, BlockEngine, BlockOutcome},
    config::{AccountingConfig, ConsistencyMode},
    error::AccountingResult,
    keys::KeySpace,
    session::{AccountingSession, RoundHeights},
    shares::ShareEngine,
    snapshot::PriorState,
    state_store::StateStore,
    types::{MiningMode, RoundUpdate, ShareData, ShareEvent, ShareType, Track},
    utils::now_millis,
};

/// Result of one accounted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventOutcome {
    pub mode: MiningMode,
    pub block: BlockOutcome,
    pub round_closed: bool,
    /// Number of commands in the committed write batch
    pub commands: usize,
}

pub struct ShareProcessor<S: StateStore> {
    store: Arc<S>,
    config: AccountingConfig,
    keys: KeySpace,
    share_engine: ShareEngine,
    block_engine: BlockEngine,
    session: Mutex<AccountingSession>,
    serial: Mutex<()>,
    round_updates: broadcast::Sender<RoundUpdate>,
}

impl<S: StateStore> ShareProcessor<S> {
    pub fn new(store: Arc<S>, config: AccountingConfig) -> Self {
        let keys = KeySpace::new(config.pool.clone());
        let (round_updates, _) = broadcast::channel::<RoundUpdate>(100);
        Self {
            store,
            share_engine: ShareEngine::new(keys.clone())
                .with_continuous_gap(config.continuous_gap_secs),
            block_engine: BlockEngine::new(keys.clone()),
            session: Mutex::new(AccountingSession::new(config.pool.clone())),
            serial: Mutex::new(()),
            keys,
            config,
            round_updates,
        }
    }

    pub fn config(&self) -> &AccountingConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Receiver of the notifications sent whenever a shared round closes.
    pub fn subscribe_round_updates(&self) -> broadcast::Receiver<RoundUpdate> {
        self.round_updates.subscribe()
    }

    pub async fn heights(&self, track: Track) -> RoundHeights {
        self.session.lock().await.heights(track)
    }

    pub async fn handle_event(&self, event: &ShareEvent) -> AccountingResult<EventOutcome> {
        self.handle_share(&event.share_data, event.share_type, event.block_valid)
            .await
    }

    pub async fn handle_share(
        &self,
        share: &ShareData,
        share_type: ShareType,
        block_valid: bool,
    ) -> AccountingResult<EventOutcome> {
        self.handle_share_at(share, share_type, block_valid, now_millis())
            .await
    }

    /// Accounts one event as if it arrived at `now` (milliseconds).
    pub async fn handle_share_at(
        &self,
        share: &ShareData,
        share_type: ShareType,
        block_valid: bool,
        now: u64,
    ) -> AccountingResult<EventOutcome> {
        let _serial = match self.config.consistency {
            ConsistencyMode::Serialized => Some(self.serial.lock().await),
            ConsistencyMode::LastWriteWins => None,
        };
        let mode = self.config.mode_for(share.port);

        let replies = self
            .store
            .execute(PriorState::lookups(&self.keys))
            .await
            .map_err(|e| {
                error!("Failed to read round state for {}: {}", share.addr_primary, e);
                e
            })?;
        let prior = PriorState::from_replies(replies);

        let (mut commands, blocks) = {
            let mut session = self.session.lock().await;
            let commands = self.share_engine.build_shares_commands(
                &mut session,
                &prior,
                share,
                share_type,
                mode,
                self.config.auxiliary_enabled,
                now,
            );
            let blocks = self.block_engine.build_block_commands(
                &mut session,
                &prior,
                share,
                share_type,
                block_valid,
                mode,
                now,
            );
            (commands, blocks)
        };
        let BlockCommands {
            commands: block_commands,
            round_closed,
            outcome,
        } = blocks;
        commands.extend(block_commands);
        let batch_size = commands.len();

        self.store.execute(commands).await.map_err(|e| {
            error!("Failed to account share from {}: {}", share.addr_primary, e);
            e
        })?;

        if round_closed {
            info!(
                "Closed {} round at height {}",
                share.block_type.track().as_str(),
                share.height
            );
            // Nobody listening is not an error.
            let _ = self.round_updates.send(RoundUpdate::new(self.keys.pool()));
        }
        log_outcome(share, share_type, outcome);

        Ok(EventOutcome {
            mode,
            block: outcome,
            round_closed,
            commands: batch_size,
        })
    }
}

fn log_outcome(share: &ShareData, share_type: ShareType, outcome: BlockOutcome) {
    let track = share.block_type.track();
    let worker = share.worker(track);
    let hash = share.hash.as_deref().unwrap_or("");
    match outcome {
        BlockOutcome::Found => info!(
            "{} block found: {} by {}",
            capitalized(track),
            hash,
            worker
        ),
        BlockOutcome::Rejected => error!(
            "{} block rejected by the daemon: {} by {}",
            capitalized(track),
            hash,
            worker
        ),
        BlockOutcome::AlreadyClosed => warn!(
            "{} round {} is already closed, ignoring repeated block {} by {}",
            capitalized(track),
            share.height,
            hash,
            worker
        ),
        BlockOutcome::None => {}
    }
    if share_type.is_valid() {
        debug!(
            "Share accepted at difficulty {}/{} by {} [{}]",
            share.difficulty, share.share_diff, share.addr_primary, share.ip
        );
    } else {
        debug!(
            "Share rejected ({}) by {} [{}]",
            share_type.as_str(),
            share.addr_primary,
            share.ip
        );
    }
}

fn capitalized(track: Track) -> &'static str {
    match track {
        Track::Primary => "Primary",
        Track::Auxiliary => "Auxiliary",
    }
}
