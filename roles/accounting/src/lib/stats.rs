//! Read side of the round state: hashrate and round summaries.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use serde::Serialize;
use tracing::debug;

use crate::{
    config::AccountingConfig,
    error::AccountingResult,
    keys::KeySpace,
    snapshot::decode_shares,
    state_store::{Command, StateStore},
    types::{MiningMode, Track, TypeCounts, WorkerShareRecord},
    utils::{base_address, parse_work_value},
};

/// State of the open round of one track and mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoundSummary {
    pub counts: TypeCounts,
    pub effort: f64,
    /// Sum of the workers' cumulative work
    pub work: f64,
    pub workers: usize,
    pub miners: usize,
}

pub struct StatsReader<S: StateStore> {
    store: Arc<S>,
    keys: KeySpace,
    window_secs: u64,
    multiplier: f64,
}

impl<S: StateStore> StatsReader<S> {
    pub fn new(store: Arc<S>, config: &AccountingConfig) -> Self {
        Self {
            store,
            keys: KeySpace::new(config.pool.clone()),
            window_secs: config.hashrate_window_secs,
            multiplier: config.hashrate_multiplier,
        }
    }

    async fn samples(
        &self,
        track: Track,
        mode: MiningMode,
        now_secs: u64,
    ) -> AccountingResult<Vec<WorkerShareRecord>> {
        let min = now_secs.saturating_sub(self.window_secs) as f64;
        let members = self
            .store
            .execute(vec![Command::ZRangeByScore {
                key: self.keys.current_hashrate(track, mode),
                min,
                max: now_secs as f64,
            }])
            .await?
            .into_iter()
            .next()
            .map(|reply| reply.into_members())
            .unwrap_or_default();

        Ok(members
            .iter()
            .filter_map(|member| match serde_json::from_str(member) {
                Ok(sample) => Some(sample),
                Err(e) => {
                    debug!("Skipping unreadable hashrate sample: {}", e);
                    None
                }
            })
            .collect())
    }

    /// Hashes per second over the configured window.
    pub async fn hashrate(
        &self,
        track: Track,
        mode: MiningMode,
        now_secs: u64,
    ) -> AccountingResult<f64> {
        let samples = self.samples(track, mode, now_secs).await?;
        Ok(self.rate(samples.iter().map(|sample| sample.work).sum()))
    }

    /// Hashrate over the configured window, per pool region.
    pub async fn hashrate_by_identifier(
        &self,
        track: Track,
        mode: MiningMode,
        now_secs: u64,
    ) -> AccountingResult<HashMap<String, f64>> {
        let mut work: HashMap<String, f64> = HashMap::new();
        for sample in self.samples(track, mode, now_secs).await? {
            *work.entry(sample.identifier).or_default() += sample.work;
        }
        Ok(work
            .into_iter()
            .map(|(identifier, work)| (identifier, self.rate(work)))
            .collect())
    }

    pub async fn round_summary(
        &self,
        track: Track,
        mode: MiningMode,
    ) -> AccountingResult<RoundSummary> {
        let mut replies = self
            .store
            .execute(vec![
                Command::hgetall(self.keys.current_counts(track, mode)),
                Command::hgetall(self.keys.current_shares(track, mode)),
            ])
            .await?
            .into_iter();
        let counts = replies.next().map(|r| r.into_hash()).unwrap_or_default();
        let shares = decode_shares(replies.next().map(|r| r.into_hash()).unwrap_or_default());

        let field = |name: &str| {
            counts
                .get(name)
                .map(|value| parse_work_value(value).max(0.0) as u64)
                .unwrap_or(0)
        };
        Ok(RoundSummary {
            counts: TypeCounts {
                valid: field("valid"),
                invalid: field("invalid"),
                stale: field("stale"),
            },
            effort: counts
                .get("effort")
                .map(|value| parse_work_value(value))
                .unwrap_or(0.0),
            work: shares.values().map(|record| record.work.max(0.0)).sum(),
            workers: shares.len(),
            miners: count_miners(shares.keys().map(String::as_str)),
        })
    }

    fn rate(&self, work: f64) -> f64 {
        if self.window_secs == 0 {
            return 0.0;
        }
        self.multiplier * work / self.window_secs as f64
    }
}

/// Number of distinct miners among `address.worker` names.
pub fn count_miners<'a>(workers: impl IntoIterator<Item = &'a str>) -> usize {
    workers
        .into_iter()
        .map(base_address)
        .collect::<BTreeSet<_>>()
        .len()
}
