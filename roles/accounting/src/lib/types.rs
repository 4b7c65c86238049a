//! Data types for share, round and block accounting.
//!
//! Records stored in the state store are JSON encoded with the field names
//! the pool's API readers expect (`camelCase` where the stratum layer uses it).

use serde::{Deserialize, Serialize};

use crate::{error::AccountingResult, utils::lenient_f64};

/// One of the two coins a merge-mining pool accounts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Track {
    Primary,
    Auxiliary,
}

impl Track {
    pub const ALL: [Track; 2] = [Track::Primary, Track::Auxiliary];

    pub fn as_str(&self) -> &'static str {
        match self {
            Track::Primary => "primary",
            Track::Auxiliary => "auxiliary",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Track::Primary => 0,
            Track::Auxiliary => 1,
        }
    }
}

/// Solo vs shared attribution within a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MiningMode {
    Shared,
    Solo,
}

impl MiningMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MiningMode::Shared => "shared",
            MiningMode::Solo => "solo",
        }
    }

    pub fn is_solo(&self) -> bool {
        matches!(self, MiningMode::Solo)
    }
}

/// What the stratum layer believes the submission was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Share,
    Primary,
    Auxiliary,
}

impl BlockType {
    /// Plain shares are accounted on the primary track.
    pub fn track(&self) -> Track {
        match self {
            BlockType::Share | BlockType::Primary => Track::Primary,
            BlockType::Auxiliary => Track::Auxiliary,
        }
    }
}

/// Validity of a share as classified upstream (and possibly downgraded here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareType {
    Valid,
    Invalid,
    Stale,
}

impl ShareType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareType::Valid => "valid",
            ShareType::Invalid => "invalid",
            ShareType::Stale => "stale",
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ShareType::Valid)
    }
}

/// Share or block event delivered by the stratum layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareData {
    pub height: u64,
    /// Difficulty the share was submitted at
    pub difficulty: f64,
    /// Network-comparable difficulty of the submitted hash
    #[serde(default)]
    pub share_diff: f64,
    pub block_diff_primary: f64,
    #[serde(default)]
    pub block_diff_auxiliary: f64,
    pub addr_primary: String,
    #[serde(default)]
    pub addr_auxiliary: String,
    pub ip: String,
    /// Pool region tag
    #[serde(default)]
    pub identifier: Option<String>,
    pub block_type: BlockType,
    /// Stratum port the worker is connected to
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub reward: Option<f64>,
    #[serde(default)]
    pub transaction: Option<String>,
    #[serde(default)]
    pub smartnode_reward: Option<f64>,
    #[serde(default)]
    pub founder_reward: Option<f64>,
}

impl ShareData {
    /// Worker identity used on `track`.
    pub fn worker(&self, track: Track) -> &str {
        match track {
            Track::Primary => &self.addr_primary,
            Track::Auxiliary => &self.addr_auxiliary,
        }
    }

    /// Block difficulty of the coin on `track`.
    pub fn block_difficulty(&self, track: Track) -> f64 {
        match track {
            Track::Primary => self.block_diff_primary,
            Track::Auxiliary => self.block_diff_auxiliary,
        }
    }

    pub fn identifier(&self) -> &str {
        self.identifier.as_deref().unwrap_or("")
    }

    /// Whether a block submission carried a transaction id.
    pub fn has_transaction(&self) -> bool {
        self.transaction.as_deref().is_some_and(|tx| !tx.is_empty())
    }
}

/// A share event together with its upstream verdicts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareEvent {
    pub share_data: ShareData,
    pub share_type: ShareType,
    #[serde(default)]
    pub block_valid: bool,
}

impl ShareEvent {
    /// Decodes one event as the stratum layer emits it.
    pub fn from_json(raw: &str) -> AccountingResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Per-worker counters of share outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCounts {
    #[serde(default)]
    pub valid: u64,
    #[serde(default)]
    pub invalid: u64,
    #[serde(default)]
    pub stale: u64,
}

impl TypeCounts {
    pub fn increment(&mut self, share_type: ShareType) {
        match share_type {
            ShareType::Valid => self.valid += 1,
            ShareType::Invalid => self.invalid += 1,
            ShareType::Stale => self.stale += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.valid + self.invalid + self.stale
    }
}

/// Round a worker record belongs to.
///
/// Older writers mark records of orphaned rounds with the label `orphan`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoundTag {
    Height(u64),
    Label(String),
}

impl RoundTag {
    pub fn is_orphan(&self) -> bool {
        matches!(self, RoundTag::Label(label) if label == "orphan")
    }
}

impl Default for RoundTag {
    fn default() -> Self {
        RoundTag::Height(0)
    }
}

/// A worker's state within the current round of one track and mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerShareRecord {
    /// Last submission, milliseconds since the epoch
    pub time: u64,
    #[serde(deserialize_with = "lenient_f64")]
    pub effort: f64,
    pub identifier: String,
    pub round: RoundTag,
    pub solo: bool,
    /// Continuous mining time in seconds
    #[serde(deserialize_with = "lenient_f64")]
    pub times: f64,
    pub types: TypeCounts,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub share_type: Option<ShareType>,
    /// Difficulty-weighted share count
    #[serde(deserialize_with = "lenient_f64")]
    pub work: f64,
    pub worker: String,
}

/// Liveness heartbeat of a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerActivity {
    /// Seconds since the epoch
    pub time: u64,
    pub worker: String,
    pub ip: String,
    pub offline: bool,
}

/// A block the pool submitted and the daemon accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRecord {
    pub time: u64,
    pub height: u64,
    pub hash: Option<String>,
    pub reward: Option<f64>,
    pub node_reward: Option<f64>,
    pub founder_reward: Option<f64>,
    pub identifier: String,
    pub transaction: Option<String>,
    pub difficulty: f64,
    /// Round effort at the moment of discovery
    pub luck: f64,
    pub worker: String,
    pub solo: bool,
    pub round: u64,
}

/// Anchor of the currently open shared round, written when the previous one
/// closed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RoundAnchor {
    /// Milliseconds since the epoch
    pub block_time: Option<u64>,
    pub height: Option<u64>,
}

/// Notification sent to the host process when a shared round closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundUpdate {
    pub pool: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl RoundUpdate {
    pub fn new(pool: impl Into<String>) -> Self {
        Self {
            pool: pool.into(),
            kind: "roundUpdate".to_string(),
        }
    }
}
