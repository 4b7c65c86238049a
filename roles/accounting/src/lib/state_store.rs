//! Trait interface for the shared key-value state store.
//!
//! The accounting engines never touch the store directly: they emit
//! [`Command`]s, and the orchestrator submits them as one batch through
//! [`StateStore::execute`].

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::StoreResult;

/// One operation of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Read every field of a hash (empty when the key does not exist)
    HGetAll { key: String },
    /// Overwrite one hash field
    HSet {
        key: String,
        field: String,
        value: String,
    },
    /// Add an integer to a hash field
    HIncrBy {
        key: String,
        field: String,
        delta: i64,
    },
    /// Add a float to a hash field
    HIncrByFloat {
        key: String,
        field: String,
        delta: f64,
    },
    /// Insert or re-score a sorted set member
    ZAdd {
        key: String,
        score: f64,
        member: String,
    },
    /// Members of a sorted set with `min <= score <= max`, lowest score first
    ZRangeByScore { key: String, min: f64, max: f64 },
    /// Add a member to a set
    SAdd { key: String, member: String },
    /// All members of a set
    SMembers { key: String },
    /// Move a key's value to another key, replacing the destination
    Rename { from: String, to: String },
    /// Whether a key holds a value
    Exists { key: String },
}

impl Command {
    pub fn hset(key: impl Into<String>, field: impl Into<String>, value: impl Into<String>) -> Self {
        Command::HSet {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn hincrby(key: impl Into<String>, field: impl Into<String>, delta: i64) -> Self {
        Command::HIncrBy {
            key: key.into(),
            field: field.into(),
            delta,
        }
    }

    pub fn hincrbyfloat(key: impl Into<String>, field: impl Into<String>, delta: f64) -> Self {
        Command::HIncrByFloat {
            key: key.into(),
            field: field.into(),
            delta,
        }
    }

    pub fn hgetall(key: impl Into<String>) -> Self {
        Command::HGetAll { key: key.into() }
    }

    pub fn zadd(key: impl Into<String>, score: f64, member: impl Into<String>) -> Self {
        Command::ZAdd {
            key: key.into(),
            score,
            member: member.into(),
        }
    }

    pub fn sadd(key: impl Into<String>, member: impl Into<String>) -> Self {
        Command::SAdd {
            key: key.into(),
            member: member.into(),
        }
    }

    pub fn rename(from: impl Into<String>, to: impl Into<String>) -> Self {
        Command::Rename {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Whether the command leaves the store untouched.
    pub fn is_read(&self) -> bool {
        matches!(
            self,
            Command::HGetAll { .. }
                | Command::ZRangeByScore { .. }
                | Command::SMembers { .. }
                | Command::Exists { .. }
        )
    }
}

/// Result of one command, in batch order.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ok,
    Integer(i64),
    Float(f64),
    Hash(HashMap<String, String>),
    Members(Vec<String>),
}

impl Reply {
    /// The hash carried by an `HGetAll` reply, empty for anything else.
    pub fn into_hash(self) -> HashMap<String, String> {
        match self {
            Reply::Hash(hash) => hash,
            _ => HashMap::new(),
        }
    }

    /// The members carried by a set or sorted set read.
    pub fn into_members(self) -> Vec<String> {
        match self {
            Reply::Members(members) => members,
            _ => Vec::new(),
        }
    }
}

/// Trait defining the interface for state store backends.
///
/// `execute` must be all-or-nothing: either every command of the batch is
/// applied, or the store is left as it was and an error is returned.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Prepare the backend for use
    async fn initialize(&self) -> StoreResult<()>;

    /// Release the backend; later batches fail with `BackendUnavailable`
    async fn close(&self) -> StoreResult<()>;

    /// Apply a batch atomically and return one reply per command
    async fn execute(&self, commands: Vec<Command>) -> StoreResult<Vec<Reply>>;

    /// Health check for the storage backend
    async fn health_check(&self) -> StoreResult<StoreHealth>;
}

/// Storage backend health information
#[derive(Debug, Clone)]
pub struct StoreHealth {
    pub is_healthy: bool,
    pub backend_type: String,
    pub key_count: usize,
    pub last_operation_timestamp: Option<u64>,
    pub error_message: Option<String>,
}
