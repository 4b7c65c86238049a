//! In-memory state store backend for testing and development.
//!
//! This backend keeps every key in a single map guarded by an async RwLock.
//! Batches are applied to a staging overlay first and only merged into the map
//! when every command succeeded, which makes each batch atomic with respect to
//! concurrent readers and writers.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    error::{StoreError, StoreResult},
    state_store::{Command, Reply, StateStore, StoreHealth},
};

/// A value held under one key.
#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Hash(HashMap<String, String>),
    SortedSet(HashMap<String, f64>),
    Set(BTreeSet<String>),
}

/// In-memory implementation of StateStore.
///
/// All data is lost when the process stops.
pub struct MemoryStore {
    data: RwLock<HashMap<String, Entry>>,
    last_operation_timestamp: RwLock<Option<u64>>,
    open: AtomicBool,
}

impl MemoryStore {
    /// Create a new, empty MemoryStore
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            last_operation_timestamp: RwLock::new(None),
            open: AtomicBool::new(true),
        }
    }

    async fn update_last_operation_timestamp(&self) {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        *self.last_operation_timestamp.write().await = Some(timestamp);
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::BackendUnavailable)
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Pending changes of one batch on top of the committed map.
struct Staging<'a> {
    base: &'a HashMap<String, Entry>,
    overlay: HashMap<String, Option<Entry>>,
}

impl<'a> Staging<'a> {
    fn new(base: &'a HashMap<String, Entry>) -> Self {
        Self {
            base,
            overlay: HashMap::new(),
        }
    }

    fn get(&self, key: &str) -> Option<&Entry> {
        match self.overlay.get(key) {
            Some(staged) => staged.as_ref(),
            None => self.base.get(key),
        }
    }

    fn slot(&mut self, key: &str) -> &mut Option<Entry> {
        let base = self.base;
        self.overlay
            .entry(key.to_string())
            .or_insert_with(|| base.get(key).cloned())
    }

    fn hash_mut(&mut self, key: &str) -> StoreResult<&mut HashMap<String, String>> {
        match self.slot(key).get_or_insert_with(|| Entry::Hash(HashMap::new())) {
            Entry::Hash(hash) => Ok(hash),
            _ => Err(wrong_type(key, "hash")),
        }
    }

    fn apply(&mut self, command: Command) -> StoreResult<Reply> {
        match command {
            Command::HGetAll { key } => match self.get(&key) {
                None => Ok(Reply::Hash(HashMap::new())),
                Some(Entry::Hash(hash)) => Ok(Reply::Hash(hash.clone())),
                Some(_) => Err(wrong_type(&key, "hash")),
            },
            Command::HSet { key, field, value } => {
                let created = self.hash_mut(&key)?.insert(field, value).is_none();
                Ok(Reply::Integer(created as i64))
            }
            Command::HIncrBy { key, field, delta } => {
                let hash = self.hash_mut(&key)?;
                let current = match hash.get(&field) {
                    None => 0,
                    Some(raw) => raw.parse::<i64>().map_err(|_| StoreError::NotANumber {
                        key: key.clone(),
                        field: field.clone(),
                    })?,
                };
                let updated = current.saturating_add(delta);
                hash.insert(field, updated.to_string());
                Ok(Reply::Integer(updated))
            }
            Command::HIncrByFloat { key, field, delta } => {
                let hash = self.hash_mut(&key)?;
                let current = match hash.get(&field) {
                    None => 0.0,
                    Some(raw) => raw.parse::<f64>().map_err(|_| StoreError::NotANumber {
                        key: key.clone(),
                        field: field.clone(),
                    })?,
                };
                let updated = current + delta;
                hash.insert(field, updated.to_string());
                Ok(Reply::Float(updated))
            }
            Command::ZAdd { key, score, member } => {
                let slot = self.slot(&key);
                match slot.get_or_insert_with(|| Entry::SortedSet(HashMap::new())) {
                    Entry::SortedSet(set) => {
                        let added = set.insert(member, score).is_none();
                        Ok(Reply::Integer(added as i64))
                    }
                    _ => Err(wrong_type(&key, "sorted set")),
                }
            }
            Command::ZRangeByScore { key, min, max } => match self.get(&key) {
                None => Ok(Reply::Members(Vec::new())),
                Some(Entry::SortedSet(set)) => {
                    let mut members: Vec<(&String, f64)> = set
                        .iter()
                        .filter(|(_, score)| **score >= min && **score <= max)
                        .map(|(member, score)| (member, *score))
                        .collect();
                    members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
                    Ok(Reply::Members(
                        members.into_iter().map(|(member, _)| member.clone()).collect(),
                    ))
                }
                Some(_) => Err(wrong_type(&key, "sorted set")),
            },
            Command::SAdd { key, member } => {
                let slot = self.slot(&key);
                match slot.get_or_insert_with(|| Entry::Set(BTreeSet::new())) {
                    Entry::Set(set) => Ok(Reply::Integer(set.insert(member) as i64)),
                    _ => Err(wrong_type(&key, "set")),
                }
            }
            Command::SMembers { key } => match self.get(&key) {
                None => Ok(Reply::Members(Vec::new())),
                Some(Entry::Set(set)) => Ok(Reply::Members(set.iter().cloned().collect())),
                Some(_) => Err(wrong_type(&key, "set")),
            },
            Command::Rename { from, to } => {
                // A round that never saw a write of this kind has nothing to
                // archive; the rename is skipped rather than failing the batch.
                let moved = self.slot(&from).take();
                if let Some(entry) = moved {
                    *self.slot(&to) = Some(entry);
                }
                Ok(Reply::Ok)
            }
            Command::Exists { key } => Ok(Reply::Integer(self.get(&key).is_some() as i64)),
        }
    }

    fn into_overlay(self) -> HashMap<String, Option<Entry>> {
        self.overlay
    }
}

fn commit(data: &mut HashMap<String, Entry>, overlay: HashMap<String, Option<Entry>>) {
    for (key, staged) in overlay {
        match staged {
            Some(entry) => {
                data.insert(key, entry);
            }
            None => {
                data.remove(&key);
            }
        }
    }
}

fn wrong_type(key: &str, expected: &'static str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
        expected,
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn initialize(&self) -> StoreResult<()> {
        tracing::info!("Initializing memory state store");
        self.open.store(true, Ordering::SeqCst);
        self.update_last_operation_timestamp().await;
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        tracing::info!("Closing memory state store");
        self.open.store(false, Ordering::SeqCst);
        self.data.write().await.clear();
        Ok(())
    }

    async fn execute(&self, commands: Vec<Command>) -> StoreResult<Vec<Reply>> {
        self.ensure_open()?;

        if commands.iter().all(Command::is_read) {
            let data = self.data.read().await;
            let mut staging = Staging::new(&data);
            return commands
                .into_iter()
                .map(|command| staging.apply(command))
                .collect();
        }

        let mut data = self.data.write().await;
        let (replies, overlay) = {
            let mut staging = Staging::new(&data);
            let replies = commands
                .into_iter()
                .map(|command| staging.apply(command))
                .collect::<StoreResult<Vec<Reply>>>()?;
            (replies, staging.into_overlay())
        };
        commit(&mut data, overlay);
        drop(data);

        self.update_last_operation_timestamp().await;
        Ok(replies)
    }

    async fn health_check(&self) -> StoreResult<StoreHealth> {
        let last_operation = *self.last_operation_timestamp.read().await;
        let is_open = self.open.load(Ordering::SeqCst);
        let key_count = self.data.read().await.len();

        Ok(StoreHealth {
            is_healthy: is_open,
            backend_type: "memory".to_string(),
            key_count,
            last_operation_timestamp: last_operation,
            error_message: (!is_open).then(|| "store is closed".to_string()),
        })
    }
}
