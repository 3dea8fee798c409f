use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{Batch, Op, RecordStore};
use crate::error::AppError;

#[derive(Debug, Clone)]
enum Value {
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
    List(Vec<String>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Hash(_) => "hash",
            Value::Set(_) => "set",
            Value::List(_) => "list",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| deadline > now)
    }
}

/// Full sweeps of expired keys run at most this often.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
    next_sweep: Option<Instant>,
}

impl Keyspace {
    /// Drop expired entries among `keys`, and everywhere once per
    /// [`SWEEP_INTERVAL`].
    fn purge<'a>(&mut self, keys: impl IntoIterator<Item = &'a str>, now: Instant) {
        if self.next_sweep.map_or(true, |at| at <= now) {
            self.entries.retain(|_, entry| entry.is_live(now));
            self.next_sweep = Some(now + SWEEP_INTERVAL);
            return;
        }
        for key in keys {
            if self.entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
                self.entries.remove(key);
            }
        }
    }
}

/// In-memory record store with per-key expiry, backed by a `RwLock<HashMap>`.
///
/// Mirrors the Redis semantics the managers rely on: expired keys are
/// invisible, an emptied set disappears, and a batch either applies whole or
/// is rejected before anything changes. Deadlines use the tokio clock so
/// tests can pause and advance time.
pub struct MemoryRecordStore {
    data: RwLock<Keyspace>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(Keyspace::default()),
        }
    }

    fn live<'a>(data: &'a HashMap<String, Entry>, key: &str, now: Instant) -> Option<&'a Entry> {
        data.get(key).filter(|entry| entry.is_live(now))
    }

    /// Reject the batch if any op targets a key holding another type, either
    /// before the batch or as left by an earlier op of the same batch.
    fn check_types(
        data: &HashMap<String, Entry>,
        ops: &[Op],
        now: Instant,
    ) -> Result<(), AppError> {
        let mut staged: HashMap<&str, Option<&'static str>> = HashMap::new();

        for op in ops {
            let (key, expected) = match op {
                Op::WriteFields { key, .. } => (key, "hash"),
                Op::AddToSet { key, .. } | Op::RemoveFromSet { key, .. } => (key, "set"),
                Op::AppendToList { key, .. } => (key, "list"),
                Op::Delete { keys } => {
                    for key in keys {
                        staged.insert(key.as_str(), None);
                    }
                    continue;
                }
            };

            let current = match staged.get(key.as_str()) {
                Some(kind) => *kind,
                None => Self::live(data, key, now).map(|entry| entry.value.kind()),
            };
            match current {
                Some(kind) if kind != expected => {
                    return Err(AppError::Storage(format!(
                        "WRONGTYPE: key '{}' holds a {}, expected a {}",
                        key, kind, expected
                    )));
                }
                Some(_) => {}
                // Removing from a missing set creates nothing.
                None if matches!(op, Op::RemoveFromSet { .. }) => {}
                None => {
                    staged.insert(key.as_str(), Some(expected));
                }
            }
        }
        Ok(())
    }

    fn apply(data: &mut HashMap<String, Entry>, op: Op, now: Instant) {
        match op {
            Op::WriteFields { key, fields, ttl } => {
                let entry = Self::entry_for(data, key, || Value::Hash(HashMap::new()));
                if let Value::Hash(hash) = &mut entry.value {
                    hash.extend(fields);
                }
                entry.expires_at = Some(now + ttl);
            }
            Op::AddToSet { key, member, ttl } => {
                let entry = Self::entry_for(data, key, || Value::Set(HashSet::new()));
                if let Value::Set(set) = &mut entry.value {
                    set.insert(member);
                }
                entry.expires_at = Some(now + ttl);
            }
            Op::RemoveFromSet { key, member } => {
                let emptied = match data.get_mut(&key) {
                    Some(Entry {
                        value: Value::Set(set),
                        ..
                    }) => {
                        set.remove(&member);
                        set.is_empty()
                    }
                    _ => false,
                };
                if emptied {
                    data.remove(&key);
                }
            }
            Op::AppendToList { key, value, ttl } => {
                let entry = Self::entry_for(data, key, || Value::List(Vec::new()));
                if let Value::List(list) = &mut entry.value {
                    list.push(value);
                }
                if let Some(ttl) = ttl {
                    entry.expires_at = Some(now + ttl);
                }
            }
            Op::Delete { keys } => {
                for key in keys {
                    data.remove(&key);
                }
            }
        }
    }

    /// Expired keys are purged before a batch applies, so an existing entry
    /// here is live.
    fn entry_for(
        data: &mut HashMap<String, Entry>,
        key: String,
        empty: impl FnOnce() -> Value,
    ) -> &mut Entry {
        data.entry(key).or_insert_with(|| Entry {
            value: empty(),
            expires_at: None,
        })
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn read_fields(&self, key: &str) -> Result<HashMap<String, String>, AppError> {
        let data = self.data.read().await;
        match Self::live(&data.entries, key, Instant::now()) {
            Some(Entry {
                value: Value::Hash(hash),
                ..
            }) => Ok(hash.clone()),
            Some(entry) => Err(wrong_type(key, entry)),
            None => Ok(HashMap::new()),
        }
    }

    async fn increment_field(
        &self,
        key: &str,
        field: &str,
        by: i64,
    ) -> Result<Option<i64>, AppError> {
        let mut data = self.data.write().await;
        let now = Instant::now();
        let entry = match data.entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => entry,
            _ => return Ok(None),
        };
        let hash = match &mut entry.value {
            Value::Hash(hash) => hash,
            other => {
                return Err(AppError::Storage(format!(
                    "WRONGTYPE: key '{}' holds a {}",
                    key,
                    other.kind()
                )))
            }
        };
        let current = match hash.get(field) {
            Some(raw) => raw.parse::<i64>().map_err(|_| {
                AppError::Storage(format!("hash value of '{key}.{field}' is not an integer"))
            })?,
            None => 0,
        };
        let next = current + by;
        hash.insert(field.to_string(), next.to_string());
        Ok(Some(next))
    }

    async fn set_cardinality(&self, key: &str) -> Result<u64, AppError> {
        let data = self.data.read().await;
        match Self::live(&data.entries, key, Instant::now()) {
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => Ok(set.len() as u64),
            Some(entry) => Err(wrong_type(key, entry)),
            None => Ok(0),
        }
    }

    async fn read_list(&self, key: &str) -> Result<Vec<String>, AppError> {
        let data = self.data.read().await;
        match Self::live(&data.entries, key, Instant::now()) {
            Some(Entry {
                value: Value::List(list),
                ..
            }) => Ok(list.clone()),
            Some(entry) => Err(wrong_type(key, entry)),
            None => Ok(Vec::new()),
        }
    }

    async fn time_to_live(&self, key: &str) -> Result<Option<Duration>, AppError> {
        let data = self.data.read().await;
        let now = Instant::now();
        Ok(Self::live(&data.entries, key, now)
            .and_then(|entry| entry.expires_at)
            .map(|deadline| deadline - now))
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        let data = self.data.read().await;
        Ok(Self::live(&data.entries, key, Instant::now()).is_some())
    }

    async fn execute(&self, batch: Batch) -> Result<(), AppError> {
        let mut data = self.data.write().await;
        let now = Instant::now();
        Self::check_types(&data.entries, batch.ops(), now)?;

        data.purge(batch.ops().iter().flat_map(Op::keys), now);
        for op in batch.into_ops() {
            Self::apply(&mut data.entries, op, now);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

fn wrong_type(key: &str, entry: &Entry) -> AppError {
    AppError::Storage(format!(
        "WRONGTYPE: key '{}' holds a {}",
        key,
        entry.value.kind()
    ))
}
