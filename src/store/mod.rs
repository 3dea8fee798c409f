pub mod memory;
pub mod redis_store;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AppError;

/// A single mutation inside a [`Batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Set hash fields and (re)set the key's expiry.
    WriteFields {
        key: String,
        fields: Vec<(String, String)>,
        ttl: Duration,
    },
    /// Add a member to a set and (re)set the set's expiry.
    AddToSet {
        key: String,
        member: String,
        ttl: Duration,
    },
    RemoveFromSet {
        key: String,
        member: String,
    },
    /// Push to the tail of a list. Without a TTL the key keeps whatever
    /// expiry it already had.
    AppendToList {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    Delete {
        keys: Vec<String>,
    },
}

impl Op {
    /// The keys this op touches.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Op::WriteFields { key, .. }
            | Op::AddToSet { key, .. }
            | Op::RemoveFromSet { key, .. }
            | Op::AppendToList { key, .. } => vec![key.as_str()],
            Op::Delete { keys } => keys.iter().map(String::as_str).collect(),
        }
    }
}

/// An ordered group of mutations applied all-or-nothing.
///
/// Batches from different callers are not isolated from each other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    ops: Vec<Op>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_fields(
        mut self,
        key: impl Into<String>,
        fields: Vec<(String, String)>,
        ttl: Duration,
    ) -> Self {
        self.ops.push(Op::WriteFields {
            key: key.into(),
            fields,
            ttl,
        });
        self
    }

    pub fn add_to_set(
        mut self,
        key: impl Into<String>,
        member: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        self.ops.push(Op::AddToSet {
            key: key.into(),
            member: member.into(),
            ttl,
        });
        self
    }

    pub fn remove_from_set(mut self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.ops.push(Op::RemoveFromSet {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    pub fn append_to_list(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: Option<Duration>,
    ) -> Self {
        self.ops.push(Op::AppendToList {
            key: key.into(),
            value: value.into(),
            ttl,
        });
        self
    }

    pub fn delete<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.ops.push(Op::Delete {
            keys: keys.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<Op> {
        self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Expiring key-value substrate (Redis-compatible).
///
/// Abstracted as a trait so the managers can run against Redis in production
/// and against an in-process store or a mock in tests. Every failure of the
/// underlying service surfaces as [`AppError::Storage`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All fields of a hash. Absent or expired keys yield an empty map.
    async fn read_fields(&self, key: &str) -> Result<HashMap<String, String>, AppError>;

    /// Atomically add `by` to a hash field. Returns `None` without creating
    /// anything when the key does not exist.
    async fn increment_field(&self, key: &str, field: &str, by: i64)
        -> Result<Option<i64>, AppError>;

    /// Number of members of a set, 0 when absent.
    async fn set_cardinality(&self, key: &str) -> Result<u64, AppError>;

    /// The whole list in insertion order, empty when absent.
    async fn read_list(&self, key: &str) -> Result<Vec<String>, AppError>;

    /// Remaining time-to-live. `None` when the key is absent or has no expiry.
    async fn time_to_live(&self, key: &str) -> Result<Option<Duration>, AppError>;

    async fn exists(&self, key: &str) -> Result<bool, AppError>;

    /// Apply every operation of the batch, or none of them.
    async fn execute(&self, batch: Batch) -> Result<(), AppError>;

    /// Liveness probe.
    async fn ping(&self) -> Result<(), AppError>;
}

/// Single-operation writes, each submitted as a one-op batch.
#[async_trait]
pub trait RecordStoreExt: RecordStore {
    async fn write_fields(
        &self,
        key: &str,
        fields: Vec<(String, String)>,
        ttl: Duration,
    ) -> Result<(), AppError> {
        self.execute(Batch::new().write_fields(key, fields, ttl)).await
    }

    async fn add_to_set(&self, key: &str, member: &str, ttl: Duration) -> Result<(), AppError> {
        self.execute(Batch::new().add_to_set(key, member, ttl)).await
    }

    async fn remove_from_set(&self, key: &str, member: &str) -> Result<(), AppError> {
        self.execute(Batch::new().remove_from_set(key, member)).await
    }

    async fn append_to_list(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), AppError> {
        self.execute(Batch::new().append_to_list(key, value, ttl)).await
    }

    async fn delete_keys(&self, keys: &[&str]) -> Result<(), AppError> {
        self.execute(Batch::new().delete(keys.iter().copied())).await
    }
}

impl<T: RecordStore + ?Sized> RecordStoreExt for T {}
