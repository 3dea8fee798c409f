use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult, Script};

use super::{Batch, Op, RecordStore};
use crate::error::AppError;

/// `HINCRBY` that refuses to create the hash, so a view increment racing an
/// expiry cannot leave behind a key without a TTL.
const INCREMENT_IF_EXISTS: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return redis.call('HINCRBY', KEYS[1], ARGV[1], ARGV[2])
end
return false
"#;

/// Redis implementation of the RecordStore.
///
/// Batches run as `MULTI`/`EXEC` pipelines. Every round-trip is bounded by
/// `op_timeout`; a deadline that elapses is reported as a storage failure.
#[derive(Clone)]
pub struct RedisRecordStore {
    conn: ConnectionManager,
    op_timeout: Duration,
    increment_script: Script,
}

impl RedisRecordStore {
    /// Connect to `redis_url` and verify the server answers a `PING`.
    pub async fn connect(redis_url: &str, op_timeout: Duration) -> Result<Self, AppError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AppError::Storage(format!("Invalid redis URL: {}", e)))?;

        let conn = tokio::time::timeout(op_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| AppError::Storage(format!("Timed out connecting to {}", redis_url)))?
            .map_err(|e| AppError::Storage(format!("Failed to connect to redis: {}", e)))?;

        let store = Self {
            conn,
            op_timeout,
            increment_script: Script::new(INCREMENT_IF_EXISTS),
        };
        store.ping().await?;
        Ok(store)
    }

    async fn run<T, F>(&self, command: &str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = RedisResult<T>>,
    {
        with_deadline(command, self.op_timeout, fut).await
    }
}

/// Await `fut` for at most `op_timeout`. Redis errors and elapsed deadlines
/// both become [`AppError::Storage`].
async fn with_deadline<T, F>(command: &str, op_timeout: Duration, fut: F) -> Result<T, AppError>
where
    F: Future<Output = RedisResult<T>>,
{
    match tokio::time::timeout(op_timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(AppError::Storage(format!("{} failed: {}", command, e))),
        Err(_) => Err(AppError::Storage(format!(
            "{} timed out after {:?}",
            command, op_timeout
        ))),
    }
}

fn millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl RecordStore for RedisRecordStore {
    async fn read_fields(&self, key: &str) -> Result<HashMap<String, String>, AppError> {
        let mut conn = self.conn.clone();
        self.run("HGETALL", async move { conn.hgetall(key).await })
            .await
    }

    async fn increment_field(
        &self,
        key: &str,
        field: &str,
        by: i64,
    ) -> Result<Option<i64>, AppError> {
        let mut conn = self.conn.clone();
        let mut invocation = self.increment_script.prepare_invoke();
        invocation.key(key).arg(field).arg(by);
        self.run("HINCRBY", async move { invocation.invoke_async(&mut conn).await })
            .await
    }

    async fn set_cardinality(&self, key: &str) -> Result<u64, AppError> {
        let mut conn = self.conn.clone();
        self.run("SCARD", async move { conn.scard(key).await }).await
    }

    async fn read_list(&self, key: &str) -> Result<Vec<String>, AppError> {
        let mut conn = self.conn.clone();
        self.run("LRANGE", async move { conn.lrange(key, 0, -1).await })
            .await
    }

    async fn time_to_live(&self, key: &str) -> Result<Option<Duration>, AppError> {
        let mut conn = self.conn.clone();
        // -2: no such key, -1: key without expiry
        let pttl: i64 = self
            .run("PTTL", async move { conn.pttl(key).await })
            .await?;
        Ok(u64::try_from(pttl).ok().map(Duration::from_millis))
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        self.run("EXISTS", async move { conn.exists(key).await })
            .await
    }

    async fn execute(&self, batch: Batch) -> Result<(), AppError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in batch.into_ops() {
            match op {
                Op::WriteFields { key, fields, ttl } => {
                    pipe.hset_multiple(&key, fields.as_slice()).ignore();
                    pipe.pexpire(&key, millis(ttl)).ignore();
                }
                Op::AddToSet { key, member, ttl } => {
                    pipe.sadd(&key, &member).ignore();
                    pipe.pexpire(&key, millis(ttl)).ignore();
                }
                Op::RemoveFromSet { key, member } => {
                    pipe.srem(&key, &member).ignore();
                }
                Op::AppendToList { key, value, ttl } => {
                    pipe.rpush(&key, &value).ignore();
                    if let Some(ttl) = ttl {
                        pipe.pexpire(&key, millis(ttl)).ignore();
                    }
                }
                Op::Delete { keys } => {
                    pipe.del(&keys).ignore();
                }
            }
        }

        let mut conn = self.conn.clone();
        self.run("MULTI/EXEC", async move { pipe.query_async(&mut conn).await })
            .await
    }

    async fn ping(&self) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let _pong: String = self
            .run("PING", async move {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await?;
        Ok(())
    }
}
