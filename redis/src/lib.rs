//! `Redis` index store for the theater booking backend.
//!
//! Implements [`IndexStore`] over a [`ConnectionManager`], which reconnects on
//! its own after a dropped connection. Every [`IndexBatch`] is sent as one
//! `MULTI`/`EXEC` pipeline, so a show's index entries are applied
//! all-or-nothing.
//!
//! # Example
//!
//! ```no_run
//! use theater_redis::RedisIndexStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let index = RedisIndexStore::new("redis://127.0.0.1:6379").await?;
//! index.ping().await?;
//! # Ok(())
//! # }
//! ```

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, ErrorKind, RedisError};
use std::collections::HashSet;
use theater_core::index::{
    IndexBatch, IndexError, IndexFuture, IndexOp, IndexResult, IndexStore, ScoreRange,
};

/// Keys requested per `SCAN` round trip.
const SCAN_COUNT: usize = 500;

/// `Redis`-backed index store.
#[derive(Clone)]
pub struct RedisIndexStore {
    conn_manager: ConnectionManager,
}

impl RedisIndexStore {
    /// Connect to `Redis`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Unavailable`] if the URL is invalid or the server
    /// cannot be reached.
    pub async fn new(redis_url: &str) -> IndexResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| IndexError::Unavailable(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            IndexError::Unavailable(format!("Failed to create Redis connection manager: {e}"))
        })?;

        tracing::info!("Redis index store connected");
        Ok(Self { conn_manager })
    }

    /// Wrap an existing connection manager.
    #[must_use]
    pub const fn from_manager(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }

    /// Round-trip a `PING`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Unavailable`] if `Redis` does not answer.
    pub async fn ping(&self) -> IndexResult<()> {
        let mut conn = self.conn_manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| index_error("ping", &e))?;
        Ok(())
    }
}

/// Wrong-type replies mean the stored data is not what the projection wrote.
fn index_error(op: &str, e: &RedisError) -> IndexError {
    if e.kind() == ErrorKind::TypeError || e.code() == Some("WRONGTYPE") {
        IndexError::Corrupt(format!("{op}: {e}"))
    } else {
        IndexError::Unavailable(format!("{op}: {e}"))
    }
}

/// Render a score bound the way `ZRANGEBYSCORE` expects infinities.
fn score_bound(value: f64) -> String {
    match (value.is_infinite(), value.is_sign_positive()) {
        (true, true) => "+inf".to_string(),
        (true, false) => "-inf".to_string(),
        _ => value.to_string(),
    }
}

impl IndexStore for RedisIndexStore {
    fn set_members<'a>(&'a self, key: &'a str) -> IndexFuture<'a, HashSet<String>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            conn.smembers(key)
                .await
                .map_err(|e| index_error("SMEMBERS", &e))
        })
    }

    fn set_card<'a>(&'a self, key: &'a str) -> IndexFuture<'a, u64> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            conn.scard(key).await.map_err(|e| index_error("SCARD", &e))
        })
    }

    fn intersect<'a>(&'a self, keys: &'a [String]) -> IndexFuture<'a, HashSet<String>> {
        Box::pin(async move {
            if keys.is_empty() {
                return Ok(HashSet::new());
            }
            let mut conn = self.conn_manager.clone();
            conn.sinter(keys).await.map_err(|e| index_error("SINTER", &e))
        })
    }

    fn range_by_score<'a>(&'a self, key: &'a str, range: ScoreRange) -> IndexFuture<'a, Vec<String>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            conn.zrangebyscore(key, score_bound(range.min), score_bound(range.max))
                .await
                .map_err(|e| index_error("ZRANGEBYSCORE", &e))
        })
    }

    fn scores<'a>(&'a self, key: &'a str, members: &'a [String]) -> IndexFuture<'a, Vec<Option<f64>>> {
        Box::pin(async move {
            if members.is_empty() {
                return Ok(Vec::new());
            }
            let mut conn = self.conn_manager.clone();
            redis::cmd("ZMSCORE")
                .arg(key)
                .arg(members)
                .query_async(&mut conn)
                .await
                .map_err(|e| index_error("ZMSCORE", &e))
        })
    }

    fn sorted_card<'a>(&'a self, key: &'a str) -> IndexFuture<'a, u64> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            conn.zcard(key).await.map_err(|e| index_error("ZCARD", &e))
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> IndexFuture<'a, Option<String>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            conn.get(key).await.map_err(|e| index_error("GET", &e))
        })
    }

    fn get_many<'a>(&'a self, keys: &'a [String]) -> IndexFuture<'a, Vec<Option<String>>> {
        Box::pin(async move {
            if keys.is_empty() {
                return Ok(Vec::new());
            }
            let mut conn = self.conn_manager.clone();
            let values: Vec<Option<String>> = redis::cmd("MGET")
                .arg(keys)
                .query_async(&mut conn)
                .await
                .map_err(|e| index_error("MGET", &e))?;
            Ok(values)
        })
    }

    fn put<'a>(&'a self, key: &'a str, value: &'a str) -> IndexFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let _: () = conn.set(key, value).await.map_err(|e| index_error("SET", &e))?;
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> IndexFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let _: () = conn.del(key).await.map_err(|e| index_error("DEL", &e))?;
            Ok(())
        })
    }

    fn set_remove<'a>(&'a self, key: &'a str, members: &'a [String]) -> IndexFuture<'a, ()> {
        Box::pin(async move {
            if members.is_empty() {
                return Ok(());
            }
            let mut conn = self.conn_manager.clone();
            let _: () = conn
                .srem(key, members)
                .await
                .map_err(|e| index_error("SREM", &e))?;
            Ok(())
        })
    }

    fn scan_prefix<'a>(&'a self, prefix: &'a str) -> IndexFuture<'a, Vec<String>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let pattern = format!("{prefix}*");
            let mut cursor: u64 = 0;
            let mut found = Vec::new();

            loop {
                let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_COUNT)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| index_error("SCAN", &e))?;
                found.extend(keys);
                if next == 0 {
                    break;
                }
                cursor = next;
            }

            // SCAN may return a key more than once.
            found.sort();
            found.dedup();
            Ok(found)
        })
    }

    fn execute(&self, batch: IndexBatch) -> IndexFuture<'_, ()> {
        Box::pin(async move {
            if batch.is_empty() {
                return Ok(());
            }
            let ops = batch.len();
            let mut pipe = redis::pipe();
            pipe.atomic();

            for op in batch {
                match op {
                    IndexOp::SetAdd { key, members } => {
                        pipe.sadd(key, members).ignore();
                    }
                    IndexOp::SetRemove { key, member } => {
                        pipe.srem(key, member).ignore();
                    }
                    IndexOp::SortedUpsert { key, member, score } => {
                        pipe.zadd(key, member, score).ignore();
                    }
                    IndexOp::SortedRemove { key, member } => {
                        pipe.zrem(key, member).ignore();
                    }
                    IndexOp::Put { key, value } => {
                        pipe.set(key, value).ignore();
                    }
                    IndexOp::Delete { key } => {
                        pipe.del(key).ignore();
                    }
                }
            }

            let mut conn = self.conn_manager.clone();
            let _: () = pipe
                .query_async(&mut conn)
                .await
                .map_err(|e| index_error("MULTI/EXEC", &e))?;

            tracing::trace!(ops, "Index pipeline executed");
            Ok(())
        })
    }
}
