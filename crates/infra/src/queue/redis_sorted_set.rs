//! Sorted-set implementation of [`TimeIndexedQueue`].
//!
//! Redis orders equal scores lexicographically by member, so insertion order
//! is tracked separately in `{ns}:seq` and applied client-side after
//! `ZRANGEBYSCORE`.
//!
//! Scores are stored as Redis doubles; due times are exact up to 2^53 seconds.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::instrument;

use fleetpay_scheduler::{QueueError, TimeIndexedQueue};

use super::map_redis_error;

#[derive(Clone)]
pub struct RedisTimeIndexedQueue {
    conn: ConnectionManager,
    namespace: String,
}

impl RedisTimeIndexedQueue {
    /// Connect to `redis_url` and use the keys under `namespace`.
    pub async fn connect(
        redis_url: impl AsRef<str>,
        namespace: impl Into<String>,
    ) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| map_redis_error("open", e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| map_redis_error("connect", e))?;
        Ok(Self::from_connection(conn, namespace))
    }

    /// Share an existing connection manager.
    pub fn from_connection(conn: ConnectionManager, namespace: impl Into<String>) -> Self {
        Self {
            conn,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn seq_key(&self) -> String {
        format!("{}:seq", self.namespace)
    }

    fn seq_counter_key(&self) -> String {
        format!("{}:seq_counter", self.namespace)
    }
}

impl std::fmt::Debug for RedisTimeIndexedQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisTimeIndexedQueue")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

/// Redis range bound for an i64 score; the extremes map to infinities.
fn score_bound(score: i64) -> String {
    match score {
        i64::MIN => "-inf".to_string(),
        i64::MAX => "+inf".to_string(),
        s => s.to_string(),
    }
}

/// Order `(key, score)` pairs by score, then insertion sequence.
///
/// Keys with no recorded sequence sort after sequenced keys of the same score.
fn order_by_insertion(entries: Vec<(String, f64)>, seqs: Vec<Option<u64>>) -> Vec<String> {
    let mut rows: Vec<(i64, u64, String)> = entries
        .into_iter()
        .zip(seqs)
        .map(|((key, score), seq)| (score as i64, seq.unwrap_or(u64::MAX), key))
        .collect();
    rows.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
    rows.into_iter().map(|(_, _, key)| key).collect()
}

#[async_trait]
impl TimeIndexedQueue for RedisTimeIndexedQueue {
    #[instrument(skip(self), fields(namespace = %self.namespace), err)]
    async fn enqueue_or_update(&self, key: &str, score: i64) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();

        let seq: u64 = redis::cmd("INCR")
            .arg(self.seq_counter_key())
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("incr", e))?;

        redis::pipe()
            .atomic()
            .cmd("ZADD")
            .arg(&self.namespace)
            .arg(score)
            .arg(key)
            .ignore()
            .cmd("HSET")
            .arg(self.seq_key())
            .arg(key)
            .arg(seq)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| map_redis_error("zadd", e))
    }

    #[instrument(skip(self), fields(namespace = %self.namespace), err)]
    async fn remove(&self, key: &str) -> Result<bool, QueueError> {
        let mut conn = self.conn.clone();
        let (removed,): (u64,) = redis::pipe()
            .atomic()
            .cmd("ZREM")
            .arg(&self.namespace)
            .arg(key)
            .cmd("HDEL")
            .arg(self.seq_key())
            .arg(key)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("zrem", e))?;
        Ok(removed > 0)
    }

    #[instrument(skip(self), fields(namespace = %self.namespace), err)]
    async fn range_by_score(&self, min: i64, max: i64) -> Result<Vec<String>, QueueError> {
        if min > max {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();

        let entries: Vec<(String, f64)> = redis::cmd("ZRANGEBYSCORE")
            .arg(&self.namespace)
            .arg(score_bound(min))
            .arg(score_bound(max))
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("zrangebyscore", e))?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut hmget = redis::cmd("HMGET");
        hmget.arg(self.seq_key());
        for (key, _) in &entries {
            hmget.arg(key);
        }
        let seqs: Vec<Option<u64>> = hmget
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("hmget", e))?;

        Ok(order_by_insertion(entries, seqs))
    }

    async fn contains(&self, key: &str) -> Result<bool, QueueError> {
        Ok(self.score(key).await?.is_some())
    }

    #[instrument(skip(self), fields(namespace = %self.namespace), err)]
    async fn score(&self, key: &str) -> Result<Option<i64>, QueueError> {
        let mut conn = self.conn.clone();
        let score: Option<f64> = redis::cmd("ZSCORE")
            .arg(&self.namespace)
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("zscore", e))?;
        Ok(score.map(|s| s as i64))
    }

    #[instrument(skip(self), fields(namespace = %self.namespace), err)]
    async fn len(&self) -> Result<usize, QueueError> {
        let mut conn = self.conn.clone();
        redis::cmd("ZCARD")
            .arg(&self.namespace)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("zcard", e))
    }
}
