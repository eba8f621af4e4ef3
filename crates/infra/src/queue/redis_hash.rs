//! Hash-per-key implementation of [`EntryMetadataStore`].

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::instrument;

use fleetpay_scheduler::{EntryMetadataStore, FieldMap, QueueError};

use super::map_redis_error;

#[derive(Clone)]
pub struct RedisMetadataStore {
    conn: ConnectionManager,
    namespace: String,
}

impl RedisMetadataStore {
    pub fn from_connection(conn: ConnectionManager, namespace: impl Into<String>) -> Self {
        Self {
            conn,
            namespace: namespace.into(),
        }
    }

    fn meta_key(&self, key: &str) -> String {
        meta_key(&self.namespace, key)
    }
}

impl std::fmt::Debug for RedisMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisMetadataStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

fn meta_key(namespace: &str, key: &str) -> String {
    format!("{namespace}:meta:{key}")
}

#[async_trait]
impl EntryMetadataStore for RedisMetadataStore {
    #[instrument(skip(self, fields), fields(namespace = %self.namespace, field_count = fields.len()), err)]
    async fn set_fields(&self, key: &str, fields: &FieldMap) -> Result<(), QueueError> {
        // HSET with no field/value pairs is a syntax error.
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("HSET");
        cmd.arg(self.meta_key(key));
        for (name, value) in fields {
            cmd.arg(name).arg(value);
        }
        cmd.query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| map_redis_error("hset", e))
    }

    #[instrument(skip(self), fields(namespace = %self.namespace), err)]
    async fn get_fields(&self, key: &str) -> Result<FieldMap, QueueError> {
        let mut conn = self.conn.clone();
        redis::cmd("HGETALL")
            .arg(self.meta_key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("hgetall", e))
    }

    #[instrument(skip(self), fields(namespace = %self.namespace), err)]
    async fn delete(&self, key: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(self.meta_key(key))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| map_redis_error("del", e))
    }
}
