//! Key/value cache holding serialized query payloads with explicit expiry.
//!
//! Two backends implement [`CacheStore`]:
//!
//! - [`RedisCache`]: the production backend, one auto-reconnecting
//!   multiplexed connection shared by every caller.
//! - [`MemoryCache`]: an in-process map driven by the tokio clock, used in
//!   tests and for running without a Redis server.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::CacheError;

/// Key of the sampled article set.
pub const ARTICLES_KEY: &str = "articles";

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the payload at `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores `payload` at `key`, expiring `ttl` after this write.
    async fn set(&self, key: &str, payload: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Removes `key`. Returns whether a value was present.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;
}

pub type SharedCache = Arc<dyn CacheStore>;

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    redis_url: String,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("redis_url", &self.redis_url)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    /// Opens the connection manager once; clones share the same connection.
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        info!(url = %redis_url, "connected to redis");
        Ok(Self {
            conn,
            redis_url: redis_url.to_string(),
        })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        debug!(key, hit = value.is_some(), "redis get");
        Ok(value)
    }

    async fn set(&self, key: &str, payload: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        // SET EX rejects zero.
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, payload, seconds).await?;
        debug!(key, ttl_secs = seconds, bytes = payload.len(), "redis set");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    payload: String,
    expires_at: Instant,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    inner: Arc<RwLock<HashMap<String, MemoryEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time left before `key` expires, if it is live.
    pub async fn time_to_live(&self, key: &str) -> Option<Duration> {
        let inner = self.inner.read().await;
        let entry = inner.get(key)?;
        let now = Instant::now();
        (entry.expires_at > now).then(|| entry.expires_at - now)
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        {
            let inner = self.inner.read().await;
            match inner.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.payload.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        let mut inner = self.inner.write().await;
        if inner.get(key).is_some_and(|entry| entry.expires_at <= now) {
            inner.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, payload: &str, ttl: Duration) -> Result<(), CacheError> {
        let entry = MemoryEntry {
            payload: payload.to_owned(),
            expires_at: Instant::now() + ttl,
        };
        self.inner.write().await.insert(key.to_owned(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.inner.write().await.remove(key).is_some())
    }
}
