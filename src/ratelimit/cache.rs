//! The cache backend contract that every rate-limit algorithm
//! is built against: `get` / `set_with_expiry` / `flush_all` over opaque
//! strings, with two implementations shipped so the crate is runnable
//! without an external dependency — an in-process [`InMemoryCache`] and,
//! behind the `redis-cache` feature, a [`RedisCache`] built on `fred`, an
//! async Redis client used for distributed caches.

use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::BackendError;

/// Cache backend interface. Implementations are assumed
/// thread-safe and shared across the gateway's lifetime; a value is an
/// opaque string produced and parsed only by the algorithm that wrote it.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError>;
    async fn flush_all(&self) -> Result<(), BackendError>;
}

/// Default, zero-external-dependency cache backend: a sharded concurrent
/// map with lazy expiry checked on read, built on `dashmap` for
/// concurrent, lock-free shared state.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: DashMap<String, (String, Instant)>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        InMemoryCache {
            entries: DashMap::new(),
        }
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };
        let (value, expires_at) = entry.value().clone();
        if expires_at <= Instant::now() {
            drop(entry);
            self.entries.remove(key);
            return Ok(None);
        }
        Ok(Some(value))
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError> {
        self.entries
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn flush_all(&self) -> Result<(), BackendError> {
        self.entries.clear();
        Ok(())
    }
}

/// Redis-backed cache (feature `redis-cache`), for deployments that run
/// more than one gateway instance and need the token-bucket/window state
/// shared across them. Uses `fred` as the async Redis client.
#[cfg(feature = "redis-cache")]
pub struct RedisCache {
    client: fred::prelude::Client,
}

#[cfg(feature = "redis-cache")]
impl RedisCache {
    pub async fn connect(config: fred::prelude::Config) -> Result<Self, BackendError> {
        use fred::prelude::ClientLike;

        let client = fred::prelude::Builder::from_config(config)
            .build()
            .map_err(|e| BackendError::Io(e.to_string()))?;
        client
            .connect();
        client
            .wait_for_connect()
            .await
            .map_err(|e| BackendError::Io(e.to_string()))?;
        Ok(RedisCache { client })
    }
}

#[cfg(feature = "redis-cache")]
#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        use fred::prelude::KeysInterface;

        self.client
            .get(key)
            .await
            .map_err(|e| BackendError::Io(e.to_string()))
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError> {
        use fred::prelude::Expiration;
        use fred::prelude::KeysInterface;
        use fred::prelude::SetOptions;

        let _: () = self
            .client
            .set(
                key,
                value,
                Some(Expiration::PX(ttl.as_millis() as i64)),
                Some(SetOptions::default()),
                false,
            )
            .await
            .map_err(|e| BackendError::Io(e.to_string()))?;
        Ok(())
    }

    async fn flush_all(&self) -> Result<(), BackendError> {
        use fred::prelude::ServerInterface;

        self.client
            .flushall(false)
            .await
            .map_err(|e| BackendError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_value() {
        let cache = InMemoryCache::new();
        cache.set_with_expiry("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entry_reads_as_none() {
        let cache = InMemoryCache::new();
        cache
            .set_with_expiry("k", "v", Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn flush_all_clears_everything() {
        let cache = InMemoryCache::new();
        cache.set_with_expiry("a", "1", Duration::from_secs(60)).await.unwrap();
        cache.set_with_expiry("b", "2", Duration::from_secs(60)).await.unwrap();
        cache.flush_all().await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert_eq!(cache.get("b").await.unwrap(), None);
    }
}
