//! Sliding window log: an ordered list of `{timestamp,
//! tokens}` entries. Entries older than `now - windowSize` are dropped
//! before admission is decided; a request is admitted if the sum of
//! surviving entries plus its own weight does not exceed capacity.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use super::algorithm::clamp_remaining;
use super::algorithm::ProcessResult;
use super::algorithm::RateLimitAlgorithm;
use super::algorithm::RETRY_AFTER_NEVER;
use super::cache::CacheBackend;
use crate::error::BackendError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Entry {
    timestamp: i64,
    tokens: i64,
}

pub struct SlidingWindowLog {
    capacity: i64,
    window_size_millis: i64,
    ttl: Duration,
    cache: Arc<dyn CacheBackend>,
}

impl SlidingWindowLog {
    pub fn new(capacity: i64, window_size_millis: i64, ttl: Duration, cache: Arc<dyn CacheBackend>) -> Self {
        SlidingWindowLog {
            capacity,
            window_size_millis,
            ttl,
            cache,
        }
    }
}

#[async_trait]
impl RateLimitAlgorithm for SlidingWindowLog {
    async fn process_request(
        &self,
        key: &str,
        timestamp_millis: i64,
        tokens: i64,
    ) -> Result<ProcessResult, BackendError> {
        let raw = self.cache.get(key).await?;
        let mut entries: Vec<Entry> = raw
            .and_then(|s| serde_json::from_str::<Vec<Entry>>(&s).ok())
            .unwrap_or_default();

        let cutoff = timestamp_millis - self.window_size_millis;
        entries.retain(|e| e.timestamp >= cutoff);

        let sum: i64 = entries.iter().map(|e| e.tokens).sum();

        if tokens > self.capacity {
            self.persist(key, &entries).await?;
            return Ok(ProcessResult::denied(
                clamp_remaining(self.capacity - sum, self.capacity),
                RETRY_AFTER_NEVER,
            ));
        }

        if sum + tokens <= self.capacity {
            entries.push(Entry {
                timestamp: timestamp_millis,
                tokens,
            });
            let remaining = self.capacity - sum - tokens;
            self.persist(key, &entries).await?;
            return Ok(ProcessResult::allowed(clamp_remaining(remaining, self.capacity)));
        }

        let retry_after_millis = entries
            .iter()
            .map(|e| e.timestamp)
            .min()
            .map(|oldest| (oldest + self.window_size_millis - timestamp_millis).max(1))
            .unwrap_or(RETRY_AFTER_NEVER);
        self.persist(key, &entries).await?;
        Ok(ProcessResult::denied(
            clamp_remaining(self.capacity - sum, self.capacity),
            retry_after_millis,
        ))
    }

    async fn reset(&self) -> Result<(), BackendError> {
        self.cache.flush_all().await
    }
}

impl SlidingWindowLog {
    async fn persist(&self, key: &str, entries: &[Entry]) -> Result<(), BackendError> {
        let encoded = serde_json::to_string(entries).expect("entries serialize infallibly");
        self.cache
            .set_with_expiry(key, &encoded, super::jittered_ttl(self.ttl))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::cache::InMemoryCache;

    fn log(capacity: i64, window_size_millis: i64) -> SlidingWindowLog {
        SlidingWindowLog::new(
            capacity,
            window_size_millis,
            Duration::from_secs(60),
            Arc::new(InMemoryCache::new()),
        )
    }

    #[tokio::test]
    async fn admits_until_capacity_exhausted() {
        let l = log(3, 1000);
        for _ in 0..3 {
            assert!(l.process_request("k", 0, 1).await.unwrap().success);
        }
        assert!(!l.process_request("k", 0, 1).await.unwrap().success);
    }

    #[tokio::test]
    async fn old_entries_drop_out_of_the_window() {
        let l = log(1, 1000);
        assert!(l.process_request("k", 0, 1).await.unwrap().success);
        assert!(!l.process_request("k", 500, 1).await.unwrap().success);
        // Past the window: the first entry has aged out.
        assert!(l.process_request("k", 1500, 1).await.unwrap().success);
    }

    #[tokio::test]
    async fn request_larger_than_capacity_is_never_satisfiable() {
        let l = log(5, 1000);
        let result = l.process_request("k", 0, 6).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.retry_after_millis, Some(RETRY_AFTER_NEVER));
    }
}
