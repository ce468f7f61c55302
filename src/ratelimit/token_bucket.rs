//! Token bucket: `{tokens, timestamp}` refilled continuously
//! at `refillRate` tokens/second, capped at `capacity`.

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
#[serde(rename_all = "camelCase")]
struct State {
    tokens: f64,
    timestamp: i64,
}

pub struct TokenBucket {
    capacity: i64,
    refill_rate: f64,
    ttl: Duration,
    cache: Arc<dyn CacheBackend>,
}

impl TokenBucket {
    pub fn new(capacity: i64, refill_rate: f64, ttl: Duration, cache: Arc<dyn CacheBackend>) -> Self {
        TokenBucket {
            capacity,
            refill_rate,
            ttl,
            cache,
        }
    }

    fn refill(&self, state: State, now: i64) -> f64 {
        let elapsed_secs = (now - state.timestamp).max(0) as f64 / 1000.0;
        (state.tokens + elapsed_secs * self.refill_rate).min(self.capacity as f64)
    }
}

#[async_trait]
impl RateLimitAlgorithm for TokenBucket {
    async fn process_request(
        &self,
        key: &str,
        timestamp_millis: i64,
        tokens: i64,
    ) -> Result<ProcessResult, BackendError> {
        let raw = self.cache.get(key).await?;
        let state = raw
            .and_then(|s| serde_json::from_str::<State>(&s).ok())
            .unwrap_or(State {
                tokens: self.capacity as f64,
                timestamp: timestamp_millis,
            });

        let refilled = self.refill(state, timestamp_millis);

        if tokens > self.capacity {
            let next = State {
                tokens: refilled,
                timestamp: timestamp_millis,
            };
            self.persist(key, next).await?;
            return Ok(ProcessResult::denied(
                clamp_remaining(refilled as i64, self.capacity),
                RETRY_AFTER_NEVER,
            ));
        }

        if refilled >= tokens as f64 {
            let remaining = refilled - tokens as f64;
            self.persist(
                key,
                State {
                    tokens: remaining,
                    timestamp: timestamp_millis,
                },
            )
            .await?;
            return Ok(ProcessResult::allowed(clamp_remaining(remaining as i64, self.capacity)));
        }

        self.persist(
            key,
            State {
                tokens: refilled,
                timestamp: timestamp_millis,
            },
        )
        .await?;

        let retry_after_millis = if self.refill_rate > 0.0 {
            (((tokens as f64 - refilled) / self.refill_rate) * 1000.0).ceil() as i64
        } else {
            RETRY_AFTER_NEVER
        };
        Ok(ProcessResult::denied(
            clamp_remaining(refilled as i64, self.capacity),
            retry_after_millis.max(1),
        ))
    }

    async fn reset(&self) -> Result<(), BackendError> {
        self.cache.flush_all().await
    }
}

impl TokenBucket {
    async fn persist(&self, key: &str, state: State) -> Result<(), BackendError> {
        let encoded = serde_json::to_string(&state).expect("State serializes infallibly");
        self.cache
            .set_with_expiry(key, &encoded, super::jittered_ttl(self.ttl))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::cache::InMemoryCache;

    fn bucket(capacity: i64, refill_rate: f64) -> TokenBucket {
        TokenBucket::new(capacity, refill_rate, Duration::from_secs(60), Arc::new(InMemoryCache::new()))
    }

    #[tokio::test]
    async fn first_request_consumes_from_full_capacity() {
        let bucket = bucket(10, 1.0);
        let result = bucket.process_request("caller", 0, 4).await.unwrap();
        assert!(result.success);
        assert_eq!(result.tokens, 6);
    }

    #[tokio::test]
    async fn exhausting_capacity_denies() {
        let bucket = bucket(10, 1.0);
        bucket.process_request("caller", 0, 10).await.unwrap();
        let result = bucket.process_request("caller", 0, 1).await.unwrap();
        assert!(!result.success);
        assert!(result.retry_after_millis.unwrap() > 0);
    }

    #[tokio::test]
    async fn refills_over_time() {
        let bucket = bucket(10, 10.0);
        bucket.process_request("caller", 0, 10).await.unwrap();
        // one second later, refill_rate * 1s = 10 tokens back.
        let result = bucket.process_request("caller", 1000, 5).await.unwrap();
        assert!(result.success);
        assert_eq!(result.tokens, 5);
    }

    #[tokio::test]
    async fn request_larger_than_capacity_is_never_satisfiable() {
        let bucket = bucket(10, 1.0);
        let result = bucket.process_request("caller", 0, 11).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.retry_after_millis, Some(RETRY_AFTER_NEVER));
    }

    #[tokio::test]
    async fn reset_clears_state() {
        let bucket = bucket(10, 1.0);
        bucket.process_request("caller", 0, 10).await.unwrap();
        bucket.reset().await.unwrap();
        let result = bucket.process_request("caller", 0, 10).await.unwrap();
        assert!(result.success);
    }
}
