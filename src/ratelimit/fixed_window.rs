//! Fixed window: `{currentTokens, fixedWindowStart}`. On
//! window elapse (`now >= start + size`) the window snaps forward to the
//! boundary containing `now` and tokens reset to `capacity`.

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
    current_tokens: i64,
    fixed_window_start: i64,
}

pub struct FixedWindow {
    capacity: i64,
    window_size_millis: i64,
    ttl: Duration,
    cache: Arc<dyn CacheBackend>,
}

impl FixedWindow {
    pub fn new(capacity: i64, window_size_millis: i64, ttl: Duration, cache: Arc<dyn CacheBackend>) -> Self {
        FixedWindow {
            capacity,
            window_size_millis,
            ttl,
            cache,
        }
    }

    fn current_window(&self, state: State, now: i64) -> State {
        if now < state.fixed_window_start + self.window_size_millis {
            return state;
        }
        let elapsed = now - state.fixed_window_start;
        let windows_passed = elapsed / self.window_size_millis;
        State {
            current_tokens: self.capacity,
            fixed_window_start: state.fixed_window_start + windows_passed * self.window_size_millis,
        }
    }
}

#[async_trait]
impl RateLimitAlgorithm for FixedWindow {
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
                current_tokens: self.capacity,
                fixed_window_start: timestamp_millis,
            });
        let state = self.current_window(state, timestamp_millis);

        if tokens > self.capacity {
            self.persist(key, state).await?;
            return Ok(ProcessResult::denied(
                clamp_remaining(state.current_tokens, self.capacity),
                RETRY_AFTER_NEVER,
            ));
        }

        if state.current_tokens >= tokens {
            let next = State {
                current_tokens: state.current_tokens - tokens,
                fixed_window_start: state.fixed_window_start,
            };
            self.persist(key, next).await?;
            return Ok(ProcessResult::allowed(clamp_remaining(
                next.current_tokens,
                self.capacity,
            )));
        }

        self.persist(key, state).await?;
        let retry_after_millis = (state.fixed_window_start + self.window_size_millis - timestamp_millis).max(1);
        Ok(ProcessResult::denied(
            clamp_remaining(state.current_tokens, self.capacity),
            retry_after_millis,
        ))
    }

    async fn reset(&self) -> Result<(), BackendError> {
        self.cache.flush_all().await
    }
}

impl FixedWindow {
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

    fn window(capacity: i64, window_size_millis: i64) -> FixedWindow {
        FixedWindow::new(
            capacity,
            window_size_millis,
            Duration::from_secs(60),
            Arc::new(InMemoryCache::new()),
        )
    }

    #[tokio::test]
    async fn admits_within_capacity() {
        let w = window(5, 1000);
        for _ in 0..5 {
            assert!(w.process_request("k", 0, 1).await.unwrap().success);
        }
        assert!(!w.process_request("k", 0, 1).await.unwrap().success);
    }

    #[tokio::test]
    async fn window_elapse_resets_tokens() {
        let w = window(5, 1000);
        for _ in 0..5 {
            w.process_request("k", 0, 1).await.unwrap();
        }
        let result = w.process_request("k", 1000, 1).await.unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn request_larger_than_capacity_is_never_satisfiable() {
        let w = window(5, 1000);
        let result = w.process_request("k", 0, 6).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.retry_after_millis, Some(RETRY_AFTER_NEVER));
    }
}
