//! Sliding window counter: `{currentCount, previousCount,
//! windowStart}`, with a weighted estimate of the previous window's count
//! decaying linearly as the current window progresses:
//! `previousCount * (1 - elapsed/windowSize) + currentCount`.

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
    current_count: i64,
    previous_count: i64,
    window_start: i64,
}

pub struct SlidingWindowCounter {
    capacity: i64,
    window_size_millis: i64,
    ttl: Duration,
    cache: Arc<dyn CacheBackend>,
}

impl SlidingWindowCounter {
    pub fn new(capacity: i64, window_size_millis: i64, ttl: Duration, cache: Arc<dyn CacheBackend>) -> Self {
        SlidingWindowCounter {
            capacity,
            window_size_millis,
            ttl,
            cache,
        }
    }

    /// Rolls `state` forward so `now` falls within the window it describes,
    /// sliding `currentCount` into `previousCount` once per elapsed window.
    fn roll_forward(&self, mut state: State, now: i64) -> State {
        let elapsed = now - state.window_start;
        if elapsed >= 2 * self.window_size_millis {
            return State {
                current_count: 0,
                previous_count: 0,
                window_start: now,
            };
        }
        if elapsed >= self.window_size_millis {
            state.previous_count = state.current_count;
            state.current_count = 0;
            state.window_start += self.window_size_millis;
        }
        state
    }

    fn estimate(&self, state: State, now: i64) -> f64 {
        let elapsed = (now - state.window_start).max(0) as f64;
        let decay = (1.0 - elapsed / self.window_size_millis as f64).max(0.0);
        state.previous_count as f64 * decay + state.current_count as f64
    }
}

#[async_trait]
impl RateLimitAlgorithm for SlidingWindowCounter {
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
                current_count: 0,
                previous_count: 0,
                window_start: timestamp_millis,
            });
        let state = self.roll_forward(state, timestamp_millis);
        let estimate = self.estimate(state, timestamp_millis);

        if tokens > self.capacity {
            self.persist(key, state).await?;
            return Ok(ProcessResult::denied(
                clamp_remaining((self.capacity as f64 - estimate).round() as i64, self.capacity),
                RETRY_AFTER_NEVER,
            ));
        }

        if estimate + tokens as f64 <= self.capacity as f64 {
            let next = State {
                current_count: state.current_count + tokens,
                ..state
            };
            let remaining = self.capacity as f64 - estimate - tokens as f64;
            self.persist(key, next).await?;
            return Ok(ProcessResult::allowed(clamp_remaining(remaining.round() as i64, self.capacity)));
        }

        self.persist(key, state).await?;
        let elapsed = (timestamp_millis - state.window_start).max(0);
        let retry_after_millis = (self.window_size_millis - elapsed).max(1);
        Ok(ProcessResult::denied(
            clamp_remaining((self.capacity as f64 - estimate).round() as i64, self.capacity),
            retry_after_millis,
        ))
    }

    async fn reset(&self) -> Result<(), BackendError> {
        self.cache.flush_all().await
    }
}

impl SlidingWindowCounter {
    async fn persist(&self, key: &str, state: State) -> Result<(), BackendError> {
        let encoded = serde_json::to_string(&state).expect("State serializes infallibly");
        self.cache
            .set_with_expiry(key, &encoded, super::jittered_ttl(self.ttl))
            .await
    }
}
