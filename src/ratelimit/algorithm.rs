//! The rate-limit algorithm contract (C4): `processRequest`
//! against a shared cache, plus administrative `reset`. The four concrete
//! policies with their own state layouts live in sibling modules;
//! this module only holds the trait and the result/sentinel types every
//! policy shares.

use async_trait::async_trait;

use crate::error::BackendError;

/// `retryAfterMillis` sentinel for "a single request alone exceeds
/// capacity": no future retry will ever succeed, since the
/// request's own weight is larger than the bucket can ever hold.
pub const RETRY_AFTER_NEVER: i64 = i64::MAX;

/// The result of one `processRequest` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessResult {
    pub success: bool,
    /// Remaining capacity, algorithm-defined, clamped into `[0, capacity]`.
    pub tokens: i64,
    /// Only set when `success` is false; [`RETRY_AFTER_NEVER`] if the
    /// request alone exceeds capacity.
    pub retry_after_millis: Option<i64>,
}

impl ProcessResult {
    pub fn allowed(remaining: i64) -> Self {
        ProcessResult {
            success: true,
            tokens: remaining,
            retry_after_millis: None,
        }
    }

    pub fn denied(remaining: i64, retry_after_millis: i64) -> Self {
        ProcessResult {
            success: false,
            tokens: remaining,
            retry_after_millis: Some(retry_after_millis),
        }
    }
}

/// One pluggable rate-limiting policy (C4). Implementations own their
/// capacity/window parameters and a shared [`super::cache::CacheBackend`]
/// handle injected at construction — there is no global mutable state; the
/// serializer and rate limiter share a cache client handed in up front.
#[async_trait]
pub trait RateLimitAlgorithm: Send + Sync {
    async fn process_request(
        &self,
        key: &str,
        timestamp_millis: i64,
        tokens: i64,
    ) -> Result<ProcessResult, BackendError>;

    /// Clears all cache state for this algorithm (administrative).
    async fn reset(&self) -> Result<(), BackendError>;
}

/// Clamps a raw remaining-capacity figure into `[0, capacity]` before it's
/// reported back to the caller.
pub(crate) fn clamp_remaining(remaining: i64, capacity: i64) -> i64 {
    remaining.clamp(0, capacity)
}

/// Lets a boxed trait object stand in for a concrete algorithm wherever a
/// `RateLimitAlgorithm` is expected — e.g. [`super::serializer::PerCallerSerializer`]
/// over whichever policy the gateway's configuration selected at startup.
#[async_trait]
impl RateLimitAlgorithm for Box<dyn RateLimitAlgorithm> {
    async fn process_request(
        &self,
        key: &str,
        timestamp_millis: i64,
        tokens: i64,
    ) -> Result<ProcessResult, BackendError> {
        (**self).process_request(key, timestamp_millis, tokens).await
    }

    async fn reset(&self) -> Result<(), BackendError> {
        (**self).reset().await
    }
}
