//! Rate limiting: C4 (the [`RateLimitAlgorithm`] contract and its four
//! concrete policies) and C5 (the [`PerCallerSerializer`] that wraps any of
//! them with per-key FIFO serialization), plus the [`CacheBackend`] they
//! share.

pub mod algorithm;
pub mod cache;
pub mod fixed_window;
pub mod serializer;
pub mod sliding_window_counter;
pub mod sliding_window_log;
pub mod token_bucket;

use std::time::Duration;

/// Applies a small +/-5% jitter to a cache TTL before a `set_with_expiry`
/// call, so that many keys written around the same instant (e.g. a burst
/// of new callers at startup) don't all expire in the same tick and
/// stampede the cache backend at once.
pub(crate) fn jittered_ttl(ttl: Duration) -> Duration {
    use rand::Rng;
    let factor = rand::rng().random_range(0.95..=1.05_f64);
    Duration::from_secs_f64((ttl.as_secs_f64() * factor).max(0.0))
}

pub use algorithm::ProcessResult;
pub use algorithm::RateLimitAlgorithm;
pub use algorithm::RETRY_AFTER_NEVER;
pub use cache::CacheBackend;
pub use cache::InMemoryCache;
pub use fixed_window::FixedWindow;
pub use serializer::PerCallerSerializer;
pub use sliding_window_counter::SlidingWindowCounter;
pub use sliding_window_log::SlidingWindowLog;
pub use token_bucket::TokenBucket;

#[cfg(feature = "redis-cache")]
pub use cache::RedisCache;
