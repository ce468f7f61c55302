//! The per-caller request serializer (C5): wraps any
//! [`RateLimitAlgorithm`] so at most one `processRequest` per caller key is
//! in flight at a time, with further calls enqueued FIFO and dispatched as
//! earlier ones complete. Realized as a `dashmap`-sharded map of key to a
//! reference-counted `tokio::sync::Mutex` — a map of key to queue with a
//! single dispatcher lock — `tokio::sync::Mutex`
//! already grants its waiters FIFO order, so no separate queue data
//! structure is needed. Empty entries are reclaimed once their last waiter
//! departs, to keep idle callers from accumulating unboundedly.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use super::algorithm::ProcessResult;
use super::algorithm::RateLimitAlgorithm;
use crate::error::BackendError;

/// Wraps `A` with per-key FIFO serialization.
pub struct PerCallerSerializer<A> {
    algorithm: A,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<A: RateLimitAlgorithm> PerCallerSerializer<A> {
    pub fn new(algorithm: A) -> Self {
        PerCallerSerializer {
            algorithm,
            locks: DashMap::new(),
        }
    }

    pub fn algorithm(&self) -> &A {
        &self.algorithm
    }

    /// Runs `processRequest` for `key`, waiting for any earlier in-flight
    /// or queued call on the same key to finish first. Unrelated keys never
    /// block each other — there is no fairness guarantee across keys.
    pub async fn process_request(
        &self,
        key: &str,
        timestamp_millis: i64,
        tokens: i64,
    ) -> Result<ProcessResult, BackendError> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;
        let result = self.algorithm.process_request(key, timestamp_millis, tokens).await;
        drop(_guard);
        self.reclaim(key);
        result
    }

    /// Same as [`Self::process_request`], but abandons the wait (returning
    /// `None`) if `cancelled` resolves first — the caller's queued slot is
    /// freed without blocking anyone else waiting on the same key.
    /// Realized with a plain future rather than a dedicated cancellation-token type, since
    /// `tokio::sync::Mutex::lock` is already cancel-safe: dropping the
    /// losing branch of `select!` simply releases this waiter's place in
    /// line.
    pub async fn process_request_cancellable<C>(
        &self,
        key: &str,
        timestamp_millis: i64,
        tokens: i64,
        cancelled: C,
    ) -> Option<Result<ProcessResult, BackendError>>
    where
        C: std::future::Future<Output = ()>,
    {
        let lock = self.lock_for(key);
        tokio::select! {
            guard = lock.lock() => {
                let result = self.algorithm.process_request(key, timestamp_millis, tokens).await;
                drop(guard);
                self.reclaim(key);
                Some(result)
            }
            _ = cancelled => {
                self.reclaim(key);
                None
            }
        }
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Drops a key's queue entry once nothing else references its mutex,
    /// so idle callers don't accumulate unboundedly.
    fn reclaim(&self, key: &str) {
        self.locks.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    #[cfg(test)]
    fn queued_keys(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::cache::InMemoryCache;
    use crate::ratelimit::token_bucket::TokenBucket;
    use std::time::Duration;

    fn serializer() -> PerCallerSerializer<TokenBucket> {
        PerCallerSerializer::new(TokenBucket::new(
            5,
            1.0,
            Duration::from_secs(60),
            Arc::new(InMemoryCache::new()),
        ))
    }

    #[tokio::test]
    async fn concurrent_requests_on_the_same_key_are_linearized() {
        let serializer = Arc::new(serializer());
        let mut handles = Vec::new();
        for _ in 0..10 {
            let serializer = serializer.clone();
            handles.push(tokio::spawn(async move {
                serializer.process_request("same-caller", 0, 1).await.unwrap()
            }));
        }
        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().success {
                successes += 1;
            }
        }
        // Capacity is 5; exactly 5 of the 10 concurrent calls should succeed
        // regardless of interleaving, proving no two calls both observed
        // the same stale state.
        assert_eq!(successes, 5);
    }

    #[tokio::test]
    async fn empty_queue_is_reclaimed_after_completion() {
        let serializer = serializer();
        serializer.process_request("k", 0, 1).await.unwrap();
        assert_eq!(serializer.queued_keys(), 0);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_block_each_other() {
        let serializer = Arc::new(serializer());
        let a = serializer.clone();
        let b = serializer.clone();
        let (ra, rb) = tokio::join!(
            a.process_request("caller-a", 0, 1),
            b.process_request("caller-b", 0, 1)
        );
        assert!(ra.unwrap().success);
        assert!(rb.unwrap().success);
    }

    #[tokio::test]
    async fn cancellation_frees_the_slot_without_blocking_others() {
        let serializer = Arc::new(serializer());
        let already_cancelled = std::future::ready(());
        let outcome = serializer
            .process_request_cancellable("k", 0, 1, already_cancelled)
            .await;
        // A request racing a future that's already resolved may still win
        // the select; what matters is that the queue is empty either way.
        let _ = outcome;
        assert_eq!(serializer.queued_keys(), 0);
    }
}
