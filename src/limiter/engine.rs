//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

use crate::store::WindowStore;

use super::epoch_ms;

/// Default upper bound on a counter store round-trip.
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(1);

/// The outcome of one rate limit evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether this call is permitted to proceed
    pub allowed: bool,
    /// Calls remaining in the current window after this evaluation
    pub remaining: u64,
    /// When the current window ends, epoch milliseconds
    pub reset_at_ms: i64,
    /// Counter value after this evaluation
    pub current_count: u64,
    /// Whether the decision was made fail-open because the store failed
    pub degraded: bool,
}

impl RateLimitDecision {
    /// Seconds until the window resets, rounded up and never negative.
    ///
    /// Suitable for a `Retry-After` header.
    pub fn retry_after_secs(&self, now_ms: i64) -> u64 {
        let remaining_ms = self.reset_at_ms.saturating_sub(now_ms).max(0);
        (remaining_ms as u64).div_ceil(1000)
    }
}

/// The core rate limiter: fixed-window counting over an injected store.
///
/// Holds no counter state of its own. Every mutation goes through the
/// store's atomic evaluation, so any number of limiter instances (in any
/// number of processes) can share one store. Can be shared across tasks
/// behind an `Arc`.
pub struct RateLimiter {
    /// Counter store handle
    store: Arc<dyn WindowStore>,
    /// Deadline for one store round-trip; beyond it the call fails open
    store_timeout: Duration,
}

impl RateLimiter {
    /// Create a rate limiter over the given store with the default store
    /// timeout.
    pub fn new(store: Arc<dyn WindowStore>) -> Self {
        Self::with_timeout(store, DEFAULT_STORE_TIMEOUT)
    }

    /// Create a rate limiter with an explicit store timeout.
    pub fn with_timeout(store: Arc<dyn WindowStore>, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
        }
    }

    /// Evaluate one call against `key` and consume quota if allowed.
    ///
    /// Callers namespace the key (`prefix:identity`) before calling. A zero
    /// `limit` always denies. This method never fails: a store error or
    /// timeout degrades to an allow, logged with the failing key and cause.
    /// Denied calls consume no quota.
    pub async fn check_and_consume(
        &self,
        key: &str,
        limit: u64,
        window_ms: i64,
    ) -> RateLimitDecision {
        let now_ms = epoch_ms();

        trace!(key = %key, limit = limit, window_ms = window_ms, "Checking rate limit");

        let evaluation = tokio::time::timeout(
            self.store_timeout,
            self.store.check_and_increment(key, now_ms, window_ms, limit),
        )
        .await;

        let snapshot = match evaluation {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                warn!(key = %key, error = %e, "Counter store failed, allowing request");
                return Self::fail_open(limit, now_ms, window_ms);
            }
            Err(_) => {
                warn!(
                    key = %key,
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "Counter store timed out, allowing request"
                );
                return Self::fail_open(limit, now_ms, window_ms);
            }
        };

        let remaining = if snapshot.consumed {
            limit.saturating_sub(snapshot.count)
        } else {
            0
        };

        RateLimitDecision {
            allowed: snapshot.consumed,
            remaining,
            reset_at_ms: snapshot.window_start_ms.saturating_add(window_ms),
            current_count: snapshot.count,
            degraded: false,
        }
    }

    /// The degraded decision returned when the store is unreachable:
    /// allow, as if this were the first call of a fresh window.
    fn fail_open(limit: u64, now_ms: i64, window_ms: i64) -> RateLimitDecision {
        RateLimitDecision {
            allowed: true,
            remaining: limit.saturating_sub(1),
            reset_at_ms: now_ms.saturating_add(window_ms),
            current_count: 0,
            degraded: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CounterSnapshot, MemoryStore, StoreError};
    use async_trait::async_trait;
    use futures::future::join_all;

    /// Store double that fails every call.
    struct FailingStore;

    #[async_trait]
    impl WindowStore for FailingStore {
        async fn check_and_increment(
            &self,
            _key: &str,
            _now_ms: i64,
            _window_ms: i64,
            _limit: u64,
        ) -> Result<CounterSnapshot, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn delete_expired(&self, _now_ms: i64) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    /// Store double that never answers within a test-sized deadline.
    struct SlowStore;

    #[async_trait]
    impl WindowStore for SlowStore {
        async fn check_and_increment(
            &self,
            _key: &str,
            now_ms: i64,
            _window_ms: i64,
            _limit: u64,
        ) -> Result<CounterSnapshot, StoreError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(CounterSnapshot {
                count: 1,
                window_start_ms: now_ms,
                consumed: true,
            })
        }

        async fn delete_expired(&self, _now_ms: i64) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    fn memory_limiter() -> (RateLimiter, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (RateLimiter::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_consumption_is_monotonic_until_denied() {
        let (limiter, _) = memory_limiter();
        let limit = 5;

        for i in 0..limit {
            let decision = limiter.check_and_consume("k", limit, 60_000).await;
            assert!(decision.allowed, "call {} should be allowed", i + 1);
            assert_eq!(decision.remaining, limit - 1 - i);
            assert_eq!(decision.current_count, i + 1);
            assert!(!decision.degraded);
        }

        let decision = limiter.check_and_consume("k", limit, 60_000).await;
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[tokio::test]
    async fn test_window_reset_restores_quota() {
        let (limiter, _) = memory_limiter();

        // Exhaust a 100ms window.
        assert!(limiter.check_and_consume("k", 2, 100).await.allowed);
        assert!(limiter.check_and_consume("k", 2, 100).await.allowed);
        assert!(!limiter.check_and_consume("k", 2, 100).await.allowed);

        tokio::time::sleep(Duration::from_millis(120)).await;

        let decision = limiter.check_and_consume("k", 2, 100).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    #[tokio::test]
    async fn test_denied_calls_consume_no_quota() {
        let (limiter, store) = memory_limiter();

        limiter.check_and_consume("k", 1, 60_000).await;

        for _ in 0..5 {
            let decision = limiter.check_and_consume("k", 1, 60_000).await;
            assert!(!decision.allowed);
            assert_eq!(decision.current_count, 1);
            assert_eq!(decision.remaining, 0);
        }

        assert_eq!(store.count("k"), Some(1));
    }

    #[tokio::test]
    async fn test_zero_limit_always_denies() {
        let (limiter, store) = memory_limiter();

        let decision = limiter.check_and_consume("k", 0, 60_000).await;

        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_calls_allow_exactly_the_limit() {
        let store = Arc::new(MemoryStore::new());
        let limiter = Arc::new(RateLimiter::new(store.clone()));
        let limit = 5;
        let calls = 20;

        let tasks = (0..calls).map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.check_and_consume("k", limit, 60_000).await })
        });

        let decisions: Vec<_> = join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let allowed = decisions.iter().filter(|d| d.allowed).count() as u64;
        assert_eq!(allowed, limit);
        assert_eq!(store.count("k"), Some(limit));
    }

    #[tokio::test]
    async fn test_store_failure_fails_open() {
        let limiter = RateLimiter::new(Arc::new(FailingStore));

        for _ in 0..10 {
            let decision = limiter.check_and_consume("k", 3, 60_000).await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, 2);
            assert!(decision.degraded);
        }
    }

    #[tokio::test]
    async fn test_store_timeout_fails_open() {
        let limiter =
            RateLimiter::with_timeout(Arc::new(SlowStore), Duration::from_millis(50));

        let decision = limiter.check_and_consume("k", 3, 60_000).await;

        assert!(decision.allowed);
        assert!(decision.degraded);
    }

    #[tokio::test]
    async fn test_oversized_window_saturates_reset() {
        let (limiter, _) = memory_limiter();

        let decision = limiter.check_and_consume("k", 1, i64::MAX).await;

        assert!(decision.allowed);
        assert_eq!(decision.reset_at_ms, i64::MAX);
        // Quota still holds under the saturated window.
        assert!(!limiter.check_and_consume("k", 1, i64::MAX).await.allowed);
    }

    #[tokio::test]
    async fn test_retry_after_rounds_up() {
        let decision = RateLimitDecision {
            allowed: false,
            remaining: 0,
            reset_at_ms: 10_500,
            current_count: 3,
            degraded: false,
        };

        assert_eq!(decision.retry_after_secs(10_000), 1);
        assert_eq!(decision.retry_after_secs(9_001), 2);
        // A window that already ended never yields a negative wait.
        assert_eq!(decision.retry_after_secs(11_000), 0);
    }
}
