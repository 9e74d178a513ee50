//! Counter storage for fixed-window rate limiting.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;

/// The state of a counter after one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Counter value after the evaluation
    pub count: u64,
    /// Start of the window the counter belongs to, epoch milliseconds
    pub window_start_ms: i64,
    /// Whether this evaluation consumed quota (incremented the counter)
    pub consumed: bool,
}

/// Errors surfaced by a counter store.
///
/// These never reach the limiter's callers; the decision engine recovers
/// from them with its fail-open policy.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing store could not be read or written.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A store round-trip exceeded its deadline.
    #[error("store operation timed out")]
    Timeout,
}

/// Trait for counter store implementations.
///
/// The store is the sole serialization point for a key: the whole
/// read-evaluate-write of `check_and_increment` must be atomic with respect
/// to concurrent callers sharing that key. Implementations back this with
/// whatever primitive they have (a per-shard lock in memory, an atomic
/// upsert in a database), never a read-then-write in application code.
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Atomically apply one fixed-window evaluation for `key`.
    ///
    /// If no counter exists, or the stored window started `window_ms` or
    /// more before `now_ms`, the effective count is zero and the effective
    /// window starts at `now_ms`. When the effective count is below
    /// `limit`, the incremented counter is persisted (a fresh row with
    /// count 1 on a new window, count + 1 with the window start unchanged
    /// otherwise) and the snapshot reports `consumed = true`. At or above
    /// `limit` nothing is written and `consumed = false`.
    async fn check_and_increment(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
        limit: u64,
    ) -> Result<CounterSnapshot, StoreError>;

    /// Remove counters whose window had fully elapsed by `now_ms`.
    ///
    /// Best-effort cleanup; expired counters are reset on next access
    /// regardless. Returns the number of counters removed.
    async fn delete_expired(&self, now_ms: i64) -> Result<u64, StoreError>;
}
