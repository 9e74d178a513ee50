//! In-memory counter store.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{CounterSnapshot, StoreError, WindowStore};

/// A stored counter row.
///
/// The window length is kept alongside the counter so the sweep can judge
/// expiry without a second source of truth.
#[derive(Debug, Clone, Copy)]
struct CounterRow {
    count: u64,
    window_start_ms: i64,
    window_ms: i64,
}

/// The default counter store, backed by a concurrent hash map.
///
/// Per-key atomicity comes from the map's entry API: the shard lock is held
/// across the whole read-evaluate-write, so concurrent callers on one key
/// serialize and a window-boundary race resolves to exactly one fresh
/// window. State lives in this process only; deployments that need counters
/// shared across processes put a durable backend behind [`WindowStore`]
/// instead.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: DashMap<String, CounterRow>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live counter rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the store holds no counters.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Current count for a key, if a row exists.
    ///
    /// Reads the stored value as-is, without applying expiry.
    pub fn count(&self, key: &str) -> Option<u64> {
        self.rows.get(key).map(|row| row.count)
    }
}

#[async_trait]
impl WindowStore for MemoryStore {
    async fn check_and_increment(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
        limit: u64,
    ) -> Result<CounterSnapshot, StoreError> {
        match self.rows.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let row = occupied.get_mut();
                let expired = now_ms - row.window_start_ms >= window_ms;
                let effective = if expired { 0 } else { row.count };

                if effective < limit {
                    if expired {
                        *row = CounterRow {
                            count: 1,
                            window_start_ms: now_ms,
                            window_ms,
                        };
                    } else {
                        row.count += 1;
                        row.window_ms = window_ms;
                    }
                    Ok(CounterSnapshot {
                        count: row.count,
                        window_start_ms: row.window_start_ms,
                        consumed: true,
                    })
                } else {
                    // Denied: leave the row untouched.
                    Ok(CounterSnapshot {
                        count: effective,
                        window_start_ms: if expired { now_ms } else { row.window_start_ms },
                        consumed: false,
                    })
                }
            }
            Entry::Vacant(vacant) => {
                if limit > 0 {
                    vacant.insert(CounterRow {
                        count: 1,
                        window_start_ms: now_ms,
                        window_ms,
                    });
                    Ok(CounterSnapshot {
                        count: 1,
                        window_start_ms: now_ms,
                        consumed: true,
                    })
                } else {
                    // A zero limit never creates state.
                    Ok(CounterSnapshot {
                        count: 0,
                        window_start_ms: now_ms,
                        consumed: false,
                    })
                }
            }
        }
    }

    async fn delete_expired(&self, now_ms: i64) -> Result<u64, StoreError> {
        let before = self.rows.len();
        self.rows
            .retain(|_, row| now_ms - row.window_start_ms < row.window_ms);
        Ok(before.saturating_sub(self.rows.len()) as u64)
    }
}
