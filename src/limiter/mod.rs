//! Rate limiting decision logic and policy presets.

mod engine;
mod policy;

pub use engine::{RateLimitDecision, RateLimiter};
pub use policy::{PolicySet, RateLimitPolicy};

/// Current time as epoch milliseconds.
pub fn epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
