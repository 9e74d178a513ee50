//! Policy presets: named limit/window pairs bound to key prefixes.
//!
//! Presets are the production path to the limiter. Each one fixes its
//! limit and window at startup, so a caller can only spend quota, never
//! renegotiate it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::PolicyConfig;
use crate::error::{FloodgateError, Result};

use super::{RateLimitDecision, RateLimiter};

/// A fixed rate limit bound to one protected action.
///
/// Keys evaluated through a policy are namespaced as `prefix:identity`,
/// so distinct actions sharing one store never collide.
pub struct RateLimitPolicy {
    prefix: String,
    limit: u64,
    window_ms: i64,
    limiter: Arc<RateLimiter>,
}

impl RateLimitPolicy {
    /// Create a policy, validating its configuration.
    ///
    /// A zero limit, zero window, or empty prefix is a configuration error
    /// and fails here, at startup, rather than on a request path.
    pub fn new(
        limiter: Arc<RateLimiter>,
        prefix: impl Into<String>,
        limit: u64,
        window: Duration,
    ) -> Result<Self> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(FloodgateError::Config(
                "policy prefix must not be empty".to_string(),
            ));
        }
        if limit == 0 {
            return Err(FloodgateError::Config(format!(
                "policy '{prefix}' must allow at least one call per window"
            )));
        }
        if window.is_zero() {
            return Err(FloodgateError::Config(format!(
                "policy '{prefix}' must have a non-zero window"
            )));
        }

        Ok(Self {
            prefix,
            limit,
            window_ms: window.as_millis() as i64,
            limiter,
        })
    }

    /// Evaluate one call from `identity` against this policy.
    pub async fn evaluate(&self, identity: &str) -> RateLimitDecision {
        let key = format!("{}:{}", self.prefix, identity);
        self.limiter
            .check_and_consume(&key, self.limit, self.window_ms)
            .await
    }

    /// The key prefix (also the policy's name).
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Maximum permitted calls per window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Window length in milliseconds.
    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }
}

/// All policies bound at startup, looked up by name.
pub struct PolicySet {
    policies: HashMap<String, Arc<RateLimitPolicy>>,
}

impl PolicySet {
    /// Build the policy set from configuration.
    pub fn from_config(
        limiter: Arc<RateLimiter>,
        configs: impl IntoIterator<Item = (String, PolicyConfig)>,
    ) -> Result<Self> {
        let mut policies = HashMap::new();
        for (name, config) in configs {
            let policy = RateLimitPolicy::new(
                limiter.clone(),
                name.clone(),
                config.limit,
                Duration::from_secs(config.window_secs),
            )?;
            info!(
                policy = %name,
                limit = config.limit,
                window_secs = config.window_secs,
                "Bound rate limit policy"
            );
            policies.insert(name, Arc::new(policy));
        }
        Ok(Self { policies })
    }

    /// Look up a policy by name.
    pub fn get(&self, name: &str) -> Option<&Arc<RateLimitPolicy>> {
        self.policies.get(name)
    }

    /// Number of bound policies.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether no policies are bound.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn test_limiter() -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(Arc::new(MemoryStore::new())))
    }

    #[tokio::test]
    async fn test_policy_enforces_its_limit() {
        let policy =
            RateLimitPolicy::new(test_limiter(), "comment", 3, Duration::from_secs(3600))
                .unwrap();

        for _ in 0..3 {
            assert!(policy.evaluate("1.2.3.4").await.allowed);
        }
        assert!(!policy.evaluate("1.2.3.4").await.allowed);
    }

    #[tokio::test]
    async fn test_identities_do_not_cross_pollinate() {
        let policy =
            RateLimitPolicy::new(test_limiter(), "subscription", 3, Duration::from_secs(3600))
                .unwrap();

        for _ in 0..3 {
            assert!(policy.evaluate("1.2.3.4").await.allowed);
            assert!(policy.evaluate("5.6.7.8").await.allowed);
        }
        assert!(!policy.evaluate("1.2.3.4").await.allowed);
        assert!(!policy.evaluate("5.6.7.8").await.allowed);
    }

    #[tokio::test]
    async fn test_policies_with_shared_store_stay_namespaced() {
        let limiter = test_limiter();
        let comment =
            RateLimitPolicy::new(limiter.clone(), "comment", 1, Duration::from_secs(3600))
                .unwrap();
        let report =
            RateLimitPolicy::new(limiter, "report", 1, Duration::from_secs(3600)).unwrap();

        assert!(comment.evaluate("1.2.3.4").await.allowed);
        // Same identity, different action: independent quota.
        assert!(report.evaluate("1.2.3.4").await.allowed);
        assert!(!comment.evaluate("1.2.3.4").await.allowed);
    }

    #[test]
    fn test_invalid_configuration_fails_fast() {
        let limiter = test_limiter();

        assert!(
            RateLimitPolicy::new(limiter.clone(), "", 5, Duration::from_secs(60)).is_err()
        );
        assert!(
            RateLimitPolicy::new(limiter.clone(), "comment", 0, Duration::from_secs(60))
                .is_err()
        );
        assert!(RateLimitPolicy::new(limiter, "comment", 5, Duration::ZERO).is_err());
    }

    #[test]
    fn test_policy_set_binds_defaults() {
        let config = crate::config::FloodgateConfig::default();
        let set = PolicySet::from_config(test_limiter(), config.policies).unwrap();

        assert_eq!(set.len(), 4);
        let comment = set.get("comment").unwrap();
        assert_eq!(comment.limit(), 10);
        assert_eq!(comment.window_ms(), 3_600_000);
        assert_eq!(set.get("subscription").unwrap().limit(), 3);
        assert!(set.get("unknown").is_none());
    }

    #[test]
    fn test_policy_set_rejects_bad_entry() {
        let configs = [(
            "broken".to_string(),
            PolicyConfig {
                limit: 0,
                window_secs: 3600,
            },
        )];
        assert!(PolicySet::from_config(test_limiter(), configs).is_err());
    }
}
