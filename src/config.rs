//! Configuration management for Floodgate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;

/// Main configuration for the Floodgate service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Named policy presets, keyed by prefix.
    ///
    /// Entries here override or extend the built-in presets. Policies are
    /// bound once at startup; there is no per-request configuration.
    #[serde(default = "default_policies")]
    pub policies: BTreeMap<String, PolicyConfig>,
}

impl Default for FloodgateConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            rate_limiting: RateLimitingConfig::default(),
            policies: default_policies(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Default limit for the generic check endpoint when the caller
    /// supplies none
    #[serde(default = "default_limit")]
    pub default_limit: u64,

    /// Default window in seconds for the generic check endpoint
    #[serde(default = "default_window_secs")]
    pub default_window_secs: u64,

    /// Upper bound on a single counter store round-trip in milliseconds;
    /// calls exceeding it are treated as store failures and fail open
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,

    /// Interval between best-effort sweeps of expired counters, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            default_window_secs: default_window_secs(),
            store_timeout_ms: default_store_timeout(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_limit() -> u64 {
    10
}

fn default_window_secs() -> u64 {
    60
}

fn default_store_timeout() -> u64 {
    1000
}

fn default_sweep_interval() -> u64 {
    300
}

/// A single policy preset: a fixed limit/window pair bound to a key prefix.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Maximum permitted calls per window
    pub limit: u64,
    /// Window length in seconds
    pub window_secs: u64,
}

/// The built-in presets, one per protected action of the consuming
/// application.
fn default_policies() -> BTreeMap<String, PolicyConfig> {
    BTreeMap::from([
        (
            "comment".to_string(),
            PolicyConfig {
                limit: 10,
                window_secs: 3600,
            },
        ),
        (
            "report".to_string(),
            PolicyConfig {
                limit: 5,
                window_secs: 3600,
            },
        ),
        (
            "subscription".to_string(),
            PolicyConfig {
                limit: 3,
                window_secs: 3600,
            },
        ),
        (
            "project".to_string(),
            PolicyConfig {
                limit: 5,
                window_secs: 3600,
            },
        ),
    ])
}

impl FloodgateConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: FloodgateConfig = serde_yaml::from_str(&contents)
            .map_err(|e| crate::error::FloodgateError::Config(e.to_string()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FloodgateConfig::default();
        assert_eq!(config.server.listen_addr, default_listen_addr());
        assert_eq!(config.rate_limiting.default_limit, 10);
        assert_eq!(config.rate_limiting.default_window_secs, 60);
        assert_eq!(config.rate_limiting.store_timeout_ms, 1000);
    }

    #[test]
    fn test_built_in_presets() {
        let policies = default_policies();
        assert_eq!(policies["comment"].limit, 10);
        assert_eq!(policies["report"].limit, 5);
        assert_eq!(policies["subscription"].limit, 3);
        assert_eq!(policies["project"].limit, 5);
        assert!(policies.values().all(|p| p.window_secs == 3600));
    }

    #[test]
    fn test_parse_yaml_overrides() {
        let yaml = r#"
server:
  listen_addr: "0.0.0.0:9000"
rate_limiting:
  default_limit: 20
policies:
  comment:
    limit: 2
    window_secs: 60
"#;
        let config: FloodgateConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.listen_addr.port(), 9000);
        assert_eq!(config.rate_limiting.default_limit, 20);
        // Unspecified fields keep their defaults
        assert_eq!(config.rate_limiting.default_window_secs, 60);
        // An explicit policies section replaces the built-ins
        assert_eq!(config.policies.len(), 1);
        assert_eq!(config.policies["comment"].limit, 2);
    }

    #[test]
    fn test_parse_empty_yaml_uses_defaults() {
        let config: FloodgateConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.policies.len(), 4);
        assert_eq!(config.rate_limiting.sweep_interval_secs, 300);
    }
}
