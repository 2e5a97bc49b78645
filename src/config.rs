//! Configuration management for the rate limiting service.
//!
//! Settings come from an optional YAML file layered with environment
//! variables prefixed `WEAVER__` (for example `WEAVER__STORAGE__REDIS_URL`).

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// Main configuration for the service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Counter store configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 8081))
}

/// Counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Redis connection URL. When unset the process-local store is used.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Prefix applied to every counter key in Redis
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Upper bound on a single store round-trip, in milliseconds
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_ms: u64,

    /// Upper bound on establishing the Redis connection at startup, in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Minimum time between sweeps of expired in-memory counters, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            key_prefix: default_key_prefix(),
            operation_timeout_ms: default_operation_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl StorageConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_key_prefix() -> String {
    "weaver:rl:".to_string()
}

fn default_operation_timeout() -> u64 {
    250
}

fn default_connect_timeout() -> u64 {
    2000
}

fn default_sweep_interval() -> u64 {
    60
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Path to a YAML bucket table layered over the builtin buckets
    #[serde(default)]
    pub buckets_path: Option<String>,

    /// Honor `X-Forwarded-For`, `X-Real-IP` and `CF-Connecting-IP`.
    ///
    /// Off by default. Only enable behind a reverse proxy that overwrites
    /// these headers; otherwise clients can pick their own key.
    #[serde(default = "default_trust_proxy_headers")]
    pub trust_proxy_headers: bool,

    /// Attach `X-RateLimit-*` headers to allowed responses too
    #[serde(default = "default_informational_headers")]
    pub informational_headers: bool,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            buckets_path: None,
            trust_proxy_headers: default_trust_proxy_headers(),
            informational_headers: default_informational_headers(),
        }
    }
}

fn default_trust_proxy_headers() -> bool {
    false
}

fn default_informational_headers() -> bool {
    true
}

impl ServiceConfig {
    /// Load configuration from an optional file plus `WEAVER__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }

        let config: ServiceConfig = builder
            .add_source(
                ::config::Environment::with_prefix("WEAVER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.server.http_addr.port(), 8081);
        assert!(config.storage.redis_url.is_none());
        assert_eq!(config.storage.operation_timeout(), Duration::from_millis(250));
        assert_eq!(config.storage.key_prefix, "weaver:rl:");
        assert!(!config.rate_limiting.trust_proxy_headers);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            r#"
server:
  http_addr: "0.0.0.0:9000"
storage:
  redis_url: "redis://127.0.0.1:6379"
  operation_timeout_ms: 100
rate_limiting:
  trust_proxy_headers: true
"#
        )
        .unwrap();

        let config = ServiceConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.server.http_addr.port(), 9000);
        assert_eq!(
            config.storage.redis_url.as_deref(),
            Some("redis://127.0.0.1:6379")
        );
        assert_eq!(config.storage.operation_timeout_ms, 100);
        // Unset fields keep their defaults
        assert_eq!(config.storage.sweep_interval_secs, 60);
        assert!(config.rate_limiting.trust_proxy_headers);
        assert!(config.rate_limiting.informational_headers);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = ServiceConfig::load(Some(Path::new("/nonexistent/weaver.yaml")));
        assert!(result.is_err());
    }
}
