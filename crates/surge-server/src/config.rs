//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (SURGE_*)
//! - TOML configuration file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed cross-origin callers. `["*"]` allows any origin.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Handshake/heartbeat timing.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Cross-process backplane connection.
    #[serde(default)]
    pub backplane: BackplaneSection,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Token verification.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Ping interval in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    pub interval_ms: u64,

    /// A connection silent longer than this is treated as disconnected.
    #[serde(default = "default_heartbeat_timeout")]
    pub timeout_ms: u64,

    /// Maximum time for handshake authentication to complete.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_ms: u64,
}

/// Backplane connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackplaneSection {
    /// Disable to run single-instance without Redis.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_backplane_host")]
    pub host: String,

    #[serde(default = "default_backplane_port")]
    pub port: u16,

    #[serde(default)]
    pub password: Option<String>,

    /// Logical database index.
    #[serde(default)]
    pub db: i64,

    /// Per-request timeout for backplane publishes.
    #[serde(default = "default_backplane_timeout")]
    pub request_timeout_ms: u64,

    /// Reconnect backoff base delay.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Reconnect backoff cap.
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_ms: u64,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum subscriptions per connection.
    #[serde(default = "default_max_subscriptions")]
    pub max_subscriptions_per_connection: usize,

    /// Per-room broadcast capacity.
    #[serde(default = "default_room_capacity")]
    pub room_capacity: usize,
}

/// Token verification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret shared with the session-issuing service.
    #[serde(default = "default_auth_secret")]
    pub secret: String,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("SURGE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("SURGE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_true() -> bool {
    true
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_heartbeat_interval() -> u64 {
    25_000 // 25 seconds
}

fn default_heartbeat_timeout() -> u64 {
    60_000 // 60 seconds
}

fn default_handshake_timeout() -> u64 {
    10_000
}

fn default_backplane_host() -> String {
    std::env::var("SURGE_REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_backplane_port() -> u16 {
    std::env::var("SURGE_REDIS_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(6379)
}

fn default_backplane_timeout() -> u64 {
    5_000
}

fn default_backoff_base() -> u64 {
    100
}

fn default_backoff_cap() -> u64 {
    3_000
}

fn default_max_subscriptions() -> usize {
    100
}

fn default_room_capacity() -> usize {
    1024
}

fn default_auth_secret() -> String {
    std::env::var("SURGE_AUTH_SECRET").unwrap_or_else(|_| "dev-secret".to_string())
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
            heartbeat: HeartbeatConfig::default(),
            backplane: BackplaneSection::default(),
            limits: LimitsConfig::default(),
            auth: AuthConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_heartbeat_interval(),
            timeout_ms: default_heartbeat_timeout(),
            handshake_timeout_ms: default_handshake_timeout(),
        }
    }
}

impl Default for BackplaneSection {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_backplane_host(),
            port: default_backplane_port(),
            password: None,
            db: 0,
            request_timeout_ms: default_backplane_timeout(),
            backoff_base_ms: default_backoff_base(),
            backoff_cap_ms: default_backoff_cap(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_subscriptions_per_connection: default_max_subscriptions(),
            room_capacity: default_room_capacity(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: default_auth_secret(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "surge.toml",
            "/etc/surge/surge.toml",
            "~/.config/surge/surge.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host/port do not form a valid address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// Router limits derived from config.
    #[must_use]
    pub fn router_config(&self) -> surge_core::RouterConfig {
        surge_core::RouterConfig {
            max_subscriptions_per_connection: self.limits.max_subscriptions_per_connection,
            room_capacity: self.limits.room_capacity,
        }
    }

    /// Backplane connection parameters derived from config.
    #[must_use]
    pub fn backplane_config(&self) -> surge_backplane::BackplaneConfig {
        surge_backplane::BackplaneConfig {
            host: self.backplane.host.clone(),
            port: self.backplane.port,
            password: self.backplane.password.clone(),
            db: self.backplane.db,
            request_timeout: Duration::from_millis(self.backplane.request_timeout_ms),
            backoff_base: Duration::from_millis(self.backplane.backoff_base_ms),
            backoff_cap: Duration::from_millis(self.backplane.backoff_cap_ms),
            ..surge_backplane::BackplaneConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.heartbeat.interval_ms, 25_000);
        assert_eq!(config.heartbeat.timeout_ms, 60_000);
        assert_eq!(config.backplane.request_timeout_ms, 5_000);
        assert_eq!(config.backplane.backoff_base_ms, 100);
        assert_eq!(config.backplane.backoff_cap_ms, 3_000);
        assert_eq!(config.allowed_origins, vec!["*".to_string()]);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000
            allowed_origins = ["https://app.example.com"]

            [heartbeat]
            interval_ms = 10000

            [backplane]
            host = "cache.internal"
            db = 2
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.heartbeat.interval_ms, 10_000);
        // Unset fields keep their defaults.
        assert_eq!(config.heartbeat.timeout_ms, 60_000);
        assert_eq!(config.backplane.host, "cache.internal");
        assert_eq!(config.backplane.db, 2);
    }

    #[test]
    fn test_backplane_config_conversion() {
        let config = Config::default();
        let backplane = config.backplane_config();
        assert_eq!(backplane.request_timeout, Duration::from_secs(5));
        assert_eq!(backplane.backoff_base, Duration::from_millis(100));
        assert_eq!(backplane.backoff_cap, Duration::from_secs(3));
    }
}
