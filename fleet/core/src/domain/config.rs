// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Fleet Server Configuration
//
// Defines the YAML configuration schema for the check-in server:
// - HTTP bind address
// - Check-in timings (flush interval, long-poll timeout, keep-alive)
// - Feature gates
// - Cache and subscription sizing
// - Storage backend selection
// - Observability settings

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level server configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub checkin: CheckinConfig,

    #[serde(default)]
    pub features: FeatureConfig,

    #[serde(default)]
    pub action_cache: ActionCacheConfig,

    #[serde(default)]
    pub token_resolver: TokenResolverConfig,

    #[serde(default)]
    pub subscriptions: SubscriptionConfig,

    /// Storage backend; in-memory when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseConfig>,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckinConfig {
    /// How often the batched writer flushes pending check-ins
    #[serde(default = "default_flush_interval", with = "humantime_serde")]
    pub flush_interval: Duration,

    /// How long a check-in is held open waiting for actions
    #[serde(default = "default_long_poll_timeout", with = "humantime_serde")]
    pub long_poll_timeout: Duration,

    /// How often a held check-in refreshes the agent's liveness
    #[serde(default = "default_keep_alive_interval", with = "humantime_serde")]
    pub keep_alive_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Sequence-number action dispatch and pending action fetch
    #[serde(default = "default_true")]
    pub actions: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCacheConfig {
    #[serde(default = "default_action_cache_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResolverConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_token_cache_capacity")]
    pub cache_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Bound of each subscription's delivery queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// How often newly indexed actions are picked up and dispatched
    #[serde(default = "default_action_poll_interval", with = "humantime_serde")]
    pub action_poll_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus exporter port; exporter disabled when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8220
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_long_poll_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_keep_alive_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_action_cache_capacity() -> usize {
    4096
}

fn default_token_cache_capacity() -> usize {
    1024
}

fn default_queue_capacity() -> usize {
    16
}

fn default_action_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_max_connections() -> u32 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for CheckinConfig {
    fn default() -> Self {
        Self {
            flush_interval: default_flush_interval(),
            long_poll_timeout: default_long_poll_timeout(),
            keep_alive_interval: default_keep_alive_interval(),
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self { actions: true }
    }
}

impl Default for ActionCacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_action_cache_capacity(),
        }
    }
}

impl Default for TokenResolverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_capacity: default_token_cache_capacity(),
        }
    }
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            action_poll_interval: default_action_poll_interval(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_port: None,
        }
    }
}

impl FleetConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. FLEET_CONFIG_PATH environment variable
    /// 2. ./fleet-server.yaml (working directory)
    /// 3. ~/.fleet/config.yaml (user home)
    /// 4. /etc/fleet-server/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("FLEET_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./fleet-server.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".fleet").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/fleet-server/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("FLEET_DATABASE_URL") {
            if !url.is_empty() {
                tracing::info!("Environment override: FLEET_DATABASE_URL");
                let max_connections = self
                    .database
                    .as_ref()
                    .map(|db| db.max_connections)
                    .unwrap_or_else(default_max_connections);
                self.database = Some(DatabaseConfig { url, max_connections });
            }
        }

        if let Ok(val) = std::env::var("FLEET_PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Environment override: FLEET_PORT={}", port);
                    self.server.port = port;
                }
                Err(_) => {
                    tracing::warn!("Invalid value for FLEET_PORT: '{}'. Ignoring.", val);
                }
            }
        }

        if let Ok(val) = std::env::var("FLEET_FEATURE_ACTIONS") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => self.features.actions = true,
                "false" | "0" | "no" | "off" => self.features.actions = false,
                _ => {
                    tracing::warn!(
                        "Invalid value for FLEET_FEATURE_ACTIONS: '{}'. Expected true/false. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.bind_address.is_empty() {
            anyhow::bail!("server.bind_address cannot be empty");
        }

        if self.checkin.flush_interval.is_zero() {
            anyhow::bail!("checkin.flush_interval must be greater than zero");
        }

        if self.checkin.long_poll_timeout.is_zero() {
            anyhow::bail!("checkin.long_poll_timeout must be greater than zero");
        }

        if self.checkin.keep_alive_interval.is_zero() {
            anyhow::bail!("checkin.keep_alive_interval must be greater than zero");
        }

        if self.checkin.keep_alive_interval >= self.checkin.long_poll_timeout {
            anyhow::bail!(
                "checkin.keep_alive_interval ({:?}) must be shorter than checkin.long_poll_timeout ({:?})",
                self.checkin.keep_alive_interval,
                self.checkin.long_poll_timeout
            );
        }

        if self.action_cache.capacity == 0 {
            anyhow::bail!("action_cache.capacity must be greater than zero");
        }

        if self.token_resolver.enabled && self.token_resolver.cache_capacity == 0 {
            anyhow::bail!("token_resolver.cache_capacity must be greater than zero");
        }

        if self.subscriptions.queue_capacity == 0 {
            anyhow::bail!("subscriptions.queue_capacity must be greater than zero");
        }

        if self.subscriptions.action_poll_interval.is_zero() {
            anyhow::bail!("subscriptions.action_poll_interval must be greater than zero");
        }

        if let Some(db) = &self.database {
            if db.url.is_empty() {
                anyhow::bail!("database.url cannot be empty");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FleetConfig::default();
        assert_eq!(config.server.port, 8220);
        assert_eq!(config.checkin.flush_interval, Duration::from_secs(10));
        assert_eq!(config.checkin.long_poll_timeout, Duration::from_secs(300));
        assert_eq!(config.checkin.keep_alive_interval, Duration::from_secs(30));
        assert!(config.features.actions);
        assert!(config.database.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
checkin:
  long_poll_timeout: 2m
features:
  actions: false
"#;
        let config = FleetConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.checkin.long_poll_timeout, Duration::from_secs(120));
        assert_eq!(config.checkin.keep_alive_interval, Duration::from_secs(30));
        assert!(!config.features.actions);
        assert_eq!(config.server.bind_address, "0.0.0.0");
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet-server.yaml");

        let mut config = FleetConfig::default();
        config.database = Some(DatabaseConfig {
            url: "postgres://localhost/fleet".to_string(),
            max_connections: 4,
        });
        config.to_yaml_file(&path).unwrap();

        let loaded = FleetConfig::from_yaml_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_validation_rejects_keep_alive_longer_than_long_poll() {
        let mut config = FleetConfig::default();
        config.checkin.keep_alive_interval = Duration::from_secs(600);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_flush_interval() {
        let mut config = FleetConfig::default();
        config.checkin.flush_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
