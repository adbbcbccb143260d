use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::models::ResourceType;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub watcher: WatcherConfig,
    pub cache: CacheConfig,
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Resource types to watch, as `resource.version.group`
    pub resources: Vec<String>,
    /// How long startup waits for every subscription's initial list
    pub sync_timeout_seconds: u64,
    /// Relay queue depth above which a warning is logged
    pub queue_high_water_mark: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            resources: vec![
                "deployments.v1.apps".to_string(),
                "events.v1.events.k8s.io".to_string(),
            ],
            sync_timeout_seconds: 10,
            queue_high_water_mark: 10_000,
        }
    }
}

impl WatcherConfig {
    #[must_use]
    pub const fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_seconds: u64,
    pub sweep_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 30 * 60,
            sweep_interval_seconds: 60,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

/// Remote sink for outbound notifications. An empty URL disables delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub url: String,
    pub source: String,
    pub cluster_uid: String,
    pub timeout_seconds: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            source: "https://github.com/topowatch/topowatch".to_string(),
            cluster_uid: String::new(),
            timeout_seconds: 30,
        }
    }
}

impl WebhookConfig {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.url.is_empty()
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // TOPOWATCH_WEBHOOK__URL, TOPOWATCH_WATCHER__RESOURCES=a,b, ...
        builder = builder.add_source(
            Environment::with_prefix("TOPOWATCH")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("watcher.resources")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Check the whole configuration, returning every problem found
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be 'json' or 'pretty', got '{}'",
                self.logging.format
            ));
        }

        if self.watcher.resources.is_empty() {
            errors.push("watcher.resources must list at least one resource".to_string());
        }
        for resource in &self.watcher.resources {
            if let Err(e) = resource.parse::<ResourceType>() {
                errors.push(format!("watcher.resources: {e}"));
            }
        }
        if self.watcher.sync_timeout_seconds == 0 {
            errors.push("watcher.sync_timeout_seconds must be greater than 0".to_string());
        }

        if self.cache.enabled {
            if self.cache.ttl_seconds == 0 {
                errors.push("cache.ttl_seconds must be greater than 0".to_string());
            }
            if self.cache.sweep_interval_seconds == 0 {
                errors.push("cache.sweep_interval_seconds must be greater than 0".to_string());
            }
        }

        if self.webhook.is_enabled()
            && !(self.webhook.url.starts_with("http://") || self.webhook.url.starts_with("https://"))
        {
            errors.push(format!(
                "webhook.url must be an http(s) URL, got '{}'",
                self.webhook.url
            ));
        }
        if self.webhook.is_enabled() && self.webhook.timeout_seconds == 0 {
            errors.push("webhook.timeout_seconds must be greater than 0".to_string());
        }

        if !self.cache.enabled && !self.webhook.is_enabled() {
            errors.push("nothing to do: cache is disabled and webhook.url is empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
