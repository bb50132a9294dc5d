//! Configuration management for the yoyaku engine
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files. Component-specific sections live next to their
//! components; this module assembles them into one [`Config`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::discovery::DiscoveryConfig;
use crate::error::{Error, Result};
use crate::publish::PublisherConfig;
use crate::rewrite::RewriteConfig;
use crate::schedule::{RetryPolicy, SchedulerConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory layout
    pub storage: StorageConfig,

    /// Slot allocation and state machine settings
    pub scheduler: SchedulerConfig,

    /// Retry policy for schedule entries
    pub retry: RetryPolicy,

    /// Batch execution bounds
    pub executor: ExecutorConfig,

    /// Discovery collaborator settings
    pub discovery: DiscoveryConfig,

    /// Publish collaborator settings
    pub publisher: PublisherConfig,

    /// Rewrite collaborator settings
    pub rewrite: RewriteConfig,

    /// Two-tier cache settings
    pub cache: CacheConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Data directory layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for all persisted documents
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl StorageConfig {
    /// Directory holding the schedule documents
    pub fn schedule_dir(&self) -> PathBuf {
        self.data_dir.join("schedule")
    }

    /// Posted-id registry file
    pub fn posted_ids_path(&self) -> PathBuf {
        self.data_dir.join("posted_ids.json")
    }

    /// Discovery offset state file
    pub fn offset_path(&self) -> PathBuf {
        self.data_dir.join("search_offset.json")
    }
}

/// Batch execution bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Maximum entries per batch invocation
    pub max_batch_items: usize,

    /// Wall-clock budget per batch invocation, in seconds
    pub time_budget_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_batch_items: 8,
            time_budget_secs: 300,
        }
    }
}

impl ExecutorConfig {
    #[must_use]
    pub fn time_budget(&self) -> Duration {
        Duration::from_secs(self.time_budget_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("YOYAKU_DATA_DIR") {
            config.storage.data_dir = dir.into();
            config.cache.dir = config.storage.data_dir.join("cache");
        }

        if let Some(minutes) = env_parse("YOYAKU_SLOT_INTERVAL_MINUTES") {
            config.scheduler.slot_interval_minutes = minutes;
        }
        if let Some(slots) = env_parse("YOYAKU_MAX_DAILY_SLOTS") {
            config.scheduler.max_daily_slots = slots;
        }
        if let Some(minutes) = env_parse("YOYAKU_DUE_BUFFER_MINUTES") {
            config.scheduler.due_buffer_minutes = minutes;
        }

        if let Some(attempts) = env_parse("YOYAKU_MAX_ATTEMPTS") {
            config.retry.max_attempts = attempts;
        }

        if let Some(items) = env_parse("YOYAKU_BATCH_ITEMS") {
            config.executor.max_batch_items = items;
        }
        if let Some(secs) = env_parse("YOYAKU_TIME_BUDGET_SECS") {
            config.executor.time_budget_secs = secs;
        }

        if let Ok(url) = std::env::var("DISCOVERY_BASE_URL") {
            config.discovery.base_url = url;
        }
        config.discovery.api_key = std::env::var("DISCOVERY_API_KEY").ok();
        if let Some(size) = env_parse("DISCOVERY_BATCH_SIZE") {
            config.discovery.batch_size = size;
        }
        if let Some(count) = env_parse("DISCOVERY_REQUIRED_COUNT") {
            config.discovery.required_count = count;
        }

        if let Ok(endpoint) = std::env::var("CMS_ENDPOINT") {
            config.publisher.endpoint = endpoint;
        }
        if let Ok(username) = std::env::var("CMS_USERNAME") {
            config.publisher.username = username;
        }
        if let Ok(password) = std::env::var("CMS_APP_PASSWORD") {
            config.publisher.app_password = password;
        }

        config.rewrite.endpoint = std::env::var("REWRITE_ENDPOINT").ok();
        config.rewrite.api_key = std::env::var("REWRITE_API_KEY").ok();
        if let Ok(model) = std::env::var("REWRITE_MODEL") {
            config.rewrite.model = model;
        }

        if let Ok(level) = std::env::var("YOYAKU_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("YOYAKU_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read config file {}: {e}", path.display()))
        })?;

        toml::from_str(&content).map_err(|e| {
            Error::config(format!(
                "failed to parse TOML config file {}: {e}",
                path.display()
            ))
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let interval = self.scheduler.slot_interval_minutes;
        if interval == 0 {
            return Err(Error::config("slot_interval_minutes must be greater than 0"));
        }
        if 1440 % interval != 0 {
            return Err(Error::config(
                "slot_interval_minutes must divide a day evenly",
            ));
        }

        let slots_per_day = (1440 / interval) as usize;
        if self.scheduler.max_daily_slots == 0 || self.scheduler.max_daily_slots > slots_per_day {
            return Err(Error::config(format!(
                "max_daily_slots must be between 1 and {slots_per_day}"
            )));
        }

        if self.retry.max_attempts == 0 {
            return Err(Error::config("max_attempts must be greater than 0"));
        }

        if self.discovery.batch_size == 0 {
            return Err(Error::config("discovery batch_size must be greater than 0"));
        }
        if self.discovery.required_count == 0
            || self.discovery.required_count > self.discovery.batch_size
        {
            return Err(Error::config(
                "discovery required_count must be between 1 and batch_size",
            ));
        }

        if self.executor.max_batch_items == 0 {
            return Err(Error::config("max_batch_items must be greater than 0"));
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler.slot_interval_minutes, 15);
        assert_eq!(config.scheduler.max_daily_slots, 96);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_storage_paths() {
        let storage = StorageConfig {
            data_dir: PathBuf::from("/var/lib/yoyaku"),
        };
        assert_eq!(
            storage.posted_ids_path(),
            PathBuf::from("/var/lib/yoyaku/posted_ids.json")
        );
        assert_eq!(
            storage.schedule_dir(),
            PathBuf::from("/var/lib/yoyaku/schedule")
        );
    }

    #[test]
    fn test_validate_rejects_uneven_interval() {
        let mut config = Config::default();
        config.scheduler.slot_interval_minutes = 7;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_excess_daily_slots() {
        let mut config = Config::default();
        config.scheduler.max_daily_slots = 200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_required_above_batch() {
        let mut config = Config::default();
        config.discovery.batch_size = 10;
        config.discovery.required_count = 20;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml() {
        let toml_text = r#"
            [storage]
            data_dir = "/srv/yoyaku"

            [scheduler]
            slot_interval_minutes = 30
            max_daily_slots = 48

            [retry]
            max_attempts = 5

            [publisher]
            endpoint = "https://blog.example.com"
            username = "editor"
            app_password = "secret"
        "#;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("yoyaku.toml");
        std::fs::write(&path, toml_text).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/srv/yoyaku"));
        assert_eq!(config.scheduler.slot_interval_minutes, 30);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.publisher.endpoint, "https://blog.example.com");
        // Sections not present keep their defaults
        assert_eq!(config.discovery.batch_size, 100);
        assert!(config.validate().is_ok());
    }
}
