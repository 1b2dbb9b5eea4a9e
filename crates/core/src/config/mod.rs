//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (KARMA_*)
//! 2. TOML config file (if KARMA_CONFIG_FILE set)
//! 3. Built-in defaults

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::TtlPolicy;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (KARMA_*)
/// 2. TOML config file (if KARMA_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the backend API.
    ///
    /// Set via KARMA_API_BASE_URL environment variable.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Path to the SQLite store backing the cache and offline queue.
    ///
    /// Set via KARMA_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via KARMA_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Interval between offline queue drains in milliseconds.
    ///
    /// Set via KARMA_SYNC_INTERVAL_MS environment variable.
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,

    /// Maximum number of pending offline actions; the oldest is evicted beyond this.
    ///
    /// Set via KARMA_MAX_QUEUE_SIZE environment variable.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Failed sync attempts after which an offline action is dropped.
    ///
    /// Set via KARMA_MAX_RETRIES environment variable.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Expiry for cache collections without an explicit entry, in milliseconds.
    ///
    /// Set via KARMA_DEFAULT_TTL_MS environment variable.
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,

    /// Per-collection expiry in milliseconds.
    ///
    /// Set via KARMA_CACHE_TTL_MS__<COLLECTION> environment variables.
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: BTreeMap<String, u64>,
}

fn default_api_base_url() -> String {
    "http://localhost:3001".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./karma-store.sqlite")
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_sync_interval_ms() -> u64 {
    30_000
}

fn default_max_queue_size() -> usize {
    crate::queue::DEFAULT_CAPACITY
}

fn default_max_retries() -> u32 {
    crate::queue::DEFAULT_MAX_RETRIES
}

fn default_ttl_ms() -> u64 {
    5 * 60 * 1000
}

fn default_cache_ttl_ms() -> BTreeMap<String, u64> {
    [
        ("user_profile", 15 * 60 * 1000),
        ("donation_categories", 60 * 60 * 1000),
        ("community_stats", 10 * 60 * 1000),
        ("donations_list", 5 * 60 * 1000),
        ("rides_list", 5 * 60 * 1000),
        ("chat_conversations", 2 * 60 * 1000),
    ]
    .into_iter()
    .map(|(collection, ms)| (collection.to_string(), ms))
    .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            db_path: default_db_path(),
            timeout_ms: default_timeout_ms(),
            sync_interval_ms: default_sync_interval_ms(),
            max_queue_size: default_max_queue_size(),
            max_retries: default_max_retries(),
            default_ttl_ms: default_ttl_ms(),
            cache_ttl_ms: default_cache_ttl_ms(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Sync loop tick interval.
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    /// Expiry policy built from `default_ttl_ms` and `cache_ttl_ms`.
    pub fn ttl_policy(&self) -> TtlPolicy {
        self.cache_ttl_ms
            .iter()
            .fold(TtlPolicy::new(Duration::from_millis(self.default_ttl_ms)), |policy, (collection, ms)| {
                policy.with(collection.clone(), Duration::from_millis(*ms))
            })
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `KARMA_`
    /// 2. TOML file from `KARMA_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("KARMA_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("KARMA_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
