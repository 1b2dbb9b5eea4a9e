//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `api_base_url` is empty, and
    /// `ConfigError::Invalid` if:
    /// - `api_base_url` is not an http(s) URL
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `sync_interval_ms` is less than 100ms or exceeds 1 hour
    /// - `max_queue_size` is 0 or exceeds 10000
    /// - `max_retries` is 0
    /// - any TTL is 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "api_base_url".into(),
                hint: "Set KARMA_API_BASE_URL environment variable".into(),
            });
        }
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                field: "api_base_url".into(),
                reason: "must start with http:// or https://".into(),
            });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.sync_interval_ms < 100 {
            return Err(ConfigError::Invalid {
                field: "sync_interval_ms".into(),
                reason: "must be at least 100ms".into(),
            });
        }
        if self.sync_interval_ms > 3_600_000 {
            return Err(ConfigError::Invalid {
                field: "sync_interval_ms".into(),
                reason: "must not exceed 1 hour (3600000ms)".into(),
            });
        }

        if self.max_queue_size == 0 {
            return Err(ConfigError::Invalid {
                field: "max_queue_size".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.max_queue_size > 10_000 {
            return Err(ConfigError::Invalid { field: "max_queue_size".into(), reason: "must not exceed 10000".into() });
        }

        if self.max_retries == 0 {
            return Err(ConfigError::Invalid { field: "max_retries".into(), reason: "must be greater than 0".into() });
        }

        if self.default_ttl_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "default_ttl_ms".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if let Some((collection, _)) = self.cache_ttl_ms.iter().find(|(_, ms)| **ms == 0) {
            return Err(ConfigError::Invalid {
                field: format!("cache_ttl_ms.{collection}"),
                reason: "must be greater than 0".into(),
            });
        }

        if self.sync_interval_ms < self.timeout_ms {
            tracing::warn!(
                sync_interval_ms = self.sync_interval_ms,
                timeout_ms = self.timeout_ms,
                "sync interval is shorter than the request timeout; \
                 ticks during a slow drain will be skipped"
            );
        }

        Ok(())
    }
}
