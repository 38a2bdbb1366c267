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
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    /// - `archive_prefix` is empty or contains a path separator
    /// - `failure_ttl_ms` or `live_fetch_timeout_ms` is 0
    /// - `max_container_bytes` is below 1MB
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.archive_prefix.is_empty() {
            return Err(invalid("archive_prefix", "must not be empty"));
        }
        if self.archive_prefix.contains(['/', '\\']) {
            return Err(invalid("archive_prefix", "must not contain path separators"));
        }

        if self.failure_ttl_ms == 0 {
            return Err(invalid("failure_ttl_ms", "must be greater than 0"));
        }

        if self.live_fetch_timeout_ms == 0 {
            return Err(invalid("live_fetch_timeout_ms", "must be greater than 0"));
        }

        if self.max_container_bytes < 1024 * 1024 {
            return Err(invalid("max_container_bytes", "must be at least 1MB"));
        }

        if self.live_fetch_timeout_ms < self.timeout_ms {
            tracing::warn!(
                live_fetch_timeout_ms = self.live_fetch_timeout_ms,
                timeout_ms = self.timeout_ms,
                "live_fetch_timeout_ms is shorter than timeout_ms; \
                 slow fetches will be recorded as failures before the HTTP timeout fires"
            );
        }

        Ok(())
    }
}
