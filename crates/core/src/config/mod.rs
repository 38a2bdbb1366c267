//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (LIVECACHE_*)
//! 2. TOML config file (if LIVECACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::policy::PolicyConfig;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (LIVECACHE_*)
/// 2. TOML config file (if LIVECACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite capture index.
    ///
    /// Set via LIVECACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Directory holding archive containers.
    ///
    /// Set via LIVECACHE_ARCHIVE_DIR environment variable.
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,

    /// File name prefix for archive containers (`<prefix>-00000.arc`).
    ///
    /// Set via LIVECACHE_ARCHIVE_PREFIX environment variable.
    #[serde(default = "default_archive_prefix")]
    pub archive_prefix: String,

    /// Size at which the archive rolls over to a new container.
    ///
    /// Set via LIVECACHE_MAX_CONTAINER_BYTES environment variable.
    #[serde(default = "default_max_container_bytes")]
    pub max_container_bytes: u64,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via LIVECACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via LIVECACHE_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via LIVECACHE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Bound on a whole live capture (fetch plus archive write) in milliseconds.
    ///
    /// Must be greater than 0. A timeout after the archive append leaves an
    /// orphaned record in the container and is recorded as a failed fetch.
    ///
    /// Set via LIVECACHE_LIVE_FETCH_TIMEOUT_MS environment variable.
    #[serde(default = "default_live_fetch_timeout_ms")]
    pub live_fetch_timeout_ms: u64,

    /// How long a failed live fetch suppresses new attempts, in milliseconds.
    ///
    /// Set via LIVECACHE_FAILURE_TTL_MS environment variable.
    #[serde(default = "default_failure_ttl_ms")]
    pub failure_ttl_ms: u64,

    /// Freshness used when a caller does not pass `max_age_ms`.
    ///
    /// Set via LIVECACHE_DEFAULT_MAX_AGE_MS environment variable.
    #[serde(default = "default_max_age_ms")]
    pub default_max_age_ms: u64,

    /// Collapse concurrent live fetches of the same URL into one.
    ///
    /// Set via LIVECACHE_DEDUPE_LIVE_FETCHES environment variable.
    #[serde(default = "default_true")]
    pub dedupe_live_fetches: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./livecache-index.sqlite")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("./livecache-archive")
}

fn default_archive_prefix() -> String {
    "live".into()
}

fn default_max_container_bytes() -> u64 {
    100 * 1024 * 1024
}

fn default_user_agent() -> String {
    "livecache/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_live_fetch_timeout_ms() -> u64 {
    30_000
}

fn default_failure_ttl_ms() -> u64 {
    600_000
}

fn default_max_age_ms() -> u64 {
    3_600_000
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            archive_dir: default_archive_dir(),
            archive_prefix: default_archive_prefix(),
            max_container_bytes: default_max_container_bytes(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            live_fetch_timeout_ms: default_live_fetch_timeout_ms(),
            failure_ttl_ms: default_failure_ttl_ms(),
            default_max_age_ms: default_max_age_ms(),
            dedupe_live_fetches: true,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn default_max_age(&self) -> Duration {
        Duration::from_millis(self.default_max_age_ms)
    }

    /// Lookup policy settings derived from this configuration.
    pub fn policy(&self) -> PolicyConfig {
        PolicyConfig {
            failure_ttl: Duration::from_millis(self.failure_ttl_ms),
            live_fetch_timeout: Duration::from_millis(self.live_fetch_timeout_ms),
            dedupe_live_fetches: self.dedupe_live_fetches,
        }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `LIVECACHE_`
    /// 2. TOML file from `LIVECACHE_CONFIG_FILE` (if set)
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

        if let Ok(config_path) = std::env::var("LIVECACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("LIVECACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./livecache-index.sqlite"));
        assert_eq!(config.archive_dir, PathBuf::from("./livecache-archive"));
        assert_eq!(config.archive_prefix, "live");
        assert_eq!(config.max_container_bytes, 104_857_600);
        assert_eq!(config.user_agent, "livecache/0.1");
        assert_eq!(config.max_bytes, 5_242_880);
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.live_fetch_timeout_ms, 30_000);
        assert_eq!(config.failure_ttl_ms, 600_000);
        assert_eq!(config.default_max_age_ms, 3_600_000);
        assert!(config.dedupe_live_fetches);
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
        assert_eq!(config.default_max_age(), Duration::from_secs(3600));
    }

    #[test]
    fn test_policy_config() {
        let config = AppConfig { failure_ttl_ms: 1_000, live_fetch_timeout_ms: 2_000, dedupe_live_fetches: false, ..Default::default() };
        let policy = config.policy();
        assert_eq!(policy.failure_ttl, Duration::from_secs(1));
        assert_eq!(policy.live_fetch_timeout, Duration::from_secs(2));
        assert!(!policy.dedupe_live_fetches);
    }

    #[test]
    fn test_default_policy_matches_default_config() {
        let policy = AppConfig::default().policy();
        let expected = PolicyConfig::default();
        assert_eq!(policy.failure_ttl, expected.failure_ttl);
        assert_eq!(policy.live_fetch_timeout, expected.live_fetch_timeout);
        assert_eq!(policy.dedupe_live_fetches, expected.dedupe_live_fetches);
    }

    #[test]
    fn test_load_from_toml_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("livecache.toml", "archive_prefix = \"fromfile\"\nfailure_ttl_ms = 5000\n")?;
            jail.set_env("LIVECACHE_CONFIG_FILE", "livecache.toml");
            jail.set_env("LIVECACHE_FAILURE_TTL_MS", "7000");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.archive_prefix, "fromfile");
            assert_eq!(config.failure_ttl_ms, 7000);
            Ok(())
        });
    }
}
