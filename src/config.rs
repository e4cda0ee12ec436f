//! Runtime configuration for ff-cache.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! Command-line flags (and their environment variables) override file values.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::fill::FillPolicy;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "ff-cache", about = "Feature flag directory cache")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address, overrides `server.listen`.
    #[arg(long, env = "FF_CACHE_LISTEN")]
    pub listen: Option<String>,

    /// Base URL of the upstream feature flag directory, overrides `upstream.base_url`.
    #[arg(long, env = "FF_UPSTREAM_URL")]
    pub upstream_url: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long, env = "FF_CACHE_LOG_DEBUG")]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, env = "FF_CACHE_LOG_JSON")]
    pub log_json: bool,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("upstream.base_url must not be empty")]
    MissingUpstream,

    #[error("{0} must be at least 1")]
    ZeroBudget(&'static str),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,

    /// Upstream directory service.
    pub upstream: UpstreamConfig,

    /// Cache freshness and retry tuning.
    pub cache: CacheConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8080").
    pub listen: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 10,
        }
    }
}

/// Upstream directory service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL, e.g. "http://feature-flipper.internal".
    pub base_url: String,

    /// Per-request transport timeout in seconds.
    ///
    /// Kept one second under the server request timeout so an upstream stall
    /// surfaces as a fill failure rather than a dropped client request.
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 9,
        }
    }
}

/// Staleness windows and attempt budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory listing staleness window.
    pub directory_ttl_secs: u64,

    /// Alias index staleness window.
    pub alias_ttl_secs: u64,

    /// Per-set feature list staleness window.
    pub set_ttl_secs: u64,

    /// Attempts for the first, blocking directory fill.
    pub directory_sync_attempts: u32,

    /// Attempts for a background directory refresh.
    pub directory_async_attempts: u32,

    /// Attempts for the first, blocking fill of a set.
    pub set_sync_attempts: u32,

    /// Attempts for a background refresh of a set.
    pub set_async_attempts: u32,

    /// Maximum concurrent alias fetches during an alias rebuild.
    pub alias_fetch_concurrency: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory_ttl_secs: 30 * 60,
            alias_ttl_secs: 60 * 60,
            set_ttl_secs: 2 * 60,
            directory_sync_attempts: 3,
            directory_async_attempts: 1,
            set_sync_attempts: 3,
            set_async_attempts: 1,
            alias_fetch_concurrency: 8,
        }
    }
}

impl CacheConfig {
    /// Fill policy for the directory listing.
    pub fn directory_policy(&self) -> FillPolicy {
        FillPolicy {
            ttl: Duration::from_secs(self.directory_ttl_secs),
            sync_attempts: self.directory_sync_attempts,
            async_attempts: self.directory_async_attempts,
        }
    }

    /// Fill policy for an individual feature set.
    pub fn set_policy(&self) -> FillPolicy {
        FillPolicy {
            ttl: Duration::from_secs(self.set_ttl_secs),
            sync_attempts: self.set_sync_attempts,
            async_attempts: self.set_async_attempts,
        }
    }

    pub fn alias_ttl(&self) -> Duration {
        Duration::from_secs(self.alias_ttl_secs)
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Apply command-line overrides on top of file values.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(listen) = &cli.listen {
            self.server.listen = listen.clone();
        }
        if let Some(url) = &cli.upstream_url {
            self.upstream.base_url = url.clone();
        }
    }

    /// Reject configurations the cache engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.base_url.trim().is_empty() {
            return Err(ConfigError::MissingUpstream);
        }
        let budgets = [
            ("cache.directory_sync_attempts", self.cache.directory_sync_attempts),
            ("cache.directory_async_attempts", self.cache.directory_async_attempts),
            ("cache.set_sync_attempts", self.cache.set_sync_attempts),
            ("cache.set_async_attempts", self.cache.set_async_attempts),
        ];
        for (name, value) in budgets {
            if value == 0 {
                return Err(ConfigError::ZeroBudget(name));
            }
        }
        if self.cache.alias_fetch_concurrency == 0 {
            return Err(ConfigError::ZeroBudget("cache.alias_fetch_concurrency"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.cache.directory_ttl_secs, 1800);
        assert_eq!(cfg.cache.set_ttl_secs, 120);
        assert_eq!(cfg.cache.directory_sync_attempts, 3);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_policies_follow_config() {
        let cfg = CacheConfig::default();
        let dir = cfg.directory_policy();
        assert_eq!(dir.ttl, Duration::from_secs(30 * 60));
        assert_eq!(dir.sync_attempts, 3);
        assert_eq!(dir.async_attempts, 1);
        assert_eq!(cfg.set_policy().ttl, Duration::from_secs(120));
        assert_eq!(cfg.alias_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"upstream": {{"base_url": "http://flags:9000"}}, "cache": {{"set_ttl_secs": 30}}}}"#
        )
        .unwrap();

        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.upstream.base_url, "http://flags:9000");
        assert_eq!(cfg.upstream.timeout_secs, 9);
        assert_eq!(cfg.cache.set_ttl_secs, 30);
        assert_eq!(cfg.cache.directory_ttl_secs, 1800);
        assert_eq!(cfg.server.listen, "0.0.0.0:8080");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(cfg.server.request_timeout_secs, 10);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "ff-cache",
            "--listen",
            "127.0.0.1:9999",
            "--upstream-url",
            "http://upstream",
        ]);
        let mut cfg = Config::default();
        cfg.apply_cli(&cli);
        assert_eq!(cfg.server.listen, "127.0.0.1:9999");
        assert_eq!(cfg.upstream.base_url, "http://upstream");
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let mut cfg = Config::default();
        cfg.cache.set_sync_attempts = 0;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ZeroBudget("cache.set_sync_attempts"))
        );

        let mut cfg = Config::default();
        cfg.upstream.base_url = "  ".to_string();
        assert_eq!(cfg.validate(), Err(ConfigError::MissingUpstream));
    }
}
