// src/config.rs

//! Sync engine configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//! The config is passed explicitly to the engine and the CLI commands.
//!
//! # Example (TOML)
//!
//! ```toml
//! db_path = "/var/lib/fdroid-sync/catalog.db"
//! http_timeout_secs = 30
//! max_retries = 3
//! parallel_fetch = true
//! max_concurrent_fetches = 4
//! fingerprint_algorithm = "sha256"
//! device_sdk = 34
//! installed_packages = "/var/lib/fdroid-sync/installed.json"
//! ```

use crate::db::paths;
use crate::error::{Error, Result};
use crate::hash::HashAlgorithm;
use crate::index::ParseOptions;
use crate::index::parser::DEFAULT_DEVICE_SDK;
use crate::signing::SignatureVerifier;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default catalog database location
pub const DEFAULT_DB_PATH: &str = "/var/lib/fdroid-sync/catalog.db";

/// Configuration for sync passes and repository management
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// SQLite catalog database
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Sync lock file (default: `sync.lock` next to the database)
    #[serde(default)]
    pub lock_path: Option<String>,

    /// Per-request HTTP timeout in seconds (default: 30)
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Attempts per URL before a transport failure is reported (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Fetch and verify repositories concurrently (default: true)
    #[serde(default = "default_parallel_fetch")]
    pub parallel_fetch: bool,

    /// Upper bound on concurrent repository fetches (default: 4)
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Digest used for signing-certificate fingerprints (default: sha256)
    #[serde(default = "default_fingerprint_algorithm")]
    pub fingerprint_algorithm: String,

    /// SDK level used to filter `uses-permission` entries
    #[serde(default = "default_device_sdk")]
    pub device_sdk: i32,

    /// JSON snapshot of installed packages used by the CLI
    #[serde(default)]
    pub installed_packages: Option<String>,
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

fn default_http_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_user_agent() -> String {
    format!("fdroid-sync/{}", env!("CARGO_PKG_VERSION"))
}

fn default_parallel_fetch() -> bool {
    true
}

fn default_max_concurrent_fetches() -> usize {
    4
}

fn default_fingerprint_algorithm() -> String {
    HashAlgorithm::Sha256.name().to_string()
}

fn default_device_sdk() -> i32 {
    DEFAULT_DEVICE_SDK
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            lock_path: None,
            http_timeout_secs: default_http_timeout(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
            parallel_fetch: default_parallel_fetch(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            fingerprint_algorithm: default_fingerprint_algorithm(),
            device_sdk: default_device_sdk(),
            installed_packages: None,
        }
    }
}

impl SyncConfig {
    /// Default configuration with a different database path
    pub fn with_db_path(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: SyncConfig = toml::from_str(content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        self.fingerprint_algorithm()?;
        if self.db_path.trim().is_empty() {
            return Err(Error::ConfigError("db_path must not be empty".into()));
        }
        if self.max_retries == 0 {
            return Err(Error::ConfigError("max_retries must be at least 1".into()));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(Error::ConfigError(
                "max_concurrent_fetches must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn fingerprint_algorithm(&self) -> Result<HashAlgorithm> {
        self.fingerprint_algorithm.parse()
    }

    /// Certificate verifier using the configured fingerprint digest
    pub fn verifier(&self) -> Result<SignatureVerifier> {
        Ok(SignatureVerifier::new(self.fingerprint_algorithm()?))
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            device_sdk: self.device_sdk,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn lock_path(&self) -> PathBuf {
        match &self.lock_path {
            Some(path) => PathBuf::from(path),
            None => paths::lock_path(&self.db_path),
        }
    }
}
