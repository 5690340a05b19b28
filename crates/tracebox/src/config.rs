//! Service configuration.
//!
//! Loaded from a JSON file; every field is optional and falls back to its
//! default. `TRACEBOX_DB_PATH` in the environment overrides the backend with
//! a SQLite database at that path.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use tracebox_core::PrefixWidth;
use tracebox_store::{Backend, MemoryBackend, SqliteBackend, StoreConfig, MAX_SHARD_SIZE};

use crate::error::{Result, ServiceError};

/// Environment variable naming a SQLite database file.
pub const DB_PATH_ENV: &str = "TRACEBOX_DB_PATH";

/// Which storage backend to run on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Process-local, nothing persisted.
    #[default]
    Memory,
    /// SQLite database file.
    Sqlite {
        /// Database path.
        path: PathBuf,
    },
}

/// Configuration for the report service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Bucket prefix width `W` in bits.
    pub prefix_bits: u32,
    /// Bucket keys per scan shard.
    pub shard_size: usize,
    /// Maximum shards scanned at once.
    pub max_concurrency: usize,
    /// Query lookback when the request names no `since`.
    pub default_lookback_secs: i64,
    /// Storage backend.
    pub backend: BackendConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            prefix_bits: PrefixWidth::default().bits(),
            shard_size: 1000,
            max_concurrency: 10,
            default_lookback_secs: 3600,
            backend: BackendConfig::Memory,
        }
    }
}

impl ServiceConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(self) -> Self {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`.
    pub fn apply_env_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup(DB_PATH_ENV).filter(|p| !p.is_empty()) {
            tracing::debug!(path = %path, "database path taken from environment");
            self.backend = BackendConfig::Sqlite { path: path.into() };
        }
        self
    }

    /// Check ranges.
    pub fn validate(&self) -> Result<()> {
        self.prefix_width()?;
        if self.shard_size == 0 || self.shard_size > MAX_SHARD_SIZE {
            return Err(ServiceError::Config(format!(
                "shard_size must be between 1 and {}",
                MAX_SHARD_SIZE
            )));
        }
        if self.max_concurrency == 0 {
            return Err(ServiceError::Config(
                "max_concurrency must be at least 1".into(),
            ));
        }
        if self.default_lookback_secs < 0 {
            return Err(ServiceError::Config(
                "default_lookback_secs must not be negative".into(),
            ));
        }
        Ok(())
    }

    /// The configured prefix width.
    pub fn prefix_width(&self) -> Result<PrefixWidth> {
        PrefixWidth::new(self.prefix_bits).map_err(|e| ServiceError::Config(e.to_string()))
    }

    /// Store-level settings.
    pub fn store_config(&self) -> Result<StoreConfig> {
        Ok(StoreConfig {
            width: self.prefix_width()?,
            shard_size: self.shard_size,
            max_concurrency: self.max_concurrency,
        })
    }

    /// Open the configured backend.
    pub fn open_backend(&self) -> Result<Box<dyn Backend>> {
        let backend: Box<dyn Backend> = match &self.backend {
            BackendConfig::Memory => Box::new(MemoryBackend::new()),
            BackendConfig::Sqlite { path } => {
                Box::new(SqliteBackend::open(path, self.prefix_width()?)?)
            }
        };
        tracing::info!(backend = backend.name(), prefix_bits = self.prefix_bits, "backend opened");
        Ok(backend)
    }
}
