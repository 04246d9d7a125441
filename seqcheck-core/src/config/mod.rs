//! Configuration for seqcheck runs
//!
//! Structured configuration with defaults, TOML file loading, `SEQCHECK_*`
//! environment overrides and validation.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SeqcheckError, SeqcheckResult};

pub mod defaults;
pub mod database;
pub mod executor;
pub mod workload;

pub use database::{DatabaseConfig, FaultConfig};
pub use defaults::*;
pub use executor::ExecutorConfig;
pub use workload::WorkloadConfig;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeqcheckConfig {
    /// Deadline, retry and classification policy
    pub executor: ExecutorConfig,

    /// Generator and key space
    pub workload: WorkloadConfig,

    /// Store location and injected faults
    pub database: DatabaseConfig,
}

impl SeqcheckConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> SeqcheckResult<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> SeqcheckResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SeqcheckError::configuration(
                "config_file",
                format!("cannot read {}: {}", path.display(), e),
            )
        })?;
        let mut config: Self = toml::from_str(&text)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> SeqcheckResult<()> {
        self.executor.apply_env()?;
        self.workload.apply_env()?;
        self.database.apply_env()?;
        Ok(())
    }

    pub fn validate(&self) -> SeqcheckResult<()> {
        self.executor.validate()?;
        self.workload.validate()?;
        self.database.validate()?;
        Ok(())
    }

    /// Small, fast configuration for tests
    pub fn test() -> Self {
        let mut config = Self::default();
        config.executor.deadline = Duration::from_secs(2);
        config.executor.base_backoff = Duration::from_millis(1);
        config.executor.max_backoff = Duration::from_millis(4);
        config.workload.concurrency = 4;
        config.workload.ops = 100;
        config.workload.stagger = Duration::ZERO;
        config.workload.seed = Some(7);
        config
    }
}

/// Builder for SeqcheckConfig
pub struct SeqcheckConfigBuilder {
    config: SeqcheckConfig,
}

impl SeqcheckConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SeqcheckConfig::default(),
        }
    }

    pub fn executor(mut self, executor: ExecutorConfig) -> Self {
        self.config.executor = executor;
        self
    }

    pub fn workload(mut self, workload: WorkloadConfig) -> Self {
        self.config.workload = workload;
        self
    }

    pub fn database(mut self, database: DatabaseConfig) -> Self {
        self.config.database = database;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.workload.concurrency = concurrency;
        self
    }

    pub fn ops(mut self, ops: u64) -> Self {
        self.config.workload.ops = ops;
        self
    }

    pub fn key_count(mut self, key_count: usize) -> Self {
        self.config.workload.key_count = key_count;
        self
    }

    pub fn table_count(mut self, table_count: usize) -> Self {
        self.config.workload.table_count = table_count;
        self
    }

    pub fn build(self) -> SeqcheckResult<SeqcheckConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for SeqcheckConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse an optional environment variable
pub(crate) fn parse_env<T: FromStr>(key: &str) -> SeqcheckResult<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SeqcheckError::configuration(key, format!("invalid value '{}'", raw))),
        Err(_) => Ok(None),
    }
}

/// Parse a millisecond duration from the environment
pub(crate) fn parse_duration_from_env(key: &str, default: Duration) -> SeqcheckResult<Duration> {
    Ok(parse_env::<u64>(key)?
        .map(Duration::from_millis)
        .unwrap_or(default))
}
