//! Workload generation configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults::*;
use super::{parse_duration_from_env, parse_env};
use crate::error::{SeqcheckError, SeqcheckResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Number of concurrent worker processes
    pub concurrency: usize,

    /// Workers that issue writes; defaults to half the concurrency
    pub writers: Option<usize>,

    /// Size of the last-written window; defaults to twice the concurrency
    pub window_size: Option<usize>,

    /// Sub-keys per logical key
    pub key_count: usize,

    /// Tables the sub-keys are spread over
    pub table_count: usize,

    /// Total operations to issue across all workers
    pub ops: u64,

    /// Mean pause between operations of one worker
    #[serde(with = "humantime_serde")]
    pub stagger: Duration,

    /// Seed for read selection; entropy when unset
    pub seed: Option<u64>,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            writers: None,
            window_size: None,
            key_count: DEFAULT_KEY_COUNT,
            table_count: DEFAULT_TABLE_COUNT,
            ops: DEFAULT_OPS,
            stagger: duration_ms(DEFAULT_STAGGER_MS),
            seed: None,
        }
    }
}

impl WorkloadConfig {
    pub fn apply_env(&mut self) -> SeqcheckResult<()> {
        if let Some(v) = parse_env("SEQCHECK_CONCURRENCY")? {
            self.concurrency = v;
        }
        if let Some(v) = parse_env("SEQCHECK_WRITERS")? {
            self.writers = Some(v);
        }
        if let Some(v) = parse_env("SEQCHECK_WINDOW_SIZE")? {
            self.window_size = Some(v);
        }
        if let Some(v) = parse_env("SEQCHECK_KEY_COUNT")? {
            self.key_count = v;
        }
        if let Some(v) = parse_env("SEQCHECK_TABLE_COUNT")? {
            self.table_count = v;
        }
        if let Some(v) = parse_env("SEQCHECK_OPS")? {
            self.ops = v;
        }
        if let Some(v) = parse_env("SEQCHECK_SEED")? {
            self.seed = Some(v);
        }
        self.stagger = parse_duration_from_env("SEQCHECK_STAGGER_MS", self.stagger)?;
        Ok(())
    }

    pub fn writers(&self) -> usize {
        self.writers.unwrap_or_else(|| (self.concurrency / 2).max(1))
    }

    pub fn window_size(&self) -> usize {
        self.window_size.unwrap_or(2 * self.concurrency)
    }

    pub fn validate(&self) -> SeqcheckResult<()> {
        if self.concurrency == 0 {
            return Err(SeqcheckError::configuration(
                "workload.concurrency",
                "concurrency must be non-zero",
            ));
        }
        let writers = self.writers();
        if writers == 0 || writers > self.concurrency {
            return Err(SeqcheckError::configuration(
                "workload.writers",
                format!(
                    "writers must be between 1 and concurrency ({}), got {}",
                    self.concurrency, writers
                ),
            ));
        }
        if self.window_size() == 0 {
            return Err(SeqcheckError::configuration(
                "workload.window_size",
                "window_size must be non-zero",
            ));
        }
        if self.key_count == 0 {
            return Err(SeqcheckError::configuration(
                "workload.key_count",
                "key_count must be non-zero",
            ));
        }
        if self.table_count == 0 {
            return Err(SeqcheckError::configuration(
                "workload.table_count",
                "table_count must be non-zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_sizes() {
        let config = WorkloadConfig {
            concurrency: 30,
            ..Default::default()
        };
        assert_eq!(config.window_size(), 60);
        assert_eq!(config.writers(), 15);

        let single = WorkloadConfig {
            concurrency: 1,
            ..Default::default()
        };
        assert_eq!(single.writers(), 1);
        assert!(single.validate().is_ok());
    }

    #[test]
    fn test_writers_bounded_by_concurrency() {
        let config = WorkloadConfig {
            concurrency: 4,
            writers: Some(5),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
