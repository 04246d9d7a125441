//! Operation executor configuration

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults::*;
use super::{parse_duration_from_env, parse_env};
use crate::error::{SeqcheckError, SeqcheckResult};
use crate::history::Function;

/// Deadline, retry and classification settings for the executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Bound on a whole call, retries included
    #[serde(with = "humantime_serde")]
    pub deadline: Duration,

    /// Conflict retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub base_backoff: Duration,

    /// Mean growth factor between consecutive retry delays
    pub backoff_multiplier: f64,

    /// Relative spread of the growth factor, e.g. 0.125 for ±12.5%
    pub backoff_jitter: f64,

    /// Upper bound on a single retry delay
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,

    /// Regex identifying a serialization conflict in a fault message
    pub conflict_pattern: String,

    /// Regex identifying a client-side timeout in a fault message
    pub timeout_pattern: String,

    /// Functions whose unknown outcome may be reported as a failure
    pub idempotent: BTreeSet<Function>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            deadline: duration_secs(DEFAULT_DEADLINE_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            base_backoff: duration_ms(DEFAULT_BASE_BACKOFF_MS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            backoff_jitter: DEFAULT_BACKOFF_JITTER,
            max_backoff: duration_secs(DEFAULT_MAX_BACKOFF_SECS),
            conflict_pattern: DEFAULT_CONFLICT_PATTERN.to_string(),
            timeout_pattern: DEFAULT_TIMEOUT_PATTERN.to_string(),
            idempotent: [Function::Read].into_iter().collect(),
        }
    }
}

impl ExecutorConfig {
    /// Override fields from `SEQCHECK_*` environment variables
    pub fn apply_env(&mut self) -> SeqcheckResult<()> {
        self.deadline = parse_duration_from_env("SEQCHECK_DEADLINE_MS", self.deadline)?;
        if let Some(v) = parse_env("SEQCHECK_MAX_RETRIES")? {
            self.max_retries = v;
        }
        self.base_backoff = parse_duration_from_env("SEQCHECK_BASE_BACKOFF_MS", self.base_backoff)?;
        self.max_backoff = parse_duration_from_env("SEQCHECK_MAX_BACKOFF_MS", self.max_backoff)?;
        if let Some(v) = parse_env("SEQCHECK_BACKOFF_MULTIPLIER")? {
            self.backoff_multiplier = v;
        }
        if let Some(v) = parse_env("SEQCHECK_BACKOFF_JITTER")? {
            self.backoff_jitter = v;
        }
        if let Ok(list) = std::env::var("SEQCHECK_IDEMPOTENT") {
            self.idempotent = list
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(str::parse)
                .collect::<SeqcheckResult<_>>()?;
        }
        Ok(())
    }

    /// Validate executor configuration
    pub fn validate(&self) -> SeqcheckResult<()> {
        if self.deadline.is_zero() {
            return Err(SeqcheckError::configuration(
                "executor.deadline",
                "deadline must be greater than zero",
            ));
        }
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0) {
            return Err(SeqcheckError::configuration(
                "executor.backoff_multiplier",
                "multiplier must be a finite value >= 1.0",
            ));
        }
        if !(0.0..1.0).contains(&self.backoff_jitter) {
            return Err(SeqcheckError::configuration(
                "executor.backoff_jitter",
                "jitter must be in [0, 1)",
            ));
        }
        if self.max_backoff < self.base_backoff {
            return Err(SeqcheckError::configuration(
                "executor.max_backoff",
                "max_backoff must not be smaller than base_backoff",
            ));
        }
        regex::Regex::new(&self.conflict_pattern)?;
        regex::Regex::new(&self.timeout_pattern)?;
        Ok(())
    }
}
