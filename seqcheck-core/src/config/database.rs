//! Database transport configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults::*;
use super::{parse_duration_from_env, parse_env};
use crate::error::{SeqcheckError, SeqcheckResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Directory holding the embedded store
    pub data_dir: PathBuf,

    /// Node name handed to client setup
    pub node: String,

    /// Faults injected in front of the store
    pub faults: FaultConfig,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            node: DEFAULT_NODE.to_string(),
            faults: FaultConfig::default(),
        }
    }
}

/// Per-statement fault probabilities. All zero disables injection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultConfig {
    /// Serialization conflicts, raised before the statement applies
    pub conflict_rate: f64,

    /// Explicit rollbacks, raised before the statement applies
    pub rollback_rate: f64,

    /// Driver faults raised after the statement applied
    pub ambiguous_rate: f64,

    /// Added to every statement
    #[serde(with = "humantime_serde")]
    pub latency: Duration,

    /// Seed for fault selection; entropy when unset
    pub seed: Option<u64>,
}

impl FaultConfig {
    pub fn is_enabled(&self) -> bool {
        self.conflict_rate > 0.0
            || self.rollback_rate > 0.0
            || self.ambiguous_rate > 0.0
            || !self.latency.is_zero()
    }

    pub fn validate(&self) -> SeqcheckResult<()> {
        for (name, rate) in [
            ("conflict_rate", self.conflict_rate),
            ("rollback_rate", self.rollback_rate),
            ("ambiguous_rate", self.ambiguous_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(SeqcheckError::configuration(
                    format!("database.faults.{}", name),
                    format!("rate must be within [0, 1], got {}", rate),
                ));
            }
        }
        if self.conflict_rate + self.rollback_rate + self.ambiguous_rate > 1.0 {
            return Err(SeqcheckError::configuration(
                "database.faults",
                "fault rates must sum to at most 1",
            ));
        }
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn apply_env(&mut self) -> SeqcheckResult<()> {
        if let Ok(dir) = std::env::var("SEQCHECK_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(node) = std::env::var("SEQCHECK_NODE") {
            self.node = node;
        }
        if let Some(v) = parse_env("SEQCHECK_CONFLICT_RATE")? {
            self.faults.conflict_rate = v;
        }
        if let Some(v) = parse_env("SEQCHECK_ROLLBACK_RATE")? {
            self.faults.rollback_rate = v;
        }
        if let Some(v) = parse_env("SEQCHECK_AMBIGUOUS_RATE")? {
            self.faults.ambiguous_rate = v;
        }
        self.faults.latency = parse_duration_from_env("SEQCHECK_LATENCY_MS", self.faults.latency)?;
        Ok(())
    }

    /// Path of the embedded store file
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DEFAULT_DB_FILE)
    }

    pub fn validate(&self) -> SeqcheckResult<()> {
        if self.node.trim().is_empty() {
            return Err(SeqcheckError::configuration(
                "database.node",
                "node name must not be empty",
            ));
        }
        self.faults.validate()
    }
}
