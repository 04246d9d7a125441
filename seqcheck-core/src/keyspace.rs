//! Key decomposition and table placement
//!
//! A logical key `k` is written as `key_count` sub-keys `k_0 .. k_{n-1}`, each in
//! its own statement. Sub-keys are spread over `table_count` tables so that one
//! logical write touches several independent storage units.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

use crate::error::{SeqcheckError, SeqcheckResult};
use crate::history::Observation;

pub const TABLE_PREFIX: &str = "test";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpace {
    key_count: usize,
    table_count: usize,
}

impl KeySpace {
    pub fn new(key_count: usize, table_count: usize) -> SeqcheckResult<Self> {
        if key_count == 0 {
            return Err(SeqcheckError::configuration(
                "workload.key_count",
                "key_count must be non-zero",
            ));
        }
        if table_count == 0 {
            return Err(SeqcheckError::configuration(
                "workload.table_count",
                "table_count must be non-zero",
            ));
        }
        Ok(Self {
            key_count,
            table_count,
        })
    }

    pub fn key_count(&self) -> usize {
        self.key_count
    }

    pub fn table_count(&self) -> usize {
        self.table_count
    }

    /// Sub-keys of `key` in write order
    pub fn subkeys(&self, key: u64) -> Vec<String> {
        subkeys(self.key_count, key)
    }

    /// Table holding `subkey`
    pub fn table_for(&self, subkey: &str) -> String {
        format!("{}{}", TABLE_PREFIX, stable_hash(subkey) % self.table_count as u64)
    }

    pub fn tables(&self) -> impl Iterator<Item = String> {
        (0..self.table_count).map(|i| format!("{}{}", TABLE_PREFIX, i))
    }
}

/// Sub-keys of `key` in write order
pub fn subkeys(key_count: usize, key: u64) -> Vec<String> {
    (0..key_count).map(|i| format!("{}_{}", key, i)).collect()
}

/// What a read of `key` returns once its write is fully visible
pub fn expected_observation(key_count: usize, key: u64) -> Observation {
    subkeys(key_count, key).into_iter().rev().map(Some).collect()
}

fn stable_hash(s: &str) -> u64 {
    let mut hasher = FxHasher::default();
    s.hash(&mut hasher);
    hasher.finish()
}
