//! History checkers
//!
//! A checker folds over a fully materialized [`History`] and returns a
//! [`Verdict`]. It never mutates the history and never consults generator state.

use serde::{Deserialize, Serialize};

use crate::error::{SeqcheckError, SeqcheckResult};
use crate::history::History;

pub mod sequential;

pub use sequential::{classify_read, Category, SequentialChecker, Violation, ViolationReason};

/// Parameters a checker needs beyond the history itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOptions {
    /// Sub-keys per logical key
    pub key_count: Option<usize>,
}

impl CheckOptions {
    pub fn with_key_count(key_count: usize) -> Self {
        Self {
            key_count: Some(key_count),
        }
    }

    pub fn require_key_count(&self) -> SeqcheckResult<usize> {
        match self.key_count {
            Some(n) if n > 0 => Ok(n),
            _ => Err(SeqcheckError::configuration(
                "checker.key_count",
                "a non-zero key_count is required to check reads",
            )),
        }
    }
}

/// Number of ok reads per category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub none: usize,
    pub some: usize,
    pub all: usize,
    pub bad: usize,
}

impl Counts {
    pub fn total(&self) -> usize {
        self.none + self.some + self.all + self.bad
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub valid: bool,
    pub counts: Counts,
    /// The violating reads, in history order
    pub bad: Vec<Violation>,
}

pub trait Checker: Send + Sync {
    fn check(&self, history: &History, options: &CheckOptions) -> SeqcheckResult<Verdict>;
}
