//! Core error types for seqcheck
//!
//! This module contains the main SeqcheckError enum and the associated
//! Result aliases.

use thiserror::Error;

use crate::db::DbFault;
use crate::history::Function;

/// Error type for seqcheck operations
///
/// Faults that the executor classifies never become a `SeqcheckError`; they are
/// recorded on the completed operation instead. What remains here is either a
/// problem with the run itself (configuration, setup, history shape) or a fault
/// outside the known taxonomy, which must stop the worker that hit it.
#[derive(Error, Debug)]
pub enum SeqcheckError {
    // Configuration
    #[error("Configuration error in {component}: {message}")]
    ConfigurationError { component: String, message: String },

    // Database
    #[error("Database operation '{operation}' failed")]
    Database {
        operation: String,
        #[source]
        source: DbFault,
    },

    #[error("Unclassified fault during {f} of key {key} on process {process}: {source}")]
    UnclassifiedFault {
        process: u64,
        f: Function,
        key: u64,
        #[source]
        source: DbFault,
    },

    #[error("Storage operation '{operation}' failed")]
    Storage {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    // History
    #[error("History invariant violated at index {index}: {reason}")]
    HistoryInvariant { index: u64, reason: String },

    // Lifecycle
    #[error("Not initialized: {component}")]
    NotInitialized { component: String },

    // Serialization & IO
    #[error("JSON error: {0}")]
    JsonError(#[from] Box<serde_json::Error>),

    #[error("IO error: {0}")]
    IoError(#[from] Box<std::io::Error>),

    // Internal
    #[error("Internal error: {message}")]
    Internal { message: String },
}

pub type Result<T> = std::result::Result<T, SeqcheckError>;
pub type SeqcheckResult<T> = Result<T>;
