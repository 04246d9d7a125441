//! Error conversion implementations for SeqcheckError
//!
//! This module provides From trait implementations for converting
//! external error types into SeqcheckError variants.

use super::types::SeqcheckError;
use crate::db::DbFault;

impl From<DbFault> for SeqcheckError {
    fn from(fault: DbFault) -> Self {
        SeqcheckError::Database {
            operation: "database_operation".to_string(),
            source: fault,
        }
    }
}

// Storage error conversions
impl From<redb::DatabaseError> for SeqcheckError {
    fn from(err: redb::DatabaseError) -> Self {
        SeqcheckError::storage("open_database", err)
    }
}

// Serialization error conversions
impl From<serde_json::Error> for SeqcheckError {
    fn from(err: serde_json::Error) -> Self {
        SeqcheckError::JsonError(Box::new(err))
    }
}

impl From<toml::de::Error> for SeqcheckError {
    fn from(err: toml::de::Error) -> Self {
        SeqcheckError::ConfigurationError {
            component: "config_file".to_string(),
            message: format!("Invalid TOML: {}", err),
        }
    }
}

impl From<regex::Error> for SeqcheckError {
    fn from(err: regex::Error) -> Self {
        SeqcheckError::ConfigurationError {
            component: "pattern".to_string(),
            message: format!("Invalid pattern: {}", err),
        }
    }
}

// System error conversions
impl From<std::io::Error> for SeqcheckError {
    fn from(err: std::io::Error) -> Self {
        SeqcheckError::IoError(Box::new(err))
    }
}

// Async/Task error conversions
impl From<tokio::task::JoinError> for SeqcheckError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            SeqcheckError::Internal {
                message: "Task was cancelled".to_string(),
            }
        } else if err.is_panic() {
            SeqcheckError::Internal {
                message: "Task panicked".to_string(),
            }
        } else {
            SeqcheckError::Internal {
                message: format!("Task join failed: {}", err),
            }
        }
    }
}

impl From<tokio::sync::watch::error::RecvError> for SeqcheckError {
    fn from(err: tokio::sync::watch::error::RecvError) -> Self {
        SeqcheckError::Internal {
            message: format!("Channel receive failed: {}", err),
        }
    }
}
