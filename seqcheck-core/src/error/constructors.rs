//! Constructor methods for SeqcheckError

use super::types::SeqcheckError;
use crate::db::DbFault;

impl SeqcheckError {
    /// Create a configuration error with component and message
    ///
    /// # Examples
    /// ```rust
    /// use seqcheck_core::error::SeqcheckError;
    ///
    /// let err = SeqcheckError::configuration("workload.key_count", "must be non-zero");
    /// assert!(err.to_string().contains("workload.key_count"));
    /// ```
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        SeqcheckError::ConfigurationError {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Wrap a transport fault raised outside the executor (setup, teardown)
    pub fn database(operation: impl Into<String>, source: DbFault) -> Self {
        SeqcheckError::Database {
            operation: operation.into(),
            source,
        }
    }

    /// Create a Storage error with a boxed source
    pub fn storage<E: std::error::Error + Send + Sync + 'static>(
        operation: impl Into<String>,
        source: E,
    ) -> Self {
        SeqcheckError::Storage {
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    pub fn history_invariant(index: u64, reason: impl Into<String>) -> Self {
        SeqcheckError::HistoryInvariant {
            index,
            reason: reason.into(),
        }
    }

    pub fn not_initialized(component: impl Into<String>) -> Self {
        SeqcheckError::NotInitialized {
            component: component.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        SeqcheckError::Internal {
            message: message.into(),
        }
    }

    /// Whether this error means the calling worker must stop immediately
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SeqcheckError::UnclassifiedFault { .. } | SeqcheckError::Internal { .. }
        )
    }
}
