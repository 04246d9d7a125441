//! Fault classification
//!
//! Only an explicit rollback proves a call had no effect. Every other recognised
//! fault leaves the commit state unknown and is reported as `info`. A fault that
//! matches nothing here is not recorded at all; it reaches the caller as an
//! unclassified error.

use regex::Regex;

use crate::db::{DbFault, FaultKind};
use crate::error::SeqcheckResult;
use crate::history::ErrorTag;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// Confirmed no-op
    Fail(ErrorTag),
    /// Outcome unknown
    Info(ErrorTag),
}

#[derive(Debug, Clone)]
pub struct FaultClassifier {
    timeout: Regex,
}

impl FaultClassifier {
    pub fn new(timeout_pattern: &str) -> SeqcheckResult<Self> {
        Ok(Self {
            timeout: Regex::new(timeout_pattern)?,
        })
    }

    /// Map a fault onto an outcome, or `None` when it is not one we understand.
    ///
    /// The timeout pattern is checked on driver and SQL faults; rollbacks, batch
    /// updates and closed connections keep their own tags.
    pub fn classify(&self, fault: &DbFault) -> Option<Classified> {
        match fault.kind {
            FaultKind::Rollback => Some(Classified::Fail(ErrorTag::Rollback(
                fault.message.clone(),
            ))),
            FaultKind::BatchUpdate => Some(Classified::Info(ErrorTag::BatchUpdate(
                fault.detail().to_string(),
            ))),
            FaultKind::ConnectionClosed => Some(Classified::Info(ErrorTag::ConnectionClosed)),
            FaultKind::Driver | FaultKind::Sql if self.timeout.is_match(&fault.message) => {
                Some(Classified::Info(ErrorTag::Timeout))
            }
            FaultKind::Driver => Some(Classified::Info(ErrorTag::Driver(fault.message.clone()))),
            FaultKind::Sql => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> FaultClassifier {
        FaultClassifier::new("timeout").unwrap()
    }

    #[test]
    fn test_only_rollback_is_a_failure() {
        let c = classifier();
        assert_eq!(
            c.classify(&DbFault::rollback("aborted")),
            Some(Classified::Fail(ErrorTag::Rollback("aborted".into())))
        );
        for fault in [
            DbFault::driver("An I/O error occurred"),
            DbFault::batch_update("Batch entry 0 was aborted", None),
            DbFault::connection_closed("connection closed during rollback"),
            DbFault::sql("ERROR: query timeout exceeded"),
        ] {
            assert!(
                matches!(c.classify(&fault), Some(Classified::Info(_))),
                "{} should be info",
                fault
            );
        }
    }

    #[test]
    fn test_batch_update_unwraps_cause() {
        let fault = DbFault::batch_update(
            "Batch entry 0 was aborted. Call getNextException to see the cause.",
            Some("ERROR: duplicate key value".into()),
        );
        assert_eq!(
            classifier().classify(&fault),
            Some(Classified::Info(ErrorTag::BatchUpdate(
                "ERROR: duplicate key value".into()
            )))
        );
    }

    #[test]
    fn test_sql_timeout_and_connection_closed_tags() {
        let c = classifier();
        assert_eq!(
            c.classify(&DbFault::sql("statement timeout")),
            Some(Classified::Info(ErrorTag::Timeout))
        );
        assert_eq!(
            c.classify(&DbFault::connection_closed("closed")),
            Some(Classified::Info(ErrorTag::ConnectionClosed))
        );
    }

    #[test]
    fn test_driver_timeout_is_tagged_timeout() {
        let c = classifier();
        assert_eq!(
            c.classify(&DbFault::driver("socket read timeout after 10000ms")),
            Some(Classified::Info(ErrorTag::Timeout))
        );
        assert_eq!(
            c.classify(&DbFault::driver("connection reset")),
            Some(Classified::Info(ErrorTag::Driver("connection reset".into())))
        );
    }

    #[test]
    fn test_unknown_sql_fault_is_unclassified() {
        assert_eq!(classifier().classify(&DbFault::sql("syntax error at or near")), None);
    }
}
