//! Operation executor
//!
//! Turns one logical database call into exactly one completion record:
//!
//! ```text
//!   invoke ──► deadline ──► conflict retry ──► attempt(s)
//!                 │               │
//!                 │ expired       │ fault
//!                 ▼               ▼
//!          info :timeout     classification ──► ok | fail | info
//!                                 │                     │
//!                                 │ unrecognised        ▼
//!                                 ▼              idempotence remap
//!                         Err(UnclassifiedFault)
//! ```
//!
//! The executor keeps no history. Expiry of the deadline only stops the client
//! waiting; whatever the database was doing is left to finish or abort on its own.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::config::ExecutorConfig;
use crate::db::DbResult;
use crate::error::{SeqcheckError, SeqcheckResult};
use crate::history::{ErrorTag, Function, Observation, OpType, Operation};

pub mod classify;
pub mod retry;

pub use classify::{Classified, FaultClassifier};
pub use retry::{Attempt, Backoff, ConflictRetry, RetryState};

/// Result of racing a future against a deadline
#[derive(Debug, PartialEq, Eq)]
pub enum Deadline<T> {
    Completed(T),
    Expired,
}

/// Await `fut` for at most `deadline`. On expiry the future is dropped.
pub async fn within_deadline<F: Future>(deadline: Duration, fut: F) -> Deadline<F::Output> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(output) => Deadline::Completed(output),
        Err(_) => Deadline::Expired,
    }
}

#[derive(Debug, Clone)]
pub struct Executor {
    config: ExecutorConfig,
    retry: ConflictRetry,
    classifier: FaultClassifier,
}

impl Executor {
    pub fn new(config: ExecutorConfig) -> SeqcheckResult<Self> {
        config.validate()?;
        Ok(Self {
            retry: ConflictRetry::from_config(&config)?,
            classifier: FaultClassifier::new(&config.timeout_pattern)?,
            config,
        })
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn is_idempotent(&self, f: Function) -> bool {
        self.config.idempotent.contains(&f)
    }

    /// Retry one statement while it fails with a serialization conflict
    pub async fn with_conflict_retry<T, F, Fut>(&self, attempt: F) -> DbResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        self.retry.run(attempt).await
    }

    /// Run `action` as a single-statement call: every attempt is conflict-retried,
    /// and the call as a whole is bounded by the deadline.
    pub async fn execute<F, Fut>(&self, op: &Operation, action: F) -> SeqcheckResult<Operation>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DbResult<Option<Observation>>>,
    {
        self.guard(op, self.with_conflict_retry(action)).await
    }

    /// Bound an arbitrary call by the deadline, classify its fault if any, and
    /// apply the idempotence remap.
    ///
    /// Calls made of several statements retry each statement themselves with
    /// [`Executor::with_conflict_retry`] and pass the whole sequence here.
    pub async fn guard<Fut>(&self, op: &Operation, call: Fut) -> SeqcheckResult<Operation>
    where
        Fut: Future<Output = DbResult<Option<Observation>>>,
    {
        let completed = match within_deadline(self.config.deadline, call).await {
            Deadline::Expired => {
                warn!(
                    process = op.process,
                    f = %op.f,
                    key = op.key,
                    "Call exceeded deadline of {:?}",
                    self.config.deadline
                );
                op.info(ErrorTag::Timeout)
            }
            Deadline::Completed(Ok(value)) => op.ok(value),
            Deadline::Completed(Err(fault)) => match self.classifier.classify(&fault) {
                Some(Classified::Fail(tag)) => {
                    debug!(process = op.process, key = op.key, "Call failed: {}", tag);
                    op.fail(tag)
                }
                Some(Classified::Info(tag)) => {
                    warn!(
                        process = op.process,
                        f = %op.f,
                        key = op.key,
                        "Call outcome unknown: {}",
                        tag
                    );
                    op.info(tag)
                }
                None => {
                    error!(
                        process = op.process,
                        f = %op.f,
                        key = op.key,
                        "Unclassified fault: {}",
                        fault
                    );
                    return Err(SeqcheckError::UnclassifiedFault {
                        process: op.process,
                        f: op.f,
                        key: op.key,
                        source: fault,
                    });
                }
            },
        };

        let completed = self.remap(completed);
        tracing::Span::current().record("outcome", tracing::field::display(completed.op_type));
        Ok(completed)
    }

    /// Downgrade `info` to `fail` for idempotent functions
    pub fn remap(&self, mut op: Operation) -> Operation {
        if op.op_type == OpType::Info && self.is_idempotent(op.f) {
            op.op_type = OpType::Fail;
        }
        op
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbFault;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tracing_test::traced_test;

    fn executor() -> Executor {
        let mut config = ExecutorConfig::default();
        config.deadline = Duration::from_secs(1);
        config.base_backoff = Duration::from_millis(1);
        config.max_backoff = Duration::from_millis(4);
        Executor::new(config).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_wins_over_eventual_success() {
        let op = Operation::write(0, 3);
        let done = executor()
            .execute(&op, || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(None)
            })
            .await
            .unwrap();

        assert_eq!(done.op_type, OpType::Info);
        assert_eq!(done.error, Some(ErrorTag::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_conflicts_become_info() {
        let op = Operation::write(0, 3);
        let attempts = AtomicU32::new(0);
        let mut config = ExecutorConfig::default();
        config.base_backoff = Duration::from_millis(1);
        config.max_backoff = Duration::from_millis(1);
        let executor = Executor::new(config).unwrap();

        let done = executor
            .execute(&op, || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(DbFault::serialization_conflict("WriteTooOld"))
            })
            .await
            .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 31);
        assert_eq!(done.op_type, OpType::Info);
        assert!(matches!(done.error, Some(ErrorTag::Driver(_))));
    }

    #[tokio::test]
    async fn test_idempotent_reads_fail_and_writes_stay_unknown() {
        let executor = executor();
        let fault = || async { Err(DbFault::driver("connection reset")) };

        let read = executor.execute(&Operation::read(1, 9), fault).await.unwrap();
        assert_eq!(read.op_type, OpType::Fail);
        assert!(matches!(read.error, Some(ErrorTag::Driver(_))));

        let write = executor.execute(&Operation::write(1, 9), fault).await.unwrap();
        assert_eq!(write.op_type, OpType::Info);
    }

    #[test]
    fn test_remap_leaves_ok_and_fail_alone() {
        let executor = executor();
        let read = Operation::read(0, 1);
        assert_eq!(executor.remap(read.ok(None)).op_type, OpType::Ok);
        assert_eq!(
            executor.remap(read.info(ErrorTag::Timeout)).op_type,
            OpType::Fail
        );
        let write = Operation::write(0, 1);
        assert_eq!(
            executor.remap(write.info(ErrorTag::Timeout)).op_type,
            OpType::Info
        );
    }

    #[tokio::test]
    async fn test_rollback_is_fail_and_success_is_ok() {
        let executor = executor();
        let op = Operation::write(2, 4);

        let failed = executor
            .execute(&op, || async { Err(DbFault::rollback("aborted")) })
            .await
            .unwrap();
        assert_eq!(failed.op_type, OpType::Fail);

        let value = vec![Some("4_0".to_string())];
        let ok = executor
            .execute(&Operation::read(2, 4), || {
                let value = value.clone();
                async move { Ok(Some(value)) }
            })
            .await
            .unwrap();
        assert!(ok.is_ok());
        assert_eq!(ok.value, Some(vec![Some("4_0".to_string())]));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unclassified_fault_aborts_the_call() {
        let op = Operation::write(5, 11);
        let err = executor()
            .execute(&op, || async { Err(DbFault::sql("syntax error at or near \"SELEC\"")) })
            .await
            .unwrap_err();

        match err {
            SeqcheckError::UnclassifiedFault { process, key, .. } => {
                assert_eq!(process, 5);
                assert_eq!(key, 11);
            }
            other => panic!("expected unclassified fault, got {:?}", other),
        }
        assert!(logs_contain("Unclassified fault"));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = ExecutorConfig::default();
        config.timeout_pattern = "[".into();
        assert!(Executor::new(config).is_err());
    }
}
