//! Scenario runner
//!
//! Wires a generator, one client per worker, a shared history recorder and the
//! sequential checker into a single run:
//!
//! ```text
//!            ┌──────────── Limit<Reserve<Writes, Reads>> ────────────┐
//!            ▼                    ▼                    ▼              │
//!        worker 0             worker 1      ...    worker n-1         │ window
//!            │ invoke              │                    │              │
//!            ▼                    ▼                    ▼              │
//!     SequentialClient ──► Executor ──► Database ◄──────┘              │
//!            │ completion                                              │
//!            ▼                                                         │
//!     HistoryRecorder ──► History ──► SequentialChecker ──► Verdict    │
//! ```
//!
//! A worker whose call ends in `info` may still have that call in flight at the
//! database, so it moves on as a fresh process (`process + concurrency`) to
//! keep each process strictly sequential in the history.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::checker::{CheckOptions, Checker, SequentialChecker, Verdict};
use crate::client::{Client, SequentialClient, SetupLatch};
use crate::config::SeqcheckConfig;
use crate::db::Database;
use crate::error::SeqcheckResult;
use crate::executor::Executor;
use crate::history::{History, HistoryRecorder, OutcomeCounts};
use crate::keyspace::KeySpace;
use crate::observability::run_span;
use crate::workload::{Generator, Limit, Next, Reserve};

/// Delay before asking a generator again after it had nothing to offer
const PENDING_BACKOFF: Duration = Duration::from_millis(1);

/// Everything a finished run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    pub outcomes: OutcomeCounts,
    pub verdict: Verdict,
    #[serde(skip)]
    pub history: History,
}

/// Drive the sequential workload against `database` and check the result
pub async fn run_sequential<D: Database + 'static>(
    database: Arc<D>,
    config: &SeqcheckConfig,
) -> SeqcheckResult<RunReport> {
    config.validate()?;
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();

    async move {
        let workload = &config.workload;
        let keyspace = KeySpace::new(workload.key_count, workload.table_count)?;
        let executor = Arc::new(Executor::new(config.executor.clone())?);
        let (reserve, _window) = Reserve::sequential(workload)?;
        let generator = Arc::new(Limit::new(reserve, workload.ops));
        let recorder = HistoryRecorder::new();
        let latch = Arc::new(SetupLatch::new());

        info!(
            concurrency = workload.concurrency,
            writers = workload.writers(),
            ops = workload.ops,
            key_count = keyspace.key_count(),
            table_count = keyspace.table_count(),
            "Starting run"
        );
        let start = Instant::now();

        let mut workers = JoinSet::new();
        for thread in 0..workload.concurrency as u64 {
            let client = SequentialClient::new(
                database.clone(),
                executor.clone(),
                keyspace,
                latch.clone(),
            );
            workers.spawn(
                worker(
                    thread,
                    workload.concurrency as u64,
                    client,
                    generator.clone(),
                    recorder.clone(),
                    config.database.node.clone(),
                    workload.stagger,
                )
                .in_current_span(),
            );
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined? {
                if e.is_fatal() {
                    error!("Worker aborted, stopping run: {}", e);
                } else {
                    warn!("Worker failed, stopping run: {}", e);
                }
                workers.abort_all();
                return Err(e);
            }
        }

        let history = recorder.history();
        history.validate()?;
        let outcomes = history.outcome_counts();
        info!(
            ok = outcomes.ok,
            fail = outcomes.fail,
            info = outcomes.info,
            "Workload finished"
        );

        let verdict =
            SequentialChecker.check(&history, &CheckOptions::with_key_count(keyspace.key_count()))?;

        Ok(RunReport {
            run_id,
            started_at,
            elapsed: start.elapsed(),
            outcomes,
            verdict,
            history,
        })
    }
    .instrument(run_span(&run_id.to_string()))
    .await
}

/// One simulated client: pull operations until the generator is exhausted
pub async fn worker<C, G>(
    thread: u64,
    concurrency: u64,
    mut client: C,
    generator: Arc<G>,
    recorder: HistoryRecorder,
    node: String,
    stagger: Duration,
) -> SeqcheckResult<()>
where
    C: Client,
    G: Generator + ?Sized,
{
    client.setup(&node).await?;
    let mut process = thread;

    loop {
        match generator.next(process) {
            Next::Exhausted => break,
            Next::Pending => sleep(PENDING_BACKOFF.max(stagger)).await,
            Next::Ready(op) => {
                let invoke = recorder.record(op);
                let completed = recorder.record(client.invoke(&invoke).await?);
                if completed.is_info() {
                    process += concurrency;
                    debug!(thread, process, "Retiring process after unknown outcome");
                }
                if stagger.is_zero() {
                    tokio::task::yield_now().await;
                } else {
                    sleep(jittered(stagger)).await;
                }
            }
        }
    }

    client.teardown().await
}

/// Uniform delay in `[0, 2 * mean]`
fn jittered(mean: Duration) -> Duration {
    let max = mean.as_micros().saturating_mul(2) as u64;
    Duration::from_micros(rand::thread_rng().gen_range(0..=max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDatabase;

    #[tokio::test]
    async fn test_clean_run_is_valid() {
        let config = SeqcheckConfig::test();
        let report = run_sequential(Arc::new(MemoryDatabase::new()), &config)
            .await
            .unwrap();

        assert!(report.verdict.valid);
        assert_eq!(report.outcomes.ok as u64, config.workload.ops);
        assert_eq!(report.history.len() as u64, 2 * config.workload.ops);
        assert!(report.history.validate().is_ok());
    }

    #[test]
    fn test_jitter_bounds() {
        let mean = Duration::from_millis(10);
        for _ in 0..1_000 {
            assert!(jittered(mean) <= Duration::from_millis(20));
        }
    }
}
