//! Fault-injecting transport wrapper
//!
//! Wraps any [`Database`] and, per statement, may add latency and raise one of the
//! faults a real cluster produces under contention or partition:
//!
//! - serialization conflict, before the statement applies (retryable)
//! - rollback, before the statement applies (confirmed no-op)
//! - driver fault, *after* the statement applied (effect happened, client cannot tell)
//!
//! Table DDL is never faulted so setup stays deterministic.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::trace;

use super::{Connection, Database, DbFault, DbResult};
use crate::config::FaultConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Injected {
    Conflict,
    Rollback,
    Ambiguous,
}

struct FaultPlan {
    config: FaultConfig,
    rng: Mutex<ChaCha8Rng>,
}

impl FaultPlan {
    fn roll(&self) -> Option<Injected> {
        let draw: f64 = self.rng.lock().gen();
        let c = &self.config;
        if draw < c.conflict_rate {
            Some(Injected::Conflict)
        } else if draw < c.conflict_rate + c.rollback_rate {
            Some(Injected::Rollback)
        } else if draw < c.conflict_rate + c.rollback_rate + c.ambiguous_rate {
            Some(Injected::Ambiguous)
        } else {
            None
        }
    }

    async fn delay(&self) {
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }
    }
}

pub struct ChaosDatabase<D: Database> {
    inner: D,
    plan: Arc<FaultPlan>,
}

impl<D: Database> ChaosDatabase<D> {
    pub fn new(inner: D, config: FaultConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            inner,
            plan: Arc::new(FaultPlan {
                config,
                rng: Mutex::new(rng),
            }),
        }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }
}

#[async_trait]
impl<D: Database> Database for ChaosDatabase<D> {
    type Conn = ChaosConnection<D::Conn>;

    async fn connect(&self, node: &str) -> DbResult<Self::Conn> {
        Ok(ChaosConnection {
            inner: self.inner.connect(node).await?,
            plan: self.plan.clone(),
        })
    }
}

pub struct ChaosConnection<C: Connection> {
    inner: C,
    plan: Arc<FaultPlan>,
}

impl<C: Connection> ChaosConnection<C> {
    /// Fault raised before the statement reaches the store, if any
    fn before(&self, injected: Option<Injected>, statement: &str) -> DbResult<()> {
        match injected {
            Some(Injected::Conflict) => {
                trace!(statement, "Injecting serialization conflict");
                Err(DbFault::serialization_conflict(
                    "TransactionRetryWithProtoRefreshError: injected",
                ))
            }
            Some(Injected::Rollback) => {
                trace!(statement, "Injecting rollback");
                Err(DbFault::rollback(
                    "ERROR: current transaction is aborted, commands ignored until end of transaction block",
                ))
            }
            _ => Ok(()),
        }
    }

    fn after<T>(&self, injected: Option<Injected>, statement: &str, result: DbResult<T>) -> DbResult<T> {
        match (injected, result) {
            (Some(Injected::Ambiguous), Ok(_)) => {
                trace!(statement, "Injecting ambiguous driver fault");
                Err(DbFault::driver(
                    "An I/O error occurred while sending to the backend.",
                ))
            }
            (_, result) => result,
        }
    }
}

#[async_trait]
impl<C: Connection> Connection for ChaosConnection<C> {
    async fn create_table(&self, table: &str) -> DbResult<()> {
        self.inner.create_table(table).await
    }

    async fn drop_table(&self, table: &str) -> DbResult<()> {
        self.inner.drop_table(table).await
    }

    async fn insert(&self, table: &str, key: &str) -> DbResult<()> {
        self.plan.delay().await;
        let injected = self.plan.roll();
        self.before(injected, "insert")?;
        let result = self.inner.insert(table, key).await;
        self.after(injected, "insert", result)
    }

    async fn select(&self, table: &str, key: &str) -> DbResult<Option<String>> {
        self.plan.delay().await;
        let injected = self.plan.roll();
        self.before(injected, "select")?;
        let result = self.inner.select(table, key).await;
        self.after(injected, "select", result)
    }

    fn is_valid(&self) -> bool {
        self.inner.is_valid()
    }

    async fn close(&self) -> DbResult<()> {
        self.inner.close().await
    }
}
