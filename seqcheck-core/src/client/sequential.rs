//! Client for the sequential workload
//!
//! A write of key `k` inserts `k_0 .. k_{n-1}` one statement at a time, in index
//! order. A read selects the same sub-keys in reverse order. Each statement is
//! conflict-retried on its own; the deadline covers the whole call.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, Instrument};

use super::{Client, SetupLatch};
use crate::db::{Connection, ConnectionSlot, Database, DbResult};
use crate::error::{SeqcheckError, SeqcheckResult};
use crate::executor::Executor;
use crate::history::{Function, Observation, Operation};
use crate::keyspace::KeySpace;
use crate::observability::operation_span;

pub struct SequentialClient<D: Database> {
    database: Arc<D>,
    executor: Arc<Executor>,
    keyspace: KeySpace,
    latch: Arc<SetupLatch>,
    slot: Option<ConnectionSlot<D>>,
}

impl<D: Database> SequentialClient<D> {
    /// Clients of one run share the database, executor and setup latch
    pub fn new(
        database: Arc<D>,
        executor: Arc<Executor>,
        keyspace: KeySpace,
        latch: Arc<SetupLatch>,
    ) -> Self {
        Self {
            database,
            executor,
            keyspace,
            latch,
            slot: None,
        }
    }
}

async fn create_schema<D: Database>(
    slot: &mut ConnectionSlot<D>,
    keyspace: &KeySpace,
) -> SeqcheckResult<()> {
    let conn = slot
        .acquire()
        .await
        .map_err(|e| SeqcheckError::database("connect", e))?;
    for table in keyspace.tables() {
        conn.drop_table(&table)
            .await
            .map_err(|e| SeqcheckError::database("drop_table", e))?;
        conn.create_table(&table)
            .await
            .map_err(|e| SeqcheckError::database("create_table", e))?;
    }
    conn.release();
    info!(tables = keyspace.table_count(), "Created tables");
    Ok(())
}

async fn write_subkeys<D: Database>(
    slot: &mut ConnectionSlot<D>,
    executor: &Executor,
    keyspace: &KeySpace,
    key: u64,
) -> DbResult<Option<Observation>> {
    let conn = slot.acquire().await?;
    for subkey in keyspace.subkeys(key) {
        let table = keyspace.table_for(&subkey);
        let (c, t, k) = (&*conn, table.as_str(), subkey.as_str());
        executor.with_conflict_retry(move || c.insert(t, k)).await?;
    }
    conn.release();
    Ok(None)
}

async fn read_subkeys<D: Database>(
    slot: &mut ConnectionSlot<D>,
    executor: &Executor,
    keyspace: &KeySpace,
    key: u64,
) -> DbResult<Option<Observation>> {
    let conn = slot.acquire().await?;
    let mut observed = Vec::with_capacity(keyspace.key_count());
    for subkey in keyspace.subkeys(key).into_iter().rev() {
        let table = keyspace.table_for(&subkey);
        let (c, t, k) = (&*conn, table.as_str(), subkey.as_str());
        observed.push(executor.with_conflict_retry(move || c.select(t, k)).await?);
    }
    conn.release();
    Ok(Some(observed))
}

#[async_trait]
impl<D: Database + 'static> Client for SequentialClient<D> {
    async fn setup(&mut self, node: &str) -> SeqcheckResult<()> {
        let mut slot = ConnectionSlot::new(self.database.clone(), node);
        self.latch
            .run_once(create_schema(&mut slot, &self.keyspace))
            .await?;
        self.slot = Some(slot);
        Ok(())
    }

    async fn invoke(&mut self, op: &Operation) -> SeqcheckResult<Operation> {
        let slot = self
            .slot
            .as_mut()
            .ok_or_else(|| SeqcheckError::not_initialized("sequential client"))?;
        let executor = &self.executor;
        let keyspace = &self.keyspace;

        let call = async move {
            match op.f {
                Function::Write => {
                    executor
                        .guard(op, write_subkeys(slot, executor, keyspace, op.key))
                        .await
                }
                Function::Read => {
                    executor
                        .guard(op, read_subkeys(slot, executor, keyspace, op.key))
                        .await
                }
            }
        };
        call.instrument(operation_span(op.process, op.f, op.key))
            .await
    }

    async fn teardown(&mut self) -> SeqcheckResult<()> {
        if let Some(mut slot) = self.slot.take() {
            slot.close()
                .await
                .map_err(|e| SeqcheckError::database("close", e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExecutorConfig, FaultConfig};
    use crate::db::{ChaosDatabase, MemoryDatabase};
    use crate::history::{ErrorTag, OpType};
    use std::time::Duration;

    fn client(database: Arc<MemoryDatabase>) -> SequentialClient<MemoryDatabase> {
        let mut config = ExecutorConfig::default();
        config.base_backoff = Duration::from_millis(1);
        config.max_backoff = Duration::from_millis(2);
        SequentialClient::new(
            database,
            Arc::new(Executor::new(config).unwrap()),
            KeySpace::new(5, 10).unwrap(),
            Arc::new(SetupLatch::new()),
        )
    }

    #[tokio::test]
    async fn test_write_then_read_sees_all_subkeys() {
        let database = Arc::new(MemoryDatabase::new());
        let mut client = client(database.clone());
        client.setup("n1").await.unwrap();

        let write = client.invoke(&Operation::write(0, 7)).await.unwrap();
        assert_eq!(write.op_type, OpType::Ok);

        let read = client.invoke(&Operation::read(1, 7)).await.unwrap();
        assert_eq!(read.op_type, OpType::Ok);
        assert_eq!(
            read.value,
            Some(crate::keyspace::expected_observation(5, 7))
        );

        client.teardown().await.unwrap();
        assert_eq!(database.connections_opened(), 1);
    }

    #[tokio::test]
    async fn test_read_before_write_sees_nothing() {
        let database = Arc::new(MemoryDatabase::new());
        let mut client = client(database);
        client.setup("n1").await.unwrap();

        let read = client.invoke(&Operation::read(1, 3)).await.unwrap();
        assert_eq!(read.value, Some(vec![None; 5]));
    }

    #[tokio::test]
    async fn test_duplicate_write_is_unknown_and_reconnects() {
        let database = Arc::new(MemoryDatabase::new());
        let mut client = client(database.clone());
        client.setup("n1").await.unwrap();

        client.invoke(&Operation::write(0, 2)).await.unwrap();
        let again = client.invoke(&Operation::write(0, 2)).await.unwrap();
        assert_eq!(again.op_type, OpType::Info);
        assert!(matches!(again.error, Some(ErrorTag::Driver(_))));

        client.invoke(&Operation::read(0, 2)).await.unwrap();
        assert_eq!(database.connections_opened(), 2);
    }

    #[tokio::test]
    async fn test_invoke_before_setup_is_an_error() {
        let mut client = client(Arc::new(MemoryDatabase::new()));
        assert!(matches!(
            client.invoke(&Operation::read(0, 1)).await,
            Err(SeqcheckError::NotInitialized { .. })
        ));
    }

    #[tokio::test]
    async fn test_only_one_client_creates_tables() {
        let database = Arc::new(MemoryDatabase::new());
        let latch = Arc::new(SetupLatch::new());
        let executor = Arc::new(Executor::new(ExecutorConfig::default()).unwrap());
        let keyspace = KeySpace::new(3, 4).unwrap();

        let mut a = SequentialClient::new(database.clone(), executor.clone(), keyspace, latch.clone());
        let mut b = SequentialClient::new(database.clone(), executor, keyspace, latch);
        a.setup("n1").await.unwrap();
        a.invoke(&Operation::write(0, 1)).await.unwrap();
        b.setup("n2").await.unwrap();

        // b did not drop and recreate the tables under a
        let read = b.invoke(&Operation::read(1, 1)).await.unwrap();
        assert_eq!(read.value, Some(crate::keyspace::expected_observation(3, 1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_call_discards_its_connection() {
        let database = Arc::new(ChaosDatabase::new(
            MemoryDatabase::new(),
            FaultConfig {
                latency: Duration::from_secs(5),
                ..Default::default()
            },
        ));
        let mut config = ExecutorConfig::default();
        config.deadline = Duration::from_secs(1);
        let mut client = SequentialClient::new(
            database.clone(),
            Arc::new(Executor::new(config).unwrap()),
            KeySpace::new(3, 4).unwrap(),
            Arc::new(SetupLatch::new()),
        );
        client.setup("n1").await.unwrap();
        assert_eq!(database.inner().connections_opened(), 1);

        let write = client.invoke(&Operation::write(0, 1)).await.unwrap();
        assert_eq!(write.op_type, OpType::Info);
        assert_eq!(write.error, Some(ErrorTag::Timeout));

        let read = client.invoke(&Operation::read(1, 1)).await.unwrap();
        assert_eq!(read.op_type, OpType::Fail);
        assert_eq!(database.inner().connections_opened(), 2);
    }
}
