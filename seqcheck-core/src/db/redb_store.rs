//! Embedded store backed by redb
//!
//! Each shard table of the key space is a redb table mapping a key to itself.
//! Every statement runs in its own transaction; redb serializes write
//! transactions, which gives the serializable isolation the workload expects.
//!
//! redb blocks the calling thread (waiting for the writer lock, fsync on
//! commit), so each transaction runs on tokio's blocking pool. A caller that
//! stops waiting leaves the transaction to finish there on its own.

use std::fmt::Display;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database as RedbHandle, ReadableTable, TableDefinition, TableError};
use tracing::debug;

use super::{Connection, Database, DbFault, DbResult};
use crate::error::SeqcheckResult;

fn table_def(name: &str) -> TableDefinition<'_, &'static str, &'static str> {
    TableDefinition::new(name)
}

fn storage_fault(operation: &str, err: impl Display) -> DbFault {
    DbFault::driver(format!("{} failed: {}", operation, err))
}

fn missing_table(table: &str) -> DbFault {
    DbFault::driver(format!("ERROR: relation \"{}\" does not exist", table))
}

#[derive(Clone, Debug)]
pub struct RedbDatabase {
    database: Arc<RedbHandle>,
}

impl RedbDatabase {
    /// Open or create the store at `path`
    pub fn create(path: impl AsRef<Path>) -> SeqcheckResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let database = RedbHandle::create(path)?;
        debug!(path = %path.display(), "Opened redb store");
        Ok(Self {
            database: Arc::new(database),
        })
    }
}

#[async_trait]
impl Database for RedbDatabase {
    type Conn = RedbConnection;

    async fn connect(&self, node: &str) -> DbResult<RedbConnection> {
        debug!(node, "Opening redb connection");
        Ok(RedbConnection {
            database: self.database.clone(),
            closed: AtomicBool::new(false),
        })
    }
}

pub struct RedbConnection {
    database: Arc<RedbHandle>,
    closed: AtomicBool,
}

impl RedbConnection {
    fn ensure_open(&self) -> DbResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DbFault::driver("This connection has been closed."));
        }
        Ok(())
    }

    /// Run one transaction on the blocking pool
    async fn blocking<T, F>(&self, statement: &'static str, work: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&RedbHandle) -> DbResult<T> + Send + 'static,
    {
        self.ensure_open()?;
        let database = self.database.clone();
        tokio::task::spawn_blocking(move || work(&*database))
            .await
            .map_err(|e| DbFault::sql(format!("{} task join error: {}", statement, e)))?
    }
}

fn create_table_txn(database: &RedbHandle, table: &str) -> DbResult<()> {
    let txn = database
        .begin_write()
        .map_err(|e| storage_fault("begin_write", e))?;
    txn.open_table(table_def(table))
        .map_err(|e| storage_fault("create_table", e))?;
    txn.commit().map_err(|e| storage_fault("commit", e))
}

fn drop_table_txn(database: &RedbHandle, table: &str) -> DbResult<()> {
    let txn = database
        .begin_write()
        .map_err(|e| storage_fault("begin_write", e))?;
    txn.delete_table(table_def(table))
        .map_err(|e| storage_fault("drop_table", e))?;
    txn.commit().map_err(|e| storage_fault("commit", e))
}

fn insert_txn(database: &RedbHandle, table: &str, key: &str) -> DbResult<()> {
    let txn = database
        .begin_write()
        .map_err(|e| storage_fault("begin_write", e))?;
    let inserted = {
        let mut rows = txn
            .open_table(table_def(table))
            .map_err(|e| storage_fault("open_table", e))?;
        let exists = rows
            .get(key)
            .map_err(|e| storage_fault("get", e))?
            .is_some();
        if !exists {
            rows.insert(key, key).map_err(|e| storage_fault("insert", e))?;
        }
        !exists
    };
    if !inserted {
        txn.abort().map_err(|e| storage_fault("abort", e))?;
        return Err(DbFault::driver(format!(
            "ERROR: duplicate key value violates unique constraint \"{}_pkey\"",
            table
        )));
    }
    txn.commit().map_err(|e| storage_fault("commit", e))
}

fn select_txn(database: &RedbHandle, table: &str, key: &str) -> DbResult<Option<String>> {
    let txn = database
        .begin_read()
        .map_err(|e| storage_fault("begin_read", e))?;
    let rows = match txn.open_table(table_def(table)) {
        Ok(rows) => rows,
        Err(TableError::TableDoesNotExist(_)) => return Err(missing_table(table)),
        Err(e) => return Err(storage_fault("open_table", e)),
    };
    let value = rows
        .get(key)
        .map_err(|e| storage_fault("get", e))?
        .map(|row| row.value().to_string());
    Ok(value)
}

#[async_trait]
impl Connection for RedbConnection {
    async fn create_table(&self, table: &str) -> DbResult<()> {
        let table = table.to_string();
        self.blocking("create_table", move |db| create_table_txn(db, &table))
            .await
    }

    async fn drop_table(&self, table: &str) -> DbResult<()> {
        let table = table.to_string();
        self.blocking("drop_table", move |db| drop_table_txn(db, &table))
            .await
    }

    async fn insert(&self, table: &str, key: &str) -> DbResult<()> {
        let (table, key) = (table.to_string(), key.to_string());
        self.blocking("insert", move |db| insert_txn(db, &table, &key))
            .await
    }

    async fn select(&self, table: &str, key: &str) -> DbResult<Option<String>> {
        let (table, key) = (table.to_string(), key.to_string());
        self.blocking("select", move |db| select_txn(db, &table, &key))
            .await
    }

    fn is_valid(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> DbResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutorConfig;
    use crate::executor::Executor;
    use crate::history::{ErrorTag, OpType, Operation};
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn create_test_database() -> (RedbDatabase, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let database = RedbDatabase::create(temp_dir.path().join("test.redb")).unwrap();
        (database, temp_dir)
    }

    #[tokio::test]
    async fn test_table_lifecycle() {
        let (database, _dir) = create_test_database();
        let conn = database.connect("n1").await.unwrap();

        conn.create_table("test3").await.unwrap();
        conn.insert("test3", "12_4").await.unwrap();
        assert_eq!(conn.select("test3", "12_4").await.unwrap(), Some("12_4".into()));
        assert_eq!(conn.select("test3", "12_3").await.unwrap(), None);

        conn.drop_table("test3").await.unwrap();
        let err = conn.select("test3", "12_4").await.unwrap_err();
        assert!(err.message.contains("does not exist"));
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected_without_commit() {
        let (database, _dir) = create_test_database();
        let conn = database.connect("n1").await.unwrap();
        conn.create_table("test0").await.unwrap();
        conn.insert("test0", "1_0").await.unwrap();

        let err = conn.insert("test0", "1_0").await.unwrap_err();
        assert!(err.message.contains("duplicate key"));
        assert_eq!(conn.select("test0", "1_0").await.unwrap(), Some("1_0".into()));
    }

    #[tokio::test]
    async fn test_connections_share_the_store() {
        let (database, _dir) = create_test_database();
        let a = database.connect("n1").await.unwrap();
        let b = database.connect("n2").await.unwrap();
        a.create_table("test1").await.unwrap();
        a.insert("test1", "5_2").await.unwrap();
        assert_eq!(b.select("test1", "5_2").await.unwrap(), Some("5_2".into()));

        b.close().await.unwrap();
        assert!(!b.is_valid());
        assert!(a.is_valid());
    }

    #[tokio::test]
    async fn test_deadline_expires_while_writer_lock_is_held() {
        let (database, _dir) = create_test_database();
        let conn = database.connect("n1").await.unwrap();
        conn.create_table("test0").await.unwrap();

        let (held_tx, held_rx) = std::sync::mpsc::channel();
        let handle = database.database.clone();
        let holder = std::thread::spawn(move || {
            let txn = handle.begin_write().unwrap();
            held_tx.send(()).unwrap();
            std::thread::sleep(Duration::from_secs(2));
            txn.abort().unwrap();
        });
        held_rx.recv().unwrap();

        let mut config = ExecutorConfig::default();
        config.deadline = Duration::from_millis(200);
        let executor = Executor::new(config).unwrap();

        let started = Instant::now();
        let done = executor
            .execute(&Operation::write(0, 1), || async {
                conn.insert("test0", "1_0").await.map(|()| None)
            })
            .await
            .unwrap();

        assert!(
            started.elapsed() < Duration::from_secs(1),
            "deadline did not interrupt the wait: {:?}",
            started.elapsed()
        );
        assert_eq!(done.op_type, OpType::Info);
        assert_eq!(done.error, Some(ErrorTag::Timeout));

        holder.join().unwrap();
        // the abandoned insert still runs to completion once the lock is free
        let mut visible = None;
        for _ in 0..50 {
            visible = conn.select("test0", "1_0").await.unwrap();
            if visible.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(visible, Some("1_0".into()));
    }
}
