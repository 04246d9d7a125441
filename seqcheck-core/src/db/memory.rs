//! In-process database with table semantics but no persistence

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Connection, Database, DbFault, DbResult};

type Tables = HashMap<String, BTreeSet<String>>;

#[derive(Clone, Default)]
pub struct MemoryDatabase {
    tables: Arc<Mutex<Tables>>,
    connections_opened: Arc<AtomicUsize>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections handed out so far
    pub fn connections_opened(&self) -> usize {
        self.connections_opened.load(Ordering::SeqCst)
    }

    /// Rows of `table`, sorted
    pub fn rows(&self, table: &str) -> Option<Vec<String>> {
        self.tables
            .lock()
            .get(table)
            .map(|rows| rows.iter().cloned().collect())
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    type Conn = MemoryConnection;

    async fn connect(&self, _node: &str) -> DbResult<MemoryConnection> {
        self.connections_opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            tables: self.tables.clone(),
            closed: AtomicBool::new(false),
        })
    }
}

pub struct MemoryConnection {
    tables: Arc<Mutex<Tables>>,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> DbResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DbFault::driver("This connection has been closed."));
        }
        Ok(())
    }
}

fn missing_table(table: &str) -> DbFault {
    DbFault::driver(format!("ERROR: relation \"{}\" does not exist", table))
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn create_table(&self, table: &str) -> DbResult<()> {
        self.ensure_open()?;
        self.tables.lock().entry(table.to_string()).or_default();
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> DbResult<()> {
        self.ensure_open()?;
        self.tables.lock().remove(table);
        Ok(())
    }

    async fn insert(&self, table: &str, key: &str) -> DbResult<()> {
        self.ensure_open()?;
        let mut tables = self.tables.lock();
        let rows = tables.get_mut(table).ok_or_else(|| missing_table(table))?;
        if !rows.insert(key.to_string()) {
            return Err(DbFault::driver(format!(
                "ERROR: duplicate key value violates unique constraint \"{}_pkey\"",
                table
            )));
        }
        Ok(())
    }

    async fn select(&self, table: &str, key: &str) -> DbResult<Option<String>> {
        self.ensure_open()?;
        let tables = self.tables.lock();
        let rows = tables.get(table).ok_or_else(|| missing_table(table))?;
        Ok(rows.get(key).cloned())
    }

    fn is_valid(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> DbResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
