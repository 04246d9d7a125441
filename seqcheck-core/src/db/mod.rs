//! Database transport abstraction
//!
//! The executor and client talk to the database only through [`Database`] and
//! [`Connection`]. A transport reports each failed attempt as a [`DbFault`]; the
//! fault's kind drives classification, while serialization conflicts are
//! recognised by message pattern so that any transport can signal them.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

pub mod chaos;
pub mod memory;
pub mod redb_store;
pub mod slot;

pub use chaos::{ChaosConnection, ChaosDatabase};
pub use memory::{MemoryConnection, MemoryDatabase};
pub use redb_store::{RedbConnection, RedbDatabase};
pub use slot::{ConnectionGuard, ConnectionSlot};

pub type DbResult<T> = std::result::Result<T, DbFault>;

/// Broad family of a transport fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// The transaction was rolled back and did not commit
    Rollback,
    /// A batched statement failed part way
    BatchUpdate,
    /// Protocol-level fault from the driver; commit state unknown
    Driver,
    /// The connection closed while rolling back
    ConnectionClosed,
    /// Any other SQL-level fault
    Sql,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FaultKind::Rollback => "rollback",
            FaultKind::BatchUpdate => "batch-update",
            FaultKind::Driver => "driver",
            FaultKind::ConnectionClosed => "connection-closed",
            FaultKind::Sql => "sql",
        };
        f.write_str(s)
    }
}

/// A fault raised by one attempt of a database call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct DbFault {
    pub kind: FaultKind,
    pub message: String,
    /// Underlying cause, e.g. the next exception of a failed batch
    pub cause: Option<String>,
}

impl DbFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    pub fn rollback(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Rollback, message)
    }

    pub fn batch_update(message: impl Into<String>, cause: Option<String>) -> Self {
        Self {
            cause,
            ..Self::new(FaultKind::BatchUpdate, message)
        }
    }

    pub fn driver(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Driver, message)
    }

    pub fn connection_closed(message: impl Into<String>) -> Self {
        Self::new(FaultKind::ConnectionClosed, message)
    }

    pub fn sql(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Sql, message)
    }

    /// What a serializable database reports when a transaction must restart
    pub fn serialization_conflict(detail: impl fmt::Display) -> Self {
        Self::driver(format!("ERROR: restart transaction: {}", detail))
    }

    /// The most specific message available
    pub fn detail(&self) -> &str {
        self.cause.as_deref().unwrap_or(&self.message)
    }
}

/// One client's session with the database
///
/// Methods take `&self`; a connection is owned by exactly one client and used
/// sequentially, so implementations need no cross-call locking of their own.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Create `table` with a single string primary key
    async fn create_table(&self, table: &str) -> DbResult<()>;

    async fn drop_table(&self, table: &str) -> DbResult<()>;

    /// Insert `key` into `table` in its own serializable transaction
    async fn insert(&self, table: &str, key: &str) -> DbResult<()>;

    /// Read `key` back from `table`
    async fn select(&self, table: &str, key: &str) -> DbResult<Option<String>>;

    /// False once the session can no longer be trusted
    fn is_valid(&self) -> bool {
        true
    }

    async fn close(&self) -> DbResult<()> {
        Ok(())
    }
}

/// Connection factory for a database node
#[async_trait]
pub trait Database: Send + Sync {
    type Conn: Connection + 'static;

    async fn connect(&self, node: &str) -> DbResult<Self::Conn>;
}
