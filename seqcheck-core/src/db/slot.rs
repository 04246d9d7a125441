//! Scoped connection ownership
//!
//! A client keeps at most one connection in its [`ConnectionSlot`]. Calls borrow it
//! through a [`ConnectionGuard`], which puts it back only when the call explicitly
//! releases it. Any other exit (a fault propagated with `?`, the call future being
//! dropped at its deadline, a panic) discards the connection, so a session left in
//! the middle of a transaction is never reused.

use std::sync::Arc;

use tracing::debug;

use super::{Connection, Database, DbResult};

pub struct ConnectionSlot<D: Database> {
    database: Arc<D>,
    node: String,
    conn: Option<D::Conn>,
}

impl<D: Database> ConnectionSlot<D> {
    pub fn new(database: Arc<D>, node: impl Into<String>) -> Self {
        Self {
            database,
            node: node.into(),
            conn: None,
        }
    }

    /// Whether a reusable connection is currently parked in the slot
    pub fn is_connected(&self) -> bool {
        self.conn.as_ref().map_or(false, |c| c.is_valid())
    }

    /// Borrow the parked connection, reconnecting if there is none or it went stale
    pub async fn acquire(&mut self) -> DbResult<ConnectionGuard<'_, D::Conn>> {
        let conn = match self.conn.take() {
            Some(conn) if conn.is_valid() => conn,
            stale => {
                if stale.is_some() {
                    debug!(node = %self.node, "Discarding invalid connection");
                }
                debug!(node = %self.node, "Opening connection");
                self.database.connect(&self.node).await?
            }
        };

        Ok(ConnectionGuard {
            slot: &mut self.conn,
            conn: Some(conn),
            released: false,
        })
    }

    pub async fn close(&mut self) -> DbResult<()> {
        match self.conn.take() {
            Some(conn) => conn.close().await,
            None => Ok(()),
        }
    }
}

/// A connection on loan from a [`ConnectionSlot`]
pub struct ConnectionGuard<'a, C: Connection> {
    slot: &'a mut Option<C>,
    conn: Option<C>,
    released: bool,
}

impl<'a, C: Connection> ConnectionGuard<'a, C> {
    /// Return the connection to the slot for reuse
    pub fn release(mut self) {
        self.released = true;
    }
}

impl<'a, C: Connection> std::ops::Deref for ConnectionGuard<'a, C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection is held until the guard drops")
    }
}

impl<'a, C: Connection> Drop for ConnectionGuard<'a, C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.released && conn.is_valid() {
                *self.slot = Some(conn);
            } else {
                debug!("Connection abandoned; next call reconnects");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DbFault, MemoryDatabase};
    use std::time::Duration;

    #[tokio::test]
    async fn test_released_connection_is_reused() {
        let database = Arc::new(MemoryDatabase::new());
        let mut slot = ConnectionSlot::new(database.clone(), "n1");

        let guard = slot.acquire().await.unwrap();
        guard.release();
        assert!(slot.is_connected());

        let guard = slot.acquire().await.unwrap();
        guard.release();
        assert_eq!(database.connections_opened(), 1);
    }

    #[tokio::test]
    async fn test_error_path_discards_connection() {
        let database = Arc::new(MemoryDatabase::new());
        let mut slot = ConnectionSlot::new(database.clone(), "n1");

        async fn failing_call(slot: &mut ConnectionSlot<MemoryDatabase>) -> DbResult<()> {
            let guard = slot.acquire().await?;
            guard.select("missing", "k").await?;
            guard.release();
            Ok(())
        }

        assert!(failing_call(&mut slot).await.is_err());
        assert!(!slot.is_connected());

        slot.acquire().await.unwrap().release();
        assert_eq!(database.connections_opened(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_call_discards_connection() {
        let database = Arc::new(MemoryDatabase::new());
        let mut slot = ConnectionSlot::new(database.clone(), "n1");

        let call = async {
            let guard = slot.acquire().await?;
            tokio::time::sleep(Duration::from_secs(60)).await;
            guard.release();
            Ok::<_, DbFault>(())
        };
        let result = tokio::time::timeout(Duration::from_secs(1), call).await;

        assert!(result.is_err());
        assert!(!slot.is_connected());
    }
}
