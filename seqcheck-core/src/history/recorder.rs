//! Thread-safe history recorder
//!
//! Stamps each record with its position and the time since the recorder was
//! created, then appends it. Workers share one recorder through `Clone`.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use super::{History, Operation};

#[derive(Clone)]
pub struct HistoryRecorder {
    ops: Arc<Mutex<Vec<Operation>>>,
    started: Instant,
}

impl HistoryRecorder {
    pub fn new() -> Self {
        Self {
            ops: Arc::new(Mutex::new(Vec::new())),
            started: Instant::now(),
        }
    }

    /// Append a record, returning it as stamped
    pub fn record(&self, mut op: Operation) -> Operation {
        let mut ops = self.ops.lock();
        op.index = ops.len() as u64;
        op.time = self.started.elapsed().as_nanos() as u64;
        ops.push(op.clone());
        op
    }

    pub fn len(&self) -> usize {
        self.ops.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.lock().is_empty()
    }

    /// Copy of everything recorded so far
    pub fn history(&self) -> History {
        History::new(self.ops.lock().clone())
    }
}

impl Default for HistoryRecorder {
    fn default() -> Self {
        Self::new()
    }
}
