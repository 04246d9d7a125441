//! Bounded window of recently written keys

use std::collections::VecDeque;

use parking_lot::Mutex;
use rand::Rng;

/// FIFO of the last `capacity` write keys, pre-filled with placeholders.
///
/// Only used to steer reads toward keys that are probably still being written;
/// nothing downstream relies on it for correctness.
#[derive(Debug)]
pub struct LastWritten {
    entries: Mutex<VecDeque<Option<u64>>>,
    capacity: usize,
}

impl LastWritten {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(std::iter::repeat(None).take(capacity).collect()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append `key`, evicting the oldest entry
    pub fn push(&self, key: u64) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        entries.pop_front();
        entries.push_back(Some(key));
    }

    /// Uniform draw over the real (non-placeholder) entries
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<u64> {
        let entries = self.entries.lock();
        let live = entries.iter().flatten().count();
        if live == 0 {
            return None;
        }
        entries.iter().flatten().nth(rng.gen_range(0..live)).copied()
    }

    /// Number of real entries
    pub fn live_len(&self) -> usize {
        self.entries.lock().iter().flatten().count()
    }

    pub fn snapshot(&self) -> Vec<Option<u64>> {
        self.entries.lock().iter().copied().collect()
    }
}
