//! Workload generation
//!
//! Writers take fresh keys from a shared counter and push them into a
//! [`LastWritten`] window; readers pick keys from that same window. Keeping the
//! window short makes it likely that a read lands on a key whose write is still
//! in flight, which is where ordering anomalies show up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::WorkloadConfig;
use crate::error::SeqcheckResult;
use crate::history::Operation;

pub mod window;

pub use window::LastWritten;

/// What a generator has for a process right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    Ready(Operation),
    /// Nothing yet; ask again later
    Pending,
    /// The generator will never produce again
    Exhausted,
}

impl Next {
    pub fn ready(self) -> Option<Operation> {
        match self {
            Next::Ready(op) => Some(op),
            _ => None,
        }
    }
}

/// Source of operations, shared by all workers of a run
pub trait Generator: Send + Sync {
    fn next(&self, process: u64) -> Next;
}

impl<G: Generator + ?Sized> Generator for Arc<G> {
    fn next(&self, process: u64) -> Next {
        (**self).next(process)
    }
}

/// Writes of strictly increasing keys
#[derive(Debug)]
pub struct Writes {
    counter: AtomicU64,
    window: Arc<LastWritten>,
}

impl Writes {
    pub fn new(window: Arc<LastWritten>) -> Self {
        Self {
            counter: AtomicU64::new(0),
            window,
        }
    }
}

impl Generator for Writes {
    fn next(&self, process: u64) -> Next {
        let key = self.counter.fetch_add(1, Ordering::SeqCst);
        self.window.push(key);
        Next::Ready(Operation::write(process, key))
    }
}

/// Reads of keys drawn from the window
#[derive(Debug)]
pub struct Reads {
    window: Arc<LastWritten>,
    rng: Mutex<ChaCha8Rng>,
}

impl Reads {
    pub fn new(window: Arc<LastWritten>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            window,
            rng: Mutex::new(rng),
        }
    }
}

impl Generator for Reads {
    fn next(&self, process: u64) -> Next {
        match self.window.sample(&mut *self.rng.lock()) {
            Some(key) => Next::Ready(Operation::read(process, key)),
            None => Next::Pending,
        }
    }
}

/// Routes the first `writers` worker slots to one generator and the rest to another
#[derive(Debug)]
pub struct Reserve<W, R> {
    concurrency: u64,
    writers: u64,
    writes: W,
    reads: R,
}

impl<W: Generator, R: Generator> Reserve<W, R> {
    pub fn new(concurrency: usize, writers: usize, writes: W, reads: R) -> Self {
        Self {
            concurrency: concurrency.max(1) as u64,
            writers: writers as u64,
            writes,
            reads,
        }
    }

    pub fn is_writer(&self, process: u64) -> bool {
        process % self.concurrency < self.writers
    }
}

impl Reserve<Writes, Reads> {
    /// Writers and readers sharing one window, sized from `config`
    pub fn sequential(config: &WorkloadConfig) -> SeqcheckResult<(Self, Arc<LastWritten>)> {
        config.validate()?;
        let window = Arc::new(LastWritten::new(config.window_size()));
        let reserve = Self::new(
            config.concurrency,
            config.writers(),
            Writes::new(window.clone()),
            Reads::new(window.clone(), config.seed),
        );
        Ok((reserve, window))
    }
}

impl<W: Generator, R: Generator> Generator for Reserve<W, R> {
    fn next(&self, process: u64) -> Next {
        if self.is_writer(process) {
            self.writes.next(process)
        } else {
            self.reads.next(process)
        }
    }
}

/// Stops after `limit` operations
#[derive(Debug)]
pub struct Limit<G> {
    inner: G,
    remaining: AtomicU64,
}

impl<G: Generator> Limit<G> {
    pub fn new(inner: G, limit: u64) -> Self {
        Self {
            inner,
            remaining: AtomicU64::new(limit),
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::SeqCst)
    }
}

impl<G: Generator> Generator for Limit<G> {
    fn next(&self, process: u64) -> Next {
        let reserved = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if reserved.is_err() {
            return Next::Exhausted;
        }
        match self.inner.next(process) {
            Next::Ready(op) => Next::Ready(op),
            other => {
                self.remaining.fetch_add(1, Ordering::SeqCst);
                other
            }
        }
    }
}
