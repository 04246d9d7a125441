//! Run-once latch for schema setup
//!
//! Every client of a run calls [`SetupLatch::run_once`] while starting up. The
//! first caller to claim the latch runs the setup; the others wait until it
//! publishes its result. If the winner is dropped before finishing, the waiters
//! see a failed setup instead of hanging.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tracing::debug;

use crate::error::{SeqcheckError, SeqcheckResult};

#[derive(Debug)]
pub struct SetupLatch {
    claimed: AtomicBool,
    done: watch::Sender<Option<bool>>,
}

impl SetupLatch {
    pub fn new() -> Self {
        let (done, _) = watch::channel(None);
        Self {
            claimed: AtomicBool::new(false),
            done,
        }
    }

    /// Run `setup` if no one has yet, otherwise wait for whoever did.
    ///
    /// Returns `true` to the caller that actually ran it. `setup` is only polled
    /// by that caller.
    pub async fn run_once<Fut>(&self, setup: Fut) -> SeqcheckResult<bool>
    where
        Fut: Future<Output = SeqcheckResult<()>>,
    {
        if self
            .claimed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let publish = Publish {
                done: &self.done,
                ok: false,
            };
            let result = setup.await;
            publish.finish(result.is_ok());
            return result.map(|_| true);
        }

        debug!("Waiting for setup in another client");
        let mut rx = self.done.subscribe();
        let ok = rx.wait_for(Option::is_some).await.map(|state| *state == Some(true))?;
        if ok {
            Ok(false)
        } else {
            Err(SeqcheckError::not_initialized(
                "schema setup failed in another client",
            ))
        }
    }
}

impl Default for SetupLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishes the setup result when dropped
struct Publish<'a> {
    done: &'a watch::Sender<Option<bool>>,
    ok: bool,
}

impl Publish<'_> {
    fn finish(mut self, ok: bool) {
        self.ok = ok;
    }
}

impl Drop for Publish<'_> {
    fn drop(&mut self) {
        self.done.send_replace(Some(self.ok));
    }
}
