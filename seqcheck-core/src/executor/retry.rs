//! Serialization-conflict retry
//!
//! A serializable database aborts one side of a conflicting pair and asks the
//! client to restart. Those faults are retried here, with a delay that grows by a
//! jittered factor each step so concurrent clients do not retry in lockstep. Every
//! other fault leaves the loop on first sight.
//!
//! The loop is an explicit state machine: each attempt is sorted into an
//! [`Attempt`], and a [`RetryState`] owned by the call decides whether another
//! attempt is allowed and how long to wait before it.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use regex::Regex;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::ExecutorConfig;
use crate::db::{DbFault, DbResult};
use crate::error::SeqcheckResult;

/// Outcome of one attempt
#[derive(Debug)]
pub enum Attempt<T> {
    Success(T),
    /// A serialization conflict; the attempt had no effect and may be repeated
    Retryable(DbFault),
    /// Any other fault; leaves the loop untouched
    Fatal(DbFault),
}

/// Jittered exponential backoff
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    multiplier: f64,
    jitter: f64,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, multiplier: f64, jitter: f64, max: Duration) -> Self {
        Self {
            next: base.min(max),
            multiplier,
            jitter,
            max,
        }
    }

    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(
            config.base_backoff,
            config.backoff_multiplier,
            config.backoff_jitter,
            config.max_backoff,
        )
    }

    /// Delay the next retry will wait
    pub fn current(&self) -> Duration {
        self.next
    }

    /// Growth factor for one step, drawn from `multiplier * [1 - jitter, 1 + jitter]`
    pub fn factor<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.jitter <= 0.0 {
            return self.multiplier;
        }
        let low = self.multiplier * (1.0 - self.jitter);
        let high = self.multiplier * (1.0 + self.jitter);
        rng.gen_range(low..=high)
    }

    /// Take the current delay and grow the next one
    pub fn advance<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Duration {
        let delay = self.next;
        let grown = delay.as_nanos() as f64 * self.factor(rng);
        let capped = grown.min(self.max.as_nanos() as f64);
        self.next = Duration::from_nanos(capped as u64);
        delay
    }
}

/// Per-call retry bookkeeping. Never shared between calls.
#[derive(Debug, Clone)]
pub struct RetryState {
    attempts_remaining: u32,
    backoff: Backoff,
}

impl RetryState {
    pub fn new(attempts_remaining: u32, backoff: Backoff) -> Self {
        Self {
            attempts_remaining,
            backoff,
        }
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.attempts_remaining
    }

    /// Spend one retry. Returns the delay to wait, or `None` once the budget is gone.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts_remaining == 0 {
            return None;
        }
        self.attempts_remaining -= 1;
        Some(self.backoff.advance(&mut rand::thread_rng()))
    }
}

/// Retries attempts that fail with a serialization conflict
#[derive(Debug, Clone)]
pub struct ConflictRetry {
    matcher: Regex,
    max_retries: u32,
    backoff: Backoff,
}

impl ConflictRetry {
    pub fn new(pattern: &str, max_retries: u32, backoff: Backoff) -> SeqcheckResult<Self> {
        Ok(Self {
            matcher: Regex::new(pattern)?,
            max_retries,
            backoff,
        })
    }

    pub fn from_config(config: &ExecutorConfig) -> SeqcheckResult<Self> {
        Self::new(
            &config.conflict_pattern,
            config.max_retries,
            Backoff::from_config(config),
        )
    }

    pub fn is_conflict(&self, fault: &DbFault) -> bool {
        self.matcher.is_match(&fault.message)
    }

    /// Sort a raw attempt result
    pub fn judge<T>(&self, result: DbResult<T>) -> Attempt<T> {
        match result {
            Ok(value) => Attempt::Success(value),
            Err(fault) if self.is_conflict(&fault) => Attempt::Retryable(fault),
            Err(fault) => Attempt::Fatal(fault),
        }
    }

    /// Run `attempt` until it succeeds, fails with something other than a
    /// conflict, or the retry budget is spent. The last fault is returned on
    /// exhaustion.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> DbResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        let mut state = RetryState::new(self.max_retries, self.backoff.clone());
        let mut tries = 0u32;

        loop {
            tries += 1;
            match self.judge(attempt().await) {
                Attempt::Success(value) => {
                    if tries > 1 {
                        debug!("Succeeded after {} attempts", tries);
                    }
                    return Ok(value);
                }
                Attempt::Fatal(fault) => return Err(fault),
                Attempt::Retryable(fault) => match state.next_delay() {
                    Some(delay) => {
                        debug!(
                            attempt = tries,
                            remaining = state.attempts_remaining(),
                            ?delay,
                            "Serialization conflict, retrying: {}",
                            fault.message
                        );
                        sleep(delay).await;
                    }
                    None => {
                        warn!("Conflict retry budget exhausted after {} attempts", tries);
                        return Err(fault);
                    }
                },
            }
        }
    }
}
