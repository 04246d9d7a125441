//! Logging setup and span helpers

use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::history::Function;

const DEFAULT_FILTER: &str = "seqcheck_core=info,seqcheck=info";

/// Initialize tracing with environment-based configuration.
///
/// `RUST_LOG` takes precedence over the built-in filter. Logs go to stderr so that
/// command output on stdout stays machine-readable.
pub fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    // A second init (e.g. from tests) keeps the first subscriber
    let _ = Registry::default().with(env_filter).with(fmt_layer).try_init();
}

/// Span covering one client call
#[inline]
pub fn operation_span(process: u64, f: Function, key: u64) -> Span {
    tracing::debug_span!(
        "op",
        process = process,
        f = %f,
        key = key,
        outcome = tracing::field::Empty,
    )
}

/// Span covering a whole run
#[inline]
pub fn run_span(run_id: &str) -> Span {
    tracing::info_span!("run", run_id = %run_id)
}
