//! Client contract
//!
//! A client is one simulated process's handle on the database. The orchestrator
//! calls `setup` once, then `invoke` for each operation, then `teardown`. Every
//! `invoke` goes through the [`Executor`](crate::executor::Executor) so that it
//! returns exactly one completion for the invoke it was given.

use async_trait::async_trait;

use crate::error::SeqcheckResult;
use crate::history::Operation;

pub mod sequential;
pub mod setup;

pub use sequential::SequentialClient;
pub use setup::SetupLatch;

#[async_trait]
pub trait Client: Send {
    /// Connect to `node` and make sure the schema exists
    async fn setup(&mut self, node: &str) -> SeqcheckResult<()>;

    /// Perform `op`, returning its `ok`, `fail` or `info` completion.
    ///
    /// An `Err` is reserved for faults the executor cannot classify; the caller
    /// must stop rather than record anything for the call.
    async fn invoke(&mut self, op: &Operation) -> SeqcheckResult<Operation>;

    async fn teardown(&mut self) -> SeqcheckResult<()>;
}
