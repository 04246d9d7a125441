//! Workload driver and sequential-consistency checker for serializable SQL databases
//!
//! The pieces, leaf first:
//!
//! - [`executor`]: deadline, fault classification, conflict retry and idempotence
//!   remap around one database call
//! - [`workload`]: write/read generators sharing a last-written window
//! - [`checker`]: the sequential-consistency check over a finished history
//! - [`client`]: the per-process client contract and the sequential client
//! - [`runner`]: wires the above into a run against any [`db::Database`]

pub mod checker;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod history;
pub mod keyspace;
pub mod observability;
pub mod runner;
pub mod workload;

pub use error::{SeqcheckError, SeqcheckResult};
