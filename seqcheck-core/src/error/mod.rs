//! Error handling for seqcheck
//!
//! Two layers of failure exist in this crate:
//!
//! - [`DbFault`](crate::db::DbFault) is what a database transport raises for a single
//!   attempt. The executor absorbs it: conflicts are retried, everything it recognises
//!   is folded into the completed operation as an [`ErrorTag`](crate::history::ErrorTag).
//! - [`SeqcheckError`] is what escapes to the caller: configuration problems, setup
//!   failures, malformed histories, and faults the executor could not classify.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 seqcheck error propagation                   │
//! ├──────────────────────────────────────────────────────────────┤
//! │  attempt ──DbFault──▶ conflict retry ──▶ classification      │
//! │                                            │                 │
//! │           fail / info record ◀─────────────┤                 │
//! │           SeqcheckError::UnclassifiedFault ◀┘ (fatal)        │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod types;
pub mod constructors;
pub mod conversions;

#[cfg(test)]
mod tests;

pub use types::{SeqcheckError, SeqcheckResult, Result};
