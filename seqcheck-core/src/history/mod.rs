//! Operation records and histories
//!
//! An [`Operation`] is one line of a history: either the invocation of a call by a
//! process or its completion. Every invoke is eventually followed by exactly one
//! `ok`, `fail` or `info` from the same process for the same call, and a process
//! never has two outstanding invokes.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SeqcheckError, SeqcheckResult};

pub mod recorder;

pub use recorder::HistoryRecorder;

/// Kind of a history record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    Invoke,
    /// Confirmed success
    Ok,
    /// Confirmed to have had no effect
    Fail,
    /// Outcome unknown; the effect may or may not have happened
    Info,
}

impl OpType {
    pub fn is_completion(self) -> bool {
        !matches!(self, OpType::Invoke)
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpType::Invoke => "invoke",
            OpType::Ok => "ok",
            OpType::Fail => "fail",
            OpType::Info => "info",
        };
        f.write_str(s)
    }
}

/// Function a client is asked to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Function {
    Read,
    Write,
}

impl Function {
    pub fn as_str(&self) -> &'static str {
        match self {
            Function::Read => "read",
            Function::Write => "write",
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Function {
    type Err = SeqcheckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(Function::Read),
            "write" => Ok(Function::Write),
            other => Err(SeqcheckError::configuration(
                "function",
                format!("unknown function '{}'", other),
            )),
        }
    }
}

/// Why an operation did not complete with `ok`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "kebab-case")]
pub enum ErrorTag {
    /// The database rolled the transaction back
    Rollback(String),
    /// Part of a batch may have been applied
    BatchUpdate(String),
    /// Driver or protocol fault with unclear commit state
    Driver(String),
    /// The connection closed while the transaction was being rolled back
    ConnectionClosed,
    Timeout,
}

impl fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorTag::Rollback(msg) => write!(f, "rollback: {}", msg),
            ErrorTag::BatchUpdate(msg) => write!(f, "batch-update: {}", msg),
            ErrorTag::Driver(msg) => write!(f, "driver: {}", msg),
            ErrorTag::ConnectionClosed => f.write_str("connection-closed"),
            ErrorTag::Timeout => f.write_str("timeout"),
        }
    }
}

/// Sub-key values returned by a read, in reverse index order. `None` is an
/// absent sub-key.
pub type Observation = Vec<Option<String>>;

/// A single history record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Position in the history, assigned by the recorder
    #[serde(default)]
    pub index: u64,
    pub process: u64,
    #[serde(rename = "type")]
    pub op_type: OpType,
    pub f: Function,
    pub key: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Observation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorTag>,
    /// Nanoseconds since the run started, assigned by the recorder
    #[serde(default)]
    pub time: u64,
}

impl Operation {
    pub fn invoke(process: u64, f: Function, key: u64) -> Self {
        Self {
            index: 0,
            process,
            op_type: OpType::Invoke,
            f,
            key,
            value: None,
            error: None,
            time: 0,
        }
    }

    pub fn write(process: u64, key: u64) -> Self {
        Self::invoke(process, Function::Write, key)
    }

    pub fn read(process: u64, key: u64) -> Self {
        Self::invoke(process, Function::Read, key)
    }

    fn complete(&self, op_type: OpType) -> Self {
        Self {
            index: 0,
            process: self.process,
            op_type,
            f: self.f,
            key: self.key,
            value: None,
            error: None,
            time: 0,
        }
    }

    pub fn ok(&self, value: Option<Observation>) -> Self {
        let mut op = self.complete(OpType::Ok);
        op.value = value;
        op
    }

    pub fn fail(&self, error: ErrorTag) -> Self {
        let mut op = self.complete(OpType::Fail);
        op.error = Some(error);
        op
    }

    pub fn info(&self, error: ErrorTag) -> Self {
        let mut op = self.complete(OpType::Info);
        op.error = Some(error);
        op
    }

    pub fn is_ok(&self) -> bool {
        self.op_type == OpType::Ok
    }

    pub fn is_info(&self) -> bool {
        self.op_type == OpType::Info
    }

    pub fn is_read(&self) -> bool {
        self.f == Function::Read
    }
}

/// Number of completions per outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub ok: usize,
    pub fail: usize,
    pub info: usize,
}

/// Ordered, immutable record of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    ops: Vec<Operation>,
}

impl History {
    pub fn new(ops: Vec<Operation>) -> Self {
        Self { ops }
    }

    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.ops.iter()
    }

    /// Completion records only
    pub fn completions(&self) -> impl Iterator<Item = &Operation> {
        self.ops.iter().filter(|op| op.op_type.is_completion())
    }

    /// Confirmed-successful reads
    pub fn ok_reads(&self) -> impl Iterator<Item = &Operation> {
        self.ops.iter().filter(|op| op.is_ok() && op.is_read())
    }

    pub fn outcome_counts(&self) -> OutcomeCounts {
        self.completions()
            .fold(OutcomeCounts::default(), |mut counts, op| {
                match op.op_type {
                    OpType::Ok => counts.ok += 1,
                    OpType::Fail => counts.fail += 1,
                    OpType::Info => counts.info += 1,
                    OpType::Invoke => {}
                }
                counts
            })
    }

    /// Check the per-process pairing invariant.
    ///
    /// Every completion must answer the outstanding invoke of its process, for the
    /// same function and key, and no process may invoke twice without completing.
    /// Invokes still outstanding at the end of the history are allowed; the run may
    /// have been cut short.
    pub fn validate(&self) -> SeqcheckResult<()> {
        let mut outstanding: HashMap<u64, &Operation> = HashMap::new();

        for (position, op) in self.ops.iter().enumerate() {
            let index = position as u64;
            match op.op_type {
                OpType::Invoke => {
                    if let Some(prev) = outstanding.insert(op.process, op) {
                        return Err(SeqcheckError::history_invariant(
                            index,
                            format!(
                                "process {} invoked {} of key {} while {} of key {} was outstanding",
                                op.process, op.f, op.key, prev.f, prev.key
                            ),
                        ));
                    }
                }
                _ => match outstanding.remove(&op.process) {
                    Some(invoke) if invoke.f == op.f && invoke.key == op.key => {}
                    Some(invoke) => {
                        return Err(SeqcheckError::history_invariant(
                            index,
                            format!(
                                "{} of {} key {} does not match invoke of {} key {} on process {}",
                                op.op_type, op.f, op.key, invoke.f, invoke.key, op.process
                            ),
                        ));
                    }
                    None => {
                        return Err(SeqcheckError::history_invariant(
                            index,
                            format!("process {} completed without an invoke", op.process),
                        ));
                    }
                },
            }
        }

        Ok(())
    }

    /// Export to JSON for external analysis
    pub fn to_json(&self) -> SeqcheckResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Import from JSON
    pub fn from_json(json: &str) -> SeqcheckResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl FromIterator<Operation> for History {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
