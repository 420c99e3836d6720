//! Inference sequences - the per-kind execution pipelines
//!
//! Each sequence is a fixed pipeline of steps (IWI, IR, MFP, MVP, TVA, TIP,
//! MIA, GR, QR, AR, T, OR, OWI - the short tags appear in execution logs).
//! Handlers read the blackboard and the Body but never write state: they
//! return a list of [`Commit`] actions the orchestrator applies serially,
//! which is what keeps blackboard writes single-writer even when independent
//! inferences dispatch in parallel.
//!
//! # Modules
//!
//! - [`simple`] - passthrough copy
//! - [`grouping`] - `&across` / `&in` relation construction
//! - [`looping`] - `*every` iteration driving
//! - [`assigning`] - `$.` `$+` `$-` `$=` `$%` markers
//! - [`timing`] - `@if` / `@if!` gates and `@after` serialization
//! - [`imperative`] - tool-actuated pipeline, shared by judgements

mod assigning;
mod grouping;
mod imperative;
mod looping;
mod simple;
mod steps;
#[cfg(test)]
pub(crate) mod testutil;
mod timing;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use assigning::AssigningHandler;
pub use grouping::GroupingHandler;
pub use imperative::ImperativeHandler;
pub use looping::LoopingHandler;
pub use simple::SimpleHandler;
pub use timing::TimingHandler;

use crate::blackboard::{Blackboard, LoopState, StateError};
use crate::body::{Body, ToolError};
use crate::plan::{FlowIndex, Inference, Plan, SequenceKind};
use crate::reference::{Reference, ReferenceError};

/// Everything a handler may read while executing one inference
pub struct SequenceContext<'a> {
    pub inference: &'a Inference,
    pub plan: &'a Plan,
    pub board: &'a Blackboard,
    pub body: &'a Body,
}

/// One blackboard mutation requested by a handler; applied by the
/// orchestrator in order, under its write serialization.
#[derive(Debug)]
pub enum Commit {
    WriteReference {
        cid: String,
        reference: Reference,
    },
    /// `$=` identity binding: same version, no copy
    AliasReference {
        dst: String,
        src: String,
    },
    /// Timing gate: complete-as-skipped every inference inside the prefix
    SkipSubtree {
        prefix: FlowIndex,
    },
    /// Loop driver: reset body state for the next iteration
    BeginIteration {
        prefix: FlowIndex,
        concepts_to_reset: Vec<String>,
        body_inferences: Vec<String>,
    },
    SetLoopState {
        inference: String,
        state: LoopState,
    },
    PushIterationSnapshot {
        prefix: FlowIndex,
        cid: String,
        reference: Reference,
    },
}

/// Result of a successful handler execution
#[derive(Debug)]
pub struct SequenceOutput {
    pub commits: Vec<Commit>,
    /// Structured step log persisted with the execution row
    pub log: Value,
    /// A yielded inference returns to pending instead of completing
    /// (loops between iterations)
    pub yielded: bool,
}

impl SequenceOutput {
    pub fn complete(commits: Vec<Commit>, log: Value) -> Self {
        Self {
            commits,
            log,
            yielded: false,
        }
    }

    pub fn yielded(commits: Vec<Commit>, log: Value) -> Self {
        Self {
            commits,
            log,
            yielded: true,
        }
    }
}

/// Errors raised while executing a sequence
#[derive(Debug, Error)]
pub enum SequenceError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("Output shape mismatch for {inference}: {detail}")]
    OutputShape { inference: String, detail: String },

    #[error("Working interpretation of {inference} is missing {what}")]
    Interpretation { inference: String, what: String },

    #[error("{inference} dispatched without required input {missing}")]
    Readiness { inference: String, missing: String },
}

impl SequenceError {
    /// Only transient tool failures qualify for the retry policy
    pub fn is_transient(&self) -> bool {
        match self {
            SequenceError::Tool(t) => t.is_transient(),
            _ => false,
        }
    }

    /// Cancellations fail the inference without retry
    pub fn is_cancellation(&self) -> bool {
        matches!(self, SequenceError::Tool(t) if t.is_cancellation())
    }

    /// A readiness violation is an orchestrator bug: fatal for the run
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, SequenceError::Readiness { .. })
    }
}

/// One execution pipeline
#[async_trait]
pub trait SequenceHandler: Send + Sync {
    async fn execute(&self, ctx: &SequenceContext<'_>) -> Result<SequenceOutput, SequenceError>;
}

/// Dispatch table from sequence kind to handler
pub struct SequenceRegistry {
    handlers: HashMap<SequenceKind, Box<dyn SequenceHandler>>,
}

impl SequenceRegistry {
    /// The standard seven pipelines
    pub fn standard() -> Self {
        let mut handlers: HashMap<SequenceKind, Box<dyn SequenceHandler>> = HashMap::new();
        handlers.insert(SequenceKind::Simple, Box::new(SimpleHandler));
        handlers.insert(SequenceKind::Grouping, Box::new(GroupingHandler));
        handlers.insert(SequenceKind::Looping, Box::new(LoopingHandler));
        handlers.insert(SequenceKind::Assigning, Box::new(AssigningHandler));
        handlers.insert(SequenceKind::Timing, Box::new(TimingHandler));
        handlers.insert(SequenceKind::Imperative, Box::new(ImperativeHandler { judgement: false }));
        handlers.insert(SequenceKind::Judgement, Box::new(ImperativeHandler { judgement: true }));
        Self { handlers }
    }

    pub fn get(&self, kind: SequenceKind) -> Option<&dyn SequenceHandler> {
        self.handlers.get(&kind).map(Box::as_ref)
    }
}

impl Default for SequenceRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
