//! PlanOrch - plan orchestrator
//!
//! Executes compiled plans of declarative inferences over a per-run
//! blackboard: a dependency-driven scheduler fires inferences whose inputs
//! are complete, sequences actuate tools through the Body's capability
//! bundle, and every cycle checkpoints durably so runs can be paused,
//! resumed, or forked.
//!
//! # Core Concepts
//!
//! - **Readiness over orchestration scripts**: the plan declares data
//!   dependencies; the scheduler derives execution order each cycle
//! - **State on the blackboard**: concept references and statuses live in
//!   one per-run store, snapshotted whole at cycle boundaries
//! - **Tools behind the Body**: sequences never touch SDKs, files or
//!   subprocesses directly, which is what makes mock-driven runs
//!   deterministic
//! - **Isolated runs**: each hosted run owns its sandbox, SQLite file,
//!   event channel and cancel token
//!
//! # Modules
//!
//! - [`plan`] - immutable concept/inference catalogs and plan packages
//! - [`reference`] - named-axis tensors of typed cell values
//! - [`blackboard`] - per-run runtime state
//! - [`orchestrator`] - readiness rules and the cycle protocol
//! - [`sequences`] - the seven execution pipelines
//! - [`body`] - capability bundle (LLM, fs, prompts, scripts, perception)
//! - [`run`] - run host, handles, drivers over durable state
//! - [`events`] - per-run bounded event stream
//! - [`server`] - REST + WebSocket management surface
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod blackboard;
pub mod body;
pub mod cli;
pub mod config;
pub mod events;
pub mod orchestrator;
pub mod plan;
pub mod reference;
pub mod run;
pub mod sequences;
pub mod server;

// Re-export commonly used types
pub use blackboard::{Blackboard, ConceptStatus, InferenceStatus, LoopState, StateError};
pub use body::{
    Body, BodyBuilder, CancelToken, FnLlmClient, GenerateOptions, HttpLlmClient, InstructionContext, LlmClient,
    MockLlmClient, ParadigmRegistry, ToolError,
};
pub use config::{CheckpointConfig, Config, LlmConfig, ServerConfig, StorageConfig};
pub use events::{EventBus, EventEmitter, RunEvent};
pub use orchestrator::{
    CycleReport, ExecutionRecord, FrontierEntry, Orchestrator, OrchestratorConfig, RetryConfig, RunOutcome,
};
pub use plan::{
    Concept, ConceptRepo, ConceptType, FlowIndex, Inference, InferenceRepo, LoadError, Manifest, Plan, SequenceKind,
    StartFlags, WorkingInterpretation,
};
pub use reference::{Callable, CellValue, PerceptualSign, Reference, ReferenceError, SignNorm};
pub use run::{AgentSpec, RunHandle, RunHost, RunInfo, RunRequest, RunStatus};
pub use sequences::{Commit, SequenceContext, SequenceError, SequenceHandler, SequenceOutput, SequenceRegistry};
