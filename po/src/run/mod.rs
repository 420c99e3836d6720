//! Run host: per-run lifecycle over durable state
//!
//! - [`host`] - the catalog of deployed plans and live runs
//! - [`handle`] - shared per-run state (status, pause, cancel, events)
//! - [`driver`] - the spawned task driving cycles and persisting checkpoints

mod driver;
mod handle;
mod host;

pub use driver::RunDriver;
pub use handle::{RunErrorInfo, RunHandle, RunStatus};
pub use host::{AgentSpec, PlanInfo, RunHost, RunInfo, RunRequest};
