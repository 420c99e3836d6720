//! Run event types

use serde::{Deserialize, Serialize};

/// One event on a run's stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    InferenceStarted {
        run_id: String,
        inference: String,
        flow_index: String,
        sequence: String,
        cycle: u64,
    },
    InferenceCompleted {
        run_id: String,
        inference: String,
        flow_index: String,
        concept_written: Option<String>,
        cycle: u64,
    },
    InferenceFailed {
        run_id: String,
        inference: String,
        flow_index: String,
        error: String,
        will_retry: bool,
        cycle: u64,
    },
    CycleCompleted {
        run_id: String,
        cycle: u64,
        fired: usize,
    },
    RunCompleted {
        run_id: String,
        cycles: u64,
    },
    RunFailed {
        run_id: String,
        kind: String,
        detail: String,
    },
    RunPaused {
        run_id: String,
        cycle: u64,
    },
}

impl RunEvent {
    pub fn run_id(&self) -> &str {
        match self {
            RunEvent::InferenceStarted { run_id, .. }
            | RunEvent::InferenceCompleted { run_id, .. }
            | RunEvent::InferenceFailed { run_id, .. }
            | RunEvent::CycleCompleted { run_id, .. }
            | RunEvent::RunCompleted { run_id, .. }
            | RunEvent::RunFailed { run_id, .. }
            | RunEvent::RunPaused { run_id, .. } => run_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            RunEvent::InferenceStarted { .. } => "InferenceStarted",
            RunEvent::InferenceCompleted { .. } => "InferenceCompleted",
            RunEvent::InferenceFailed { .. } => "InferenceFailed",
            RunEvent::CycleCompleted { .. } => "CycleCompleted",
            RunEvent::RunCompleted { .. } => "RunCompleted",
            RunEvent::RunFailed { .. } => "RunFailed",
            RunEvent::RunPaused { .. } => "RunPaused",
        }
    }
}
