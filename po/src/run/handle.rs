//! Per-run handle
//!
//! Cheap shared view of a live (or finished) run: status, pause flag,
//! cancel token, event bus and the store path. The driver task owns the
//! blackboard; everything else goes through this handle.

use std::path::PathBuf;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::body::CancelToken;
use crate::events::{EventBus, RunEvent};
use crate::orchestrator::FrontierEntry;

/// Lifecycle of a hosted run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn tag(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

/// User-visible failure description
#[derive(Debug, Clone, Serialize)]
pub struct RunErrorInfo {
    pub kind: String,
    pub detail: String,
    pub frontier: Vec<FrontierEntry>,
}

/// Shared state of one hosted run
pub struct RunHandle {
    pub run_id: String,
    pub plan_id: String,
    pub user_id: String,
    pub store_path: PathBuf,
    bus: EventBus,
    cancel: CancelToken,
    paused: AtomicBool,
    cycle: AtomicU64,
    status: RwLock<RunStatus>,
    error: RwLock<Option<RunErrorInfo>>,
}

impl RunHandle {
    pub fn new(
        run_id: String,
        plan_id: String,
        user_id: String,
        store_path: PathBuf,
        cancel: CancelToken,
    ) -> Self {
        Self {
            run_id,
            plan_id,
            user_id,
            store_path,
            bus: EventBus::with_default_capacity(),
            cancel,
            paused: AtomicBool::new(false),
            cycle: AtomicU64::new(0),
            status: RwLock::new(RunStatus::Running),
            error: RwLock::new(None),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.bus.subscribe()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn status(&self) -> RunStatus {
        *self.status.read().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_status(&self, status: RunStatus) {
        *self.status.write().unwrap_or_else(|p| p.into_inner()) = status;
    }

    pub fn error(&self) -> Option<RunErrorInfo> {
        self.error.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn set_error(&self, error: RunErrorInfo) {
        *self.error.write().unwrap_or_else(|p| p.into_inner()) = Some(error);
    }

    pub fn cycle(&self) -> u64 {
        self.cycle.load(Ordering::SeqCst)
    }

    pub fn set_cycle(&self, cycle: u64) {
        self.cycle.store(cycle, Ordering::SeqCst);
    }

    /// Cooperative pause: observed at the next cycle boundary
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn unpause(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Stop the run: fires the cancel token every Body call observes
    pub fn stop(&self) {
        self.cancel.fire();
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status(),
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}
