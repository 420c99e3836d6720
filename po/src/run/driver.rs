//! Run driver task
//!
//! One spawned task per live run. Drives orchestrator cycles, persists
//! execution rows, iteration history and checkpoints between cycles, and
//! observes the handle's pause/stop flags at every cycle boundary.
//! Checkpoints are whole-snapshot and transactional, so a crash leaves
//! either the pre-cycle or the post-cycle blackboard on disk, never a mix.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use planstore::RunStore;
use tracing::{error, info, warn};

use crate::blackboard::Blackboard;
use crate::config::CheckpointConfig;
use crate::events::EventEmitter;
use crate::orchestrator::{CycleReport, Orchestrator, RunOutcome};

use super::handle::{RunErrorInfo, RunHandle, RunStatus};

pub struct RunDriver {
    pub orchestrator: Orchestrator,
    pub board: Blackboard,
    pub store: RunStore,
    pub handle: Arc<RunHandle>,
    pub emitter: EventEmitter,
    pub checkpoint_policy: CheckpointConfig,
    /// (flow prefix, concept) -> iteration rows already persisted
    persisted_history: BTreeMap<(String, String), usize>,
    completed_since_checkpoint: u64,
}

impl RunDriver {
    pub fn new(
        orchestrator: Orchestrator,
        board: Blackboard,
        store: RunStore,
        handle: Arc<RunHandle>,
        emitter: EventEmitter,
        checkpoint_policy: CheckpointConfig,
    ) -> Self {
        Self {
            orchestrator,
            board,
            store,
            handle,
            emitter,
            checkpoint_policy,
            persisted_history: BTreeMap::new(),
            completed_since_checkpoint: 0,
        }
    }

    /// Drive the run to a terminal state, then record it
    pub async fn drive(mut self) {
        let run_id = self.handle.run_id.clone();
        let result = self.drive_inner().await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(%run_id, error = %e, "Run driver error");
                RunOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        self.finish(outcome);
    }

    async fn drive_inner(&mut self) -> eyre::Result<RunOutcome> {
        loop {
            if self.handle.cancel_token().is_cancelled() {
                return Ok(RunOutcome::Cancelled);
            }
            if self.handle.is_paused() {
                self.handle.set_status(RunStatus::Paused);
                self.emitter.run_paused(self.orchestrator.cycle());
                self.save_checkpoint()?;
                while self.handle.is_paused() {
                    if self.handle.cancel_token().is_cancelled() {
                        return Ok(RunOutcome::Cancelled);
                    }
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                self.handle.set_status(RunStatus::Running);
            }

            let report = self.orchestrator.run_cycle(&mut self.board).await?;
            self.handle.set_cycle(report.cycle);
            self.persist_cycle(&report)?;

            if let Some(fatal) = report.executions.iter().find(|e| e.status == "fatal") {
                return Ok(RunOutcome::Failed {
                    reason: fatal.error.clone().unwrap_or_else(|| "fatal execution".into()),
                });
            }
            if let Some(outcome) = self.orchestrator.check_termination(&self.board, &report) {
                return Ok(outcome);
            }
        }
    }

    fn persist_cycle(&mut self, report: &CycleReport) -> eyre::Result<()> {
        for record in &report.executions {
            let exec_id = self.store.record_execution(
                record.cycle,
                &record.flow_index,
                &record.sequence,
                &record.status,
                record.concept_written.as_deref(),
                record.error.as_deref(),
            )?;
            if !record.log.is_null() {
                self.store.append_log(exec_id, &record.log)?;
            }
        }

        let mut new_rows: Vec<(String, String, u64, serde_json::Value)> = Vec::new();
        for ((flow, cid), refs) in self.board.iteration_entries() {
            let seen = self
                .persisted_history
                .get(&(flow.clone(), cid.clone()))
                .copied()
                .unwrap_or(0);
            for (offset, reference) in refs[seen..].iter().enumerate() {
                new_rows.push((flow.clone(), cid.clone(), (seen + offset) as u64, reference.to_canonical()?));
            }
            self.persisted_history.insert((flow.clone(), cid.clone()), refs.len());
        }
        for (flow, cid, iteration, snapshot) in new_rows {
            self.store.record_iteration(&flow, &cid, iteration, &snapshot)?;
        }

        self.completed_since_checkpoint += report.fired as u64;
        if self.checkpoint_policy.due(self.completed_since_checkpoint) {
            self.save_checkpoint()?;
            self.completed_since_checkpoint = 0;
        }
        Ok(())
    }

    fn save_checkpoint(&mut self) -> eyre::Result<()> {
        let snapshot = self.board.snapshot()?;
        let (complete, _) = self.board.counts();
        self.store
            .save_checkpoint(self.orchestrator.cycle(), complete as u64, &snapshot)?;
        Ok(())
    }

    fn finish(&mut self, outcome: RunOutcome) {
        // Terminal checkpoint is always written for forensic resume
        if let Err(e) = self.save_checkpoint() {
            warn!(run_id = %self.handle.run_id, error = %e, "Failed to write terminal checkpoint");
        }

        let status = match &outcome {
            RunOutcome::Completed => RunStatus::Completed,
            RunOutcome::Cancelled => RunStatus::Cancelled,
            _ => RunStatus::Failed,
        };
        if let Err(e) = self.store.set_meta("status", status.tag()) {
            warn!(run_id = %self.handle.run_id, error = %e, "Failed to persist run status");
        }

        match &outcome {
            RunOutcome::Completed => {
                info!(run_id = %self.handle.run_id, cycles = self.orchestrator.cycle(), "Run completed");
                self.emitter.run_completed(self.orchestrator.cycle());
            }
            other => {
                let frontier = match other {
                    RunOutcome::Deadlocked { frontier } => frontier.clone(),
                    _ => Vec::new(),
                };
                self.handle.set_error(RunErrorInfo {
                    kind: other.kind().to_string(),
                    detail: other.detail(),
                    frontier,
                });
                warn!(run_id = %self.handle.run_id, kind = other.kind(), "Run ended without success");
                self.emitter.run_failed(other.kind(), &other.detail());
            }
        }
        self.handle.set_status(status);
    }
}
