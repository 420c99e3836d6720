//! Orchestrator cycle driver
//!
//! Each cycle snapshots readiness, fires every ready inference in waitlist
//! order (bounded parallel dispatch for disjoint writers), applies the
//! resulting commits serially, then checks termination. Two inferences that
//! are both ready always settle in flow-index order, which is what makes the
//! execution log deterministic under a fixed Body.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use eyre::{WrapErr, eyre};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::blackboard::{Blackboard, InferenceStatus};
use crate::body::Body;
use crate::events::EventEmitter;
use crate::plan::{Inference, Plan};
use crate::reference::{CellValue, Reference};
use crate::sequences::{Commit, SequenceContext, SequenceError, SequenceOutput, SequenceRegistry};

use super::config::OrchestratorConfig;
use super::readiness::{is_ready, missing_inputs};

/// One blocked inference in a deadlock report
#[derive(Debug, Clone, serde::Serialize)]
pub struct FrontierEntry {
    pub flow_index: String,
    pub inference: String,
    pub missing: Vec<String>,
}

/// Terminal state of a run
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed,
    Deadlocked { frontier: Vec<FrontierEntry> },
    BudgetExhausted { cycles: u64 },
    Cancelled,
    Failed { reason: String },
}

impl RunOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Deadlocked { .. } => "deadlock",
            RunOutcome::BudgetExhausted { .. } => "budget_exhausted",
            RunOutcome::Cancelled => "cancelled",
            RunOutcome::Failed { .. } => "failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }

    pub fn detail(&self) -> String {
        match self {
            RunOutcome::Completed => "all final concepts complete".to_string(),
            RunOutcome::Deadlocked { frontier } => {
                let blocked: Vec<String> = frontier
                    .iter()
                    .map(|f| format!("{} missing {:?}", f.flow_index, f.missing))
                    .collect();
                format!("no inference can fire; frontier: {}", blocked.join("; "))
            }
            RunOutcome::BudgetExhausted { cycles } => format!("cycle budget exhausted after {cycles} cycles"),
            RunOutcome::Cancelled => "cancelled".to_string(),
            RunOutcome::Failed { reason } => reason.clone(),
        }
    }
}

/// One dispatched (or skipped) inference, as persisted to the execution log
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub inference: String,
    pub flow_index: String,
    pub sequence: String,
    /// complete | yielded | skipped | failed | fatal
    pub status: String,
    pub concept_written: Option<String>,
    pub error: Option<String>,
    pub cycle: u64,
    pub log: Value,
}

/// Summary of one cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub fired: usize,
    pub transitions: usize,
    pub executions: Vec<ExecutionRecord>,
}

/// Drives one run's plan to completion over its blackboard
pub struct Orchestrator {
    plan: Arc<Plan>,
    body: Body,
    registry: SequenceRegistry,
    config: OrchestratorConfig,
    emitter: EventEmitter,
    cycle: u64,
}

impl Orchestrator {
    pub fn new(plan: Arc<Plan>, body: Body, config: OrchestratorConfig, emitter: EventEmitter) -> Self {
        Self {
            plan,
            body,
            registry: SequenceRegistry::standard(),
            config,
            emitter,
            cycle: 0,
        }
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Resume bookkeeping after a checkpoint restore
    pub fn set_cycle(&mut self, cycle: u64) {
        self.cycle = cycle;
    }

    /// Construct the run's blackboard: ground concepts (overridden or
    /// augmented by the request's ground inputs) start complete.
    pub fn seed_blackboard(&self, ground_inputs: &BTreeMap<String, Value>) -> eyre::Result<Blackboard> {
        let mut board = Blackboard::new();
        for concept in self.plan.concepts.iter() {
            let supplied = ground_inputs
                .get(&concept.id)
                .or_else(|| ground_inputs.get(&concept.concept_name));
            let ground = match supplied {
                Some(value) => Some(
                    Reference::from_nested_json(value, &concept.reference_axis_names)
                        .wrap_err_with(|| format!("bad ground input for concept {}", concept.id))?,
                ),
                None if concept.is_ground_concept => Some(
                    concept
                        .initial_reference()
                        .wrap_err_with(|| format!("bad seeded reference for concept {}", concept.id))?,
                ),
                None => None,
            };
            board.register_concept(&concept.id, ground);
        }
        for inference in self.plan.inferences.iter_flow_order() {
            board.register_inference(&inference.id);
        }
        Ok(board)
    }

    /// Run one cycle: fire everything ready at cycle start, in flow order
    pub async fn run_cycle(&mut self, board: &mut Blackboard) -> eyre::Result<CycleReport> {
        self.cycle += 1;
        let cycle = self.cycle;

        // 1. Snapshot readiness against cycle-start statuses
        let ready: Vec<String> = self
            .plan
            .inferences
            .iter_flow_order()
            .filter(|inf| is_ready(inf, board, &self.plan))
            .map(|inf| inf.id.clone())
            .collect();
        debug!(cycle, ready = ready.len(), "Cycle start");

        let mut executions: Vec<ExecutionRecord> = Vec::new();
        let mut queue: VecDeque<String> = ready.into();

        // 2. Dispatch in batches of disjoint writers, bounded by the pool
        while !queue.is_empty() {
            let mut batch: Vec<&Inference> = Vec::new();
            let mut writers: HashSet<&str> = HashSet::new();
            let mut deferred: VecDeque<String> = VecDeque::new();

            while batch.len() < self.config.workers.max(1) {
                let Some(id) = queue.pop_front() else { break };
                let Some(inference) = self.plan.inferences.get(&id) else {
                    continue;
                };
                // An earlier batch may have skipped or completed this one
                if board.inference_status(&id) != Some(InferenceStatus::Pending)
                    || !is_ready(inference, board, &self.plan)
                {
                    continue;
                }
                if writers.insert(inference.concept_to_infer.as_str()) {
                    batch.push(inference);
                } else {
                    deferred.push_back(id);
                }
            }
            for id in deferred.into_iter().rev() {
                queue.push_front(id);
            }
            if batch.is_empty() {
                break;
            }

            // Phase A: admit (status, support edges, start-flag bookkeeping)
            let mut jobs = Vec::with_capacity(batch.len());
            for inference in batch {
                let handler = self
                    .registry
                    .get(inference.sequence)
                    .ok_or_else(|| eyre!("no handler for sequence {}", inference.sequence))?;
                self.admit(board, inference, cycle)?;
                jobs.push((inference, handler));
            }

            // Phase B: execute concurrently; handlers only read
            let board_view: &Blackboard = &*board;
            let futures = jobs.iter().map(|&(inference, handler)| {
                let ctx = SequenceContext {
                    inference,
                    plan: &self.plan,
                    board: board_view,
                    body: &self.body,
                };
                async move { handler.execute(&ctx).await.map_err(SettleInput::from_err) }
            });
            let results = futures::future::join_all(futures).await;

            // Phase C: settle serially in flow order
            for ((inference, _), result) in jobs.into_iter().zip(results) {
                let records = self.settle(board, inference, result, cycle).await?;
                executions.extend(records);
            }
        }

        let fired = executions.iter().filter(|e| e.status != "skipped").count();
        let transitions = executions.len();
        self.emitter.cycle_completed(cycle, fired);
        Ok(CycleReport {
            cycle,
            fired,
            transitions,
            executions,
        })
    }

    fn admit(&self, board: &mut Blackboard, inference: &Inference, cycle: u64) -> eyre::Result<()> {
        board.mark_inference(&inference.id, InferenceStatus::InProgress)?;
        for cid in inference.input_concepts() {
            if let Some(version) = board.version_of(cid) {
                board.record_support(&inference.id, cid, version);
            }
        }

        let flags = &inference.start_flags;
        let values_incomplete = inference.value_concepts.iter().any(|c| !board.concept_complete(c));
        let function_incomplete = inference
            .function_concept
            .as_deref()
            .map(|f| !board.concept_complete(f))
            .unwrap_or(false);
        if (flags.start_without_value_only_once && values_incomplete)
            || (flags.start_without_function_only_once && function_incomplete)
        {
            board.note_fired_once(&inference.id);
        }
        board.note_fired(&inference.id);

        self.emitter.inference_started(
            &inference.id,
            &inference.flow_index.to_string(),
            inference.sequence.tag(),
            cycle,
        );
        Ok(())
    }

    async fn settle(
        &self,
        board: &mut Blackboard,
        inference: &Inference,
        result: Result<SequenceOutput, SettleInput>,
        cycle: u64,
    ) -> eyre::Result<Vec<ExecutionRecord>> {
        let flow = inference.flow_index.to_string();
        let mut records = Vec::new();

        match result {
            Ok(output) => {
                let skipped = self.apply_commits(board, inference, output.commits, cycle)?;

                if output.yielded {
                    board.mark_inference(&inference.id, InferenceStatus::Pending)?;
                    records.push(ExecutionRecord {
                        inference: inference.id.clone(),
                        flow_index: flow,
                        sequence: inference.sequence.tag().to_string(),
                        status: "yielded".to_string(),
                        concept_written: None,
                        error: None,
                        cycle,
                        log: output.log,
                    });
                } else if !board.concept_complete(&inference.concept_to_infer) {
                    // Output contract: a completing handler must have written
                    board.mark_inference(&inference.id, InferenceStatus::Failed)?;
                    let error = format!(
                        "sequence completed without writing {} (shape mismatch)",
                        inference.concept_to_infer
                    );
                    warn!(inference = %inference.id, %error, "Output contract violated");
                    self.emitter.inference_failed(&inference.id, &flow, &error, false, cycle);
                    records.push(ExecutionRecord {
                        inference: inference.id.clone(),
                        flow_index: flow,
                        sequence: inference.sequence.tag().to_string(),
                        status: "failed".to_string(),
                        concept_written: None,
                        error: Some(error),
                        cycle,
                        log: output.log,
                    });
                } else {
                    board.mark_inference(&inference.id, InferenceStatus::Complete)?;
                    self.emitter.inference_completed(
                        &inference.id,
                        &flow,
                        Some(&inference.concept_to_infer),
                        cycle,
                    );
                    records.push(ExecutionRecord {
                        inference: inference.id.clone(),
                        flow_index: flow,
                        sequence: inference.sequence.tag().to_string(),
                        status: "complete".to_string(),
                        concept_written: Some(inference.concept_to_infer.clone()),
                        error: None,
                        cycle,
                        log: output.log,
                    });
                }
                records.extend(skipped);
            }
            Err(SettleInput { error }) => {
                board.mark_inference(&inference.id, InferenceStatus::Failed)?;
                let detail = error.to_string();

                if error.is_fatal_for_run() {
                    self.emitter.inference_failed(&inference.id, &flow, &detail, false, cycle);
                    records.push(ExecutionRecord {
                        inference: inference.id.clone(),
                        flow_index: flow,
                        sequence: inference.sequence.tag().to_string(),
                        status: "fatal".to_string(),
                        concept_written: None,
                        error: Some(detail),
                        cycle,
                        log: Value::Null,
                    });
                    return Ok(records);
                }

                let will_retry = !error.is_cancellation()
                    && error.is_transient()
                    && board.retry_count(&inference.id) < self.config.retry.attempts;
                if will_retry {
                    let attempt = board.bump_retry(&inference.id);
                    let delay = self.config.retry.backoff(attempt);
                    warn!(inference = %inference.id, attempt, ?delay, %detail, "Transient failure, retrying");
                    tokio::time::sleep(delay).await;
                    board.mark_inference(&inference.id, InferenceStatus::Pending)?;
                } else {
                    warn!(inference = %inference.id, %detail, "Inference failed");
                }

                self.emitter
                    .inference_failed(&inference.id, &flow, &detail, will_retry, cycle);
                records.push(ExecutionRecord {
                    inference: inference.id.clone(),
                    flow_index: flow,
                    sequence: inference.sequence.tag().to_string(),
                    status: "failed".to_string(),
                    concept_written: None,
                    error: Some(detail),
                    cycle,
                    log: Value::Null,
                });
            }
        }
        Ok(records)
    }

    /// Apply a handler's commits; returns records for any skipped subtree
    fn apply_commits(
        &self,
        board: &mut Blackboard,
        inference: &Inference,
        commits: Vec<Commit>,
        cycle: u64,
    ) -> eyre::Result<Vec<ExecutionRecord>> {
        let mut skipped_records = Vec::new();
        for commit in commits {
            match commit {
                Commit::WriteReference { cid, reference } => {
                    board.set_reference(&cid, reference, Some(&inference.id))?;
                }
                Commit::AliasReference { dst, src } => {
                    board.alias_reference(&dst, &src)?;
                }
                Commit::SkipSubtree { prefix } => {
                    for gated in self.plan.inferences.in_subtree(&prefix) {
                        if board.inference_status(&gated.id) == Some(InferenceStatus::Complete) {
                            continue;
                        }
                        board.skip_inference(&gated.id)?;
                        if !board.concept_complete(&gated.concept_to_infer) {
                            board.set_reference(
                                &gated.concept_to_infer,
                                Reference::singleton(CellValue::null()),
                                Some(&gated.id),
                            )?;
                        }
                        debug!(inference = %gated.id, gate = %inference.id, "Skipped by timing gate");
                        skipped_records.push(ExecutionRecord {
                            inference: gated.id.clone(),
                            flow_index: gated.flow_index.to_string(),
                            sequence: gated.sequence.tag().to_string(),
                            status: "skipped".to_string(),
                            concept_written: Some(gated.concept_to_infer.clone()),
                            error: None,
                            cycle,
                            log: serde_json::json!({"skipped_by": inference.id}),
                        });
                    }
                }
                Commit::BeginIteration {
                    prefix,
                    concepts_to_reset,
                    body_inferences,
                } => {
                    board.begin_iteration(&prefix, &concepts_to_reset, &body_inferences);
                }
                Commit::SetLoopState { inference, state } => {
                    board.set_loop_state(&inference, state);
                }
                Commit::PushIterationSnapshot { prefix, cid, reference } => {
                    board.push_iteration_snapshot(&prefix, &cid, reference);
                }
            }
        }
        Ok(skipped_records)
    }

    /// Termination per the cycle protocol: success, budget, then deadlock
    pub fn check_termination(&self, board: &Blackboard, report: &CycleReport) -> Option<RunOutcome> {
        if self.body.cancel.is_cancelled() {
            return Some(RunOutcome::Cancelled);
        }

        let finals: Vec<&str> = self
            .plan
            .concepts
            .iter()
            .filter(|c| c.is_final_concept)
            .map(|c| c.id.as_str())
            .collect();
        let finals_complete = finals.iter().all(|cid| board.concept_complete(cid));
        let (complete, total) = board.counts();

        if finals_complete && (!finals.is_empty() || complete == total) {
            return Some(RunOutcome::Completed);
        }
        if self.cycle >= self.config.max_cycles {
            return Some(RunOutcome::BudgetExhausted { cycles: self.cycle });
        }
        if report.transitions == 0 {
            let frontier: Vec<FrontierEntry> = self
                .plan
                .inferences
                .iter_flow_order()
                .filter(|inf| board.inference_status(&inf.id) == Some(InferenceStatus::Pending))
                .map(|inf| FrontierEntry {
                    flow_index: inf.flow_index.to_string(),
                    inference: inf.id.clone(),
                    missing: missing_inputs(inf, board, &self.plan),
                })
                .collect();
            return Some(RunOutcome::Deadlocked { frontier });
        }
        None
    }

    /// Drive cycles until a terminal outcome (tests, one-shot CLI runs)
    pub async fn run_to_completion(
        &mut self,
        board: &mut Blackboard,
    ) -> eyre::Result<(RunOutcome, Vec<ExecutionRecord>)> {
        let mut all_executions = Vec::new();
        loop {
            let report = self.run_cycle(board).await?;
            all_executions.extend(report.executions.iter().cloned());

            if let Some(fatal) = report.executions.iter().find(|e| e.status == "fatal") {
                let outcome = RunOutcome::Failed {
                    reason: fatal.error.clone().unwrap_or_else(|| "fatal execution".into()),
                };
                self.emitter.run_failed(outcome.kind(), &outcome.detail());
                return Ok((outcome, all_executions));
            }

            if let Some(outcome) = self.check_termination(board, &report) {
                match &outcome {
                    RunOutcome::Completed => {
                        info!(cycles = self.cycle, "Run completed");
                        self.emitter.run_completed(self.cycle);
                    }
                    other => {
                        warn!(kind = other.kind(), "Run ended without success");
                        self.emitter.run_failed(other.kind(), &other.detail());
                    }
                }
                return Ok((outcome, all_executions));
            }
        }
    }
}

/// Carrier for handler errors through the join boundary
struct SettleInput {
    error: SequenceError,
}

impl SettleInput {
    fn from_err(error: SequenceError) -> Self {
        Self { error }
    }
}
