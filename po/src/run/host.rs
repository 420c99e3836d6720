//! Run host
//!
//! Owns the deployed-plan catalog and every hosted run. Each run is fully
//! isolated: its own blackboard, sandbox directory, SQLite file, event bus
//! and cancel token. The only shared state is the read-only plan catalog
//! and the process-wide LLM configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use eyre::{WrapErr, eyre};
use planstore::{RunStore, RunSummary, scan_runs, store_path};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::blackboard::Blackboard;
use crate::body::{Body, BodyBuilder, CancelToken, HttpLlmClient, LlmClient, MockLlmClient, QueuedUserInput};
use crate::config::Config;
use crate::orchestrator::Orchestrator;
use crate::plan::{LoadError, Plan};
use crate::reference::Reference;

use super::driver::RunDriver;
use super::handle::{RunErrorInfo, RunHandle, RunStatus};

/// Tool bindings one agent brings to a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentSpec {
    #[serde(default)]
    pub tools: BTreeMap<String, String>,
}

/// Request to start a run (`POST /api/runs`)
#[derive(Debug, Clone, Deserialize)]
pub struct RunRequest {
    pub plan_id: String,
    #[serde(default)]
    pub run_id: Option<String>,
    pub user_id: String,
    #[serde(default)]
    pub ground_inputs: BTreeMap<String, Value>,
    #[serde(default)]
    pub agents: BTreeMap<String, AgentSpec>,
    /// Pre-seeded answers for the user-input capability
    #[serde(default)]
    pub user_inputs: Vec<String>,
}

/// Summary of one deployed plan
#[derive(Debug, Clone, Serialize)]
pub struct PlanInfo {
    pub plan_id: String,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
}

/// User-visible run summary
#[derive(Debug, Clone, Serialize)]
pub struct RunInfo {
    pub run_id: String,
    pub plan_id: String,
    pub status: String,
    pub cycle: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RunErrorInfo>,
}

/// Hosts many isolated runs over a catalog of deployed plans
pub struct RunHost {
    config: Config,
    plans: RwLock<BTreeMap<String, Arc<Plan>>>,
    runs: RwLock<BTreeMap<String, Arc<RunHandle>>>,
}

impl RunHost {
    pub fn new(config: Config) -> eyre::Result<Self> {
        std::fs::create_dir_all(&config.storage.runs_dir)?;
        std::fs::create_dir_all(&config.storage.plans_dir)?;
        std::fs::create_dir_all(&config.storage.sandboxes_dir)?;
        let host = Self {
            config,
            plans: RwLock::new(BTreeMap::new()),
            runs: RwLock::new(BTreeMap::new()),
        };
        host.reload_deployed_plans();
        Ok(host)
    }

    /// Re-register plans unpacked by earlier deploys (restart survival)
    fn reload_deployed_plans(&self) {
        let Ok(entries) = std::fs::read_dir(&self.config.storage.plans_dir) else {
            return;
        };
        for entry in entries.flatten() {
            let dir = entry.path();
            if !dir.join("manifest.json").exists() {
                continue;
            }
            let plan_id = entry.file_name().to_string_lossy().to_string();
            match Plan::load_dir(&dir) {
                Ok(plan) => {
                    info!(%plan_id, name = %plan.manifest.name, "Reloaded deployed plan");
                    self.plans
                        .write()
                        .unwrap_or_else(|p| p.into_inner())
                        .insert(plan_id, Arc::new(plan));
                }
                Err(e) => {
                    tracing::warn!(%plan_id, error = %e, "Skipping undeployable plan directory");
                }
            }
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // === Plans ===

    /// Deploy a plan package ZIP; rejects bad packages outright
    pub fn deploy_zip(&self, bytes: &[u8]) -> Result<String, LoadError> {
        let plan_id = Uuid::now_v7().to_string();
        let dest = self.config.storage.plans_dir.join(&plan_id);
        let plan = Plan::load_zip(bytes, &dest)?;
        info!(plan_id = %plan_id, name = %plan.manifest.name, "Plan deployed");
        self.plans
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(plan_id.clone(), Arc::new(plan));
        Ok(plan_id)
    }

    /// Register an already-unpacked plan directory (CLI one-shot runs)
    pub fn deploy_dir(&self, dir: &std::path::Path) -> Result<String, LoadError> {
        let plan = Plan::load_dir(dir)?;
        let plan_id = Uuid::now_v7().to_string();
        info!(plan_id = %plan_id, name = %plan.manifest.name, "Plan registered");
        self.plans
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(plan_id.clone(), Arc::new(plan));
        Ok(plan_id)
    }

    pub fn plan(&self, plan_id: &str) -> Option<Arc<Plan>> {
        self.plans
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(plan_id)
            .cloned()
    }

    pub fn plans(&self) -> Vec<PlanInfo> {
        self.plans
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|(plan_id, plan)| PlanInfo {
                plan_id: plan_id.clone(),
                name: plan.manifest.name.clone(),
                version: plan.manifest.version.clone(),
                description: plan.manifest.description.clone(),
            })
            .collect()
    }

    pub fn delete_plan(&self, plan_id: &str) -> bool {
        let removed = self
            .plans
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(plan_id)
            .is_some();
        if removed {
            let _ = std::fs::remove_dir_all(self.config.storage.plans_dir.join(plan_id));
        }
        removed
    }

    // === Runs ===

    /// Start a new run of a deployed plan
    pub fn start_run(&self, request: RunRequest) -> eyre::Result<Arc<RunHandle>> {
        let plan = self
            .plan(&request.plan_id)
            .ok_or_else(|| eyre!("unknown plan {}", request.plan_id))?;
        let run_id = request
            .run_id
            .clone()
            .unwrap_or_else(|| Uuid::now_v7().to_string());
        if self.run(&run_id).is_some() {
            return Err(eyre!("run {run_id} already exists"));
        }

        let path = store_path(&self.config.storage.runs_dir, &run_id);
        let store = RunStore::create(&path, &run_id).wrap_err("creating run store")?;
        store.set_meta("plan_id", &request.plan_id)?;
        store.set_meta("status", RunStatus::Running.tag())?;

        // The tool binding survives with the run so resume/fork rebuild the
        // same Body without the original request
        let llm_tool = self.resolve_llm_tool(&request, &plan);
        store.set_meta("llm_tool", &llm_tool)?;

        let cancel = CancelToken::new();
        let body = self.build_body(&llm_tool, &request.user_inputs, &plan, &run_id, cancel.clone())?;

        let handle = Arc::new(RunHandle::new(
            run_id.clone(),
            request.plan_id.clone(),
            request.user_id.clone(),
            path,
            cancel,
        ));
        let emitter = handle.bus().emitter_for(&run_id);

        let mut orchestrator = Orchestrator::new(
            Arc::clone(&plan),
            body,
            self.config.orchestrator.clone(),
            emitter.clone(),
        );

        // Manifest defaults fill in any ground inputs the request omitted
        let mut inputs = request.ground_inputs.clone();
        for (name, spec) in &plan.manifest.inputs {
            if !inputs.contains_key(name) {
                if let Some(default) = &spec.default {
                    inputs.insert(name.clone(), default.clone());
                }
            }
        }
        let board = orchestrator.seed_blackboard(&inputs)?;

        self.spawn_driver(orchestrator, board, store, Arc::clone(&handle), emitter);
        self.runs
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(run_id, Arc::clone(&handle));
        Ok(handle)
    }

    /// Resume a run from its latest (or a chosen) checkpoint
    pub fn resume_run(&self, run_id: &str, cycle: Option<u64>) -> eyre::Result<Arc<RunHandle>> {
        if let Some(live) = self.run(run_id) {
            if !live.is_terminal() {
                return Err(eyre!("run {run_id} is still live"));
            }
        }

        let path = store_path(&self.config.storage.runs_dir, run_id);
        let store = RunStore::open(&path).wrap_err("opening run store")?;
        let plan_id = store
            .meta("plan_id")?
            .ok_or_else(|| eyre!("run {run_id} has no plan id"))?;
        let plan = self
            .plan(&plan_id)
            .ok_or_else(|| eyre!("plan {plan_id} is not deployed"))?;

        let checkpoint = match cycle {
            Some(cycle) => store.checkpoint_at(cycle)?,
            None => store
                .latest_checkpoint()?
                .ok_or_else(|| eyre!("run {run_id} has no checkpoint"))?,
        };
        let board = Blackboard::restore(&checkpoint.snapshot)?;
        store.set_meta("status", RunStatus::Running.tag())?;

        let llm_tool = store
            .meta("llm_tool")?
            .unwrap_or_else(|| self.config.llm.provider.clone());
        let cancel = CancelToken::new();
        let body = self.build_body(&llm_tool, &[], &plan, run_id, cancel.clone())?;

        let handle = Arc::new(RunHandle::new(
            run_id.to_string(),
            plan_id,
            "resume".to_string(),
            path,
            cancel,
        ));
        handle.set_cycle(checkpoint.cycle);
        let emitter = handle.bus().emitter_for(run_id);

        let mut orchestrator = Orchestrator::new(
            Arc::clone(&plan),
            body,
            self.config.orchestrator.clone(),
            emitter.clone(),
        );
        orchestrator.set_cycle(checkpoint.cycle);

        info!(%run_id, cycle = checkpoint.cycle, "Resuming run from checkpoint");
        self.spawn_driver(orchestrator, board, store, Arc::clone(&handle), emitter);
        self.runs
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(run_id.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Fork a run at a checkpoint into a new, diverging run
    pub fn fork_run(
        &self,
        source_run_id: &str,
        cycle: u64,
        new_run_id: Option<String>,
        ground_overrides: BTreeMap<String, Value>,
    ) -> eyre::Result<Arc<RunHandle>> {
        let source_path = store_path(&self.config.storage.runs_dir, source_run_id);
        let source = RunStore::open(&source_path).wrap_err("opening source run store")?;
        let plan_id = source
            .meta("plan_id")?
            .ok_or_else(|| eyre!("run {source_run_id} has no plan id"))?;
        let plan = self
            .plan(&plan_id)
            .ok_or_else(|| eyre!("plan {plan_id} is not deployed"))?;

        let new_id = new_run_id.unwrap_or_else(|| Uuid::now_v7().to_string());
        if self.run(&new_id).is_some() {
            return Err(eyre!("run {new_id} already exists"));
        }
        let new_path = store_path(&self.config.storage.runs_dir, &new_id);
        let mut forked = source.fork_into(&new_path, cycle, &new_id)?;
        forked.set_meta("plan_id", &plan_id)?;
        forked.set_meta("status", RunStatus::Running.tag())?;

        let checkpoint = forked.checkpoint_at(cycle)?;
        let mut board = Blackboard::restore(&checkpoint.snapshot)?;

        // Divergence point: swapped ground inputs overwrite their concepts
        for (name, value) in &ground_overrides {
            let cid = plan.concepts.resolve(name, "fork override")?;
            let concept = plan
                .concepts
                .get(&cid)
                .ok_or_else(|| eyre!("unknown concept {cid}"))?;
            let reference = Reference::from_nested_json(value, &concept.reference_axis_names)
                .wrap_err_with(|| format!("bad fork override for {name}"))?;
            board.set_reference(&cid, reference, None)?;
        }
        forked.save_checkpoint(cycle, board.counts().0 as u64, &board.snapshot()?)?;

        let llm_tool = source
            .meta("llm_tool")?
            .unwrap_or_else(|| self.config.llm.provider.clone());
        forked.set_meta("llm_tool", &llm_tool)?;
        let cancel = CancelToken::new();
        let body = self.build_body(&llm_tool, &[], &plan, &new_id, cancel.clone())?;

        let handle = Arc::new(RunHandle::new(
            new_id.clone(),
            plan_id,
            "fork".to_string(),
            new_path,
            cancel,
        ));
        handle.set_cycle(cycle);
        let emitter = handle.bus().emitter_for(&new_id);

        let mut orchestrator = Orchestrator::new(
            Arc::clone(&plan),
            body,
            self.config.orchestrator.clone(),
            emitter.clone(),
        );
        orchestrator.set_cycle(cycle);

        info!(source = %source_run_id, fork = %new_id, cycle, "Forked run");
        self.spawn_driver(orchestrator, board, forked, Arc::clone(&handle), emitter);
        self.runs
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(new_id, Arc::clone(&handle));
        Ok(handle)
    }

    fn spawn_driver(
        &self,
        orchestrator: Orchestrator,
        board: Blackboard,
        store: RunStore,
        handle: Arc<RunHandle>,
        emitter: crate::events::EventEmitter,
    ) {
        let driver = RunDriver::new(
            orchestrator,
            board,
            store,
            handle,
            emitter,
            self.config.checkpoint.clone(),
        );
        tokio::spawn(driver.drive());
    }

    fn build_body(
        &self,
        llm_tool: &str,
        user_inputs: &[String],
        plan: &Plan,
        run_id: &str,
        cancel: CancelToken,
    ) -> eyre::Result<Body> {
        let sandbox = self.config.storage.sandboxes_dir.join(run_id);
        std::fs::create_dir_all(&sandbox)?;

        let mut builder = BodyBuilder::new(&sandbox, self.build_llm(llm_tool))
            .with_read_root(&plan.root)
            .with_paradigm_dir(&plan.root.join("provisions").join("paradigms"))
            .with_cancel(cancel)
            .with_call_timeout(Duration::from_millis(self.config.llm.timeout_ms));
        if !user_inputs.is_empty() {
            builder = builder.with_user_input(Arc::new(QueuedUserInput::new(user_inputs.to_vec())));
        }
        Ok(builder.build())
    }

    /// Which llm_tool binding governs this run
    fn resolve_llm_tool(&self, request: &RunRequest, plan: &Plan) -> String {
        let agent = plan
            .manifest
            .default_agent
            .as_ref()
            .and_then(|name| request.agents.get(name))
            .or_else(|| request.agents.values().next());
        agent
            .and_then(|a| a.tools.get("llm_tool"))
            .cloned()
            .unwrap_or_else(|| self.config.llm.provider.clone())
    }

    /// LLM client for a tool binding. `mock` is the deterministic fixture
    /// client; `mock:<needle>=<response>;...` adds substring rules.
    fn build_llm(&self, tool: &str) -> Arc<dyn LlmClient> {
        if let Some(rules) = tool.strip_prefix("mock:") {
            let mut mock = MockLlmClient::new();
            for rule in rules.split(';').filter(|r| !r.is_empty()) {
                if let Some((needle, response)) = rule.split_once('=') {
                    mock = mock.with_rule(needle.trim(), response.trim());
                }
            }
            return Arc::new(mock);
        }
        if tool == "mock" {
            return Arc::new(MockLlmClient::new());
        }
        let api_key = std::env::var(&self.config.llm.api_key_env).unwrap_or_default();
        Arc::new(HttpLlmClient::new(
            self.config.llm.base_url.clone(),
            api_key,
            self.config.llm.model.clone(),
            self.config.llm.max_tokens,
            Duration::from_millis(self.config.llm.timeout_ms),
        ))
    }

    pub fn run(&self, run_id: &str) -> Option<Arc<RunHandle>> {
        self.runs
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(run_id)
            .cloned()
    }

    pub fn run_info(&self, run_id: &str) -> Option<RunInfo> {
        if let Some(handle) = self.run(run_id) {
            return Some(RunInfo {
                run_id: handle.run_id.clone(),
                plan_id: handle.plan_id.clone(),
                status: handle.status().tag().to_string(),
                cycle: Some(handle.cycle()),
                error: handle.error(),
            });
        }
        // Not live: report from disk
        let path = store_path(&self.config.storage.runs_dir, run_id);
        let store = RunStore::open(&path).ok()?;
        let status = store.meta("status").ok()??;
        let cycle = store.latest_checkpoint().ok()?.map(|c| c.cycle);
        Some(RunInfo {
            run_id: run_id.to_string(),
            plan_id: store.meta("plan_id").ok()?.unwrap_or_default(),
            status,
            cycle,
            error: None,
        })
    }

    /// Live runs plus interrupted run files found on disk
    pub fn list_runs(&self) -> Vec<RunInfo> {
        let mut infos: Vec<RunInfo> = Vec::new();
        let live: Vec<String> = {
            let runs = self.runs.read().unwrap_or_else(|p| p.into_inner());
            runs.keys().cloned().collect()
        };
        for run_id in &live {
            if let Some(info) = self.run_info(run_id) {
                infos.push(info);
            }
        }
        if let Ok(summaries) = scan_runs(&self.config.storage.runs_dir) {
            for summary in summaries {
                if live.contains(&summary.run_id) {
                    continue;
                }
                infos.push(RunInfo {
                    run_id: summary.run_id.clone(),
                    plan_id: summary.plan_id.clone().unwrap_or_default(),
                    status: if summary.is_resumable() {
                        "interrupted".to_string()
                    } else {
                        summary.status.clone()
                    },
                    cycle: summary.latest_cycle,
                    error: None,
                });
            }
        }
        infos.sort_by(|a, b| a.run_id.cmp(&b.run_id));
        infos
    }

    /// Recovery scan for interrupted runs
    pub fn scan(&self) -> Vec<RunSummary> {
        scan_runs(&self.config.storage.runs_dir).unwrap_or_default()
    }

    /// Final-concept references plus the manifest output mapping
    pub fn run_result(&self, run_id: &str) -> eyre::Result<Value> {
        let path = store_path(&self.config.storage.runs_dir, run_id);
        let store = RunStore::open(&path)?;
        let plan_id = store.meta("plan_id")?.unwrap_or_default();
        let checkpoint = store
            .latest_checkpoint()?
            .ok_or_else(|| eyre!("run {run_id} has no checkpoint"))?;
        let board = Blackboard::restore(&checkpoint.snapshot)?;

        let mut finals = serde_json::Map::new();
        let mut outputs = serde_json::Map::new();
        if let Some(plan) = self.plan(&plan_id) {
            for concept in plan.concepts.iter() {
                if concept.is_final_concept && board.concept_complete(&concept.id) {
                    finals.insert(
                        concept.concept_name.clone(),
                        board.get_reference(&concept.id)?.to_nested_json()?,
                    );
                }
            }
            for name in plan.manifest.outputs.keys() {
                if let Ok(cid) = plan.concepts.resolve(name, "result mapping") {
                    if board.concept_complete(&cid) {
                        outputs.insert(name.clone(), board.get_reference(&cid)?.to_nested_json()?);
                    }
                }
            }
        }
        Ok(serde_json::json!({
            "run_id": run_id,
            "cycle": checkpoint.cycle,
            "finals": finals,
            "outputs": outputs,
        }))
    }

    /// Execution log rows for a run
    pub fn executions(&self, run_id: &str) -> eyre::Result<Vec<planstore::ExecutionRow>> {
        let path = store_path(&self.config.storage.runs_dir, run_id);
        let store = RunStore::open(&path)?;
        Ok(store.executions()?)
    }

    /// Checkpoint rows for a run
    pub fn checkpoints(&self, run_id: &str) -> eyre::Result<Vec<planstore::CheckpointRow>> {
        let path = store_path(&self.config.storage.runs_dir, run_id);
        let store = RunStore::open(&path)?;
        Ok(store.checkpoints()?)
    }

    /// Pause every live run (graceful shutdown)
    pub fn pause_all(&self) {
        let runs = self.runs.read().unwrap_or_else(|p| p.into_inner());
        for handle in runs.values() {
            if !handle.is_terminal() {
                handle.pause();
            }
        }
    }
}
