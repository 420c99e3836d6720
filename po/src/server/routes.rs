//! REST handlers

use std::collections::BTreeMap;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::run::RunRequest;

use super::AppState;

pub(crate) fn error_body(status: StatusCode, kind: &str, detail: impl ToString) -> Response {
    (
        status,
        Json(json!({"error": {"kind": kind, "detail": detail.to_string()}})),
    )
        .into_response()
}

pub(crate) fn not_found(what: &str, id: &str) -> Response {
    error_body(StatusCode::NOT_FOUND, "not_found", format!("{what} {id} not found"))
}

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}

// === Plans ===

pub async fn deploy_plan(State(host): State<AppState>, mut multipart: Multipart) -> Response {
    let mut bytes: Option<Vec<u8>> = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => match field.bytes().await {
                Ok(data) => {
                    bytes = Some(data.to_vec());
                    break;
                }
                Err(e) => return error_body(StatusCode::BAD_REQUEST, "bad_upload", e),
            },
            Ok(None) => break,
            Err(e) => return error_body(StatusCode::BAD_REQUEST, "bad_upload", e),
        }
    }
    let Some(bytes) = bytes else {
        return error_body(StatusCode::BAD_REQUEST, "bad_upload", "missing package field");
    };

    match host.deploy_zip(&bytes) {
        Ok(plan_id) => (StatusCode::CREATED, Json(json!({"plan_id": plan_id}))).into_response(),
        Err(e) => {
            warn!(error = %e, "Plan deploy rejected");
            error_body(StatusCode::UNPROCESSABLE_ENTITY, "load_error", e)
        }
    }
}

pub async fn list_plans(State(host): State<AppState>) -> Json<Value> {
    Json(json!({"plans": host.plans()}))
}

pub async fn get_plan(State(host): State<AppState>, Path(id): Path<String>) -> Response {
    match host.plan(&id) {
        Some(plan) => Json(json!({
            "plan_id": id,
            "name": plan.manifest.name,
            "version": plan.manifest.version,
            "description": plan.manifest.description,
            "inputs": plan.manifest.inputs,
            "outputs": plan.manifest.outputs,
            "concepts": plan.concepts.len(),
            "inferences": plan.inferences.len(),
        }))
        .into_response(),
        None => not_found("plan", &id),
    }
}

pub async fn delete_plan(State(host): State<AppState>, Path(id): Path<String>) -> Response {
    if host.delete_plan(&id) {
        Json(json!({"deleted": id})).into_response()
    } else {
        not_found("plan", &id)
    }
}

// === Runs ===

pub async fn start_run(State(host): State<AppState>, Json(request): Json<RunRequest>) -> Response {
    let agents: Vec<String> = request.agents.keys().cloned().collect();
    match host.start_run(request) {
        Ok(handle) => (
            StatusCode::CREATED,
            Json(json!({
                "run_id": handle.run_id,
                "status": "started",
                "agents": agents,
            })),
        )
            .into_response(),
        Err(e) => error_body(StatusCode::UNPROCESSABLE_ENTITY, "start_failed", e),
    }
}

pub async fn list_runs(State(host): State<AppState>) -> Json<Value> {
    Json(json!({"runs": host.list_runs()}))
}

pub async fn get_run(State(host): State<AppState>, Path(id): Path<String>) -> Response {
    match host.run_info(&id) {
        Some(info) => Json(json!(info)).into_response(),
        None => not_found("run", &id),
    }
}

pub async fn run_result(State(host): State<AppState>, Path(id): Path<String>) -> Response {
    match host.run_result(&id) {
        Ok(result) => Json(result).into_response(),
        Err(e) => error_body(StatusCode::NOT_FOUND, "no_result", e),
    }
}

pub async fn run_executions(State(host): State<AppState>, Path(id): Path<String>) -> Response {
    match host.executions(&id) {
        Ok(rows) => {
            let rows: Vec<Value> = rows
                .into_iter()
                .map(|r| {
                    json!({
                        "id": r.id,
                        "cycle": r.cycle,
                        "flow_index": r.flow_index,
                        "sequence": r.sequence,
                        "status": r.status,
                        "concept_written": r.concept_written,
                        "err": r.err,
                        "ts": r.ts,
                    })
                })
                .collect();
            Json(json!({"run_id": id, "executions": rows})).into_response()
        }
        Err(e) => error_body(StatusCode::NOT_FOUND, "no_executions", e),
    }
}

pub async fn pause_run(State(host): State<AppState>, Path(id): Path<String>) -> Response {
    match host.run(&id) {
        Some(handle) if !handle.is_terminal() => {
            handle.pause();
            Json(json!({"run_id": id, "status": "pausing"})).into_response()
        }
        Some(_) => error_body(StatusCode::CONFLICT, "terminal", "run already finished"),
        None => not_found("run", &id),
    }
}

pub async fn resume_live_run(State(host): State<AppState>, Path(id): Path<String>) -> Response {
    match host.run(&id) {
        Some(handle) if handle.is_paused() => {
            handle.unpause();
            Json(json!({"run_id": id, "status": "running"})).into_response()
        }
        Some(_) => error_body(StatusCode::CONFLICT, "not_paused", "run is not paused"),
        None => not_found("run", &id),
    }
}

pub async fn stop_run(State(host): State<AppState>, Path(id): Path<String>) -> Response {
    match host.run(&id) {
        Some(handle) => {
            handle.stop();
            handle.unpause();
            Json(json!({"run_id": id, "status": "stopping"})).into_response()
        }
        None => not_found("run", &id),
    }
}

// === Checkpoints ===

pub async fn list_checkpoints(State(host): State<AppState>, Path(run_id): Path<String>) -> Response {
    match host.checkpoints(&run_id) {
        Ok(rows) => {
            let rows: Vec<Value> = rows
                .into_iter()
                .map(|c| json!({"cycle": c.cycle, "inf_count": c.inf_count, "ts": c.ts}))
                .collect();
            Json(json!({"run_id": run_id, "checkpoints": rows})).into_response()
        }
        Err(e) => error_body(StatusCode::NOT_FOUND, "no_checkpoints", e),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ResumeBody {
    #[serde(default)]
    pub cycle: Option<u64>,
}

pub async fn resume_from_checkpoint(
    State(host): State<AppState>,
    Path(run_id): Path<String>,
    body: Option<Json<ResumeBody>>,
) -> Response {
    let cycle = body.and_then(|b| b.0.cycle);
    match host.resume_run(&run_id, cycle) {
        Ok(handle) => Json(json!({"run_id": handle.run_id, "status": "resumed", "cycle": handle.cycle()})).into_response(),
        Err(e) => error_body(StatusCode::CONFLICT, "resume_failed", e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ForkBody {
    pub cycle: u64,
    #[serde(default)]
    pub new_run_id: Option<String>,
    #[serde(default)]
    pub ground_inputs: BTreeMap<String, Value>,
}

pub async fn fork_run(
    State(host): State<AppState>,
    Path(run_id): Path<String>,
    Json(body): Json<ForkBody>,
) -> Response {
    match host.fork_run(&run_id, body.cycle, body.new_run_id, body.ground_inputs) {
        Ok(handle) => (
            StatusCode::CREATED,
            Json(json!({"run_id": handle.run_id, "forked_from": run_id, "cycle": body.cycle})),
        )
            .into_response(),
        Err(e) => error_body(StatusCode::CONFLICT, "fork_failed", e),
    }
}
