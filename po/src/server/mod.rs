//! HTTP management surface
//!
//! REST endpoints for deploying plans, starting and controlling runs, and
//! inspecting checkpoints, plus a WebSocket event stream per run. The
//! server owns nothing: every operation delegates to the [`RunHost`].

mod routes;
mod ws;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use eyre::{Context, Result};
use tracing::info;

use crate::run::RunHost;

/// Shared state for all handlers
pub type AppState = Arc<RunHost>;

/// Assemble the full router over a host
pub fn router(host: AppState) -> Router {
    Router::new()
        .route("/api/plans/deploy", post(routes::deploy_plan))
        .route("/api/plans", get(routes::list_plans))
        .route("/api/plans/{id}", get(routes::get_plan).delete(routes::delete_plan))
        .route("/api/runs", post(routes::start_run).get(routes::list_runs))
        .route("/api/runs/{id}", get(routes::get_run))
        .route("/api/runs/{id}/result", get(routes::run_result))
        .route("/api/runs/{id}/executions", get(routes::run_executions))
        .route("/api/runs/{id}/pause", post(routes::pause_run))
        .route("/api/runs/{id}/resume", post(routes::resume_live_run))
        .route("/api/runs/{id}/stop", post(routes::stop_run))
        .route("/api/checkpoints/{run_id}", get(routes::list_checkpoints))
        .route("/api/checkpoints/{run_id}/resume", post(routes::resume_from_checkpoint))
        .route("/api/checkpoints/{run_id}/fork", post(routes::fork_run))
        .route("/ws/runs/{id}", get(ws::run_events))
        .route("/api/health", get(routes::health))
        .with_state(host)
}

/// Bind and serve until ctrl-c; live runs are paused (checkpointing) first
pub async fn serve(host: AppState) -> Result<()> {
    let addr = format!("{}:{}", host.config().server.host, host.config().server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context(format!("binding {addr}"))?;
    info!(%addr, "Server listening");

    let shutdown_host = Arc::clone(&host);
    let app = router(host);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested, pausing live runs");
            shutdown_host.pause_all();
            // Give drivers a cycle boundary to checkpoint
            tokio::time::sleep(std::time::Duration::from_millis(750)).await;
        })
        .await
        .context("server error")?;
    Ok(())
}

pub(crate) use routes::not_found;
