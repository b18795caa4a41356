//! API routes for wardend.
//!
//! Ingress returns the initial run synchronously and schedules remediation
//! detached; status queries read whatever state the run has reached so far.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use warden_common::{
    ContainerInfo, DaemonHealthResponse, IncidentSignal, LiveFrameKind, ManualScaleRequest,
    RetrievalTestResponse, RunResult, RunbookResponse, ScaleDirection, ScaleDownResponse,
    ScaleOutcome, VERSION,
};

use crate::server::AppState;

type AppStateArc = Arc<AppState>;

// ============================================================================
// Incident Routes
// ============================================================================

pub fn incident_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/incident", post(submit_incident))
        .route("/v1/incident/:id", get(get_incident))
        .route("/v1/incidents", get(list_incidents))
}

async fn submit_incident(
    State(state): State<AppStateArc>,
    Json(mut signal): Json<IncidentSignal>,
) -> Result<Json<RunResult>, (StatusCode, String)> {
    if signal.alert_type.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "alert_type is required".to_string()));
    }

    let run = state.orchestrator.ingest(&mut signal).await;
    state.orchestrator.spawn_run(signal);
    Ok(Json(run))
}

async fn get_incident(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
) -> Result<Json<RunResult>, (StatusCode, String)> {
    state
        .registry
        .read()
        .await
        .get(&id)
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Incident not found.".to_string()))
}

async fn list_incidents(State(state): State<AppStateArc>) -> Json<Vec<RunResult>> {
    Json(state.registry.read().await.list())
}

// ============================================================================
// Manual Scaling Routes
// ============================================================================

pub fn scale_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/scale", post(manual_scale))
}

/// Operator-triggered scaling. Bypasses diagnosis and council entirely.
async fn manual_scale(
    State(state): State<AppStateArc>,
    Json(req): Json<ManualScaleRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let base = state.config.runtime.target_workload.clone();

    match req.direction {
        ScaleDirection::Up => {
            let count = req.count.min(state.config.runtime.max_replicas);
            info!("Manual scale up: {} replicas of '{}'", count, base);
            let replicas = state
                .runtime
                .scale_to(&base, count)
                .await
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))?;
            let routing_updated = state
                .runtime
                .reconfigure_routing(&base, &replicas)
                .await
                .unwrap_or(false);

            let outcome = ScaleOutcome {
                base,
                requested: count,
                replicas,
                routing_updated,
                timestamp: chrono::Utc::now(),
            };
            state
                .hub
                .emit(LiveFrameKind::ScaleEvent, json!(outcome), None);
            Ok(Json(json!(outcome)))
        }
        ScaleDirection::Down => {
            info!("Manual scale down of '{}'", base);
            let removed = state
                .runtime
                .scale_down(&base)
                .await
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))?;
            let _ = state.runtime.reconfigure_routing(&base, &[]).await;
            Ok(Json(json!(ScaleDownResponse { removed })))
        }
    }
}

// ============================================================================
// Runbook & Retrieval Routes
// ============================================================================

pub fn runbook_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/runbook", get(dump_runbook))
        .route("/v1/retrieval/test", get(test_retrieval))
}

async fn dump_runbook(State(state): State<AppStateArc>) -> Json<RunbookResponse> {
    let entries = state.runbook.load();
    let total = entries.len();
    Json(RunbookResponse { entries, total })
}

#[derive(Debug, Deserialize)]
struct RetrievalTestQuery {
    #[serde(default = "default_test_query")]
    query: String,
}

fn default_test_query() -> String {
    "CPU usage at 98% infinite loop".to_string()
}

/// Run the similarity retriever against arbitrary text, for offline
/// inspection of what a diagnosis would see.
async fn test_retrieval(
    State(state): State<AppStateArc>,
    Query(params): Query<RetrievalTestQuery>,
) -> Json<RetrievalTestResponse> {
    let corpus = state.runbook.load();
    let matches = state.retriever.retrieve(&params.query, &corpus);
    let count = matches.len();
    Json(RetrievalTestResponse {
        query: params.query,
        matches,
        count,
    })
}

// ============================================================================
// Runtime Routes
// ============================================================================

pub fn runtime_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/containers", get(list_containers))
        .route("/v1/containers/:name/logs", get(container_logs))
}

async fn list_containers(
    State(state): State<AppStateArc>,
) -> Result<Json<Vec<ContainerInfo>>, (StatusCode, String)> {
    state
        .runtime
        .list_running()
        .await
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    #[serde(default = "default_log_tail")]
    tail: u32,
}

fn default_log_tail() -> u32 {
    50
}

async fn container_logs(
    State(state): State<AppStateArc>,
    Path(name): Path<String>,
    Query(params): Query<LogsQuery>,
) -> Result<String, (StatusCode, String)> {
    state
        .runtime
        .get_logs(&name, params.tail)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))
}

// ============================================================================
// Health Routes
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/health", get(daemon_health))
}

async fn daemon_health(State(state): State<AppStateArc>) -> Json<DaemonHealthResponse> {
    Json(DaemonHealthResponse {
        status: "ok".to_string(),
        version: VERSION.to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        live_clients: state.hub.client_count(),
        runs_tracked: state.registry.read().await.len(),
    })
}

// ============================================================================
// Live Channel Routes
// ============================================================================

pub fn live_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/ws", get(live_channel))
}

async fn live_channel(State(state): State<AppStateArc>, ws: WebSocketUpgrade) -> Response {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| async move { hub.run_client(socket).await })
}
