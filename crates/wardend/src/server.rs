//! HTTP server for wardend.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::WardenConfig;
use crate::live::LiveHub;
use crate::orchestrator::Orchestrator;
use crate::retrieval::Retriever;
use crate::routes;
use crate::runbook::Runbook;
use crate::runtime::ContainerRuntime;
use crate::state::SharedRuns;

/// Application state shared across handlers. Constructed once in `main` and
/// injected; there are no process-wide mutable handles.
pub struct AppState {
    pub config: WardenConfig,
    pub registry: SharedRuns,
    pub runbook: Arc<Runbook>,
    pub hub: LiveHub,
    pub orchestrator: Arc<Orchestrator>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub retriever: Retriever,
    pub start_time: Instant,
}

/// Run the HTTP server until the process is stopped.
pub async fn run(state: AppState) -> Result<()> {
    let addr = state.config.listen_addr.clone();
    let state = Arc::new(state);

    let app = Router::new()
        .merge(routes::incident_routes())
        .merge(routes::scale_routes())
        .merge(routes::runbook_routes())
        .merge(routes::runtime_routes())
        .merge(routes::health_routes())
        .merge(routes::live_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("  Listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
