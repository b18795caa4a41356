//! Warden Daemon - autonomous incident remediation.
//!
//! Receives alerts, diagnoses them with precedent-augmented LLM analysis,
//! gates remediation behind a council vote, executes against the container
//! runtime, verifies recovery, and learns from every resolved incident.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wardend::config::{WardenConfig, CONFIG_PATH};
use wardend::live::LiveHub;
use wardend::llm::HttpModelBackend;
use wardend::notifier::Notifier;
use wardend::orchestrator::Orchestrator;
use wardend::retrieval::Retriever;
use wardend::runbook::Runbook;
use wardend::runtime::DockerCli;
use wardend::server::{self, AppState};
use wardend::state::create_shared_runs;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Warden Daemon v{} starting", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::var("WARDEN_CONFIG").unwrap_or_else(|_| CONFIG_PATH.to_string());
    let config = WardenConfig::load(Path::new(&config_path))?;

    let registry = create_shared_runs();
    let runbook = Arc::new(Runbook::new(&config.runbook_path));
    let hub = LiveHub::new();
    let backend = Arc::new(HttpModelBackend::new(&config.model));
    let runtime = Arc::new(DockerCli::new(&config.runtime));
    let notifier = Arc::new(Notifier::new(&config.notify_webhook_url));
    let retriever = Retriever::new(config.retrieval.top_k, config.retrieval.min_similarity);

    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        Arc::clone(&registry),
        Arc::clone(&runbook),
        hub.clone(),
        backend,
        runtime.clone(),
        notifier,
    ));

    info!(
        "Watching workload '{}', runbook at {}",
        config.runtime.target_workload, config.runbook_path
    );

    let state = AppState {
        config,
        registry,
        runbook,
        hub,
        orchestrator,
        runtime,
        retriever,
        start_time: Instant::now(),
    };

    server::run(state).await
}
