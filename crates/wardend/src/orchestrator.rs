//! The remediation pipeline: one detached run per incident.
//!
//! Stages inside a run are strictly sequential - retrieval, diagnosis,
//! council, execution, verification, learning - while runs for distinct
//! incidents interleave freely. Ingress never waits on a run; it records the
//! incident and schedules the pipeline on its own task.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;
use warden_common::{
    ActionKind, CouncilDecision, CouncilVerdict, Diagnosis, IncidentSignal, LiveFrameKind,
    Precedent, RunResult, RunStatus,
};

use crate::config::WardenConfig;
use crate::council;
use crate::diagnosis::DiagnosisAgent;
use crate::errors::PipelineError;
use crate::executor;
use crate::live::LiveHub;
use crate::llm::ModelBackend;
use crate::notifier::Notifier;
use crate::runbook::Runbook;
use crate::runtime::ContainerRuntime;
use crate::state::SharedRuns;
use crate::verify;

pub struct Orchestrator {
    config: WardenConfig,
    registry: SharedRuns,
    runbook: Arc<Runbook>,
    hub: LiveHub,
    backend: Arc<dyn ModelBackend>,
    runtime: Arc<dyn ContainerRuntime>,
    notifier: Arc<Notifier>,
    agent: DiagnosisAgent,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: WardenConfig,
        registry: SharedRuns,
        runbook: Arc<Runbook>,
        hub: LiveHub,
        backend: Arc<dyn ModelBackend>,
        runtime: Arc<dyn ContainerRuntime>,
        notifier: Arc<Notifier>,
    ) -> Self {
        let agent = DiagnosisAgent::new(
            crate::retrieval::Retriever::new(
                config.retrieval.top_k,
                config.retrieval.min_similarity,
            ),
            config.model.log_truncate_chars,
        );
        Self {
            config,
            registry,
            runbook,
            hub,
            backend,
            runtime,
            notifier,
            agent,
        }
    }

    /// Accept an incident: normalize the id, record the run, announce it,
    /// and return the initial result. The caller decides whether to drive
    /// the pipeline inline (tests) or detached ([`Orchestrator::spawn_run`]).
    pub async fn ingest(&self, signal: &mut IncidentSignal) -> RunResult {
        if signal.incident_id.is_empty() {
            signal.incident_id = Uuid::new_v4().to_string();
        }
        info!(
            "Incident received: {} ({})",
            signal.incident_id, signal.alert_type
        );

        let mut run = RunResult::new(&signal.incident_id, &signal.alert_type);
        run.record("RECEIVED", "Incident received via webhook.", None);
        self.registry.write().await.insert(run.clone());

        self.hub.emit(
            LiveFrameKind::IncidentNew,
            json!({
                "incident_id": signal.incident_id,
                "alert_type": signal.alert_type,
                "logs": crate::retrieval::truncate_chars(&signal.logs, 200),
            }),
            Some(&signal.incident_id),
        );

        run
    }

    /// Schedule the remediation pipeline detached from the caller.
    pub fn spawn_run(self: &Arc<Self>, signal: IncidentSignal) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.notifier
                .notify(&signal, RunStatus::Received, None, None, None)
                .await;
            this.run_remediation(signal).await;
        });
    }

    /// Drive one incident through the full pipeline to a terminal state.
    pub async fn run_remediation(&self, signal: IncidentSignal) {
        let iid = signal.incident_id.clone();

        // -- Retrieval (timeline context; non-fatal by construction) -------
        let corpus = self.runbook.load();
        let matches = self.agent.retrieve_precedents(&signal, &corpus);
        if let Some(best) = matches.first() {
            self.record(
                &iid,
                "RETRIEVAL",
                format!(
                    "Retrieved {} similar past incidents (best match: {:.1}%)",
                    matches.len(),
                    best.similarity * 100.0
                ),
                Some("RETRIEVER"),
            )
            .await;
            self.hub.emit(
                LiveFrameKind::AiThinking,
                json!({
                    "incident_id": iid,
                    "message": format!(
                        "Found {} similar past incidents. Injecting runbook knowledge into the prompt.",
                        matches.len()
                    ),
                }),
                Some(&iid),
            );
        } else {
            self.record(
                &iid,
                "RETRIEVAL",
                "Cold start - no prior incidents in the runbook yet.",
                Some("RETRIEVER"),
            )
            .await;
            self.hub.emit(
                LiveFrameKind::AiThinking,
                json!({
                    "incident_id": iid,
                    "message": "Cold start - reasoning from first principles.",
                }),
                Some(&iid),
            );
        }

        // -- Diagnosis (streamed preview, then the authoritative call) -----
        self.set_status(&iid, RunStatus::Analysing).await;
        self.record(&iid, "ANALYSING", "Diagnosing the incident.", Some("DIAGNOSER"))
            .await;
        self.emit_status(&iid, RunStatus::Analysing, "Diagnosing (precedent-augmented).");

        self.stream_preview(&signal, &corpus).await;

        let (diagnosis, _matches) = match self.agent.diagnose(&signal, &corpus, self.backend.as_ref()).await
        {
            Ok(result) => result,
            Err(e) => {
                self.fail_run(&signal, None, &e).await;
                return;
            }
        };

        self.update_run(&iid, |run| run.diagnosis = Some(diagnosis.clone()))
            .await;
        self.hub.emit(
            LiveFrameKind::AiComplete,
            json!({ "incident_id": iid, "diagnosis": diagnosis }),
            Some(&iid),
        );
        self.record(
            &iid,
            "AI_COMPLETE",
            format!("Root cause: {} -> {}", diagnosis.root_cause, diagnosis.action),
            Some("DIAGNOSER"),
        )
        .await;
        self.notifier
            .notify(&signal, RunStatus::Analysing, Some(&diagnosis), None, None)
            .await;

        // -- Council review ------------------------------------------------
        self.set_status(&iid, RunStatus::CouncilReview).await;
        self.record(&iid, "COUNCIL_REVIEW", "Convening the council.", None)
            .await;
        self.emit_status(&iid, RunStatus::CouncilReview, "Council convened.");

        let decision = self.council_or_bypass(&signal, &diagnosis).await;

        if let Some(decision) = &decision {
            for vote in &decision.votes {
                self.hub.emit(
                    LiveFrameKind::CouncilVote,
                    json!({ "incident_id": iid, "vote": vote }),
                    Some(&iid),
                );
                let reasoning = crate::retrieval::truncate_chars(&vote.reasoning, 80);
                self.record(
                    &iid,
                    "COUNCIL_VOTE",
                    format!("{}: {} - {}", vote.role.as_str(), vote.verdict.as_str(), reasoning),
                    Some(vote.role.as_str()),
                )
                .await;
            }
            self.hub.emit(
                LiveFrameKind::CouncilDecision,
                json!({ "incident_id": iid, "decision": decision }),
                Some(&iid),
            );
            self.record(&iid, "COUNCIL_DECISION", decision.summary.clone(), None)
                .await;
            self.update_run(&iid, |run| run.decision = Some(decision.clone()))
                .await;
            self.notifier
                .notify(
                    &signal,
                    RunStatus::CouncilReview,
                    Some(&diagnosis),
                    Some(decision),
                    None,
                )
                .await;

            if decision.final_verdict == CouncilVerdict::Rejected {
                let err = PipelineError::CouncilRejected {
                    summary: decision.summary.clone(),
                };
                self.fail_run(&signal, Some(&diagnosis), &err).await;
                return;
            }
        }

        self.set_status(&iid, RunStatus::Approved).await;
        self.record(&iid, "APPROVED", "Council approved the action.", None)
            .await;

        // -- Execution -----------------------------------------------------
        self.set_status(&iid, RunStatus::Executing).await;
        self.record(&iid, "EXECUTING", format!("Executing: {}", diagnosis.action), None)
            .await;
        self.emit_status(
            &iid,
            RunStatus::Executing,
            &format!("Executing {}.", diagnosis.action),
        );

        let target = signal
            .workload
            .clone()
            .unwrap_or_else(|| self.config.runtime.target_workload.clone());

        if diagnosis.action == ActionKind::ScaleUp {
            self.set_status(&iid, RunStatus::Scaling).await;
            self.record(
                &iid,
                "SCALING",
                format!("Spawning {} replicas.", diagnosis.replica_count),
                None,
            )
            .await;
            self.emit_status(
                &iid,
                RunStatus::Scaling,
                &format!("Scaling to {} replicas.", diagnosis.replica_count),
            );
        } else if diagnosis.action == ActionKind::Restart {
            self.hub.emit(
                LiveFrameKind::RuntimeAction,
                json!({ "incident_id": iid, "action": "RESTART", "workload": target }),
                Some(&iid),
            );
        }

        let report = match executor::execute(
            &diagnosis,
            &target,
            self.runtime.as_ref(),
            self.config.runtime.max_replicas,
        )
        .await
        {
            Ok(report) => report,
            Err(e) => {
                self.fail_run(&signal, Some(&diagnosis), &e).await;
                return;
            }
        };

        let stage = execution_stage(diagnosis.action, &report);
        for note in &report.notes {
            self.record(&iid, stage, note.clone(), None).await;
        }
        if report.replicas_spawned > 0 {
            self.update_run(&iid, |run| run.replicas_spawned = report.replicas_spawned)
                .await;
            self.hub.emit(
                LiveFrameKind::ScaleEvent,
                json!({
                    "incident_id": iid,
                    "base": target,
                    "replicas_spawned": report.replicas_spawned,
                    "routing_updated": report.routing_updated,
                }),
                Some(&iid),
            );
            self.notifier
                .notify(&signal, RunStatus::Scaling, Some(&diagnosis), None, None)
                .await;
        }

        if report.resolved_immediately {
            self.resolve_run(&signal, &diagnosis, decision.as_ref(), false)
                .await;
            return;
        }

        // -- Verification --------------------------------------------------
        self.set_status(&iid, RunStatus::Verifying).await;
        self.record(&iid, "VERIFYING", "Running health checks.", None).await;
        self.emit_status(&iid, RunStatus::Verifying, "Verifying service health.");

        let healthy = verify::verify_health(&self.config.verify).await;
        self.hub.emit(
            LiveFrameKind::HealthCheck,
            json!({
                "incident_id": iid,
                "healthy": healthy,
                "attempts": self.config.verify.retries,
            }),
            Some(&iid),
        );

        if healthy {
            self.resolve_run(&signal, &diagnosis, decision.as_ref(), true)
                .await;
        } else {
            let err = PipelineError::Verification {
                attempts: self.config.verify.retries,
            };
            self.fail_run(&signal, Some(&diagnosis), &err).await;
        }
    }

    /// Streaming diagnosis preview for connected dashboards. Advisory only:
    /// every failure here is swallowed and the authoritative diagnosis call
    /// proceeds regardless.
    async fn stream_preview(&self, signal: &IncidentSignal, corpus: &[Precedent]) {
        if self.hub.client_count() == 0 {
            return;
        }
        let iid = signal.incident_id.clone();
        let (tx, mut rx) = mpsc::channel::<String>(32);

        let hub = self.hub.clone();
        let forward_id = iid.clone();
        let forwarder = tokio::spawn(async move {
            let mut full_text = String::new();
            while let Some(chunk) = rx.recv().await {
                full_text.push_str(&chunk);
                hub.emit(
                    LiveFrameKind::AiStream,
                    json!({
                        "incident_id": forward_id,
                        "chunk": chunk,
                        "full_text": full_text,
                    }),
                    Some(&forward_id),
                );
            }
        });

        if let Err(e) = self
            .agent
            .stream_diagnosis(signal, corpus, self.backend.as_ref(), tx)
            .await
        {
            warn!("Streaming preview failed (advisory): {:#}", e);
        }
        let _ = forwarder.await;
    }

    /// Run the council on its own task so a programming fault inside council
    /// plumbing (a panic) degrades to a bypass-approval instead of wedging
    /// the run. The two reviewer calls are already guarded individually;
    /// this covers everything outside them.
    async fn council_or_bypass(
        &self,
        signal: &IncidentSignal,
        diagnosis: &Diagnosis,
    ) -> Option<CouncilDecision> {
        let iid = signal.incident_id.clone();
        let backend = Arc::clone(&self.backend);
        let signal = signal.clone();
        let diagnosis = diagnosis.clone();
        let handle = tokio::spawn(async move {
            council::review(&signal, &diagnosis, backend.as_ref()).await
        });

        match handle.await {
            Ok(decision) => Some(decision),
            Err(e) => {
                warn!("Council review failed internally: {} - proceeding anyway", e);
                self.record(
                    &iid,
                    "COUNCIL_BYPASS",
                    format!("Council error: {e} - auto-approved"),
                    None,
                )
                .await;
                None
            }
        }
    }

    async fn resolve_run(
        &self,
        signal: &IncidentSignal,
        diagnosis: &Diagnosis,
        decision: Option<&CouncilDecision>,
        persist: bool,
    ) {
        let iid = &signal.incident_id;
        let resolved_at = chrono::Utc::now();
        let replicas_used = self
            .registry
            .read()
            .await
            .get(iid)
            .map(|r| r.replicas_spawned)
            .unwrap_or(0);

        self.update_run(iid, |run| {
            run.status = RunStatus::Resolved;
            run.resolved_at = Some(resolved_at);
        })
        .await;
        self.record(iid, "RESOLVED", "Service is healthy. Incident resolved.", None)
            .await;
        self.hub.emit(
            LiveFrameKind::Resolved,
            json!({ "incident_id": iid, "resolved_at": resolved_at }),
            Some(iid),
        );

        if persist {
            let entry = Precedent {
                incident_id: signal.incident_id.clone(),
                alert_type: signal.alert_type.clone(),
                logs: signal.logs.clone(),
                workload: signal
                    .workload
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
                severity: signal
                    .severity
                    .clone()
                    .unwrap_or_else(|| "UNKNOWN".to_string()),
                root_cause: diagnosis.root_cause.clone(),
                action: diagnosis.action.to_string(),
                justification: diagnosis.justification.clone(),
                confidence: diagnosis.confidence,
                council_approved: decision.map(|d| d.consensus).unwrap_or(true),
                replicas_used,
                resolved_at,
            };
            if let Err(e) = self.runbook.append(entry).await {
                warn!("Runbook append failed (learning skipped): {:#}", e);
            }
        }

        self.notifier
            .notify(signal, RunStatus::Resolved, Some(diagnosis), decision, None)
            .await;
        info!("Incident {} RESOLVED", iid);
    }

    async fn fail_run(
        &self,
        signal: &IncidentSignal,
        diagnosis: Option<&Diagnosis>,
        error: &PipelineError,
    ) {
        let iid = &signal.incident_id;
        let message = error.to_string();

        self.update_run(iid, |run| {
            run.status = RunStatus::Failed;
            run.error = Some(message.clone());
        })
        .await;
        self.record(iid, "FAILED", message.clone(), None).await;
        self.hub.emit(
            LiveFrameKind::Failed,
            json!({ "incident_id": iid, "error": message }),
            Some(iid),
        );
        self.notifier
            .notify(signal, RunStatus::Failed, diagnosis, None, Some(&message))
            .await;
        warn!("Incident {} FAILED: {}", iid, message);
    }

    async fn set_status(&self, incident_id: &str, status: RunStatus) {
        self.update_run(incident_id, |run| run.status = status).await;
    }

    fn emit_status(&self, incident_id: &str, status: RunStatus, message: &str) {
        self.hub.emit(
            LiveFrameKind::StatusUpdate,
            json!({
                "incident_id": incident_id,
                "status": status.as_str(),
                "message": message,
            }),
            Some(incident_id),
        );
    }

    async fn record(
        &self,
        incident_id: &str,
        stage: &str,
        message: impl Into<String>,
        actor: Option<&str>,
    ) {
        let mut registry = self.registry.write().await;
        if let Some(run) = registry.get_mut(incident_id) {
            run.record(stage, message, actor);
        }
    }

    async fn update_run(&self, incident_id: &str, f: impl FnOnce(&mut RunResult)) {
        let mut registry = self.registry.write().await;
        if let Some(run) = registry.get_mut(incident_id) {
            f(run);
        }
    }
}

fn execution_stage(action: ActionKind, report: &executor::ExecutionReport) -> &'static str {
    match action {
        ActionKind::Restart => "RESTARTED",
        ActionKind::ScaleUp => {
            if report.fallback_restart_used {
                "RESTARTED"
            } else {
                "SCALED"
            }
        }
        ActionKind::ScaleDown => "SCALED_DOWN",
        ActionKind::Rollback => "ROLLBACK",
        ActionKind::Noop => "NOOP",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::BackendExhausted;
    use crate::state::create_shared_runs;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use warden_common::ContainerInfo;

    struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<String, (String, String)>>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<String, (String, String)>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().collect()),
            })
        }
    }

    #[async_trait]
    impl ModelBackend for ScriptedBackend {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(text),
                Some(Err((primary, fallback))) => Err(BackendExhausted { primary, fallback }.into()),
                None => Err(anyhow::anyhow!("no scripted reply left")),
            }
        }

        async fn complete_stream(
            &self,
            _system: &str,
            _user: &str,
            _tx: mpsc::Sender<String>,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingRuntime {
        restart_calls: AtomicU32,
        scale_calls: AtomicU32,
    }

    #[async_trait]
    impl ContainerRuntime for CountingRuntime {
        async fn restart(&self, _name: &str) -> Result<String> {
            self.restart_calls.fetch_add(1, Ordering::SeqCst);
            Ok("running".to_string())
        }

        async fn scale_to(&self, base: &str, count: u32) -> Result<Vec<String>> {
            self.scale_calls.fetch_add(1, Ordering::SeqCst);
            Ok((1..=count).map(|i| format!("{base}-replica-{i}")).collect())
        }

        async fn scale_down(&self, _base: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn get_logs(&self, _name: &str, _tail: u32) -> Result<String> {
            Ok(String::new())
        }

        async fn list_running(&self) -> Result<Vec<ContainerInfo>> {
            Ok(Vec::new())
        }

        async fn reconfigure_routing(&self, _base: &str, _replicas: &[String]) -> Result<bool> {
            Ok(true)
        }
    }

    async fn healthy_endpoint() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok")
                    .await;
            }
        });
        format!("http://{addr}/health")
    }

    fn build(
        backend: Arc<dyn ModelBackend>,
        runtime: Arc<dyn ContainerRuntime>,
        runbook_dir: &std::path::Path,
        health_url: &str,
    ) -> Orchestrator {
        let mut config = WardenConfig::default();
        config.verify.health_url = health_url.to_string();
        config.verify.delay_secs = 0;
        config.verify.retries = 1;
        config.verify.timeout_secs = 1;
        let runbook = Arc::new(Runbook::new(runbook_dir.join("runbook.json")));
        Orchestrator::new(
            config,
            create_shared_runs(),
            runbook,
            LiveHub::new(),
            backend,
            runtime,
            Arc::new(Notifier::new("")),
        )
    }

    fn signal(alert: &str, logs: &str) -> IncidentSignal {
        IncidentSignal {
            incident_id: "inc-1".to_string(),
            alert_type: alert.to_string(),
            logs: logs.to_string(),
            workload: Some("target-app".to_string()),
            severity: Some("HIGH".to_string()),
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn test_cold_start_restart_resolves_and_learns() {
        let backend = ScriptedBackend::new(vec![
            Ok(r#"{"root_cause": "OOM kill loop", "action": "RESTART", "justification": "process killed by the kernel", "confidence": 0.95, "replica_count": 0}"#.to_string()),
            Ok(r#"{"verdict": "APPROVED", "reasoning": "restart is safe"}"#.to_string()),
            Ok(r#"{"verdict": "APPROVED", "reasoning": "proportionate and logged"}"#.to_string()),
        ]);
        let runtime = Arc::new(CountingRuntime::default());
        let dir = tempfile::tempdir().unwrap();
        let health_url = healthy_endpoint().await;
        let orch = build(backend, runtime.clone(), dir.path(), &health_url);

        let mut incident = signal("Memory Leak", "OOM killed process");
        orch.ingest(&mut incident).await;
        orch.run_remediation(incident).await;

        let run = orch.registry.read().await.get("inc-1").unwrap();
        assert_eq!(run.status, RunStatus::Resolved);
        assert!(run.error.is_none());
        assert_eq!(run.decision.as_ref().unwrap().approvals, 3);
        assert_eq!(runtime.restart_calls.load(Ordering::SeqCst), 1);

        let corpus = orch.runbook.load();
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus[0].incident_id, "inc-1");
        assert_eq!(corpus[0].action, "RESTART");
    }

    #[tokio::test]
    async fn test_persisted_precedent_feeds_next_retrieval() {
        let backend = ScriptedBackend::new(vec![
            Ok(r#"{"root_cause": "OOM kill loop", "action": "RESTART", "justification": "kernel killed the process", "confidence": 0.95, "replica_count": 0}"#.to_string()),
            Ok(r#"{"verdict": "APPROVED", "reasoning": "ok"}"#.to_string()),
            Ok(r#"{"verdict": "APPROVED", "reasoning": "ok"}"#.to_string()),
        ]);
        let runtime = Arc::new(CountingRuntime::default());
        let dir = tempfile::tempdir().unwrap();
        let health_url = healthy_endpoint().await;
        let orch = build(backend, runtime, dir.path(), &health_url);

        let mut first = signal("Memory Leak", "OOM killed process heap exhausted memory climbing");
        orch.ingest(&mut first).await;
        orch.run_remediation(first).await;

        // A near-identical second incident retrieves the first as precedent
        // and the diagnosis prompt carries its root cause and action.
        let second = signal("Memory Leak", "OOM killed process heap exhausted again");
        let corpus = orch.runbook.load();
        let matches = orch.agent.retrieve_precedents(&second, &corpus);
        assert!(!matches.is_empty());
        assert!(matches[0].similarity > 0.05);
        assert_eq!(matches[0].incident_id, "inc-1");

        let prompt = crate::prompts::build_diagnosis_system_prompt(&matches);
        assert!(prompt.contains("OOM kill loop"));
        assert!(prompt.contains("Action     : RESTART"));
    }

    #[tokio::test]
    async fn test_both_endpoints_down_fails_without_runtime_action() {
        let backend = ScriptedBackend::new(vec![Err((
            "primary timed out".to_string(),
            "fallback refused connection".to_string(),
        ))]);
        let runtime = Arc::new(CountingRuntime::default());
        let dir = tempfile::tempdir().unwrap();
        let orch = build(
            backend,
            runtime.clone(),
            dir.path(),
            "http://127.0.0.1:1/health",
        );

        let mut incident = signal("Memory Leak", "OOM killed process");
        orch.ingest(&mut incident).await;
        orch.run_remediation(incident).await;

        let run = orch.registry.read().await.get("inc-1").unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        let error = run.error.unwrap();
        assert!(error.contains("primary timed out"));
        assert!(error.contains("fallback refused connection"));
        assert_eq!(runtime.restart_calls.load(Ordering::SeqCst), 0);
        assert_eq!(runtime.scale_calls.load(Ordering::SeqCst), 0);
        assert!(orch.runbook.load().is_empty());
    }

    #[tokio::test]
    async fn test_noop_resolves_without_runtime_or_verifier() {
        let backend = ScriptedBackend::new(vec![
            Ok(r#"{"root_cause": "transient blip", "action": "NOOP", "justification": "self-recovered", "confidence": 0.6, "replica_count": 0}"#.to_string()),
            Ok(r#"{"verdict": "APPROVED", "reasoning": "nothing to do"}"#.to_string()),
            Ok(r#"{"verdict": "APPROVED", "reasoning": "fine"}"#.to_string()),
        ]);
        let runtime = Arc::new(CountingRuntime::default());
        let dir = tempfile::tempdir().unwrap();
        // Unreachable health URL proves the verifier is skipped for NOOP.
        let orch = build(
            backend,
            runtime.clone(),
            dir.path(),
            "http://127.0.0.1:1/health",
        );

        let mut incident = signal("Latency Blip", "p99 briefly elevated");
        orch.ingest(&mut incident).await;
        orch.run_remediation(incident).await;

        let run = orch.registry.read().await.get("inc-1").unwrap();
        assert_eq!(run.status, RunStatus::Resolved);
        assert_eq!(runtime.restart_calls.load(Ordering::SeqCst), 0);
        assert_eq!(runtime.scale_calls.load(Ordering::SeqCst), 0);
        // Nothing was remedied, so nothing is worth learning from.
        assert!(orch.runbook.load().is_empty());
    }

    #[tokio::test]
    async fn test_council_rejection_halts_before_execution() {
        let backend = ScriptedBackend::new(vec![
            Ok(r#"{"root_cause": "bad deploy", "action": "ROLLBACK", "justification": "regression", "confidence": 0.8, "replica_count": 0}"#.to_string()),
            Ok(r#"{"verdict": "REJECTED", "reasoning": "rollback without backup"}"#.to_string()),
            Ok(r#"{"verdict": "REJECTED", "reasoning": "not auditable"}"#.to_string()),
        ]);
        let runtime = Arc::new(CountingRuntime::default());
        let dir = tempfile::tempdir().unwrap();
        let orch = build(
            backend,
            runtime.clone(),
            dir.path(),
            "http://127.0.0.1:1/health",
        );

        let mut incident = signal("Bad Deploy", "errors after release");
        orch.ingest(&mut incident).await;
        orch.run_remediation(incident).await;

        let run = orch.registry.read().await.get("inc-1").unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error.unwrap().contains("rejected"));
        assert_eq!(runtime.restart_calls.load(Ordering::SeqCst), 0);
        assert_eq!(runtime.scale_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ingest_assigns_uuid_when_id_missing() {
        let backend = ScriptedBackend::new(vec![]);
        let runtime = Arc::new(CountingRuntime::default());
        let dir = tempfile::tempdir().unwrap();
        let orch = build(backend, runtime, dir.path(), "http://127.0.0.1:1/");

        let mut incident = IncidentSignal {
            incident_id: String::new(),
            alert_type: "CPU Spike".to_string(),
            logs: String::new(),
            workload: None,
            severity: None,
            timestamp: None,
        };
        let run = orch.ingest(&mut incident).await;
        assert!(!incident.incident_id.is_empty());
        assert_eq!(run.incident_id, incident.incident_id);
        assert_eq!(run.status, RunStatus::Received);
        assert_eq!(run.timeline.len(), 1);
    }

    #[tokio::test]
    async fn test_scale_up_records_replicas_on_the_run() {
        let backend = ScriptedBackend::new(vec![
            Ok(r#"{"root_cause": "cpu saturation", "action": "SCALE_UP", "justification": "spread load", "confidence": 0.9, "replica_count": 2}"#.to_string()),
            Ok(r#"{"verdict": "APPROVED", "reasoning": "scaling is safe"}"#.to_string()),
            Ok(r#"{"verdict": "APPROVED", "reasoning": "proportionate"}"#.to_string()),
        ]);
        let runtime = Arc::new(CountingRuntime::default());
        let dir = tempfile::tempdir().unwrap();
        let health_url = healthy_endpoint().await;
        let orch = build(backend, runtime.clone(), dir.path(), &health_url);

        let mut incident = signal("CPU Spike", "cpu pegged at 100 percent");
        orch.ingest(&mut incident).await;
        orch.run_remediation(incident).await;

        let run = orch.registry.read().await.get("inc-1").unwrap();
        assert_eq!(run.status, RunStatus::Resolved);
        assert_eq!(run.replicas_spawned, 2);
        assert_eq!(runtime.scale_calls.load(Ordering::SeqCst), 1);

        let corpus = orch.runbook.load();
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus[0].replicas_used, 2);
    }
}
