//! Core data model: incidents, diagnoses, council votes, runs, precedents,
//! and live-channel frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// INCOMING INCIDENT
// ============================================================================

/// An alert describing a misbehaving service, as received on ingress.
///
/// Immutable after creation; one orchestrator run owns it for its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentSignal {
    /// Unique alert identifier. Assigned a v4 UUID on ingress when absent.
    #[serde(default)]
    pub incident_id: String,
    /// Category, e.g. "Memory Leak".
    pub alert_type: String,
    /// Raw log snippet from the failing workload.
    #[serde(default)]
    pub logs: String,
    /// Name of the affected workload, when the alert source knows it.
    #[serde(default)]
    pub workload: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    /// Free-form timestamp from the alert source.
    #[serde(default)]
    pub timestamp: Option<String>,
}

// ============================================================================
// DIAGNOSIS
// ============================================================================

/// The closed remediation vocabulary. The executor matches exhaustively on
/// this, so adding an action is a compile-time-checked change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    #[serde(rename = "RESTART")]
    Restart,
    #[serde(rename = "SCALE_UP")]
    ScaleUp,
    #[serde(rename = "SCALE_DOWN")]
    ScaleDown,
    #[serde(rename = "ROLLBACK")]
    Rollback,
    #[serde(rename = "NOOP")]
    Noop,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Restart => "RESTART",
            ActionKind::ScaleUp => "SCALE_UP",
            ActionKind::ScaleDown => "SCALE_DOWN",
            ActionKind::Rollback => "ROLLBACK",
            ActionKind::Noop => "NOOP",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured output of the diagnosis agent.
///
/// `confidence` is always normalized into `[0, 1]` before this struct is
/// handed to anyone else, regardless of the scale the model answered in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnosis {
    pub root_cause: String,
    pub action: ActionKind,
    pub justification: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default = "default_replica_count")]
    pub replica_count: u32,
}

fn default_confidence() -> f64 {
    0.85
}

fn default_replica_count() -> u32 {
    2
}

// ============================================================================
// COUNCIL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CouncilRole {
    #[serde(rename = "DIAGNOSER")]
    Diagnoser,
    #[serde(rename = "SAFETY_REVIEWER")]
    SafetyReviewer,
    #[serde(rename = "COMPLIANCE_REVIEWER")]
    ComplianceReviewer,
}

impl CouncilRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CouncilRole::Diagnoser => "DIAGNOSER",
            CouncilRole::SafetyReviewer => "SAFETY_REVIEWER",
            CouncilRole::ComplianceReviewer => "COMPLIANCE_REVIEWER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CouncilVerdict {
    #[serde(rename = "APPROVED")]
    Approved,
    #[serde(rename = "REJECTED")]
    Rejected,
    #[serde(rename = "NEEDS_REVIEW")]
    NeedsReview,
}

impl CouncilVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            CouncilVerdict::Approved => "APPROVED",
            CouncilVerdict::Rejected => "REJECTED",
            CouncilVerdict::NeedsReview => "NEEDS_REVIEW",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilVote {
    pub role: CouncilRole,
    pub verdict: CouncilVerdict,
    pub reasoning: String,
    pub timestamp: DateTime<Utc>,
}

impl CouncilVote {
    pub fn new(role: CouncilRole, verdict: CouncilVerdict, reasoning: impl Into<String>) -> Self {
        Self {
            role,
            verdict,
            reasoning: reasoning.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Outcome of the three-vote review protocol.
///
/// Invariant: `consensus == (approvals >= 2)` and `final_verdict` is
/// `Approved` exactly when consensus holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilDecision {
    pub votes: Vec<CouncilVote>,
    pub approvals: u32,
    pub final_verdict: CouncilVerdict,
    pub consensus: bool,
    pub summary: String,
}

// ============================================================================
// RUN TRACKING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    #[serde(rename = "RECEIVED")]
    Received,
    #[serde(rename = "ANALYSING")]
    Analysing,
    #[serde(rename = "COUNCIL_REVIEW")]
    CouncilReview,
    #[serde(rename = "APPROVED")]
    Approved,
    #[serde(rename = "EXECUTING")]
    Executing,
    #[serde(rename = "SCALING")]
    Scaling,
    #[serde(rename = "VERIFYING")]
    Verifying,
    #[serde(rename = "RESOLVED")]
    Resolved,
    #[serde(rename = "FAILED")]
    Failed,
}

impl RunStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Resolved | RunStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Received => "RECEIVED",
            RunStatus::Analysing => "ANALYSING",
            RunStatus::CouncilReview => "COUNCIL_REVIEW",
            RunStatus::Approved => "APPROVED",
            RunStatus::Executing => "EXECUTING",
            RunStatus::Scaling => "SCALING",
            RunStatus::Verifying => "VERIFYING",
            RunStatus::Resolved => "RESOLVED",
            RunStatus::Failed => "FAILED",
        }
    }
}

/// One entry in a run's append-only audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub ts: DateTime<Utc>,
    pub stage: String,
    pub message: String,
    #[serde(default)]
    pub actor: Option<String>,
}

/// Everything known about one remediation run. Mutated in place as the run
/// advances; readers may observe any non-terminal intermediate state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub incident_id: String,
    pub alert_type: String,
    #[serde(default)]
    pub diagnosis: Option<Diagnosis>,
    #[serde(default)]
    pub decision: Option<CouncilDecision>,
    pub status: RunStatus,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub replicas_spawned: u32,
    #[serde(default)]
    pub timeline: Vec<TimelineEntry>,
}

impl RunResult {
    pub fn new(incident_id: impl Into<String>, alert_type: impl Into<String>) -> Self {
        Self {
            incident_id: incident_id.into(),
            alert_type: alert_type.into(),
            diagnosis: None,
            decision: None,
            status: RunStatus::Received,
            resolved_at: None,
            error: None,
            replicas_spawned: 0,
            timeline: Vec::new(),
        }
    }

    /// Append an audit-trail entry.
    pub fn record(&mut self, stage: &str, message: impl Into<String>, actor: Option<&str>) {
        self.timeline.push(TimelineEntry {
            ts: Utc::now(),
            stage: stage.to_string(),
            message: message.into(),
            actor: actor.map(|a| a.to_string()),
        });
    }
}

// ============================================================================
// RUNBOOK PRECEDENT
// ============================================================================

/// A resolved incident persisted to the runbook corpus.
///
/// The raw logs, workload and severity ride along so the similarity
/// retriever can score future incidents against the full context, not just
/// the diagnosis summary. Entries are append-only and never rewritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Precedent {
    pub incident_id: String,
    pub alert_type: String,
    #[serde(default)]
    pub logs: String,
    #[serde(default = "default_unknown")]
    pub workload: String,
    #[serde(default = "default_severity")]
    pub severity: String,
    pub root_cause: String,
    pub action: String,
    pub justification: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default = "default_true")]
    pub council_approved: bool,
    #[serde(default)]
    pub replicas_used: u32,
    pub resolved_at: DateTime<Utc>,
}

fn default_unknown() -> String {
    "unknown".to_string()
}

fn default_severity() -> String {
    "UNKNOWN".to_string()
}

fn default_true() -> bool {
    true
}

/// A retrieval hit: one precedent plus its similarity to the current query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecedentMatch {
    pub incident_id: String,
    pub alert_type: String,
    pub root_cause: String,
    pub action: String,
    pub justification: String,
    /// Truncated log excerpt kept small enough for prompt injection.
    pub log_snippet: String,
    /// Cosine similarity, rounded to 4 decimals.
    pub similarity: f64,
    pub workload: String,
    pub severity: String,
    pub replicas_used: u32,
}

// ============================================================================
// SCALING
// ============================================================================

/// Outcome of a scale-up operation against the runtime driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleOutcome {
    pub base: String,
    pub requested: u32,
    pub replicas: Vec<String>,
    pub routing_updated: bool,
    pub timestamp: DateTime<Utc>,
}

/// A workload known to the runtime driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub name: String,
    pub status: String,
    pub image: String,
}

// ============================================================================
// LIVE-CHANNEL FRAMES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiveFrameKind {
    #[serde(rename = "incident.new")]
    IncidentNew,
    #[serde(rename = "status.update")]
    StatusUpdate,
    #[serde(rename = "ai.thinking")]
    AiThinking,
    #[serde(rename = "ai.stream")]
    AiStream,
    #[serde(rename = "ai.complete")]
    AiComplete,
    #[serde(rename = "council.vote")]
    CouncilVote,
    #[serde(rename = "council.decision")]
    CouncilDecision,
    #[serde(rename = "runtime.action")]
    RuntimeAction,
    #[serde(rename = "scale.event")]
    ScaleEvent,
    #[serde(rename = "health.check")]
    HealthCheck,
    #[serde(rename = "resolved")]
    Resolved,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "heartbeat")]
    Heartbeat,
}

/// A typed event broadcast to every connected live-channel subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveFrame {
    #[serde(rename = "type")]
    pub kind: LiveFrameKind,
    #[serde(default)]
    pub incident_id: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl LiveFrame {
    pub fn new(kind: LiveFrameKind, data: serde_json::Value, incident_id: Option<&str>) -> Self {
        Self {
            kind,
            incident_id: incident_id.map(|s| s.to_string()),
            data,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_kind_wire_format() {
        let json = serde_json::to_string(&ActionKind::ScaleUp).unwrap();
        assert_eq!(json, "\"SCALE_UP\"");

        let back: ActionKind = serde_json::from_str("\"RESTART\"").unwrap();
        assert_eq!(back, ActionKind::Restart);
    }

    #[test]
    fn test_diagnosis_defaults() {
        let d: Diagnosis = serde_json::from_str(
            r#"{"root_cause": "OOM", "action": "RESTART", "justification": "crash loop"}"#,
        )
        .unwrap();
        assert_eq!(d.confidence, 0.85);
        assert_eq!(d.replica_count, 2);
    }

    #[test]
    fn test_run_status_terminal() {
        assert!(RunStatus::Resolved.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Verifying.is_terminal());
        assert!(!RunStatus::Received.is_terminal());
    }

    #[test]
    fn test_incident_signal_tolerates_minimal_payload() {
        let s: IncidentSignal =
            serde_json::from_str(r#"{"alert_type": "CPU Spike"}"#).unwrap();
        assert!(s.incident_id.is_empty());
        assert!(s.logs.is_empty());
        assert!(s.workload.is_none());
    }

    #[test]
    fn test_live_frame_kind_wire_format() {
        let json = serde_json::to_string(&LiveFrameKind::CouncilVote).unwrap();
        assert_eq!(json, "\"council.vote\"");
    }

    #[test]
    fn test_run_result_record_appends_in_order() {
        let mut run = RunResult::new("inc-1", "Memory Leak");
        run.record("RECEIVED", "Incident received.", None);
        run.record("ANALYSING", "Diagnosing.", Some("DIAGNOSER"));
        assert_eq!(run.timeline.len(), 2);
        assert_eq!(run.timeline[0].stage, "RECEIVED");
        assert_eq!(run.timeline[1].actor.as_deref(), Some("DIAGNOSER"));
    }
}
