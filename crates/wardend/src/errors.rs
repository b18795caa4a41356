//! Typed failure taxonomy for the remediation pipeline.
//!
//! Only failures that terminate a run live here. Reviewer outages degrade to
//! auto-approved votes, retrieval faults degrade to a cold start, and
//! notification/broadcast faults are logged and discarded - none of those
//! ever surface as a `PipelineError`.

use thiserror::Error;
use warden_common::ActionKind;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Both model endpoints failed. Carries both underlying errors so the
    /// run's error string names each one.
    #[error("diagnosis failed: primary: {primary}; fallback: {fallback}")]
    Diagnosis { primary: String, fallback: String },

    /// The model answered, but not with parseable structured output.
    #[error("diagnosis response was not valid JSON: {detail}")]
    DiagnosisParse { detail: String },

    /// Explicit majority rejection by the council.
    #[error("council rejected the action: {summary}")]
    CouncilRejected { summary: String },

    /// A remediation action against the runtime failed terminally. For
    /// scale-up this is only raised after the single restart fallback also
    /// failed, with both errors in `detail`.
    #[error("{action} execution failed: {detail}")]
    Execution { action: ActionKind, detail: String },

    /// The service never came back healthy within the retry budget.
    #[error("health check failed after {attempts} attempts")]
    Verification { attempts: u32 },
}

impl PipelineError {
    /// Stage label recorded in the timeline when this error ends a run.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Diagnosis { .. } | PipelineError::DiagnosisParse { .. } => "DIAGNOSIS",
            PipelineError::CouncilRejected { .. } => "COUNCIL_DECISION",
            PipelineError::Execution { .. } => "EXECUTING",
            PipelineError::Verification { .. } => "VERIFYING",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnosis_error_names_both_endpoints() {
        let err = PipelineError::Diagnosis {
            primary: "connect timeout".to_string(),
            fallback: "404 no such model".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("connect timeout"));
        assert!(msg.contains("404 no such model"));
    }

    #[test]
    fn test_execution_error_mentions_action() {
        let err = PipelineError::Execution {
            action: ActionKind::Restart,
            detail: "no such container".to_string(),
        };
        assert!(err.to_string().contains("RESTART"));
    }
}
