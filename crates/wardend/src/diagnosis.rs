//! Diagnosis agent: precedent-augmented root-cause analysis.
//!
//! Pipeline per incident: truncate logs to a token-safe tail, retrieve the
//! most similar past incidents, inject them into the diagnostician prompt,
//! call the model backend (primary with one fallback), parse the strict-JSON
//! reply, then normalize confidence and clean the free-text fields.
//!
//! Calling this twice yields two independent diagnoses; there is no hidden
//! state beyond the outbound model call.

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::info;
use warden_common::{Diagnosis, IncidentSignal, Precedent, PrecedentMatch};

use crate::errors::PipelineError;
use crate::llm::{strip_code_fence, BackendExhausted, ModelBackend};
use crate::prompts::{build_diagnosis_system_prompt, build_incident_message};
use crate::retrieval::Retriever;

pub struct DiagnosisAgent {
    retriever: Retriever,
    log_truncate_chars: usize,
}

/// The model's reply before normalization. `confidence` stays a raw JSON
/// value here because models answer in whatever scale they feel like.
#[derive(Debug, Deserialize)]
struct RawDiagnosis {
    root_cause: String,
    action: warden_common::ActionKind,
    #[serde(default)]
    justification: String,
    #[serde(default)]
    confidence: Value,
    #[serde(default)]
    replica_count: Option<i64>,
}

impl DiagnosisAgent {
    pub fn new(retriever: Retriever, log_truncate_chars: usize) -> Self {
        Self {
            retriever,
            log_truncate_chars,
        }
    }

    /// Retrieve precedents for the signal without calling the model. The
    /// orchestrator uses this for the timeline/broadcast before diagnosis.
    pub fn retrieve_precedents(
        &self,
        signal: &IncidentSignal,
        corpus: &[Precedent],
    ) -> Vec<PrecedentMatch> {
        let safe_logs = tail_chars(&signal.logs, self.log_truncate_chars);
        self.retriever.retrieve(&safe_logs, corpus)
    }

    /// Produce the authoritative diagnosis for one incident.
    pub async fn diagnose(
        &self,
        signal: &IncidentSignal,
        corpus: &[Precedent],
        backend: &dyn ModelBackend,
    ) -> Result<(Diagnosis, Vec<PrecedentMatch>), PipelineError> {
        let safe_logs = tail_chars(&signal.logs, self.log_truncate_chars);
        let matches = self.retriever.retrieve(&safe_logs, corpus);

        let system = build_diagnosis_system_prompt(&matches);
        let user = build_incident_message(signal, &safe_logs, self.log_truncate_chars);

        let raw = backend
            .complete(&system, &user)
            .await
            .map_err(into_diagnosis_error)?;

        let diagnosis = parse_diagnosis(&raw)?;

        info!(
            "Diagnosis: cause={} action={} conf={:.2} ({})",
            diagnosis.root_cause,
            diagnosis.action,
            diagnosis.confidence,
            if matches.is_empty() {
                "cold start".to_string()
            } else {
                format!("{} precedents", matches.len())
            }
        );

        Ok((diagnosis, matches))
    }

    /// Streaming preview of the diagnosis for live display. Performs the
    /// same retrieval and prompt construction, then forwards token fragments
    /// to `tx`. Advisory only - the run's diagnosis always comes from
    /// [`DiagnosisAgent::diagnose`].
    pub async fn stream_diagnosis(
        &self,
        signal: &IncidentSignal,
        corpus: &[Precedent],
        backend: &dyn ModelBackend,
        tx: mpsc::Sender<String>,
    ) -> anyhow::Result<()> {
        let safe_logs = tail_chars(&signal.logs, self.log_truncate_chars);
        let matches = self.retriever.retrieve(&safe_logs, corpus);
        let system = build_diagnosis_system_prompt(&matches);
        let user = build_incident_message(signal, &safe_logs, self.log_truncate_chars);
        backend.complete_stream(&system, &user, tx).await
    }
}

fn into_diagnosis_error(e: anyhow::Error) -> PipelineError {
    match e.downcast_ref::<BackendExhausted>() {
        Some(both) => PipelineError::Diagnosis {
            primary: both.primary.clone(),
            fallback: both.fallback.clone(),
        },
        None => PipelineError::Diagnosis {
            primary: format!("{e:#}"),
            fallback: "not attempted".to_string(),
        },
    }
}

/// Parse the model's reply into a normalized [`Diagnosis`].
fn parse_diagnosis(raw: &str) -> Result<Diagnosis, PipelineError> {
    let text = strip_code_fence(raw);
    let parsed: RawDiagnosis =
        serde_json::from_str(&text).map_err(|e| PipelineError::DiagnosisParse {
            detail: e.to_string(),
        })?;

    Ok(Diagnosis {
        root_cause: sanitize_text(&parsed.root_cause),
        action: parsed.action,
        justification: sanitize_text(&parsed.justification),
        confidence: normalize_confidence(&parsed.confidence),
        replica_count: parsed.replica_count.unwrap_or(2).max(0) as u32,
    })
}

/// Keep only the LAST `max_chars` characters - logs never leave the process
/// unbounded.
pub fn tail_chars(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}

/// Normalize a raw confidence value into `[0, 1]`.
///
/// Models answer on whatever scale they like: values in (1, 100] are read as
/// percentages, values in (100, 1000] as per-mille, anything non-numeric
/// becomes 0.0, and the result is clamped. Total and idempotent.
pub fn normalize_confidence(raw: &Value) -> f64 {
    let Some(mut conf) = raw.as_f64() else {
        return 0.0;
    };
    if conf > 1.0 && conf <= 100.0 {
        conf /= 100.0;
    } else if conf > 100.0 && conf <= 1000.0 {
        conf /= 1000.0;
    }
    conf.clamp(0.0, 1.0)
}

/// Whitelisted misspellings and formatting artifacts seen in model output.
/// Deterministic substitution only - no general text cleanup.
const TEXT_CORRECTIONS: &[(&str, &str)] = &[
    ("Rot Cause", "Root Cause"),
    ("NNtwork", "Network"),
    ("Netwrok", "Network"),
    ("connettivity", "connectivity"),
    ("conectivity", "connectivity"),
    ("Justificatiin", "Justification"),
    ("Justificaton", "Justification"),
    ("\t", " "),
];

/// Apply the correction whitelist and collapse repeated whitespace.
pub fn sanitize_text(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let mut s = raw.to_string();
    for (from, to) in TEXT_CORRECTIONS {
        s = s.replace(from, to);
    }
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
