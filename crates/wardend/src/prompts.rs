//! Prompt construction for the diagnosis agent and the council reviewers.

use warden_common::{Diagnosis, IncidentSignal, PrecedentMatch};

use crate::retrieval::truncate_chars;

/// Log excerpt length when a precedent is rendered into the prompt. Smaller
/// than the stored snippet so two precedents fit comfortably.
const PROMPT_SNIPPET_CHARS: usize = 200;

/// Base instruction for the diagnostician. The action vocabulary and the
/// decision heuristics are fixed; precedent knowledge gets appended when
/// retrieval found matches.
const DIAGNOSTICIAN_BASE: &str = r#"You are an expert SRE diagnostician with memory of past incidents.
Analyse the incident payload and return **only** valid JSON:
{"root_cause": "<one-line>", "action": "RESTART"|"SCALE_UP"|"SCALE_DOWN"|"ROLLBACK"|"NOOP", "justification": "<why>", "confidence": 0.0-1.0, "replica_count": <int>}
For CPU spikes or memory leaks, prefer SCALE_UP with replica_count=2-3.
For DB issues, prefer RESTART. For minor issues, use NOOP.
For pod crashes or OOM kills, prefer RESTART with high confidence.
If you have past runbook knowledge below, USE IT to improve your diagnosis.
A higher confidence means you've seen this pattern before.
Return ONLY the JSON object."#;

/// Safety reviewer instruction: approve routine remediation, reject anything
/// destructive or unverifiable.
pub const SAFETY_SYSTEM: &str = r#"You are a Security & Compliance Officer reviewing an SRE's proposed action.
Given the incident and the proposed plan, return **only** valid JSON:
{"verdict": "APPROVED"|"REJECTED"|"NEEDS_REVIEW", "reasoning": "<security assessment>"}
APPROVE safe actions (restart, scale up/down). REJECT dangerous actions (rollback without backup, arbitrary code execution). Return ONLY the JSON object."#;

/// Compliance reviewer instruction: proportionality and audit trail.
pub const COMPLIANCE_SYSTEM: &str = r#"You are a Corporate Auditor logging compliance decisions.
Given the incident, the SRE plan, and the security review, return **only** valid JSON:
{"verdict": "APPROVED"|"REJECTED"|"NEEDS_REVIEW", "reasoning": "<compliance log entry>"}
Check: Is the action proportionate? Is there an audit trail? APPROVE if the action is safe and logged. Return ONLY the JSON object."#;

/// Render retrieved precedents into the block injected into the
/// diagnostician's system prompt. Empty when there are no matches.
pub fn format_precedent_block(matches: &[PrecedentMatch]) -> String {
    if matches.is_empty() {
        return String::new();
    }

    let mut lines = vec![
        "\n\n-- RUNBOOK KNOWLEDGE (from past resolved incidents) --".to_string(),
        "Use these to inform your analysis. Learn from what worked before.\n".to_string(),
    ];
    for (i, m) in matches.iter().enumerate() {
        lines.push(format!(
            "Past Incident #{} (similarity: {:.1}%):",
            i + 1,
            m.similarity * 100.0
        ));
        lines.push(format!("  Alert Type : {}", m.alert_type));
        lines.push(format!("  Root Cause : {}", m.root_cause));
        lines.push(format!("  Action     : {}", m.action));
        lines.push(format!("  Justification: {}", m.justification));
        if m.replicas_used > 0 {
            lines.push(format!("  Replicas   : {}", m.replicas_used));
        }
        lines.push(format!(
            "  Log Snippet: {}",
            truncate_chars(&m.log_snippet, PROMPT_SNIPPET_CHARS)
        ));
        lines.push(String::new());
    }
    lines.push(
        "If the current incident is similar, apply the same proven fix. \
         If it's different, reason from first principles.\n-- END RUNBOOK KNOWLEDGE --"
            .to_string(),
    );
    lines.join("\n")
}

/// Full diagnostician system prompt: base heuristics plus precedent block.
pub fn build_diagnosis_system_prompt(matches: &[PrecedentMatch]) -> String {
    format!("{}{}", DIAGNOSTICIAN_BASE, format_precedent_block(matches))
}

/// The user message describing the incident. `safe_logs` must already be
/// truncated to the configured tail.
pub fn build_incident_message(
    signal: &IncidentSignal,
    safe_logs: &str,
    truncate_chars: usize,
) -> String {
    format!(
        "Incident ID : {}\nWorkload    : {}\nAlert Type  : {}\nSeverity    : {}\nLogs (last {} chars):\n{}",
        signal.incident_id,
        signal.workload.as_deref().unwrap_or("unknown"),
        signal.alert_type,
        signal.severity.as_deref().unwrap_or("UNKNOWN"),
        truncate_chars,
        safe_logs,
    )
}

/// The plan text reviewers vote on.
pub fn build_plan_text(signal: &IncidentSignal, diagnosis: &Diagnosis) -> String {
    format!(
        "Incident: {} ({})\nRoot Cause: {}\nProposed Action: {}\nConfidence: {}\nReplica Count: {}\nJustification: {}\n",
        signal.incident_id,
        signal.alert_type,
        diagnosis.root_cause,
        diagnosis.action,
        diagnosis.confidence,
        diagnosis.replica_count,
        diagnosis.justification,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_common::ActionKind;

    fn sample_match() -> PrecedentMatch {
        PrecedentMatch {
            incident_id: "inc-7".to_string(),
            alert_type: "Memory Leak".to_string(),
            root_cause: "unbounded cache growth".to_string(),
            action: "RESTART".to_string(),
            justification: "restart reclaimed the heap".to_string(),
            log_snippet: "OOM killed process".to_string(),
            similarity: 0.4321,
            workload: "target-app".to_string(),
            severity: "HIGH".to_string(),
            replicas_used: 0,
        }
    }

    #[test]
    fn test_cold_start_prompt_has_no_precedent_block() {
        let prompt = build_diagnosis_system_prompt(&[]);
        assert!(!prompt.contains("RUNBOOK KNOWLEDGE"));
        assert!(prompt.contains("RESTART"));
    }

    #[test]
    fn test_precedent_block_names_cause_and_action() {
        let prompt = build_diagnosis_system_prompt(&[sample_match()]);
        assert!(prompt.contains("RUNBOOK KNOWLEDGE"));
        assert!(prompt.contains("unbounded cache growth"));
        assert!(prompt.contains("Action     : RESTART"));
        assert!(prompt.contains("similarity: 43.2%"));
    }

    #[test]
    fn test_incident_message_fields() {
        let signal = IncidentSignal {
            incident_id: "inc-1".to_string(),
            alert_type: "CPU Spike".to_string(),
            logs: String::new(),
            workload: Some("checkout-svc".to_string()),
            severity: None,
            timestamp: None,
        };
        let msg = build_incident_message(&signal, "cpu pegged", 2000);
        assert!(msg.contains("inc-1"));
        assert!(msg.contains("checkout-svc"));
        assert!(msg.contains("Severity    : UNKNOWN"));
        assert!(msg.contains("cpu pegged"));
    }

    #[test]
    fn test_plan_text_carries_the_proposal() {
        let signal = IncidentSignal {
            incident_id: "inc-2".to_string(),
            alert_type: "Memory Leak".to_string(),
            logs: String::new(),
            workload: None,
            severity: None,
            timestamp: None,
        };
        let diagnosis = Diagnosis {
            root_cause: "heap exhaustion".to_string(),
            action: ActionKind::ScaleUp,
            justification: "spread the load".to_string(),
            confidence: 0.9,
            replica_count: 3,
        };
        let plan = build_plan_text(&signal, &diagnosis);
        assert!(plan.contains("SCALE_UP"));
        assert!(plan.contains("Replica Count: 3"));
    }
}
