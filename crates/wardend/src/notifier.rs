//! Notification sink - fire-and-forget status messages to a webhook.
//!
//! Notifications are advisory: every failure path here logs and returns,
//! nothing propagates into the remediation run.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::{info, warn};
use warden_common::{CouncilDecision, Diagnosis, IncidentSignal, RunStatus};

pub struct Notifier {
    webhook_url: String,
    http_client: reqwest::Client,
}

impl Notifier {
    pub fn new(webhook_url: &str) -> Self {
        Self {
            webhook_url: webhook_url.to_string(),
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn enabled(&self) -> bool {
        !self.webhook_url.is_empty()
    }

    /// Post a status update. Failures are swallowed.
    pub async fn notify(
        &self,
        signal: &IncidentSignal,
        status: RunStatus,
        diagnosis: Option<&Diagnosis>,
        decision: Option<&CouncilDecision>,
        error: Option<&str>,
    ) {
        if !self.enabled() {
            return;
        }

        let payload = build_payload(signal, status, diagnosis, decision, error);

        match self.http_client.post(&self.webhook_url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("Notification sent -> {}", status.as_str());
            }
            Ok(resp) => warn!("Notification webhook returned {}", resp.status()),
            Err(e) => warn!("Notification failed (non-fatal): {}", e),
        }
    }
}

fn build_payload(
    signal: &IncidentSignal,
    status: RunStatus,
    diagnosis: Option<&Diagnosis>,
    decision: Option<&CouncilDecision>,
    error: Option<&str>,
) -> Value {
    let mut blocks = vec![
        json!({
            "type": "header",
            "text": {
                "type": "plain_text",
                "text": format!("Warden - {}", status.as_str()),
            },
        }),
        json!({
            "type": "section",
            "fields": [
                {"type": "mrkdwn", "text": format!("*Incident:*\n`{}`", signal.incident_id)},
                {"type": "mrkdwn", "text": format!("*Alert Type:*\n{}", signal.alert_type)},
            ],
        }),
    ];

    if let Some(d) = diagnosis {
        blocks.push(json!({
            "type": "section",
            "fields": [
                {"type": "mrkdwn", "text": format!("*Root Cause:*\n{}", d.root_cause)},
                {"type": "mrkdwn", "text": format!("*Action:*\n`{}` (conf: {:.0}%)", d.action, d.confidence * 100.0)},
            ],
        }));
    }

    if let Some(c) = decision {
        let vote_text = c
            .votes
            .iter()
            .map(|v| {
                let reasoning = crate::retrieval::truncate_chars(&v.reasoning, 80);
                format!("- *{}*: {} - _{}_", v.role.as_str(), v.verdict.as_str(), reasoning)
            })
            .collect::<Vec<_>>()
            .join("\n");
        blocks.push(json!({
            "type": "section",
            "text": {"type": "mrkdwn", "text": format!("*Council Votes:*\n{vote_text}")},
        }));
        blocks.push(json!({
            "type": "section",
            "text": {"type": "mrkdwn", "text": format!("*Final Verdict:* `{}` | {}", c.final_verdict.as_str(), c.summary)},
        }));
    }

    if let Some(err) = error {
        blocks.push(json!({
            "type": "section",
            "text": {"type": "mrkdwn", "text": format!("*Error:*\n```{err}```")},
        }));
    }

    blocks.push(json!({"type": "divider"}));
    json!({ "blocks": blocks })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal() -> IncidentSignal {
        IncidentSignal {
            incident_id: "inc-1".to_string(),
            alert_type: "Memory Leak".to_string(),
            logs: String::new(),
            workload: None,
            severity: None,
            timestamp: None,
        }
    }

    #[test]
    fn test_disabled_without_url() {
        assert!(!Notifier::new("").enabled());
        assert!(Notifier::new("https://hooks.example/x").enabled());
    }

    #[test]
    fn test_payload_contains_incident_fields() {
        let payload = build_payload(&signal(), RunStatus::Resolved, None, None, None);
        let text = payload.to_string();
        assert!(text.contains("inc-1"));
        assert!(text.contains("RESOLVED"));
    }

    #[test]
    fn test_payload_includes_error_block() {
        let payload = build_payload(
            &signal(),
            RunStatus::Failed,
            None,
            None,
            Some("health check failed"),
        );
        assert!(payload.to_string().contains("health check failed"));
    }

    #[tokio::test]
    async fn test_notify_without_url_is_a_quiet_noop() {
        let notifier = Notifier::new("");
        notifier
            .notify(&signal(), RunStatus::Received, None, None, None)
            .await;
    }
}
