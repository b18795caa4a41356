//! Human-readable output for remediation runs and retrieval results.

use console::style;
use owo_colors::OwoColorize;
use warden_common::{
    DaemonHealthResponse, PrecedentMatch, RunResult, RunStatus, RunbookResponse,
};

fn status_label(status: RunStatus) -> String {
    match status {
        RunStatus::Resolved => status.as_str().green().bold().to_string(),
        RunStatus::Failed => status.as_str().red().bold().to_string(),
        RunStatus::Received => status.as_str().dimmed().to_string(),
        _ => status.as_str().yellow().to_string(),
    }
}

/// One-line summary per run, for `wardenctl list`.
pub fn print_run_summary(run: &RunResult) {
    println!(
        "{}  {}  {}",
        run.incident_id.bold(),
        status_label(run.status),
        run.alert_type
    );
}

/// Full run detail with diagnosis, council votes, and the timeline.
pub fn print_run(run: &RunResult) {
    println!("{} {}", "Incident".bold(), run.incident_id.bold());
    println!("  Alert type : {}", run.alert_type);
    println!("  Status     : {}", status_label(run.status));
    if let Some(resolved_at) = &run.resolved_at {
        println!("  Resolved   : {}", resolved_at.to_rfc3339());
    }
    if run.replicas_spawned > 0 {
        println!("  Replicas   : {}", run.replicas_spawned);
    }
    if let Some(error) = &run.error {
        println!("  Error      : {}", error.red());
    }

    if let Some(d) = &run.diagnosis {
        println!("\n{}", "Diagnosis".bold());
        println!("  Root cause : {}", d.root_cause);
        println!(
            "  Action     : {} (confidence {:.0}%)",
            d.action.as_str().cyan(),
            d.confidence * 100.0
        );
        println!("  Reason     : {}", d.justification);
    }

    if let Some(c) = &run.decision {
        println!("\n{}", "Council".bold());
        for vote in &c.votes {
            println!(
                "  {} {} - {}",
                vote.role.as_str().bold(),
                vote.verdict.as_str(),
                style(&vote.reasoning).dim()
            );
        }
        println!("  {}", c.summary);
    }

    if !run.timeline.is_empty() {
        println!("\n{}", "Timeline".bold());
        for entry in &run.timeline {
            println!(
                "  {} {:16} {}",
                style(entry.ts.format("%H:%M:%S").to_string()).dim(),
                entry.stage,
                entry.message
            );
        }
    }
}

pub fn print_matches(query: &str, matches: &[PrecedentMatch]) {
    println!("{} {}", "Query:".bold(), query);
    if matches.is_empty() {
        println!("  No precedents above the similarity threshold.");
        return;
    }
    for (i, m) in matches.iter().enumerate() {
        println!(
            "\n{} {} (similarity {:.1}%)",
            format!("#{}", i + 1).bold(),
            m.incident_id,
            m.similarity * 100.0
        );
        println!("  Alert type : {}", m.alert_type);
        println!("  Root cause : {}", m.root_cause);
        println!("  Action     : {}", m.action.cyan());
        println!("  Snippet    : {}", style(&m.log_snippet).dim());
    }
}

pub fn print_runbook(runbook: &RunbookResponse) {
    println!(
        "{} ({} entries)",
        "Runbook corpus".bold(),
        runbook.total
    );
    for entry in &runbook.entries {
        println!(
            "  {}  {:12}  {}  {}",
            entry.incident_id.bold(),
            entry.action.cyan().to_string(),
            entry.alert_type,
            style(&entry.root_cause).dim()
        );
    }
}

pub fn print_health(health: &DaemonHealthResponse) {
    println!("{} {}", "wardend".bold(), health.status.green());
    println!("  Version      : {}", health.version);
    println!("  Uptime       : {}s", health.uptime_seconds);
    println!("  Live clients : {}", health.live_clients);
    println!("  Runs tracked : {}", health.runs_tracked);
}
