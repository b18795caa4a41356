//! Warden Control - CLI client for the warden daemon.

mod cli;
mod client;
mod display;

use anyhow::{bail, Result};
use clap::Parser;
use warden_common::IncidentSignal;

use cli::{Cli, Commands};
use client::WardendClient;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = WardendClient::new(cli.addr.clone());

    match cli.command {
        Commands::Submit {
            id,
            alert,
            logs,
            workload,
            severity,
        } => {
            let signal = IncidentSignal {
                incident_id: id.unwrap_or_default(),
                alert_type: alert,
                logs,
                workload,
                severity,
                timestamp: Some(chrono::Utc::now().to_rfc3339()),
            };
            let run = client.submit(&signal).await?;
            println!("Incident accepted: {}", run.incident_id);
            display::print_run(&run);
            println!("\nFollow progress with: wardenctl status {}", run.incident_id);
        }

        Commands::Status { id, json } => {
            let run = client.status(&id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&run)?);
            } else {
                display::print_run(&run);
            }
        }

        Commands::List { json } => {
            let mut runs = client.list().await?;
            runs.sort_by(|a, b| a.incident_id.cmp(&b.incident_id));
            if json {
                println!("{}", serde_json::to_string_pretty(&runs)?);
            } else if runs.is_empty() {
                println!("No remediation runs recorded.");
            } else {
                for run in &runs {
                    display::print_run_summary(run);
                }
            }
        }

        Commands::Scale { direction, count } => {
            if direction != "up" && direction != "down" {
                bail!("direction must be 'up' or 'down'");
            }
            let outcome = client.scale(&direction, count).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }

        Commands::Runbook { json } => {
            let runbook = client.runbook().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&runbook)?);
            } else {
                display::print_runbook(&runbook);
            }
        }

        Commands::Retrieve { query } => {
            let result = client.retrieve(&query).await?;
            display::print_matches(&result.query, &result.matches);
        }

        Commands::Health => {
            let health = client.health().await?;
            display::print_health(&health);
        }
    }

    Ok(())
}
