//! CLI - command-line argument parsing for wardenctl.
//!
//! Keeps argument parsing separate from execution logic.

use clap::{Parser, Subcommand};

/// Warden CLI
#[derive(Parser)]
#[command(name = "wardenctl")]
#[command(about = "Warden - autonomous incident remediation", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Daemon base URL (overrides $WARDEN_ADDR and the default)
    #[arg(long, global = true)]
    pub addr: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit an incident for remediation
    Submit {
        /// Incident id (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Alert category, e.g. "Memory Leak"
        #[arg(long)]
        alert: String,

        /// Raw log snippet
        #[arg(long, default_value = "")]
        logs: String,

        /// Affected workload name
        #[arg(long)]
        workload: Option<String>,

        /// Severity label
        #[arg(long)]
        severity: Option<String>,
    },

    /// Show one remediation run by incident id
    Status {
        /// Incident id
        id: String,

        /// Output JSON only
        #[arg(long)]
        json: bool,
    },

    /// List all known remediation runs
    List {
        /// Output JSON only
        #[arg(long)]
        json: bool,
    },

    /// Manually scale the target workload, bypassing diagnosis and council
    Scale {
        /// Direction: up or down
        direction: String,

        /// Replica count for scaling up
        #[arg(long, default_value_t = 2)]
        count: u32,
    },

    /// Dump the runbook corpus
    Runbook {
        /// Output JSON only
        #[arg(long)]
        json: bool,
    },

    /// Test precedent retrieval against arbitrary query text
    Retrieve {
        /// Query text
        query: String,
    },

    /// Show daemon health
    Health,
}
