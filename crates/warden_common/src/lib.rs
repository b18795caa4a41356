//! Warden Common - Shared types and schemas for the warden daemon and CLI.
//!
//! Everything that crosses the wire between `wardend` and `wardenctl` lives
//! here: incident payloads, diagnoses, council votes, run results, runbook
//! precedents, live-channel frames, and the HTTP protocol schemas.

pub mod protocol;
pub mod types;

pub use protocol::*;
pub use types::*;

/// Crate version, shared by daemon and CLI for health reporting.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
