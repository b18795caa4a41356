//! HTTP protocol schemas shared between wardend and wardenctl.

use serde::{Deserialize, Serialize};

use crate::types::{Precedent, PrecedentMatch};

/// Body of `POST /v1/scale` - operator-triggered scaling that bypasses
/// diagnosis and council review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualScaleRequest {
    pub direction: ScaleDirection,
    #[serde(default = "default_scale_count")]
    pub count: u32,
}

fn default_scale_count() -> u32 {
    2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleDirection {
    #[serde(rename = "up")]
    Up,
    #[serde(rename = "down")]
    Down,
}

/// Response of `POST /v1/scale` for the down direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleDownResponse {
    pub removed: Vec<String>,
}

/// Response of `GET /v1/runbook`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunbookResponse {
    pub entries: Vec<Precedent>,
    pub total: usize,
}

/// Response of `GET /v1/retrieval/test`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalTestResponse {
    pub query: String,
    pub matches: Vec<PrecedentMatch>,
    pub count: usize,
}

/// Response of `GET /v1/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonHealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub live_clients: usize,
    pub runs_tracked: usize,
}
