//! Configuration management for wardend.
//!
//! Loads settings from /etc/warden/config.toml or uses defaults. Every field
//! has a serde default so a partial (or missing) file still yields a fully
//! usable configuration.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/warden/config.toml";

/// Model backend configuration: a primary chat-completion endpoint and a
/// local fallback, both speaking the OpenAI-compatible wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Primary endpoint base URL (hosted router).
    #[serde(default = "default_primary_base_url")]
    pub primary_base_url: String,

    /// Primary model identifier.
    #[serde(default = "default_primary_model")]
    pub primary_model: String,

    /// API key for the primary endpoint. Usually supplied via the
    /// WARDEN_PRIMARY_API_KEY environment variable rather than the file.
    #[serde(default)]
    pub primary_api_key: String,

    /// Fallback endpoint base URL (local Ollama, OpenAI-compatible route).
    #[serde(default = "default_fallback_base_url")]
    pub fallback_base_url: String,

    /// Fallback model identifier.
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,

    /// Per-call timeout in seconds. A primary call is abandoned after this
    /// and control passes to the fallback.
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,

    /// Maximum raw-log characters forwarded to the model. Logs are cut to
    /// the LAST this-many characters before leaving the process.
    #[serde(default = "default_log_truncate_chars")]
    pub log_truncate_chars: usize,
}

fn default_primary_base_url() -> String {
    "https://go.fastrouter.ai/api/v1".to_string()
}

fn default_primary_model() -> String {
    "anthropic/claude-sonnet-4-20250514".to_string()
}

fn default_fallback_base_url() -> String {
    "http://127.0.0.1:11434/v1".to_string()
}

fn default_fallback_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_model_timeout() -> u64 {
    60
}

fn default_log_truncate_chars() -> usize {
    2000
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            primary_base_url: default_primary_base_url(),
            primary_model: default_primary_model(),
            primary_api_key: String::new(),
            fallback_base_url: default_fallback_base_url(),
            fallback_model: default_fallback_model(),
            timeout_secs: default_model_timeout(),
            log_truncate_chars: default_log_truncate_chars(),
        }
    }
}

/// Runtime driver configuration: which workload we remediate and how far
/// scaling may go.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// The workload warden watches and remediates.
    #[serde(default = "default_target_workload")]
    pub target_workload: String,

    /// Container network replicas are attached to.
    #[serde(default = "default_network")]
    pub network: String,

    /// Hard ceiling on replicas spawned by one scale-up.
    #[serde(default = "default_max_replicas")]
    pub max_replicas: u32,

    /// Load-balancer container whose upstream set gets rewritten on scaling.
    #[serde(default = "default_lb_container")]
    pub lb_container: String,

    /// Port the workload serves on, used when rendering upstream entries.
    #[serde(default = "default_workload_port")]
    pub workload_port: u16,
}

fn default_target_workload() -> String {
    "target-app".to_string()
}

fn default_network() -> String {
    "warden-network".to_string()
}

fn default_max_replicas() -> u32 {
    5
}

fn default_lb_container() -> String {
    "warden-lb".to_string()
}

fn default_workload_port() -> u16 {
    8000
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            target_workload: default_target_workload(),
            network: default_network(),
            max_replicas: default_max_replicas(),
            lb_container: default_lb_container(),
            workload_port: default_workload_port(),
        }
    }
}

/// Health verification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Health endpoint polled after an action. Defaults to the target
    /// workload's /health route.
    #[serde(default = "default_health_url")]
    pub health_url: String,

    /// Number of poll attempts before giving up.
    #[serde(default = "default_verify_retries")]
    pub retries: u32,

    /// Seconds slept before each attempt.
    #[serde(default = "default_verify_delay")]
    pub delay_secs: u64,

    /// Per-attempt request timeout in seconds.
    #[serde(default = "default_health_timeout")]
    pub timeout_secs: u64,
}

fn default_health_url() -> String {
    "http://target-app:8000/health".to_string()
}

fn default_verify_retries() -> u32 {
    3
}

fn default_verify_delay() -> u64 {
    5
}

fn default_health_timeout() -> u64 {
    5
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            health_url: default_health_url(),
            retries: default_verify_retries(),
            delay_secs: default_verify_delay(),
            timeout_secs: default_health_timeout(),
        }
    }
}

/// Similarity retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// How many precedents get injected into the diagnosis prompt.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum cosine similarity for a precedent to count as a match.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,
}

fn default_top_k() -> usize {
    2
}

fn default_min_similarity() -> f64 {
    0.05
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_similarity: default_min_similarity(),
        }
    }
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WardenConfig {
    /// Address the HTTP server binds. Localhost only by default.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Runbook corpus location.
    #[serde(default = "default_runbook_path")]
    pub runbook_path: String,

    /// Optional notification webhook (Slack-compatible). Empty disables
    /// notifications entirely.
    #[serde(default)]
    pub notify_webhook_url: String,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub verify: VerifyConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

fn default_listen_addr() -> String {
    "127.0.0.1:7810".to_string()
}

fn default_runbook_path() -> String {
    "/var/lib/warden/runbook.json".to_string()
}

impl WardenConfig {
    /// Load config from the given path, falling back to defaults when the
    /// file is missing or unreadable. A malformed file is an error: silently
    /// remediating with half-read settings is worse than refusing to start.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::load_defaults());
        }

        let raw = fs::read_to_string(path)?;
        let mut config: WardenConfig = toml::from_str(&raw)?;
        config.apply_env_overrides();
        info!("Config loaded from {}", path.display());
        Ok(config)
    }

    fn load_defaults() -> Self {
        let mut config = Self {
            listen_addr: default_listen_addr(),
            runbook_path: default_runbook_path(),
            notify_webhook_url: String::new(),
            model: ModelConfig::default(),
            runtime: RuntimeConfig::default(),
            verify: VerifyConfig::default(),
            retrieval: RetrievalConfig::default(),
        };
        config.apply_env_overrides();
        config
    }

    /// The primary API key is secret material and comes from the environment
    /// when present, overriding whatever the file says.
    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("WARDEN_PRIMARY_API_KEY") {
            if !key.is_empty() {
                self.model.primary_api_key = key;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: WardenConfig = toml::from_str("").unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:7810");
        assert_eq!(config.retrieval.top_k, 2);
        assert_eq!(config.retrieval.min_similarity, 0.05);
        assert_eq!(config.verify.retries, 3);
        assert_eq!(config.verify.delay_secs, 5);
        assert_eq!(config.runtime.max_replicas, 5);
        assert_eq!(config.model.log_truncate_chars, 2000);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config: WardenConfig = toml::from_str(
            r#"
            listen_addr = "0.0.0.0:9000"

            [runtime]
            target_workload = "checkout-svc"
            "#,
        )
        .unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.runtime.target_workload, "checkout-svc");
        assert_eq!(config.runtime.max_replicas, 5);
        assert_eq!(config.model.timeout_secs, 60);
    }
}
