//! HTTP client for communicating with wardend.

use anyhow::{anyhow, Result};
use serde_json::json;
use warden_common::{
    DaemonHealthResponse, IncidentSignal, RetrievalTestResponse, RunResult, RunbookResponse,
};

/// Default daemon address, matching wardend's default listen address.
pub const DEFAULT_ADDR: &str = "http://127.0.0.1:7810";

pub struct WardendClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl WardendClient {
    /// Build a client from the --addr flag, $WARDEN_ADDR, or the default.
    pub fn new(addr: Option<String>) -> Self {
        let base_url = addr
            .or_else(|| std::env::var("WARDEN_ADDR").ok())
            .unwrap_or_else(|| DEFAULT_ADDR.to_string());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(anyhow!("daemon returned {}: {}", status, body))
    }

    fn connect_hint(e: reqwest::Error, base_url: &str) -> anyhow::Error {
        anyhow!(
            "Cannot reach the warden daemon at {}: {}\n\n\
             Is wardend running? Start it with:\n\
             systemctl start wardend\n\
             or set WARDEN_ADDR if it listens elsewhere.",
            base_url,
            e
        )
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http_client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| Self::connect_hint(e, &self.base_url))?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn submit(&self, signal: &IncidentSignal) -> Result<RunResult> {
        let response = self
            .http_client
            .post(self.url("/v1/incident"))
            .json(signal)
            .send()
            .await
            .map_err(|e| Self::connect_hint(e, &self.base_url))?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn status(&self, incident_id: &str) -> Result<RunResult> {
        self.get_json(&format!("/v1/incident/{incident_id}")).await
    }

    pub async fn list(&self) -> Result<Vec<RunResult>> {
        self.get_json("/v1/incidents").await
    }

    pub async fn scale(&self, direction: &str, count: u32) -> Result<serde_json::Value> {
        let response = self
            .http_client
            .post(self.url("/v1/scale"))
            .json(&json!({ "direction": direction, "count": count }))
            .send()
            .await
            .map_err(|e| Self::connect_hint(e, &self.base_url))?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn runbook(&self) -> Result<RunbookResponse> {
        self.get_json("/v1/runbook").await
    }

    pub async fn retrieve(&self, query: &str) -> Result<RetrievalTestResponse> {
        let response = self
            .http_client
            .get(self.url("/v1/retrieval/test"))
            .query(&[("query", query)])
            .send()
            .await
            .map_err(|e| Self::connect_hint(e, &self.base_url))?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn health(&self) -> Result<DaemonHealthResponse> {
        self.get_json("/v1/health").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_addr_used_without_overrides() {
        let client = WardendClient::new(None);
        // Either the env override or the default, never empty.
        assert!(client.base_url.starts_with("http"));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let client = WardendClient::new(Some("http://10.0.0.5:7810/".to_string()));
        assert_eq!(client.url("/v1/health"), "http://10.0.0.5:7810/v1/health");
    }
}
