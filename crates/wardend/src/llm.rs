//! Model backend: OpenAI-compatible chat completion with a primary endpoint
//! and a one-shot local fallback.
//!
//! The fallback IS the timeout policy: a primary call that times out or
//! errors is abandoned, never retried, and the same prompt goes to the
//! fallback endpoint exactly once. Both failing surfaces both errors so the
//! run can name each one.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::ModelConfig;

/// Sampling temperature for all remediation calls. Low on purpose: we want
/// reproducible diagnoses, not creative ones.
const TEMPERATURE: f64 = 0.2;

/// Chunk size used when a failed stream degrades to a one-shot completion
/// replayed to the subscriber.
const REPLAY_CHUNK_CHARS: usize = 16;

/// Raised when the primary and the fallback endpoint both failed.
#[derive(Debug, Error)]
#[error("both model endpoints failed: primary: {primary}; fallback: {fallback}")]
pub struct BackendExhausted {
    pub primary: String,
    pub fallback: String,
}

/// The outbound chat-completion seam. The orchestrator owns one of these and
/// passes it down; tests substitute fakes.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// One system+user exchange, returning the raw response text.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;

    /// Streaming variant for live progress display. Fragments are forwarded
    /// as they arrive; output is advisory only and never parsed.
    async fn complete_stream(
        &self,
        system: &str,
        user: &str,
        tx: mpsc::Sender<String>,
    ) -> Result<()>;
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

// ============================================================================
// HTTP BACKEND
// ============================================================================

#[derive(Debug, Clone)]
struct ChatEndpoint {
    label: &'static str,
    base_url: String,
    model: String,
    api_key: String,
}

impl ChatEndpoint {
    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Chat client over two OpenAI-compatible endpoints.
pub struct HttpModelBackend {
    http_client: reqwest::Client,
    primary: ChatEndpoint,
    fallback: ChatEndpoint,
}

impl HttpModelBackend {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            primary: ChatEndpoint {
                label: "primary",
                base_url: config.primary_base_url.clone(),
                model: config.primary_model.clone(),
                api_key: config.primary_api_key.clone(),
            },
            fallback: ChatEndpoint {
                label: "fallback",
                base_url: config.fallback_base_url.clone(),
                model: config.fallback_model.clone(),
                api_key: "ollama".to_string(),
            },
        }
    }

    fn request_body(endpoint: &ChatEndpoint, system: &str, user: &str, stream: bool) -> ChatRequest {
        ChatRequest {
            model: endpoint.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user.to_string(),
                },
            ],
            temperature: TEMPERATURE,
            stream,
        }
    }

    async fn call_endpoint(&self, endpoint: &ChatEndpoint, system: &str, user: &str) -> Result<String> {
        let body = Self::request_body(endpoint, system, user, false);

        info!(
            "Model call [{} {}] ({} system chars, {} user chars)",
            endpoint.label,
            endpoint.model,
            system.len(),
            user.len()
        );

        let mut request = self.http_client.post(endpoint.completions_url()).json(&body);
        if !endpoint.api_key.is_empty() {
            request = request.bearer_auth(&endpoint.api_key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("request to {} endpoint failed", endpoint.label))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("{} endpoint returned {}: {}", endpoint.label, status, error_text);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .with_context(|| format!("{} endpoint returned malformed JSON", endpoint.label))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        Ok(content.trim().to_string())
    }

    async fn stream_endpoint(
        &self,
        endpoint: &ChatEndpoint,
        system: &str,
        user: &str,
        tx: &mpsc::Sender<String>,
    ) -> Result<()> {
        let body = Self::request_body(endpoint, system, user, true);

        let mut request = self.http_client.post(endpoint.completions_url()).json(&body);
        if !endpoint.api_key.is_empty() {
            request = request.bearer_auth(&endpoint.api_key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("stream request to {} endpoint failed", endpoint.label))?;

        if !response.status().is_success() {
            anyhow::bail!(
                "{} endpoint returned {} for stream",
                endpoint.label,
                response.status()
            );
        }

        let mut byte_stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.context("stream transport error")?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            // SSE frames are newline-delimited `data: {...}` lines.
            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim().to_string();
                buffer.drain(..=pos);

                let Some(payload) = line.strip_prefix("data:").map(str::trim) else {
                    continue;
                };
                if payload == "[DONE]" {
                    return Ok(());
                }
                if let Ok(parsed) = serde_json::from_str::<StreamChunk>(payload) {
                    if let Some(content) = parsed
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.delta.content)
                    {
                        if !content.is_empty() && tx.send(content).await.is_err() {
                            // Subscriber dropped; streaming is advisory, stop quietly.
                            return Ok(());
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ModelBackend for HttpModelBackend {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let primary_err = match self.call_endpoint(&self.primary, system, user).await {
            Ok(text) => return Ok(text),
            Err(e) => {
                warn!("Primary model endpoint failed: {:#} - trying fallback", e);
                e
            }
        };

        match self.call_endpoint(&self.fallback, system, user).await {
            Ok(text) => Ok(text),
            Err(fallback_err) => Err(BackendExhausted {
                primary: format!("{primary_err:#}"),
                fallback: format!("{fallback_err:#}"),
            }
            .into()),
        }
    }

    async fn complete_stream(
        &self,
        system: &str,
        user: &str,
        tx: mpsc::Sender<String>,
    ) -> Result<()> {
        if let Err(e) = self.stream_endpoint(&self.primary, system, user, &tx).await {
            warn!("Streaming failed: {:#} - replaying one-shot completion", e);
            let full = self.complete(system, user).await?;
            let chars: Vec<char> = full.chars().collect();
            for chunk in chars.chunks(REPLAY_CHUNK_CHARS) {
                if tx.send(chunk.iter().collect()).await.is_err() {
                    break;
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// RESPONSE CLEANUP
// ============================================================================

/// Strip an optional markdown code fence from a model response so the
/// remainder can be parsed as strict JSON.
pub fn strip_code_fence(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    // Drop the opening fence line (which may carry a language tag) and
    // everything from the closing fence on.
    let after_open = match trimmed.split_once('\n') {
        Some((_, rest)) => rest,
        None => return trimmed.to_string(),
    };
    match after_open.rsplit_once("```") {
        Some((body, _)) => body.trim().to_string(),
        None => after_open.trim().to_string(),
    }
}
