//! Upstream provider client
//!
//! Thin reqwest wrapper around the OpenAI-compatible upstream's
//! `/chat/completions` endpoint. Streaming is never requested; the gateway
//! needs the full usage block to bill the call.

use crate::config::UpstreamConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors from one upstream call, split by how the gateway answers them:
/// timeouts become 408, provider errors are mirrored, transport failures
/// become 500.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request timed out after {0} seconds")]
    Timeout(u64),

    #[error("upstream returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("upstream transport error: {0}")]
    Transport(String),

    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),
}

/// Request body forwarded upstream. Built by the handler after validation,
/// with defaults already applied.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamChatRequest {
    pub model: String,
    pub messages: Vec<UpstreamMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamMessage {
    pub role: String,
    pub content: String,
}

/// Completion response as the upstream reports it. The usage block is
/// optional; some providers omit it and the gateway falls back to its own
/// estimates.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamChatResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub choices: Vec<UpstreamChoice>,
    #[serde(default)]
    pub usage: Option<UpstreamUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamChoice {
    #[serde(default)]
    pub index: u32,
    pub message: UpstreamMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct UpstreamUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Error payload shape most OpenAI-compatible providers use.
#[derive(Debug, Deserialize)]
struct UpstreamErrorBody {
    error: UpstreamErrorDetail,
}

#[derive(Debug, Deserialize)]
struct UpstreamErrorDetail {
    message: String,
}

/// HTTP client for the configured upstream provider.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout_seconds: u64,
}

impl UpstreamClient {
    /// Build a client from config. Returns an error only if reqwest cannot
    /// construct its connection pool.
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key(),
            timeout_seconds: config.timeout_seconds,
        })
    }

    /// POST one non-streaming chat completion and decode the response.
    pub async fn chat_completion(
        &self,
        request: &UpstreamChatRequest,
    ) -> Result<UpstreamChatResponse, UpstreamError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut builder = self.client.post(&url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.header("authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout(self.timeout_seconds)
            } else {
                UpstreamError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            // Surface the provider's own message when the body parses
            let message = serde_json::from_str::<UpstreamErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let completion: UpstreamChatResponse = response.json().await.map_err(|e| {
            UpstreamError::InvalidResponse(format!("Failed to parse completion response: {}", e))
        })?;

        Ok(completion)
    }
}
