use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::CompletionConfig;
use crate::prompt::CompletionRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchErrorKind {
    RateLimit,
    Authentication,
    Connectivity,
    Unknown,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("connection failed: {0}")]
    Connectivity(String),
    #[error("{0}")]
    Unknown(String),
}

impl DispatchError {
    pub fn kind(&self) -> DispatchErrorKind {
        match self {
            DispatchError::RateLimited(_) => DispatchErrorKind::RateLimit,
            DispatchError::Authentication(_) => DispatchErrorKind::Authentication,
            DispatchError::Connectivity(_) => DispatchErrorKind::Connectivity,
            DispatchError::Unknown(_) => DispatchErrorKind::Unknown,
        }
    }

    /// Whether the same request may succeed if the caller tries again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::RateLimited(_) | DispatchError::Connectivity(_)
        )
    }

    pub fn detail(&self) -> &str {
        match self {
            DispatchError::RateLimited(detail)
            | DispatchError::Authentication(detail)
            | DispatchError::Connectivity(detail)
            | DispatchError::Unknown(detail) => detail,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionReply {
    pub content: String,
    pub model: Option<String>,
}

/// A hosted chat-completion service. One call sends exactly one request.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn dispatch(
        &self,
        request: &CompletionRequest,
        api_key: &str,
    ) -> Result<CompletionReply, DispatchError>;
}

/// Client for an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct OpenAiClient {
    server_url: String,
    client: Client,
}

impl OpenAiClient {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        info!("Using completion service at: {}", config.base_url);
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            server_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    async fn dispatch(
        &self,
        request: &CompletionRequest,
        api_key: &str,
    ) -> Result<CompletionReply, DispatchError> {
        let url = format!("{}/v1/chat/completions", self.server_url);
        let params = &request.params;

        let payload = json!({
            "model": params.model,
            "messages": request.messages,
            "max_tokens": params.max_output_tokens,
            "temperature": params.temperature,
        });

        info!(
            "Sending {} messages to {} with max_tokens: {}",
            request.messages.len(),
            params.model,
            params.max_output_tokens
        );
        debug!("Payload: {}", payload);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!("Completion request failed with {}: {}", status, error_text);
            return Err(classify_status(status, &error_text));
        }

        let response_json: Value = response.json().await.map_err(classify_transport)?;
        debug!("Response JSON: {}", response_json);

        let content = response_json
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .ok_or_else(|| {
                DispatchError::Unknown("Failed to extract content from response".to_string())
            })?;

        info!("Response length: {} characters", content.len());
        Ok(CompletionReply {
            content: content.to_string(),
            model: response_json
                .get("model")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// Maps a non-success HTTP status (and its body) onto a [`DispatchError`].
pub fn classify_status(status: StatusCode, body: &str) -> DispatchError {
    let detail = format!("HTTP {}: {}", status, body.trim());
    let lowered = body.to_lowercase();

    if status == StatusCode::TOO_MANY_REQUESTS
        || lowered.contains("insufficient_quota")
        || lowered.contains("rate_limit")
    {
        DispatchError::RateLimited(detail)
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        DispatchError::Authentication(detail)
    } else if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        DispatchError::Connectivity(detail)
    } else {
        DispatchError::Unknown(detail)
    }
}

fn classify_transport(err: reqwest::Error) -> DispatchError {
    if err.is_timeout() {
        DispatchError::Connectivity(format!("request timed out: {}", err))
    } else if err.is_connect() {
        DispatchError::Connectivity(err.to_string())
    } else {
        DispatchError::Unknown(err.to_string())
    }
}
