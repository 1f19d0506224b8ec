//! Completion client boundary.
//!
//! Agents talk to a language model only through [`CompletionClient`]. The
//! client is passed in explicitly (`Arc<dyn CompletionClient>`), so tests
//! substitute a scripted implementation and production uses
//! [`OpenAiCompatClient`] against any OpenAI-compatible `/chat/completions`
//! endpoint.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use coordination::{classify_message, AgentRole, FailureClass, Retryable, TokenUsage};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::EndpointConfig;

/// One chat message in a completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// A request issued on behalf of one agent role.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Agent issuing the call. Used for logging and by test doubles.
    pub role: AgentRole,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

/// Model output plus the token counts the endpoint reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResponse {
    pub text: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl CompletionResponse {
    pub fn usage(&self) -> TokenUsage {
        TokenUsage::new(self.prompt_tokens, self.completion_tokens)
    }
}

/// Failures from a completion call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    /// The endpoint is throttling us. Always retried once.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The endpoint rejected the request itself.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Network, server-side or response decoding failure.
    #[error("Transport failure: {0}")]
    Transport(String),
}

impl Retryable for CompletionError {
    fn failure_class(&self) -> FailureClass {
        match self {
            Self::RateLimited(_) => FailureClass::Transient,
            other => classify_message(&other.to_string()),
        }
    }
}

/// Anything that can turn a chat request into text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError>;
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionReply {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// reqwest-backed client for OpenAI-compatible endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatClient {
    pub fn new(endpoint: &EndpointConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(endpoint.timeout())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            api_key: endpoint.api_key.clone(),
            model: endpoint.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe `{base_url}/models`; `true` when the endpoint answers 2xx.
    pub async fn check_endpoint(&self) -> bool {
        let mut request = self
            .http
            .get(format!("{}/models", self.base_url))
            .timeout(Duration::from_secs(5));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        match request.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatClient {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        let body = ChatCompletionBody {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
        };

        let mut builder = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_status(status, &text));
        }

        let reply: ChatCompletionReply = response
            .json()
            .await
            .map_err(|e| CompletionError::Transport(format!("decoding response: {e}")))?;

        let text = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CompletionError::Transport("response contained no message".into()))?;
        let (prompt_tokens, completion_tokens) = reply
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        debug!(
            role = %request.role,
            model = %self.model,
            prompt_tokens,
            completion_tokens,
            "Completion received"
        );

        Ok(CompletionResponse {
            text,
            prompt_tokens,
            completion_tokens,
        })
    }
}

fn map_status(status: reqwest::StatusCode, body: &str) -> CompletionError {
    let detail = format!("HTTP {status}: {body}");
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        CompletionError::RateLimited(detail)
    } else if status.is_client_error() {
        CompletionError::InvalidRequest(detail)
    } else {
        CompletionError::Transport(detail)
    }
}
