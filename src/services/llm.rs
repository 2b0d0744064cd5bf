use crate::core::prompt::ScoringPrompt;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when talking to the language-model service
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Rate limited by upstream service")]
    RateLimited,

    #[error("API returned {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Unauthorized: invalid API key")]
    Unauthorized,

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

impl LlmError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::RequestError(e) => !e.is_builder(),
            LlmError::RateLimited | LlmError::Timeout(_) | LlmError::InvalidResponse(_) => true,
            LlmError::ApiError { status, .. } => *status >= 500,
            LlmError::Unauthorized => false,
        }
    }
}

/// One round trip to a language model: prompt in, raw reply text out
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &ScoringPrompt) -> Result<String, LlmError>;

    /// Whether the backend has what it needs (credentials, endpoint) to make calls
    fn is_configured(&self) -> bool {
        true
    }
}

/// Supported language-model providers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    OpenAi,
    Anthropic,
}

impl LlmProvider {
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "https://api.openai.com/v1",
            LlmProvider::Anthropic => "https://api.anthropic.com/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "gpt-4.1",
            LlmProvider::Anthropic => "claude-sonnet-4-5-20250929",
        }
    }

    /// Conventional environment variables for the key and model
    pub fn env_vars(&self) -> (&'static str, &'static str) {
        match self {
            LlmProvider::OpenAi => ("OPENAI_API_KEY", "OPENAI_MODEL"),
            LlmProvider::Anthropic => ("ANTHROPIC_API_KEY", "ANTHROPIC_MODEL"),
        }
    }
}

/// Connection parameters for a provider's API
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout: Duration,
}

impl BackendConfig {
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), path)
    }

    fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.endpoint.trim().is_empty()
    }
}

/// Build the backend for the configured provider
pub fn build_backend(
    provider: LlmProvider,
    config: BackendConfig,
) -> Result<Arc<dyn CompletionBackend>, LlmError> {
    Ok(match provider {
        LlmProvider::OpenAi => Arc::new(OpenAiBackend::new(config)?),
        LlmProvider::Anthropic => Arc::new(AnthropicBackend::new(config)?),
    })
}

fn http_client(config: &BackendConfig) -> Result<Client, LlmError> {
    Ok(Client::builder().timeout(config.request_timeout).build()?)
}

fn send_error(e: reqwest::Error, timeout: Duration) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout(timeout)
    } else {
        LlmError::RequestError(e)
    }
}

/// Map a non-2xx response onto an error
async fn check_status(response: Response) -> Result<Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Unauthorized,
        _ => {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read body".to_string());
            LlmError::ApiError {
                status: status.as_u16(),
                message,
            }
        }
    })
}

/// Chat completions client
///
/// Created once per process and shared by reference; never mutated after creation.
pub struct OpenAiBackend {
    config: BackendConfig,
    client: Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl OpenAiBackend {
    /// Create a new backend
    pub fn new(config: BackendConfig) -> Result<Self, LlmError> {
        let client = http_client(&config)?;
        Ok(Self { config, client })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn completions_url(&self) -> String {
        self.config.url("chat/completions")
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, prompt: &ScoringPrompt) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage { role: "system", content: &prompt.system },
                ChatMessage { role: "user", content: &prompt.user },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            response_format: ResponseFormat { kind: "json_object" },
        };

        tracing::trace!("Requesting score for speaker {}", prompt.speaker_id);

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(e, self.config.request_timeout))?;

        let parsed: ChatResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse completion: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| LlmError::InvalidResponse("Missing choices[0].message.content".into()))
    }

    fn is_configured(&self) -> bool {
        self.config.has_credentials()
    }
}

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Messages API client
pub struct AnthropicBackend {
    config: BackendConfig,
    client: Client,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicBackend {
    pub fn new(config: BackendConfig) -> Result<Self, LlmError> {
        let client = http_client(&config)?;
        Ok(Self { config, client })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn messages_url(&self) -> String {
        self.config.url("messages")
    }
}

#[async_trait]
impl CompletionBackend for AnthropicBackend {
    async fn complete(&self, prompt: &ScoringPrompt) -> Result<String, LlmError> {
        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            system: &prompt.system,
            messages: [ChatMessage { role: "user", content: &prompt.user }],
        };

        tracing::trace!("Requesting score for speaker {}", prompt.speaker_id);

        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(e, self.config.request_timeout))?;

        let parsed: MessagesResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse message: {}", e)))?;

        // First text block; the reply carries no tool use
        parsed
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| LlmError::InvalidResponse("Missing text content block".into()))
    }

    fn is_configured(&self) -> bool {
        self.config.has_credentials()
    }
}
