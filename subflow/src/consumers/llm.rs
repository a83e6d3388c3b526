//! Language model client.

use crate::errors::{Result, StageError, SubflowError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;
use tracing::debug;

/// Environment variable for [`LlmConfig::base_url`].
pub const BASE_URL_ENV: &str = "SUBFLOW_LLM_BASE_URL";
/// Environment variable for [`LlmConfig::api_key`].
pub const API_KEY_ENV: &str = "SUBFLOW_LLM_API_KEY";
/// Environment variable for [`LlmConfig::model`].
pub const MODEL_ENV: &str = "SUBFLOW_LLM_MODEL";

/// A model that answers a single prompt with text.
#[async_trait]
pub trait LanguageModel: Send + Sync + Debug {
    /// Sends `prompt` and returns the reply.
    ///
    /// # Errors
    ///
    /// Returns a [`StageError`] when the model cannot be reached or answers
    /// with something unusable.
    async fn ask(&self, prompt: &str) -> std::result::Result<String, StageError>;
}

/// Connection settings for an OpenAI-compatible chat endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Server root, with or without a trailing `/v1`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token. Empty means no `Authorization` header.
    #[serde(default)]
    pub api_key: String,
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Upper bound on generated tokens.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.0
}

fn default_timeout() -> f64 {
    60.0
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            timeout_seconds: default_timeout(),
        }
    }
}

impl LlmConfig {
    /// Reads the configuration from `SUBFLOW_LLM_*` variables.
    ///
    /// # Errors
    ///
    /// Returns [`SubflowError::Config`] if the API key is not set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup(API_KEY_ENV)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| SubflowError::Config(format!("{API_KEY_ENV} is not set")))?;
        let mut config = Self {
            api_key,
            ..Self::default()
        };
        if let Some(base_url) = lookup(BASE_URL_ENV) {
            config.base_url = base_url;
        }
        if let Some(model) = lookup(MODEL_ENV) {
            config.model = model;
        }
        Ok(config)
    }

    /// Sets the model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the server root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Returns the chat completions endpoint.
    #[must_use]
    pub fn completions_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/chat/completions")
        } else {
            format!("{base}/v1/chat/completions")
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Client for OpenAI-compatible `/v1/chat/completions` servers.
#[derive(Debug, Clone)]
pub struct OpenAiChatModel {
    config: LlmConfig,
    client: reqwest::Client,
}

impl OpenAiChatModel {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns [`SubflowError::Config`] if the HTTP client cannot be built.
    pub fn new(config: LlmConfig) -> Result<Self> {
        let timeout = Duration::try_from_secs_f64(config.timeout_seconds)
            .map_err(|e| SubflowError::Config(format!("timeout_seconds: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SubflowError::Config(format!("http client: {e}")))?;
        Ok(Self { config, client })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &LlmConfig {
        &self.config
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn ask(&self, prompt: &str) -> std::result::Result<String, StageError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let mut request = self.client.post(self.config.completions_url()).json(&body);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        debug!(model = %self.config.model, prompt_chars = prompt.len(), "asking model");
        let response = request
            .send()
            .await
            .map_err(|e| StageError::from_error("llm", e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(StageError::new(
                "llm",
                format!("HTTP {}: {}", status.as_u16(), detail.trim()),
            ));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| StageError::from_error("llm", e))?;
        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| StageError::new("llm", "model returned no content"))
    }
}
