use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use avgpay_core::defaults::{LLM_MAX_TOKENS, LLM_TEMPERATURE, LLM_TIMEOUT_SECS};
use avgpay_core::{Error, GenerationBackend, Result};

use super::types::*;

/// Default Anthropic API endpoint.
pub const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com";

/// Value of the `anthropic-version` header.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-latest";

/// Configuration for the Anthropic backend.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ANTHROPIC_URL.to_string(),
            api_key: None,
            model: DEFAULT_ANTHROPIC_MODEL.to_string(),
            max_tokens: LLM_MAX_TOKENS,
            temperature: LLM_TEMPERATURE,
            timeout_seconds: LLM_TIMEOUT_SECS,
        }
    }
}

impl AnthropicConfig {
    /// Load from `ANTHROPIC_API_KEY`, `ANTHROPIC_BASE_URL`, `LLM_TIMEOUT_SECS`
    /// and `LLM_MAX_TOKENS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("ANTHROPIC_BASE_URL").unwrap_or(defaults.base_url),
            api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            max_tokens: std::env::var("LLM_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_tokens),
            timeout_seconds: std::env::var("LLM_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_seconds),
            ..defaults
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

/// Anthropic Messages API generation backend.
pub struct AnthropicBackend {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicBackend {
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "anthropic",
            model = %config.model,
            url = %config.base_url,
            "Initializing Anthropic backend"
        );

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &AnthropicConfig {
        &self.config
    }
}

#[async_trait]
impl GenerationBackend for AnthropicBackend {
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        let start = Instant::now();
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));

        let request = MessagesRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            system: (!system.is_empty()).then(|| system.to_string()),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: Some(self.config.temperature),
        };

        let mut req = self
            .client
            .post(&url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json");
        if let Some(ref key) = self.config.api_key {
            req = req.header("x-api-key", key);
        }

        let response = req
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Request(format!("anthropic request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<AnthropicErrorResponse>().await {
                Ok(body) => body.error.message,
                Err(_) => "Unknown error".to_string(),
            };
            return Err(Error::Request(format!(
                "anthropic returned {}: {}",
                status, message
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Request(format!("anthropic response was not JSON: {}", e)))?;

        // Some proxies relay upstream failures as 200 with an error envelope.
        if body.get("type").and_then(|t| t.as_str()) == Some("error") {
            let message = serde_json::from_value::<AnthropicErrorResponse>(body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(Error::Inference(format!("anthropic model error: {}", message)));
        }

        let result: MessagesResponse = serde_json::from_value(body).map_err(|e| {
            Error::Request(format!("anthropic response was not a message: {}", e))
        })?;

        if result.stop_reason.as_deref() == Some("refusal") {
            return Err(Error::Inference("anthropic model refused".to_string()));
        }

        let text = result.text();
        if text.trim().is_empty() {
            return Err(Error::Inference("anthropic returned empty content".to_string()));
        }

        debug!(
            subsystem = "inference",
            component = "anthropic",
            op = "generate",
            model = %self.config.model,
            prompt_len = prompt.len(),
            response_len = text.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Generation complete"
        );
        Ok(text)
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
