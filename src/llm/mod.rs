//! Uniform text-in, text-out access to the four LLM providers.
//!
//! Each provider gets its own [`LlmClient`]; the [`LlmGateway`] owns them,
//! applies per-provider retry policies and fans prompts out concurrently.

pub mod anthropic;
pub mod gateway;
pub mod gemini;
pub mod openai_compat;

pub use anthropic::AnthropicClient;
pub use gateway::LlmGateway;
pub use gemini::GeminiClient;
pub use openai_compat::OpenAiCompatClient;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::fmt;

use crate::error::LlmError;

/// System prompt shared by every provider call
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that provides factual information about companies. Please do not invent facts, you are allowed to say you don't know.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Gemini,
    Perplexity,
}

impl Provider {
    pub const ALL: [Provider; 4] = [Provider::OpenAi, Provider::Anthropic, Provider::Gemini, Provider::Perplexity];

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4.1-mini",
            Provider::Anthropic => "claude-3-5-haiku-20241022",
            Provider::Gemini => "gemini-2.0-flash",
            Provider::Perplexity => "sonar",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Anthropic => "https://api.anthropic.com",
            Provider::Gemini => "https://generativelanguage.googleapis.com",
            Provider::Perplexity => "https://api.perplexity.ai",
        }
    }

    /// Environment variable holding the API key
    pub fn env_var(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::Perplexity => "PERPLEXITY_API_KEY",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OpenAI",
            Provider::Anthropic => "Anthropic",
            Provider::Gemini => "Gemini",
            Provider::Perplexity => "Perplexity",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::OpenAi => write!(f, "openai"),
            Provider::Anthropic => write!(f, "anthropic"),
            Provider::Gemini => write!(f, "gemini"),
            Provider::Perplexity => write!(f, "perplexity"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            "gemini" | "google" => Ok(Provider::Gemini),
            "perplexity" => Ok(Provider::Perplexity),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

/// One prompt sent to one model
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system: Option<String>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            temperature,
            max_tokens: 500,
            system: Some(SYSTEM_PROMPT.to_string()),
        }
    }
}

/// Final answer of one (provider, model) pair, after the gateway's retries
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub provider: Provider,
    pub model_id: String,
    pub outcome: Result<String, LlmError>,
}

impl ProviderResponse {
    pub fn text(&self) -> Option<&str> {
        self.outcome.as_deref().ok()
    }

    pub fn error(&self) -> Option<&LlmError> {
        self.outcome.as_ref().err()
    }
}

/// A single provider's HTTP API
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

/// Sends a request and decodes a 2xx JSON body, classifying failures
pub(crate) async fn send_json<T: DeserializeOwned>(provider: Provider, request: RequestBuilder) -> Result<T, LlmError> {
    let response = request.send().await.map_err(|e| {
        tracing::warn!(provider = %provider, error = %e, "LLM request failed");
        LlmError::from_reqwest(e)
    })?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        tracing::warn!(provider = %provider, status = %status, error = %error_text, "LLM API error");
        return Err(LlmError::from_status(status.as_u16(), &error_text));
    }

    let body = response.bytes().await.map_err(|e| {
        tracing::warn!(provider = %provider, error = %e, "LLM response body read failed");
        LlmError::from_body_read(e)
    })?;
    serde_json::from_slice::<T>(&body).map_err(|e| LlmError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!("OpenAI".parse::<Provider>(), Ok(Provider::OpenAi));
        assert_eq!("claude".parse::<Provider>(), Ok(Provider::Anthropic));
        assert!("mistral".parse::<Provider>().is_err());
    }

    #[test]
    fn test_provider_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Provider::Perplexity).unwrap(), "\"perplexity\"");
        assert_eq!(Provider::OpenAi.to_string(), "openai");
    }
}
