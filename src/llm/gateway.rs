use futures::future::join_all;
use std::sync::Arc;

use super::{
    AnthropicClient, CompletionRequest, GeminiClient, LlmClient, OpenAiCompatClient, Provider, ProviderResponse,
};
use crate::config::LlmSettings;
use crate::error::LlmError;
use crate::http_client::build_http_client;
use crate::retry::{RetryPolicy, retry};

/// One provider's client, models and retry policy
struct ProviderSlot {
    provider: Provider,
    models: Vec<String>,
    client: Option<Arc<dyn LlmClient>>,
    policy: RetryPolicy,
}

/// Owns every provider client and applies retries uniformly
pub struct LlmGateway {
    slots: Vec<ProviderSlot>,
}

impl Default for LlmGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmGateway {
    /// A gateway with all four providers present but unconfigured
    pub fn new() -> Self {
        Self {
            slots: Provider::ALL
                .iter()
                .map(|provider| ProviderSlot {
                    provider: *provider,
                    models: vec![provider.default_model().to_string()],
                    client: None,
                    policy: RetryPolicy::default(),
                })
                .collect(),
        }
    }

    /// Installs (or replaces) the client for its provider
    pub fn with_client(mut self, client: Arc<dyn LlmClient>, models: Vec<String>, policy: RetryPolicy) -> Self {
        let provider = client.provider();
        if let Some(slot) = self.slots.iter_mut().find(|slot| slot.provider == provider) {
            if !models.is_empty() {
                slot.models = models;
            }
            slot.client = Some(client);
            slot.policy = policy;
        }
        self
    }

    /// Builds real HTTP clients for every provider that has a key
    pub fn from_settings(settings: &LlmSettings) -> reqwest::Result<Self> {
        let http = build_http_client(settings.timeout, settings.connect_timeout)?;
        let mut gateway = Self::new();

        for provider_settings in &settings.providers {
            let provider = provider_settings.provider;
            let Some(api_key) = provider_settings.api_key.as_deref().filter(|key| !key.trim().is_empty()) else {
                tracing::debug!(provider = %provider, "No API key, provider not configured");
                if let Some(slot) = gateway.slots.iter_mut().find(|slot| slot.provider == provider) {
                    if !provider_settings.models.is_empty() {
                        slot.models = provider_settings.models.clone();
                    }
                }
                continue;
            };

            let client: Arc<dyn LlmClient> = match provider {
                Provider::OpenAi | Provider::Perplexity => {
                    let mut client = OpenAiCompatClient::new(provider, http.clone(), api_key);
                    if let Some(url) = &provider_settings.base_url {
                        client = client.with_base_url(url);
                    }
                    Arc::new(client)
                }
                Provider::Anthropic => {
                    let mut client = AnthropicClient::new(http.clone(), api_key);
                    if let Some(url) = &provider_settings.base_url {
                        client = client.with_base_url(url);
                    }
                    Arc::new(client)
                }
                Provider::Gemini => {
                    let mut client = GeminiClient::new(http.clone(), api_key);
                    if let Some(url) = &provider_settings.base_url {
                        client = client.with_base_url(url);
                    }
                    Arc::new(client)
                }
            };

            gateway = gateway.with_client(client, provider_settings.models.clone(), settings.retry.clone());
        }

        Ok(gateway)
    }

    pub fn is_configured(&self, provider: Provider) -> bool {
        self.slot(provider).is_some_and(|slot| slot.client.is_some())
    }

    pub fn configured_providers(&self) -> Vec<Provider> {
        self.slots
            .iter()
            .filter(|slot| slot.client.is_some())
            .map(|slot| slot.provider)
            .collect()
    }

    fn slot(&self, provider: Provider) -> Option<&ProviderSlot> {
        self.slots.iter().find(|slot| slot.provider == provider)
    }

    /// `(prompt, provider, model, temperature) -> text | typed error`
    pub async fn query(&self, prompt: &str, provider: Provider, model: &str, temperature: f32) -> ProviderResponse {
        let outcome = match self.slot(provider).and_then(|slot| slot.client.as_ref().map(|c| (slot, c))) {
            None => Err(LlmError::NotConfigured),
            Some((slot, client)) => {
                let request = &CompletionRequest::new(prompt, model, temperature);
                let outcome = retry(&slot.policy, LlmError::is_retryable, move |attempt| {
                    async move {
                        if attempt > 0 {
                            tracing::debug!(provider = %provider, model = %request.model, attempt, "Retrying LLM call");
                        }
                        client.complete(request).await
                    }
                })
                .await;

                if let Err(e) = &outcome {
                    tracing::warn!(provider = %provider, model = %model, error = %e, "LLM call failed");
                }
                outcome
            }
        };

        ProviderResponse {
            provider,
            model_id: model.to_string(),
            outcome,
        }
    }

    /// Sends the prompt to every (provider, model) pair concurrently.
    ///
    /// Unconfigured providers yield `NotConfigured` entries without a network call.
    pub async fn fan_out(&self, prompt: &str, temperature: f32) -> Vec<ProviderResponse> {
        let calls = self.slots.iter().flat_map(move |slot| {
            slot.models
                .iter()
                .map(move |model| self.query(prompt, slot.provider, model, temperature))
        });
        join_all(calls).await
    }

    /// First successful answer, trying configured providers in order
    pub async fn first_success(&self, prompt: &str, temperature: f32) -> Option<ProviderResponse> {
        for slot in self.slots.iter().filter(|slot| slot.client.is_some()) {
            for model in &slot.models {
                let response = self.query(prompt, slot.provider, model, temperature).await;
                if response.outcome.is_ok() {
                    return Some(response);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyClient {
        provider: Provider,
        failures: Vec<LlmError>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmClient for FlakyClient {
        fn provider(&self) -> Provider {
            self.provider
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.failures.get(call) {
                Some(err) => Err(err.clone()),
                None => Ok(format!("answer from {}", request.model)),
            }
        }
    }

    fn flaky(provider: Provider, failures: Vec<LlmError>) -> Arc<FlakyClient> {
        Arc::new(FlakyClient {
            provider,
            failures,
            calls: AtomicU32::new(0),
        })
    }

    #[tokio::test]
    async fn test_unconfigured_provider_short_circuits() {
        let gateway = LlmGateway::new();
        let response = gateway.query("hi", Provider::Gemini, "gemini-2.0-flash", 0.0).await;
        assert_eq!(response.outcome, Err(LlmError::NotConfigured));

        let all = gateway.fan_out("hi", 0.0).await;
        assert_eq!(all.len(), 4);
        assert!(all.iter().all(|r| r.error() == Some(&LlmError::NotConfigured)));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let client = flaky(
            Provider::OpenAi,
            vec![LlmError::Server("HTTP 500".into()), LlmError::Overloaded("busy".into())],
        );
        let gateway = LlmGateway::new().with_client(client.clone(), vec![], RetryPolicy::immediate(3));

        let response = gateway.query("hi", Provider::OpenAi, "gpt-4.1-mini", 0.0).await;
        assert_eq!(response.text(), Some("answer from gpt-4.1-mini"));
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_auth_errors_are_not_retried() {
        let client = flaky(Provider::Anthropic, vec![LlmError::Auth("bad key".into())]);
        let gateway = LlmGateway::new().with_client(client.clone(), vec![], RetryPolicy::immediate(3));

        let response = gateway.query("hi", Provider::Anthropic, "claude", 0.0).await;
        assert_eq!(response.outcome, Err(LlmError::Auth("bad key".into())));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_one_failing_provider_does_not_affect_siblings() {
        let broken = flaky(Provider::Gemini, vec![LlmError::Validation("nope".into())]);
        let healthy = flaky(Provider::Perplexity, vec![]);
        let gateway = LlmGateway::new()
            .with_client(broken, vec!["g1".into()], RetryPolicy::immediate(0))
            .with_client(healthy, vec!["p1".into(), "p2".into()], RetryPolicy::immediate(0));

        let responses = gateway.fan_out("hi", 0.0).await;
        assert_eq!(responses.len(), 5);
        let ok: Vec<&str> = responses.iter().filter_map(|r| r.text()).collect();
        assert_eq!(ok, vec!["answer from p1", "answer from p2"]);
        assert_eq!(gateway.configured_providers(), vec![Provider::Gemini, Provider::Perplexity]);
    }
}
