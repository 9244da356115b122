//! The three analyzers that make up a report.

pub mod ai_presence;
pub mod competitors;
pub mod strategy;

pub use ai_presence::AiPresenceAnalyzer;
pub use competitors::CompetitorAnalyzer;
pub use strategy::StrategyAnalyzer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::apis::{RedditClient, WikipediaClient};
use crate::error::{AnalysisError, LlmError};
use crate::fetcher::FetchedPage;
use crate::llm::{LlmGateway, Provider, ProviderResponse};
use crate::models::{AnalysisKind, AnalysisResult, CompanyFacts};

/// Everything an analyzer may read; shared by the three concurrent tasks
#[derive(Clone)]
pub struct AnalysisContext {
    pub page: Arc<FetchedPage>,
    pub facts: Arc<CompanyFacts>,
    pub gateway: Arc<LlmGateway>,
    pub wikipedia: Arc<WikipediaClient>,
    pub reddit: Arc<RedditClient>,
    /// Client for robots.txt, sitemap and llms.txt probes
    pub site_client: reqwest::Client,
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    fn kind(&self) -> AnalysisKind;

    async fn analyze(&self, ctx: &AnalysisContext) -> Result<AnalysisResult, AnalysisError>;
}

/// The default analyzer set, in report order
pub fn default_analyzers() -> Vec<Arc<dyn Analyzer>> {
    vec![
        Arc::new(AiPresenceAnalyzer),
        Arc::new(CompetitorAnalyzer),
        Arc::new(StrategyAnalyzer),
    ]
}

/// Per-(provider, model) outcome shown in analyzer details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOutcome {
    pub provider: Provider,
    pub model_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<LlmError>,
}

impl From<&ProviderResponse> for ProviderOutcome {
    fn from(response: &ProviderResponse) -> Self {
        Self {
            provider: response.provider,
            model_id: response.model_id.clone(),
            text: response.text().map(str::to_string),
            error: response.error().cloned(),
        }
    }
}
