//! Strategy review: four independent sub-scores over the fetched page.

pub mod answerability;
pub mod crawler_access;
pub mod structured_data;
pub mod web_presence;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{AnalysisContext, Analyzer};
use crate::error::{AnalysisError, FetchError};
use crate::models::{AnalysisDetails, AnalysisKind, AnalysisResult, mean};

pub use answerability::AnswerabilityDetails;
pub use crawler_access::{CrawlerAccessDetails, PageSignals};
pub use structured_data::StructuredDataDetails;
pub use web_presence::WebPresenceDetails;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyDetails {
    pub answerability: AnswerabilityDetails,
    pub web_presence: WebPresenceDetails,
    pub structured_data: StructuredDataDetails,
    pub ai_crawler_accessibility: CrawlerAccessDetails,
}

impl StrategyDetails {
    /// Unweighted mean of the four sub-scores
    pub fn score(&self) -> f64 {
        mean(&[
            self.answerability.score,
            self.web_presence.score,
            self.structured_data.score,
            self.ai_crawler_accessibility.score,
        ])
    }
}

pub struct StrategyAnalyzer;

#[async_trait]
impl Analyzer for StrategyAnalyzer {
    fn kind(&self) -> AnalysisKind {
        AnalysisKind::StrategyReview
    }

    async fn analyze(&self, ctx: &AnalysisContext) -> Result<AnalysisResult, AnalysisError> {
        let page_url = Url::parse(&ctx.page.url).map_err(|_| FetchError::InvalidUrl(ctx.page.url.clone()))?;

        // The parsed tree is not Send; finish with it before the first await
        let (answerability, structured_data, signals) = {
            let document = ctx.page.document();
            (
                answerability::analyze(&document),
                structured_data::analyze(&document),
                PageSignals::from_document(&document, &ctx.page.text),
            )
        };

        let (web_presence, ai_crawler_accessibility) = tokio::join!(
            web_presence::analyze(&ctx.wikipedia, &ctx.reddit, &ctx.facts.name),
            crawler_access::analyze(&ctx.site_client, &page_url, signals),
        );

        let details = StrategyDetails {
            answerability,
            web_presence,
            structured_data,
            ai_crawler_accessibility,
        };
        let score = details.score();

        tracing::info!(
            score,
            answerability = details.answerability.score,
            web_presence = details.web_presence.score,
            structured_data = details.structured_data.score,
            crawler_access = details.ai_crawler_accessibility.score,
            "Strategy review analyzed"
        );
        Ok(AnalysisResult::new(
            AnalysisKind::StrategyReview,
            score,
            AnalysisDetails::StrategyReview(details),
        ))
    }
}
