use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{AnalysisContext, Analyzer, ProviderOutcome};
use crate::error::AnalysisError;
use crate::llm::ProviderResponse;
use crate::models::{AnalysisDetails, AnalysisKind, AnalysisResult, CompanyFacts, mean};

const NAME_POINTS: f64 = 36.0;
const PRODUCT_POINTS: f64 = 32.0;
const INDUSTRY_POINTS: f64 = 32.0;
const UNCERTAINTY_PENALTY: f64 = 5.0;
const TEMPERATURE: f32 = 0.2;

const UNCERTAINTY_PHRASES: &[&str] = &[
    "don't know",
    "do not know",
    "unable to",
    "cannot confidently",
    "can't confidently",
    "not sure",
    "not familiar",
    "no information",
    "couldn't find",
    "could not find",
    "don't have information",
    "do not have information",
    "i can't tell",
];

/// Which step of the cascade produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchTier {
    Exact,
    NoSpaces,
    Keywords,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TieredMatch {
    pub tier: MatchTier,
    pub points: f64,
}

impl TieredMatch {
    fn none() -> Self {
        Self {
            tier: MatchTier::None,
            points: 0.0,
        }
    }
}

/// Sub-scores of one provider response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceBreakdown {
    pub name_mentioned: bool,
    pub name_points: f64,
    pub product: TieredMatch,
    pub industry: TieredMatch,
    pub uncertain: bool,
    pub penalty: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderPresence {
    #[serde(flatten)]
    pub outcome: ProviderOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<PresenceBreakdown>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiPresenceDetails {
    pub prompt: String,
    pub responses: Vec<ProviderPresence>,
    pub successful_responses: usize,
}

/// Unique lowercase tokens longer than two characters
fn keywords<'a>(phrases: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    phrases
        .into_iter()
        .flat_map(|phrase| {
            phrase
                .to_lowercase()
                .split(|c: char| !c.is_alphanumeric())
                .filter(|token| token.chars().count() > 2)
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Exact phrase, then phrase without spaces, then keyword share
pub fn tiered_match(text: &str, phrases: &[String], max_points: f64) -> TieredMatch {
    let phrases: Vec<String> = phrases
        .iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect();
    if phrases.is_empty() {
        return TieredMatch::none();
    }

    if phrases.iter().any(|p| text.contains(p.as_str())) {
        return TieredMatch {
            tier: MatchTier::Exact,
            points: max_points,
        };
    }

    if phrases.iter().any(|p| {
        let compact: String = p.chars().filter(|c| !c.is_whitespace()).collect();
        !compact.is_empty() && text.contains(compact.as_str())
    }) {
        return TieredMatch {
            tier: MatchTier::NoSpaces,
            points: max_points,
        };
    }

    let keywords = keywords(phrases.iter().map(String::as_str));
    if keywords.is_empty() {
        return TieredMatch::none();
    }
    let matched = keywords.iter().filter(|k| text.contains(k.as_str())).count();
    if matched == 0 {
        return TieredMatch::none();
    }
    TieredMatch {
        tier: MatchTier::Keywords,
        points: (max_points * matched as f64 / keywords.len() as f64).min(max_points),
    }
}

/// Scores one successful response against the company facts
pub fn score_response(facts: &CompanyFacts, response: &str) -> PresenceBreakdown {
    let text = response.to_lowercase();

    let name = facts.name.trim().to_lowercase();
    let name_mentioned = !name.is_empty() && text.contains(&name);
    let name_points = if name_mentioned { NAME_POINTS } else { 0.0 };

    let product = tiered_match(&text, &facts.key_products_services, PRODUCT_POINTS);
    let industry = tiered_match(&text, std::slice::from_ref(&facts.industry), INDUSTRY_POINTS);

    let raw = name_points + product.points + industry.points;
    let uncertain = UNCERTAINTY_PHRASES.iter().any(|phrase| text.contains(phrase));
    // Never pushes a zero score below zero
    let penalty = if uncertain && raw > 0.0 { UNCERTAINTY_PENALTY.min(raw) } else { 0.0 };

    PresenceBreakdown {
        name_mentioned,
        name_points,
        product,
        industry,
        uncertain,
        penalty,
        score: (raw - penalty).clamp(0.0, 100.0),
    }
}

/// Mean over successful responses; failed providers are left out, not zeroed
pub fn evaluate(facts: &CompanyFacts, prompt: &str, responses: &[ProviderResponse]) -> (f64, AiPresenceDetails) {
    let mut scores = Vec::new();
    let entries = responses
        .iter()
        .map(|response| {
            let breakdown = response.text().map(|text| score_response(facts, text));
            if let Some(b) = &breakdown {
                scores.push(b.score);
            }
            ProviderPresence {
                outcome: ProviderOutcome::from(response),
                breakdown,
            }
        })
        .collect();

    let details = AiPresenceDetails {
        prompt: prompt.to_string(),
        responses: entries,
        successful_responses: scores.len(),
    };
    (mean(&scores), details)
}

pub fn presence_prompt(facts: &CompanyFacts) -> String {
    format!(
        "In 3-4 sentences, tell me about the company '{}'. Mention its industry, flagship product/service, headquarters city, and founding year if known.",
        facts.name
    )
}

/// How well LLMs know the company
pub struct AiPresenceAnalyzer;

#[async_trait]
impl Analyzer for AiPresenceAnalyzer {
    fn kind(&self) -> AnalysisKind {
        AnalysisKind::AiPresence
    }

    async fn analyze(&self, ctx: &AnalysisContext) -> Result<AnalysisResult, AnalysisError> {
        let prompt = presence_prompt(&ctx.facts);
        let responses = ctx.gateway.fan_out(&prompt, TEMPERATURE).await;
        let (score, details) = evaluate(&ctx.facts, &prompt, &responses);

        tracing::info!(
            score,
            successful = details.successful_responses,
            total = responses.len(),
            "AI presence analyzed"
        );
        Ok(AnalysisResult::new(
            AnalysisKind::AiPresence,
            score,
            AnalysisDetails::AiPresence(details),
        ))
    }
}
