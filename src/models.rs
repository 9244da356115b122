use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::analyzers::ai_presence::AiPresenceDetails;
use crate::analyzers::competitors::CompetitorDetails;
use crate::analyzers::strategy::StrategyDetails;

/// Canonical facts about the analyzed company, derived once per job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyFacts {
    pub name: String,
    pub industry: String,
    /// At most four, deduplicated, in discovery order
    pub key_products_services: Vec<String>,
    pub description: String,
}

impl CompanyFacts {
    pub const MAX_PRODUCTS: usize = 4;

    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisKind {
    AiPresence,
    CompetitorLandscape,
    StrategyReview,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 3] = [
        AnalysisKind::AiPresence,
        AnalysisKind::CompetitorLandscape,
        AnalysisKind::StrategyReview,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            AnalysisKind::AiPresence => "AI Presence",
            AnalysisKind::CompetitorLandscape => "Competitor Landscape",
            AnalysisKind::StrategyReview => "Strategy Review",
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisKind::AiPresence => write!(f, "ai_presence"),
            AnalysisKind::CompetitorLandscape => write!(f, "competitor_landscape"),
            AnalysisKind::StrategyReview => write!(f, "strategy_review"),
        }
    }
}

/// Analyzer-specific breakdown behind a score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AnalysisDetails {
    AiPresence(AiPresenceDetails),
    CompetitorLandscape(CompetitorDetails),
    StrategyReview(StrategyDetails),
}

/// Output of one analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub id: AnalysisKind,
    pub title: String,
    /// 0 to 100
    pub score: f64,
    pub details: AnalysisDetails,
    pub completed: bool,
}

impl AnalysisResult {
    pub fn new(id: AnalysisKind, score: f64, details: AnalysisDetails) -> Self {
        Self {
            id,
            title: id.title().to_string(),
            score: clamp_score(score),
            details,
            completed: true,
        }
    }
}

/// Final, immutable output of a completed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub url: String,
    pub title: String,
    pub overall_score: f64,
    pub synthesis: String,
    pub items: Vec<AnalysisResult>,
    pub company_facts: CompanyFacts,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
}

impl Report {
    pub fn item(&self, kind: AnalysisKind) -> Option<&AnalysisResult> {
        self.items.iter().find(|item| item.id == kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One end-to-end analysis request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisJob {
    pub id: String,
    pub url: String,
    pub owner_id: String,
    pub status: JobStatus,
    pub progress: f64,
    /// User-facing sentence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Technical detail for operators
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sharing: Sharing,
}

/// Public link state of a job's report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sharing {
    pub public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_at: Option<DateTime<Utc>>,
    pub view_count: u64,
}

/// Status value handed to the routing layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&AnalysisJob> for JobStatusView {
    fn from(job: &AnalysisJob) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            progress: job.progress,
            error: job.error.clone(),
        }
    }
}

pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
