use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::AnalysisKind;

/// Outcome of fetching the target site after all retries and fallbacks
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("request to {url} timed out: {message}")]
    Timeout { url: String, message: String },

    #[error("could not connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("{url} blocked automated access (HTTP {status})")]
    Blocked { url: String, status: u16 },

    #[error("{url} returned HTTP 404 Not Found")]
    NotFound { url: String },

    #[error("{url} returned HTTP {status}")]
    Http { url: String, status: u16 },

    #[error("failed to read response body from {url}: {message}")]
    Body { url: String, message: String },
}

impl FetchError {
    pub(crate) fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else if err.is_body() || err.is_decode() {
            FetchError::Body {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else {
            FetchError::Connect {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Blocked { status, .. } | FetchError::Http { status, .. } => Some(*status),
            FetchError::NotFound { .. } => Some(404),
            _ => None,
        }
    }
}

/// A single provider call that failed after the gateway's retries
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "camelCase")]
pub enum LlmError {
    #[error("provider is not configured")]
    NotConfigured,

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("request rejected: {0}")]
    Validation(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("provider overloaded: {0}")]
    Overloaded(String),

    #[error("provider server error: {0}")]
    Server(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected response: {0}")]
    Parse(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited(_)
                | LlmError::Overloaded(_)
                | LlmError::Server(_)
                | LlmError::Timeout(_)
                | LlmError::Network(_)
        )
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(err.to_string())
        } else if err.is_decode() {
            LlmError::Parse(err.to_string())
        } else {
            LlmError::Network(err.to_string())
        }
    }

    /// A response body that could not be read to the end; always worth another try
    pub(crate) fn from_body_read(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(err.to_string())
        } else {
            LlmError::Network(err.to_string())
        }
    }

    /// Classifies a non-2xx provider response
    pub(crate) fn from_status(status: u16, body: &str) -> Self {
        let body = body.chars().take(500).collect::<String>();
        if body.to_lowercase().contains("overloaded") || status == 529 {
            return LlmError::Overloaded(body);
        }
        match status {
            401 | 403 => LlmError::Auth(body),
            429 => LlmError::RateLimited(body),
            500..=599 => LlmError::Server(format!("HTTP {}: {}", status, body)),
            _ => LlmError::Validation(format!("HTTP {}: {}", status, body)),
        }
    }
}

/// Failure of a Wikipedia or Reddit call
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    #[error("{service} credentials are not configured")]
    NotConfigured { service: &'static str },

    #[error("{service} request failed: {message}")]
    Network { service: &'static str, message: String },

    #[error("{service} returned HTTP {status}")]
    Status { service: &'static str, status: u16 },

    #[error("{service} returned an unexpected payload: {message}")]
    Parse { service: &'static str, message: String },
}

impl ApiError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network { .. } => true,
            ApiError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Failure of the persistence collaborator
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(String),

    #[error("job {0} is owned by another user")]
    Forbidden(String),

    #[error("job {0} already reached a terminal state")]
    Terminal(String),

    #[error("job {0} has not completed yet")]
    NotReady(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// User-facing failure classes; each maps to one fixed sentence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    InvalidUrl,
    Unreachable,
    Blocked,
    NotFound,
    NoFacts,
    AnalyzerFailed,
    Internal,
}

impl FailureKind {
    pub fn user_message(&self) -> &'static str {
        match self {
            FailureKind::InvalidUrl => {
                "The URL you entered is not valid. Please check it and try again."
            }
            FailureKind::Unreachable => {
                "We couldn't reach your website. Please check that the URL is correct and that the site is online, then try again."
            }
            FailureKind::Blocked => {
                "The website is blocking automated access, so we couldn't analyze it. Please allow our crawler or try again later."
            }
            FailureKind::NotFound => {
                "The page you entered could not be found (HTTP 404). Please check the URL and try again."
            }
            FailureKind::NoFacts => {
                "No information found about your website. You need to add name tags, meta tags, and other basic structured data to your website to run this analysis."
            }
            FailureKind::AnalyzerFailed => {
                "Something went wrong while analyzing your website. Please try again later."
            }
            FailureKind::Internal => "An internal error occurred. Please try again later.",
        }
    }
}

/// Job-terminating error raised by the analysis pipeline
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalysisError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("no company name could be extracted from {url}")]
    NoFacts { url: String },

    #[error("{analyzer} analyzer failed: {message}")]
    AnalyzerFailed {
        analyzer: AnalysisKind,
        message: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AnalysisError {
    pub fn kind(&self) -> FailureKind {
        match self {
            AnalysisError::Fetch(err) => match err {
                FetchError::InvalidUrl(_) => FailureKind::InvalidUrl,
                FetchError::Blocked { .. } => FailureKind::Blocked,
                FetchError::NotFound { .. } => FailureKind::NotFound,
                FetchError::Timeout { .. }
                | FetchError::Connect { .. }
                | FetchError::Http { .. }
                | FetchError::Body { .. } => FailureKind::Unreachable,
            },
            AnalysisError::NoFacts { .. } => FailureKind::NoFacts,
            AnalysisError::AnalyzerFailed { .. } => FailureKind::AnalyzerFailed,
            AnalysisError::Store(_) | AnalysisError::Internal(_) => FailureKind::Internal,
        }
    }

    pub fn user_message(&self) -> &'static str {
        self.kind().user_message()
    }
}
