use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::InMemoryState, state::direct::NotKeyed};
use reqwest::Client;
use reqwest::header;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::num::NonZeroU32;

use super::{exp_decay, log_scale, send_json};
use crate::error::ApiError;
use crate::retry::{RetryPolicy, retry};

const SERVICE: &str = "reddit";

const SUBREDDIT_POINTS: f64 = 7.5;
const MEMBERS_MAX: f64 = 7.5;
const MEMBERS_K: f64 = 5000.0;
const MENTIONS_MAX: f64 = 10.0;
const MENTIONS_K: f64 = 1000.0;
const ENGAGEMENT_MAX: f64 = 10.0;
const ENGAGEMENT_K: f64 = 50.0;
const RECENCY_HALF_LIFE_HOURS: f64 = 72.0;
const RECENCY_MAX: f64 = 7.5;
const DIVERSITY_PER_SUBREDDIT: f64 = 1.5;
const DIVERSITY_MAX: f64 = 7.5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

/// One scored signal with the raw value it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedditMetric<T> {
    pub label: String,
    pub raw_value: T,
    pub score: f64,
}

impl<T> RedditMetric<T> {
    fn new(label: &str, raw_value: T, score: f64) -> Self {
        Self {
            label: label.to_string(),
            raw_value,
            score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedditPresence {
    pub configured: bool,
    pub subreddit: RedditMetric<bool>,
    pub members: RedditMetric<u64>,
    pub mention_volume: RedditMetric<usize>,
    pub engagement: RedditMetric<f64>,
    /// Hours since the latest mention
    pub recency: RedditMetric<Option<f64>>,
    pub diversity: RedditMetric<usize>,
    pub total_score: f64,
}

/// A post mentioning the company
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RedditPost {
    pub subreddit: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: u64,
    pub created_utc: f64,
}

impl RedditPresence {
    /// Zeroed block reported when no credentials are configured
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::from_signals(false, 0, &[], Utc::now())
        }
    }

    /// Scores the raw signals; the total stays within 0 to 50
    pub fn from_signals(subreddit_exists: bool, subscribers: u64, posts: &[RedditPost], now: DateTime<Utc>) -> Self {
        let subreddit_score = if subreddit_exists { SUBREDDIT_POINTS } else { 0.0 };
        let members_score = log_scale(subscribers as f64, MEMBERS_MAX, MEMBERS_K);
        let mention_score = log_scale(posts.len() as f64, MENTIONS_MAX, MENTIONS_K);

        let avg_engagement = if posts.is_empty() {
            0.0
        } else {
            posts
                .iter()
                .map(|p| p.score.max(0) as f64 + p.num_comments as f64)
                .sum::<f64>()
                / posts.len() as f64
        };
        let engagement_score = log_scale(avg_engagement, ENGAGEMENT_MAX, ENGAGEMENT_K);

        let now_secs = now.timestamp() as f64;
        let hours_since_latest = posts
            .iter()
            .map(|p| p.created_utc)
            .reduce(f64::max)
            .map(|latest| ((now_secs - latest) / 3600.0).max(0.0));
        let recency_score = exp_decay(hours_since_latest, RECENCY_HALF_LIFE_HOURS, RECENCY_MAX);

        let unique_subreddits = posts
            .iter()
            .map(|p| p.subreddit.to_lowercase())
            .collect::<HashSet<_>>()
            .len();
        let diversity_score = (unique_subreddits as f64 * DIVERSITY_PER_SUBREDDIT).min(DIVERSITY_MAX);

        let total_score =
            subreddit_score + members_score + mention_score + engagement_score + recency_score + diversity_score;

        Self {
            configured: true,
            subreddit: RedditMetric::new("Subreddit ownership", subreddit_exists, subreddit_score),
            members: RedditMetric::new("Members", subscribers, members_score),
            mention_volume: RedditMetric::new("30-day mentions", posts.len(), mention_score),
            engagement: RedditMetric::new("Avg karma+replies", avg_engagement, engagement_score),
            recency: RedditMetric::new("Latest mention hrs", hours_since_latest, recency_score),
            diversity: RedditMetric::new("Unique subreddits", unique_subreddits, diversity_score),
            total_score,
        }
    }
}

/// Subreddit a company would own: its name without spaces or punctuation
pub fn subreddit_name(company_name: &str) -> String {
    company_name.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct AboutResponse {
    #[serde(default)]
    kind: String,
    data: Option<AboutData>,
}

#[derive(Deserialize)]
struct AboutData {
    #[serde(default)]
    subscribers: Option<u64>,
}

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Deserialize)]
struct ListingChild {
    data: RedditPost,
}

/// Application-only Reddit client, paced by a rate limiter
pub struct RedditClient {
    http_client: Client,
    credentials: Option<RedditCredentials>,
    api_base: String,
    auth_url: String,
    policy: RetryPolicy,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl RedditClient {
    pub const DEFAULT_API_BASE: &'static str = "https://oauth.reddit.com";
    pub const DEFAULT_AUTH_URL: &'static str = "https://www.reddit.com/api/v1/access_token";

    pub fn new(http_client: Client, credentials: Option<RedditCredentials>, policy: RetryPolicy) -> Self {
        let per_second = NonZeroU32::new(2).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(5).unwrap_or(NonZeroU32::MIN);
        Self {
            http_client,
            credentials,
            api_base: Self::DEFAULT_API_BASE.to_string(),
            auth_url: Self::DEFAULT_AUTH_URL.to_string(),
            policy,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second).allow_burst(burst)),
        }
    }

    /// Points both the OAuth and API endpoints at another host (tests, proxies)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into().trim_end_matches('/').to_string();
        self.auth_url = format!("{}/api/v1/access_token", url);
        self.api_base = url;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    /// Collects and scores the company's Reddit footprint
    pub async fn presence(&self, company_name: &str) -> Result<RedditPresence, ApiError> {
        let Some(credentials) = &self.credentials else {
            return Ok(RedditPresence::unconfigured());
        };

        let token = self.access_token(credentials).await?;
        let (subreddit_exists, subscribers) = self.subreddit_about(credentials, &token, company_name).await?;
        let posts = self.recent_mentions(credentials, &token, company_name).await?;

        tracing::debug!(
            name = %company_name,
            subreddit_exists,
            subscribers,
            mentions = posts.len(),
            "Reddit signals collected"
        );
        Ok(RedditPresence::from_signals(subreddit_exists, subscribers, &posts, Utc::now()))
    }

    async fn access_token(&self, credentials: &RedditCredentials) -> Result<String, ApiError> {
        let response: TokenResponse = retry(&self.policy, ApiError::is_retryable, move |_| async move {
            self.rate_limiter.until_ready().await;
            let request = self
                .http_client
                .post(&self.auth_url)
                .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
                .header(header::USER_AGENT, &credentials.user_agent)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body("grant_type=client_credentials");
            send_json(SERVICE, request).await
        })
        .await?;
        Ok(response.access_token)
    }

    async fn subreddit_about(
        &self,
        credentials: &RedditCredentials,
        token: &str,
        company_name: &str,
    ) -> Result<(bool, u64), ApiError> {
        let name = subreddit_name(company_name);
        if name.is_empty() {
            return Ok((false, 0));
        }

        let url = format!("{}/r/{}/about", self.api_base, name);
        let url = url.as_str();
        let result: Result<AboutResponse, ApiError> = retry(&self.policy, ApiError::is_retryable, move |_| async move {
            self.rate_limiter.until_ready().await;
            let request = self
                .http_client
                .get(url)
                .bearer_auth(token)
                .header(header::USER_AGENT, &credentials.user_agent);
            send_json(SERVICE, request).await
        })
        .await;

        match result {
            Ok(about) if about.kind == "t5" => {
                let subscribers = about.data.and_then(|d| d.subscribers).unwrap_or(0);
                Ok((true, subscribers))
            }
            Ok(_) => Ok((false, 0)),
            // Missing, private and banned subreddits
            Err(ApiError::Status { status, .. }) if matches!(status, 302 | 403 | 404) => Ok((false, 0)),
            Err(e) => Err(e),
        }
    }

    async fn recent_mentions(
        &self,
        credentials: &RedditCredentials,
        token: &str,
        company_name: &str,
    ) -> Result<Vec<RedditPost>, ApiError> {
        let url = format!("{}/search", self.api_base);
        let quoted = format!("\"{}\"", company_name);
        let (url, quoted) = (url.as_str(), quoted.as_str());
        let listing: Listing = retry(&self.policy, ApiError::is_retryable, move |_| async move {
            self.rate_limiter.until_ready().await;
            let request = self
                .http_client
                .get(url)
                .bearer_auth(token)
                .header(header::USER_AGENT, &credentials.user_agent)
                .query(&[
                    ("q", quoted),
                    ("t", "month"),
                    ("sort", "new"),
                    ("limit", "100"),
                    ("type", "link"),
                ]);
            send_json(SERVICE, request).await
        })
        .await?;

        Ok(listing.data.children.into_iter().map(|child| child.data).collect())
    }
}
