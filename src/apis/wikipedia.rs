use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

use super::send_json;
use crate::error::ApiError;
use crate::retry::{RetryPolicy, retry};

const SERVICE: &str = "wikipedia";
const PAGE_FOUND_POINTS: f64 = 50.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WikipediaPresence {
    pub has_wikipedia_page: bool,
    pub wikipedia_url: Option<String>,
    pub score: f64,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    query: Option<Query>,
}

#[derive(Deserialize)]
struct Query {
    #[serde(default)]
    pages: HashMap<String, Page>,
}

#[derive(Deserialize)]
struct Page {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    missing: Option<serde_json::Value>,
    #[serde(default)]
    invalid: Option<serde_json::Value>,
}

pub struct WikipediaClient {
    http_client: Client,
    base_url: String,
    policy: RetryPolicy,
}

impl WikipediaClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://en.wikipedia.org";

    pub fn new(http_client: Client, policy: RetryPolicy) -> Self {
        Self {
            http_client,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            policy,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Looks up an article titled after the company
    pub async fn lookup(&self, company_name: &str) -> Result<WikipediaPresence, ApiError> {
        let endpoint = format!("{}/w/api.php", self.base_url);
        let response: QueryResponse = retry(&self.policy, ApiError::is_retryable, |_| {
            let request = self.http_client.get(&endpoint).query(&[
                ("action", "query"),
                ("format", "json"),
                ("redirects", "1"),
                ("titles", company_name),
            ]);
            send_json(SERVICE, request)
        })
        .await?;

        let page = response
            .query
            .and_then(|query| query.pages.into_values().find(|page| page.missing.is_none() && page.invalid.is_none()));

        let presence = match page {
            Some(page) => {
                let title = page.title.unwrap_or_else(|| company_name.to_string());
                WikipediaPresence {
                    has_wikipedia_page: true,
                    wikipedia_url: self.article_url(&title),
                    score: PAGE_FOUND_POINTS,
                }
            }
            None => WikipediaPresence::default(),
        };

        tracing::debug!(name = %company_name, found = presence.has_wikipedia_page, "Wikipedia lookup");
        Ok(presence)
    }

    fn article_url(&self, title: &str) -> Option<String> {
        let base = Url::parse(&format!("{}/", self.base_url)).ok()?;
        base.join(&format!("wiki/{}", title.replace(' ', "_")))
            .ok()
            .map(|url| url.to_string())
    }
}
