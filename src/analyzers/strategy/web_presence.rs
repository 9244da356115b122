use serde::{Deserialize, Serialize};

use crate::apis::{RedditClient, RedditPresence, WikipediaClient, WikipediaPresence};
use crate::error::ApiError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebPresenceDetails {
    pub wikipedia: WikipediaPresence,
    pub reddit: RedditPresence,
    /// API failures; the affected source scores 0
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub score: f64,
}

impl WebPresenceDetails {
    /// Combines the two lookups; a failed lookup contributes nothing
    pub fn from_lookups(
        wikipedia: Result<WikipediaPresence, ApiError>,
        reddit: Result<RedditPresence, ApiError>,
    ) -> Self {
        let mut errors = Vec::new();

        let wikipedia = wikipedia.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Wikipedia lookup failed, scoring 0");
            errors.push(e.to_string());
            WikipediaPresence::default()
        });
        let reddit = reddit.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Reddit lookup failed, scoring 0");
            errors.push(e.to_string());
            RedditPresence {
                configured: true,
                ..RedditPresence::unconfigured()
            }
        });

        let score = (wikipedia.score + reddit.total_score).clamp(0.0, 100.0);
        Self {
            wikipedia,
            reddit,
            errors,
            score,
        }
    }
}

pub async fn analyze(wikipedia: &WikipediaClient, reddit: &RedditClient, company_name: &str) -> WebPresenceDetails {
    let (wiki, red) = tokio::join!(wikipedia.lookup(company_name), reddit.presence(company_name));
    WebPresenceDetails::from_lookups(wiki, red)
}
