use reqwest::Client;
use std::net::IpAddr;
use std::time::Duration;
use url::{Host, Url};

use crate::error::FetchError;
use crate::http_client::{HeaderProfile, headers_for};

/// Subdomains probed in addition to the www/non-www pair
const SUBDOMAINS: &[&str] = &["www2", "shop", "store", "en", "us", "global"];

/// A 200 response larger than this ends probing early
const EARLY_EXIT_BYTES: usize = 5 * 1024;

/// Adds https:// when the scheme is missing and validates the result
pub fn normalize_url(raw: &str) -> Result<Url, FetchError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(FetchError::InvalidUrl(raw.to_string()));
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&candidate).map_err(|_| FetchError::InvalidUrl(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none_or(str::is_empty) {
        return Err(FetchError::InvalidUrl(raw.to_string()));
    }
    Ok(url)
}

fn is_local_host(url: &Url) -> bool {
    match url.host() {
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => true,
        Some(Host::Domain(domain)) => domain == "localhost" || domain.parse::<IpAddr>().is_ok(),
        None => true,
    }
}

fn with_host(url: &Url, host: &str) -> Option<Url> {
    let mut candidate = url.clone();
    candidate.set_host(Some(host)).ok()?;
    Some(candidate)
}

/// Same URL with the `www.` prefix toggled
pub fn toggle_www(url: &Url) -> Option<Url> {
    if is_local_host(url) {
        return None;
    }
    let host = url.host_str()?;
    match host.strip_prefix("www.") {
        Some(bare) => with_host(url, bare),
        None => with_host(url, &format!("www.{}", host)),
    }
}

/// Candidate URLs in probe order, original first, without duplicates
pub fn candidate_urls(url: &Url) -> Vec<Url> {
    let mut candidates = vec![url.clone()];
    if is_local_host(url) {
        return candidates;
    }

    if let Some(toggled) = toggle_www(url) {
        candidates.push(toggled);
    }

    let host = url.host_str().unwrap_or_default();
    let bare = host.strip_prefix("www.").unwrap_or(host);
    for sub in SUBDOMAINS {
        if let Some(candidate) = with_host(url, &format!("{}.{}", sub, bare)) {
            candidates.push(candidate);
        }
    }

    let mut seen = std::collections::HashSet::new();
    candidates.retain(|c| seen.insert(c.as_str().to_string()));
    candidates
}

/// Scores one probe response
pub fn score_response(status: u16, body_len: usize) -> i64 {
    let status_points = match status {
        200 => 100,
        300..=399 => 50,
        403 => -25,
        400..=599 => -50,
        _ => 0,
    };
    status_points + (body_len / 1024).min(50) as i64
}

/// Picks the best reachable host variant for a user-supplied URL
pub struct Resolver {
    client: Client,
    probe_timeout: Duration,
}

impl Resolver {
    pub fn new(client: Client, probe_timeout: Duration) -> Self {
        Self { client, probe_timeout }
    }

    /// Returns the best-scoring candidate, or the normalized input if nothing answered
    pub async fn resolve(&self, raw: &str) -> Result<Url, FetchError> {
        let url = normalize_url(raw)?;
        let mut best: Option<(Url, i64)> = None;

        for candidate in candidate_urls(&url) {
            let response = match self
                .client
                .get(candidate.as_str())
                .headers(headers_for(HeaderProfile::Browser))
                .timeout(self.probe_timeout)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!(url = %candidate, error = %e, "Candidate unreachable");
                    continue;
                }
            };

            let status = response.status().as_u16();
            let body_len = response.bytes().await.map(|b| b.len()).unwrap_or(0);
            let score = score_response(status, body_len);
            tracing::debug!(url = %candidate, status, body_len, score, "Probed candidate");

            if best.as_ref().is_none_or(|(_, best_score)| score > *best_score) {
                best = Some((candidate, score));
            }

            if status == 200 && body_len > EARLY_EXIT_BYTES {
                break;
            }
        }

        let resolved = best.map(|(candidate, _)| candidate).unwrap_or(url);
        tracing::info!(url = %resolved, "Resolved target URL");
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_defaults_to_https() {
        assert_eq!(normalize_url("example.com").unwrap().as_str(), "https://example.com/");
        assert_eq!(normalize_url("http://example.com/a").unwrap().as_str(), "http://example.com/a");
        assert!(normalize_url("").is_err());
        assert!(normalize_url("ftp://example.com").is_err());
        assert!(normalize_url("https://").is_err());
    }

    #[test]
    fn test_candidates_cover_variants() {
        let url = Url::parse("https://www.example.com/").unwrap();
        let hosts: Vec<String> = candidate_urls(&url)
            .iter()
            .map(|u| u.host_str().unwrap().to_string())
            .collect();
        assert_eq!(
            hosts,
            vec![
                "www.example.com",
                "example.com",
                "www2.example.com",
                "shop.example.com",
                "store.example.com",
                "en.example.com",
                "us.example.com",
                "global.example.com",
            ]
        );
    }

    #[test]
    fn test_local_hosts_are_not_expanded() {
        let url = Url::parse("http://127.0.0.1:8080/").unwrap();
        assert_eq!(candidate_urls(&url).len(), 1);
        assert!(toggle_www(&url).is_none());
    }

    #[test]
    fn test_scoring() {
        assert_eq!(score_response(200, 10 * 1024), 110);
        assert_eq!(score_response(200, 1024 * 1024), 150);
        assert_eq!(score_response(301, 0), 50);
        assert_eq!(score_response(403, 2048), -23);
        assert_eq!(score_response(500, 0), -50);
    }
}
