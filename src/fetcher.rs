use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Node, Selector};
use std::time::Duration;
use url::Url;

use crate::error::FetchError;
use crate::http_client::{HeaderProfile, headers_for};
use crate::resolver::toggle_www;
use crate::retry::{RetryDecision, jitter, retry_with};

static META_REFRESH_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("meta[http-equiv]").unwrap());
static BODY_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());
static REFRESH_URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)url\s*=\s*['"]?([^'"\s]+)"#).unwrap());

/// Elements whose contents never reach the extracted text
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "meta", "link", "head", "template"];

/// Tags re-read by the sanitizing second pass
const CONTENT_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "td", "th", "article", "section", "blockquote", "dd", "dt",
    "figcaption",
];

/// Share of garbled characters above which the second pass runs
const GARBLED_THRESHOLD: f64 = 0.05;

/// Delay windows and attempt budget for one fetch
#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    /// Retries after the first browser-profile attempt
    pub max_retries: u32,
    /// Timeouts, connection errors, 403s and other HTTP errors
    pub retry_delay: (Duration, Duration),
    /// HTTP 429
    pub rate_limit_delay: (Duration, Duration),
    /// Pause before the conservative fallback
    pub conservative_delay: (Duration, Duration),
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: (Duration::from_secs(2), Duration::from_secs(5)),
            rate_limit_delay: (Duration::from_secs(5), Duration::from_secs(10)),
            conservative_delay: (Duration::from_secs(3), Duration::from_secs(6)),
        }
    }
}

impl FetchConfig {
    /// Same attempt budget with every delay set to zero
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            retry_delay: (Duration::ZERO, Duration::ZERO),
            rate_limit_delay: (Duration::ZERO, Duration::ZERO),
            conservative_delay: (Duration::ZERO, Duration::ZERO),
        }
    }

    fn decide(&self, attempt: u32, err: &FetchError) -> RetryDecision {
        let window = match err {
            FetchError::InvalidUrl(_) | FetchError::NotFound { .. } => return RetryDecision::Stop,
            FetchError::Blocked { status: 429, .. } => self.rate_limit_delay,
            _ => self.retry_delay,
        };
        let delay = jitter(window.0, window.1);
        tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "Fetch attempt failed, retrying");
        RetryDecision::Retry(delay)
    }
}

/// A downloaded page and its cleaned text.
///
/// Keeps the raw HTML rather than a parsed tree so it can cross await points.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: String,
    pub html: String,
    pub text: String,
}

impl FetchedPage {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        let html = html.into();
        let text = extract_text(&html);
        Self {
            url: url.into(),
            html,
            text,
        }
    }

    pub fn document(&self) -> Html {
        Html::parse_document(&self.html)
    }
}

/// Downloads one page under anti-bot conditions
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(client: Client, config: FetchConfig) -> Self {
        Self { client, config }
    }

    pub async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let (mut final_url, mut html) = self.fetch_html(url).await?;

        if let Some(target) = meta_refresh_target(&html, &final_url) {
            tracing::info!(from = %final_url, to = %target, "Following meta refresh");
            match self.fetch_html(&target).await {
                Ok(page) => (final_url, html) = page,
                Err(e) => tracing::warn!(url = %target, error = %e, "Meta refresh target failed, keeping original page"),
            }
        }

        if is_redirecting_placeholder(&html) {
            if let Some(alternate) = toggle_www(url) {
                tracing::info!(url = %alternate, "Page is a redirect placeholder, trying alternate host");
                match self.fetch_html(&alternate).await {
                    Ok(page) => (final_url, html) = page,
                    Err(e) => tracing::warn!(url = %alternate, error = %e, "Alternate host failed"),
                }
            }
        }

        Ok(FetchedPage::new(final_url.to_string(), html))
    }

    /// Browser-profile attempts, then one conservative attempt after a final 403
    async fn fetch_html(&self, url: &Url) -> Result<(Url, String), FetchError> {
        let result = retry_with(
            self.config.max_retries + 1,
            |attempt, err| self.config.decide(attempt, err),
            |_| self.attempt(url, HeaderProfile::Browser),
        )
        .await;

        match result {
            Err(FetchError::Blocked { status: 403, .. }) => {
                let delay = jitter(self.config.conservative_delay.0, self.config.conservative_delay.1);
                tracing::warn!(url = %url, delay_ms = delay.as_millis() as u64, "Still blocked, trying conservative headers");
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                self.attempt(url, HeaderProfile::Conservative).await
            }
            other => other,
        }
    }

    async fn attempt(&self, url: &Url, profile: HeaderProfile) -> Result<(Url, String), FetchError> {
        let response = self
            .client
            .get(url.as_str())
            .headers(headers_for(profile))
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url.as_str(), &e))?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        match status {
            200..=299 => {
                let html = response
                    .text()
                    .await
                    .map_err(|e| FetchError::from_reqwest(url.as_str(), &e))?;
                Ok((final_url, html))
            }
            404 | 410 => Err(FetchError::NotFound { url: url.to_string() }),
            403 | 429 => Err(FetchError::Blocked {
                url: url.to_string(),
                status,
            }),
            _ => Err(FetchError::Http {
                url: url.to_string(),
                status,
            }),
        }
    }
}

/// Target of a `<meta http-equiv="refresh">`, resolved against the page URL
pub fn meta_refresh_target(html: &str, base: &Url) -> Option<Url> {
    let document = Html::parse_document(html);
    let content = document
        .select(&META_REFRESH_SELECTOR)
        .find(|meta| {
            meta.value()
                .attr("http-equiv")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("refresh"))
        })?
        .value()
        .attr("content")?;

    let raw = REFRESH_URL_RE.captures(content)?.get(1)?.as_str();
    let target = base.join(raw).ok()?;
    (target != *base).then_some(target)
}

/// Body is empty or just says "Redirecting"
pub fn is_redirecting_placeholder(html: &str) -> bool {
    let document = Html::parse_document(html);
    let Some(body) = document.select(&BODY_SELECTOR).next() else {
        return false;
    };
    let text = clean_text(&body.text().collect::<Vec<_>>().join(" ")).to_lowercase();
    matches!(text.as_str(), "" | "redirecting" | "redirecting...")
}

/// Visible text of a page, with the content-tag fallback for garbled payloads
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let text = visible_text(&document, &|_| false);

    if garbled_ratio(&text) > GARBLED_THRESHOLD {
        tracing::debug!("Extracted text looks garbled, re-reading content tags");
        let fallback = content_tag_text(&document);
        return fallback.chars().filter(|c| !is_garbled(*c)).collect();
    }
    text
}

/// Cleaned visible text, leaving out elements for which `skip` returns true
pub fn visible_text(document: &Html, skip: &dyn Fn(&ElementRef) -> bool) -> String {
    let mut raw = String::new();
    collect_text(document.root_element(), skip, &mut raw);
    clean_text(&raw)
}

/// Text nodes only, so comments and attribute values (data: URIs included) are dropped
fn collect_text(element: ElementRef, skip: &dyn Fn(&ElementRef) -> bool, out: &mut String) {
    if SKIPPED_TAGS.contains(&element.value().name()) || skip(&element) {
        return;
    }
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    collect_text(child, skip, out);
                }
            }
            _ => {}
        }
    }
}

fn content_tag_text(document: &Html) -> String {
    let mut parts = Vec::new();
    for element in document.root_element().descendants().filter_map(ElementRef::wrap) {
        if !CONTENT_TAGS.contains(&element.value().name()) {
            continue;
        }
        let nested = element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| CONTENT_TAGS.contains(&a.value().name()));
        if nested {
            continue;
        }
        let mut raw = String::new();
        collect_text(element, &|_| false, &mut raw);
        let text = clean_text(&raw);
        if !text.is_empty() {
            parts.push(text);
        }
    }
    parts.join(" ")
}

/// Drops C0/C1 control characters and collapses whitespace
pub fn clean_text(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_garbled(c: char) -> bool {
    c == '\u{FFFD}'
        || ('\u{E000}'..='\u{F8FF}').contains(&c)
        || ('\u{FFF0}'..='\u{FFFF}').contains(&c)
        || c.is_control()
}

fn garbled_ratio(text: &str) -> f64 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    text.chars().filter(|c| is_garbled(*c)).count() as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_skips_non_content() {
        let html = r#"<html><head><title>T</title><style>body{}</style></head>
            <body><!-- hidden --><script>var x = 1;</script><noscript>enable js</noscript>
            <h1>Hello</h1><p>World <img src="data:image/png;base64,AAAA"> again</p></body></html>"#;
        assert_eq!(extract_text(html), "Hello World again");
    }

    #[test]
    fn test_clean_text_strips_control_characters() {
        assert_eq!(clean_text("a\u{0007}b\u{0085}c\n\n  d"), "a b c d");
    }

    #[test]
    fn test_garbled_text_falls_back_to_content_tags() {
        let junk: String = std::iter::repeat_n('\u{FFFD}', 40).collect();
        let html = format!("<html><body><div>{}</div><p>Real content here</p></body></html>", junk);
        assert_eq!(extract_text(&html), "Real content here");
    }

    #[test]
    fn test_meta_refresh_target() {
        let base = Url::parse("https://example.com/").unwrap();
        let html = r#"<html><head><meta http-equiv="Refresh" content="0; URL='/home'"></head></html>"#;
        assert_eq!(
            meta_refresh_target(html, &base).unwrap().as_str(),
            "https://example.com/home"
        );
        assert!(meta_refresh_target("<html></html>", &base).is_none());
    }

    #[test]
    fn test_redirecting_placeholder() {
        assert!(is_redirecting_placeholder("<html><body> Redirecting... </body></html>"));
        assert!(is_redirecting_placeholder("<html><body></body></html>"));
        assert!(!is_redirecting_placeholder("<html><body><p>Welcome</p></body></html>"));
    }

    #[test]
    fn test_not_found_is_not_retried() {
        let config = FetchConfig::immediate(3);
        let err = FetchError::NotFound {
            url: "https://example.com".into(),
        };
        assert_eq!(config.decide(0, &err), RetryDecision::Stop);
        let blocked = FetchError::Blocked {
            url: "https://example.com".into(),
            status: 429,
        };
        assert_eq!(config.decide(0, &blocked), RetryDecision::Retry(Duration::ZERO));
    }
}
