use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, header};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;
use whatlang::Lang;

use crate::http_client::CRAWLER_USER_AGENT;
use crate::robots::RobotsTxt;

const DEFAULT_SITEMAP_PATHS: &[&str] = &["/sitemap.xml", "/sitemap_index.xml", "/sitemap-index.xml"];
const JS_FRAMEWORK_HINTS: &[&str] = &[
    "react", "vue", "angular", "next", "_next/", "nuxt", "svelte", "gatsby", "ember", "preact",
];
const ROOT_MOUNT_IDS: &[&str] = &["root", "app", "__next", "__nuxt", "___gatsby"];
const LANGUAGE_SAMPLE_CHARS: usize = 1000;

const SITEMAP_POINTS: f64 = 20.0;
const DECLARED_SITEMAP_POINTS: f64 = 10.0;
const ROBOTS_POINTS: f64 = 15.0;
const LLMS_TXT_POINTS: f64 = 10.0;
const LLM_TXT_POINTS: f64 = 5.0;
const PRERENDERED_POINTS: f64 = 25.0;
const PARTIAL_RENDER_POINTS: f64 = 10.0;
const PRERENDERED_MIN_CHARS: usize = 500;
const PARTIAL_RENDER_MIN_CHARS: usize = 200;
const ENGLISH_POINTS: f64 = 25.0;
const ENGLISH_ALTERNATE_POINTS: f64 = 10.0;

static SCRIPT_SRC_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("script[src]").unwrap());
static MOUNT_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("div[id]").unwrap());
static HREFLANG_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("link[hreflang]").unwrap());
static SITEMAP_ROOT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<\s*(urlset|sitemapindex)\b").unwrap());
static SITEMAP_ENTRY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<\s*(url|sitemap)\s*>").unwrap());

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerAccessDetails {
    pub has_robots_txt: bool,
    /// `Sitemap:` entries from robots.txt
    pub declared_sitemaps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_sitemap: Option<String>,
    /// Well-known AI crawlers disallowed from `/`
    pub blocked_ai_crawlers: Vec<String>,
    pub has_llms_txt: bool,
    pub has_llm_txt: bool,
    pub text_length: usize,
    pub js_framework_detected: bool,
    pub likely_prerendered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_language: Option<String>,
    pub is_english: bool,
    pub has_english_alternate: bool,
    pub score: f64,
}

/// What the already-fetched page says about rendering and language
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageSignals {
    pub text_length: usize,
    pub js_framework_detected: bool,
    pub detected_language: Option<Lang>,
    pub has_english_alternate: bool,
}

impl PageSignals {
    pub fn from_document(document: &Html, text: &str) -> Self {
        let js_framework_detected = document.select(&SCRIPT_SRC_SELECTOR).any(|script| {
            script.value().attr("src").is_some_and(|src| {
                let src = src.to_lowercase();
                JS_FRAMEWORK_HINTS.iter().any(|hint| src.contains(hint))
            })
        }) || document.select(&MOUNT_SELECTOR).any(|div| {
            div.value().attr("id").is_some_and(|id| ROOT_MOUNT_IDS.contains(&id))
                && div.text().all(|t| t.trim().is_empty())
        });

        let has_english_alternate = document.select(&HREFLANG_SELECTOR).any(|link| {
            let is_alternate = link
                .value()
                .attr("rel")
                .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("alternate")));
            let english = link.value().attr("hreflang").is_some_and(|lang| {
                let lang = lang.to_lowercase();
                lang == "en" || lang.starts_with("en-")
            });
            is_alternate && english
        });

        Self {
            text_length: text.chars().count(),
            js_framework_detected,
            detected_language: detect_language(text),
            has_english_alternate,
        }
    }
}

/// Statistical language ID on the leading sample of the text
pub fn detect_language(text: &str) -> Option<Lang> {
    let sample: String = text.chars().take(LANGUAGE_SAMPLE_CHARS).collect();
    whatlang::detect(&sample).map(|info| info.lang())
}

/// A 200 with a non-empty, non-HTML body; SPAs answer every path with their index page
fn is_text_file(status: u16, content_type: &str, body: &str) -> bool {
    let head = body.trim_start().chars().take(16).collect::<String>().to_lowercase();
    let looks_like_html = content_type.contains("text/html") || head.starts_with("<!doctype") || head.starts_with("<html");
    status == 200 && !body.trim().is_empty() && !looks_like_html
}

pub fn is_valid_sitemap(status: u16, content_type: &str, body: &str) -> bool {
    let content_type = content_type.to_lowercase();
    status < 400
        && (content_type.contains("application/xml") || content_type.contains("text/xml"))
        && SITEMAP_ROOT_RE.is_match(body)
        && SITEMAP_ENTRY_RE.is_match(body)
}

pub fn rendering_points(signals: &PageSignals) -> f64 {
    if signals.text_length > PRERENDERED_MIN_CHARS {
        PRERENDERED_POINTS
    } else if !signals.js_framework_detected && signals.text_length > PARTIAL_RENDER_MIN_CHARS {
        PARTIAL_RENDER_POINTS
    } else {
        0.0
    }
}

pub fn language_points(signals: &PageSignals) -> f64 {
    if signals.detected_language == Some(Lang::Eng) {
        ENGLISH_POINTS
    } else if signals.has_english_alternate {
        ENGLISH_ALTERNATE_POINTS
    } else {
        0.0
    }
}

struct Probe {
    status: u16,
    content_type: String,
    body: String,
}

/// Probes robots.txt, sitemaps and llms.txt on the page's origin
pub struct SiteProber<'a> {
    client: &'a Client,
    origin: Url,
}

impl<'a> SiteProber<'a> {
    pub fn new(client: &'a Client, page_url: &Url) -> Self {
        let mut origin = page_url.clone();
        origin.set_path("/");
        origin.set_query(None);
        origin.set_fragment(None);
        Self { client, origin }
    }

    async fn get(&self, target: &str) -> Option<Probe> {
        let url = self.origin.join(target).ok()?;
        let response = match self
            .client
            .get(url.as_str())
            .header(header::USER_AGENT, CRAWLER_USER_AGENT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Probe failed");
                return None;
            }
        };

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.text().await.unwrap_or_default();
        Some(Probe {
            status,
            content_type,
            body,
        })
    }

    async fn robots(&self) -> Option<RobotsTxt> {
        let probe = self.get("/robots.txt").await?;
        is_text_file(probe.status, &probe.content_type, &probe.body).then(|| RobotsTxt::parse(&probe.body))
    }

    async fn text_file_exists(&self, path: &str) -> bool {
        self.get(path)
            .await
            .is_some_and(|probe| is_text_file(probe.status, &probe.content_type, &probe.body))
    }

    /// First candidate that validates as a sitemap
    async fn find_sitemap(&self, declared: &[String]) -> Option<String> {
        let mut candidates: Vec<String> = declared.to_vec();
        for path in DEFAULT_SITEMAP_PATHS {
            if let Ok(url) = self.origin.join(path) {
                let url = url.to_string();
                if !candidates.contains(&url) {
                    candidates.push(url);
                }
            }
        }

        for candidate in candidates {
            if let Some(probe) = self.get(&candidate).await {
                if is_valid_sitemap(probe.status, &probe.content_type, &probe.body) {
                    return Some(candidate);
                }
                tracing::debug!(url = %candidate, status = probe.status, "Sitemap candidate rejected");
            }
        }
        None
    }
}

pub async fn analyze(client: &Client, page_url: &Url, signals: PageSignals) -> CrawlerAccessDetails {
    let prober = SiteProber::new(client, page_url);

    let robots = prober.robots().await;
    let declared_sitemaps = robots.as_ref().map(|r| r.sitemaps().to_vec()).unwrap_or_default();
    let blocked_ai_crawlers = robots.as_ref().map(RobotsTxt::blocked_ai_crawlers).unwrap_or_default();

    let (valid_sitemap, has_llms_txt, has_llm_txt) = tokio::join!(
        prober.find_sitemap(&declared_sitemaps),
        prober.text_file_exists("/llms.txt"),
        prober.text_file_exists("/llm.txt"),
    );

    let mut score = 0.0;
    if robots.is_some() {
        score += ROBOTS_POINTS;
    }
    if valid_sitemap.is_some() {
        score += SITEMAP_POINTS;
    } else if !declared_sitemaps.is_empty() {
        score += DECLARED_SITEMAP_POINTS;
    }
    if has_llms_txt {
        score += LLMS_TXT_POINTS;
    }
    if has_llm_txt {
        score += LLM_TXT_POINTS;
    }
    let rendering = rendering_points(&signals);
    score += rendering + language_points(&signals);

    if !blocked_ai_crawlers.is_empty() {
        tracing::info!(crawlers = ?blocked_ai_crawlers, "robots.txt blocks AI crawlers");
    }

    CrawlerAccessDetails {
        has_robots_txt: robots.is_some(),
        declared_sitemaps,
        valid_sitemap,
        blocked_ai_crawlers,
        has_llms_txt,
        has_llm_txt,
        text_length: signals.text_length,
        js_framework_detected: signals.js_framework_detected,
        likely_prerendered: rendering == PRERENDERED_POINTS,
        detected_language: signals.detected_language.map(|lang| lang.code().to_string()),
        is_english: signals.detected_language == Some(Lang::Eng),
        has_english_alternate: signals.has_english_alternate,
        score: score.min(100.0),
    }
}
