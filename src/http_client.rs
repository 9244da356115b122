use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder};
use std::time::Duration;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.3 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
];

const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-GB,en;q=0.9,en-US;q=0.8",
    "en-US,en;q=0.8,es;q=0.5",
    "en,en-US;q=0.9",
];

const SEC_CH_UA: &[&str] = &[
    "\"Chromium\";v=\"124\", \"Google Chrome\";v=\"124\", \"Not-A.Brand\";v=\"99\"",
    "\"Chromium\";v=\"123\", \"Google Chrome\";v=\"123\", \"Not:A-Brand\";v=\"8\"",
    "\"Microsoft Edge\";v=\"124\", \"Chromium\";v=\"124\", \"Not-A.Brand\";v=\"99\"",
];

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// Header set used when every browser-like attempt got a 403
const CONSERVATIVE_USER_AGENT: &str = "Mozilla/5.0 (compatible; aeocheck/0.1)";

/// User agent for robots.txt, sitemap and llms.txt probes
pub const CRAWLER_USER_AGENT: &str = "Mozilla/5.0 (compatible; aeocheck/0.1; +https://github.com/aeocheck/aeocheck)";

/// Which header profile a request goes out with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderProfile {
    /// Randomized desktop browser headers
    Browser,
    /// Minimal, plain headers
    Conservative,
}

/// Creates a reqwest client with standard configuration.
///
/// Headers are not baked in so callers can rotate them per request.
pub fn build_http_client(timeout: Duration, connect_timeout: Duration) -> reqwest::Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .connect_timeout(connect_timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()
}

/// Client for well-behaved machine requests (robots.txt, APIs)
pub fn build_api_client(timeout: Duration, connect_timeout: Duration, user_agent: &str) -> reqwest::Result<Client> {
    ClientBuilder::new()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(connect_timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()
}

fn pick<'a>(pool: &[&'a str]) -> &'a str {
    pool[fastrand::usize(..pool.len())]
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

/// Builds the header map for one attempt
pub fn headers_for(profile: HeaderProfile) -> HeaderMap {
    let mut headers = HeaderMap::new();
    match profile {
        HeaderProfile::Browser => {
            let user_agent = pick(USER_AGENTS);
            insert(&mut headers, header::USER_AGENT, user_agent);
            insert(&mut headers, header::ACCEPT, ACCEPT_HTML);
            insert(&mut headers, header::ACCEPT_LANGUAGE, pick(ACCEPT_LANGUAGES));
            insert(&mut headers, header::CONNECTION, "keep-alive");
            insert(&mut headers, header::UPGRADE_INSECURE_REQUESTS, "1");
            // Firefox and Safari do not send client hints
            if user_agent.contains("Chrome/") {
                insert(&mut headers, HeaderName::from_static("sec-ch-ua"), pick(SEC_CH_UA));
                insert(&mut headers, HeaderName::from_static("sec-ch-ua-mobile"), "?0");
                insert(&mut headers, HeaderName::from_static("sec-fetch-dest"), "document");
                insert(&mut headers, HeaderName::from_static("sec-fetch-mode"), "navigate");
                insert(&mut headers, HeaderName::from_static("sec-fetch-site"), "none");
            }
        }
        HeaderProfile::Conservative => {
            insert(&mut headers, header::USER_AGENT, CONSERVATIVE_USER_AGENT);
            insert(&mut headers, header::ACCEPT, "text/html");
        }
    }
    headers
}
