use aeocheck::error::FetchError;
use aeocheck::fetcher::{FetchConfig, Fetcher};
use aeocheck::http_client::build_http_client;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

mod server;
use server::Hits;

fn fetcher(max_retries: u32) -> Fetcher {
    let client = build_http_client(Duration::from_secs(5), Duration::from_secs(2)).unwrap();
    Fetcher::new(client, FetchConfig::immediate(max_retries))
}

#[tokio::test]
async fn test_fetch_company_page() {
    let base = server::start_site_server(Arc::new(Hits::default())).await;
    let url = Url::parse(&format!("{}/", base)).unwrap();

    let page = fetcher(1).fetch(&url).await.unwrap();

    assert_eq!(page.url, url.to_string());
    assert!(page.html.contains("og:site_name"));
    assert!(page.text.contains("Payments for small businesses"));
    assert!(!page.text.contains("schema.org"), "script contents must not leak into text");
}

#[tokio::test]
async fn test_persistent_403_is_blocked_after_all_attempts() {
    let hits = Arc::new(Hits::default());
    let base = server::start_site_server(hits.clone()).await;
    let url = Url::parse(&format!("{}/blocked", base)).unwrap();

    let err = fetcher(2).fetch(&url).await.unwrap_err();

    assert!(matches!(err, FetchError::Blocked { status: 403, .. }));
    assert_eq!(err.status(), Some(403));
    // one attempt and two retries with browser headers, then one conservative attempt
    assert_eq!(hits.blocked(), 4);
}

#[tokio::test]
async fn test_404_is_not_retried() {
    let base = server::start_site_server(Arc::new(Hits::default())).await;
    let url = Url::parse(&format!("{}/missing", base)).unwrap();

    let err = fetcher(3).fetch(&url).await.unwrap_err();

    assert!(matches!(err, FetchError::NotFound { .. }));
}

#[tokio::test]
async fn test_meta_refresh_is_followed() {
    let base = server::start_site_server(Arc::new(Hits::default())).await;
    let url = Url::parse(&format!("{}/refresh", base)).unwrap();

    let page = fetcher(1).fetch(&url).await.unwrap();

    assert_eq!(page.url, format!("{}/", base));
    assert!(page.text.contains("Acme builds payment software"));
}

#[tokio::test]
async fn test_unreachable_host_is_connect_error() {
    // Port 9 (discard) on localhost is closed in test environments
    let url = Url::parse("http://127.0.0.1:9/").unwrap();

    let err = fetcher(1).fetch(&url).await.unwrap_err();

    assert!(matches!(err, FetchError::Connect { .. } | FetchError::Timeout { .. }));
}
