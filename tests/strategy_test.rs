use aeocheck::analyzers::strategy::{PageSignals, crawler_access};
use aeocheck::fetcher::{FetchConfig, Fetcher};
use aeocheck::http_client::build_http_client;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

mod server;
use server::Hits;

#[tokio::test]
async fn test_crawler_access_against_fixture_site() {
    let base = server::start_site_server(Arc::new(Hits::default())).await;
    let url = Url::parse(&format!("{}/", base)).unwrap();
    let client = build_http_client(Duration::from_secs(5), Duration::from_secs(2)).unwrap();

    let page = Fetcher::new(client.clone(), FetchConfig::immediate(1)).fetch(&url).await.unwrap();
    let signals = PageSignals::from_document(&page.document(), &page.text);
    let details = crawler_access::analyze(&client, &url, signals).await;

    assert!(details.has_robots_txt);
    assert_eq!(details.declared_sitemaps, vec![format!("{}/sitemap.xml", base)]);
    assert_eq!(details.valid_sitemap, Some(format!("{}/sitemap.xml", base)));
    assert_eq!(details.blocked_ai_crawlers, vec!["GPTBot".to_string()]);
    assert!(details.has_llms_txt);
    assert!(!details.has_llm_txt);
    assert!(details.likely_prerendered);
    assert!(details.is_english);
    // robots 15 + sitemap 20 + llms.txt 10 + rendering 25 + English 25
    assert_eq!(details.score, 95.0);
}

#[tokio::test]
async fn test_crawler_access_on_bare_site() {
    let base = server::start_site_server(Arc::new(Hits::default())).await;
    let client = build_http_client(Duration::from_secs(5), Duration::from_secs(2)).unwrap();
    let mut url = Url::parse(&base).unwrap();
    url.set_path("/nameless");

    // Probes still hit the fixture's origin, so only the page signals differ here
    let page = Fetcher::new(client.clone(), FetchConfig::immediate(1)).fetch(&url).await.unwrap();
    let signals = PageSignals::from_document(&page.document(), &page.text);
    let language = crawler_access::language_points(&signals);
    let details = crawler_access::analyze(&client, &url, signals).await;

    assert!(!details.likely_prerendered);
    assert!(details.text_length < 200);
    // robots 15 + sitemap 20 + llms.txt 10, nothing for rendering
    assert_eq!(details.score, 45.0 + language);
}
