use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[allow(dead_code)]
pub const COMPANY_PAGE: &str = r#"<!doctype html>
<html lang="en"><head>
<title>Acme Corp - Home</title>
<meta property="og:site_name" content="Acme">
<meta name="description" content="Acme builds payment software for small businesses.">
<script type="application/ld+json">
{"@context":"https://schema.org","@type":"Organization","name":"Acme Corp","industry":"Fintech",
 "makesOffer":[{"@type":"Offer","itemOffered":{"@type":"Service","name":"CloudSync"}}]}
</script>
</head><body>
<header><nav><a href="/">Home</a></nav></header>
<main><article><section>
<h1>Payments for small businesses</h1>
<p>How does Acme help small businesses get paid faster without hiring a finance team?</p>
<p>Acme builds payment software that lets merchants accept cards, send invoices and reconcile payouts in one place.</p>
<p>More than 40% of our customers switched from a legacy bank terminal and cut their processing costs by a third.</p>
<p>CloudSync keeps every transaction in step with your accounting system, so month-end closing takes minutes instead of days.</p>
<p>Our support team answers within an hour, every day of the year, and every plan includes fraud monitoring at no extra cost.</p>
<p>According to a 2023 industry survey, merchants using Acme reported 25% fewer failed payments within three months.</p>
</section></article></main>
<footer><time datetime="2024-01-01">2024</time></footer>
</body></html>"#;

/// Hit counters shared with the fixture routes
#[derive(Default)]
#[allow(dead_code)]
pub struct Hits {
    pub blocked: AtomicUsize,
}

#[allow(dead_code)]
impl Hits {
    pub fn blocked(&self) -> usize {
        self.blocked.load(Ordering::SeqCst)
    }
}

async fn robots(req: HttpRequest) -> HttpResponse {
    let host = req.connection_info().host().to_string();
    HttpResponse::Ok().content_type("text/plain").body(format!(
        "User-agent: GPTBot\nDisallow: /\n\nUser-agent: *\nAllow: /\n\nSitemap: http://{}/sitemap.xml\n",
        host
    ))
}

async fn sitemap(req: HttpRequest) -> HttpResponse {
    let host = req.connection_info().host().to_string();
    HttpResponse::Ok().content_type("application/xml").body(format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"><url><loc>http://{}/</loc></url></urlset>"#,
        host
    ))
}

/// Starts the target-site fixture on a random port; returns its base URL
#[allow(dead_code)]
pub async fn start_site_server(hits: Arc<Hits>) -> String {
    let http_server = HttpServer::new(move || {
        let hits = hits.clone();
        App::new()
            .app_data(web::Data::from(hits))
            .route(
                "/",
                web::get().to(|| async { HttpResponse::Ok().content_type("text/html").body(COMPANY_PAGE) }),
            )
            .route("/robots.txt", web::get().to(robots))
            .route("/sitemap.xml", web::get().to(sitemap))
            .route(
                "/llms.txt",
                web::get().to(|| async {
                    HttpResponse::Ok()
                        .content_type("text/plain")
                        .body("# Acme\n\n> Payment software for small businesses.\n")
                }),
            )
            .route(
                "/blocked",
                web::get().to(|hits: web::Data<Hits>| async move {
                    hits.blocked.fetch_add(1, Ordering::SeqCst);
                    HttpResponse::Forbidden().body("Access denied")
                }),
            )
            .route(
                "/missing",
                web::get().to(|| async { HttpResponse::NotFound().body("Not Found") }),
            )
            .route(
                "/refresh",
                web::get().to(|| async {
                    HttpResponse::Ok()
                        .content_type("text/html")
                        .body(r#"<html><head><meta http-equiv="refresh" content="0; url=/"></head><body></body></html>"#)
                }),
            )
            .route(
                "/nameless",
                web::get().to(|| async {
                    HttpResponse::Ok()
                        .content_type("text/html")
                        .body("<html><head></head><body><p>Nothing to see here.</p></body></html>")
                }),
            )
            .default_service(web::to(|| async { HttpResponse::NotFound().body("Not Found") }))
    })
    .bind(("127.0.0.1", 0))
    .expect("Failed to bind test server");

    let addr = http_server.addrs().first().cloned().expect("No address bound");
    let url = format!("http://{}", addr);

    let app_server = http_server.run();

    tokio::spawn(async move {
        if let Err(e) = app_server.await {
            eprintln!("Test server error: {}", e);
        }
    });

    url
}
