use aeocheck::analyzers::{AnalysisContext, Analyzer, default_analyzers};
use aeocheck::apis::{RedditClient, WikipediaClient};
use aeocheck::billing::InMemoryBilling;
use aeocheck::error::{AnalysisError, StoreError};
use aeocheck::fetcher::{FetchConfig, Fetcher};
use aeocheck::http_client::build_http_client;
use aeocheck::llm::{LlmGateway, OpenAiCompatClient, Provider};
use aeocheck::models::{AnalysisJob, AnalysisKind, AnalysisResult, JobStatus, Report, mean};
use aeocheck::orchestrator::{Orchestrator, Services};
use aeocheck::resolver::Resolver;
use aeocheck::retry::RetryPolicy;
use aeocheck::store::{InMemoryJobStore, JobStore, JobUpdate, SharedReport};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod server;
use server::Hits;

const ANSWER: &str = "Acme is a fintech company that builds payment software for small businesses. \
    Its competitors include [\"Stripe\", \"Acme\", \"Square\", \"Adyen\", \"PayPal\"].";

struct Harness {
    site: String,
    store: Arc<dyn JobStore>,
    billing: Arc<InMemoryBilling>,
    orchestrator: Arc<Orchestrator>,
    // Keeps the mocks alive for the duration of the test
    _apis: MockServer,
}

async fn harness() -> Harness {
    harness_with(Arc::new(InMemoryJobStore::new()), default_analyzers()).await
}

async fn harness_with(store: Arc<dyn JobStore>, analyzers: Vec<Arc<dyn Analyzer>>) -> Harness {
    let site = server::start_site_server(Arc::new(Hits::default())).await;

    let apis = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": ANSWER}}]
        })))
        .mount(&apis)
        .await;
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "query": {"pages": {"42": {"pageid": 42, "title": "Acme"}}}
        })))
        .mount(&apis)
        .await;

    let client = build_http_client(Duration::from_secs(5), Duration::from_secs(2)).unwrap();
    let llm = OpenAiCompatClient::new(Provider::OpenAi, reqwest::Client::new(), "sk-test").with_base_url(apis.uri());
    let gateway = LlmGateway::new().with_client(Arc::new(llm), vec!["gpt-test".to_string()], RetryPolicy::immediate(0));

    let services = Services {
        resolver: Resolver::new(client.clone(), Duration::from_secs(2)),
        fetcher: Fetcher::new(client.clone(), FetchConfig::immediate(1)),
        gateway: Arc::new(gateway),
        wikipedia: Arc::new(
            WikipediaClient::new(reqwest::Client::new(), RetryPolicy::immediate(0)).with_base_url(apis.uri()),
        ),
        reddit: Arc::new(RedditClient::new(reqwest::Client::new(), None, RetryPolicy::immediate(0))),
        site_client: client,
    };

    let billing = Arc::new(InMemoryBilling::new());
    let orchestrator = Arc::new(Orchestrator::new(services, store.clone(), billing.clone()).with_analyzers(analyzers));

    Harness {
        site,
        store,
        billing,
        orchestrator,
        _apis: apis,
    }
}

#[tokio::test]
async fn test_completed_job_produces_report() {
    let h = harness().await;
    h.billing.grant_credits("alice", 3).await;
    let job_id = h.store.create_job(&format!("{}/", h.site), "alice").await.unwrap();

    let report = h.orchestrator.run_job(&job_id).await.unwrap();

    let job = h.store.get_job(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 1.0);
    assert!(job.completed_at.is_some());

    assert_eq!(report.company_facts.name, "Acme");
    assert_eq!(report.company_facts.industry, "Fintech");
    assert_eq!(report.items.len(), 3);
    for kind in AnalysisKind::ALL {
        let item = report.item(kind).unwrap();
        assert!((0.0..=100.0).contains(&item.score), "{} out of range", kind);
    }
    let scores: Vec<f64> = report.items.iter().map(|item| item.score).collect();
    assert!((report.overall_score - mean(&scores)).abs() < 1e-9);
    assert!(report.item(AnalysisKind::AiPresence).unwrap().score > 0.0);
    assert!(report.item(AnalysisKind::CompetitorLandscape).unwrap().score > 0.0);

    let stored = h.store.get_report("alice", &job_id).await.unwrap().unwrap();
    assert_eq!(stored.overall_score, report.overall_score);
    assert_eq!(h.billing.credits("alice").await, 2);
}

#[tokio::test]
async fn test_subscriber_is_not_charged() {
    let h = harness().await;
    h.billing.grant_credits("bob", 1).await;
    h.billing.subscribe("bob").await;
    let job_id = h.store.create_job(&format!("{}/", h.site), "bob").await.unwrap();

    h.orchestrator.run_job(&job_id).await.unwrap();

    assert_eq!(h.billing.credits("bob").await, 1);
}

#[tokio::test]
async fn test_blocked_site_fails_with_user_message() {
    let h = harness().await;
    h.billing.grant_credits("alice", 1).await;
    let job_id = h.store.create_job(&format!("{}/blocked", h.site), "alice").await.unwrap();

    let err = h.orchestrator.run_job(&job_id).await.unwrap_err();

    assert!(matches!(err, AnalysisError::Fetch(_)));
    let job = h.store.get_job(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap().contains("blocking automated access"));
    assert!(job.error_details.as_deref().unwrap().contains("403"));
    assert!(h.store.get_report("alice", &job_id).await.unwrap().is_none());
    assert_eq!(h.billing.credits("alice").await, 1);
}

#[tokio::test]
async fn test_page_without_name_fails_with_no_facts() {
    let h = harness().await;
    let job_id = h.store.create_job(&format!("{}/nameless", h.site), "alice").await.unwrap();

    let err = h.orchestrator.run_job(&job_id).await.unwrap_err();

    assert!(matches!(err, AnalysisError::NoFacts { .. }));
    let job = h.store.get_job(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap().starts_with("No information found about your website"));
}

#[tokio::test]
async fn test_submit_runs_in_background_and_status_is_owner_scoped() {
    let h = harness().await;
    let job_id = h.orchestrator.submit(&format!("{}/", h.site), "alice").await.unwrap();

    assert_eq!(
        h.orchestrator.get_status(&job_id, "mallory").await.unwrap_err(),
        StoreError::Forbidden(job_id.clone())
    );

    let mut status = h.orchestrator.get_status(&job_id, "alice").await.unwrap();
    let mut last_progress = status.progress;
    for _ in 0..100 {
        if status.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        status = h.orchestrator.get_status(&job_id, "alice").await.unwrap();
        assert!(status.progress >= last_progress);
        last_progress = status.progress;
    }

    assert_eq!(status.job_id, job_id);
    assert_eq!(status.status, JobStatus::Completed);
    assert_eq!(status.progress, 1.0);
    assert!(status.error.is_none());
}

/// Sets its flag when the analysis future is dropped
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Never finishes on its own; records when it gets aborted
struct StalledAnalyzer {
    dropped: Arc<AtomicBool>,
}

#[async_trait]
impl Analyzer for StalledAnalyzer {
    fn kind(&self) -> AnalysisKind {
        AnalysisKind::StrategyReview
    }

    async fn analyze(&self, _ctx: &AnalysisContext) -> Result<AnalysisResult, AnalysisError> {
        let _flag = DropFlag(self.dropped.clone());
        tokio::time::sleep(Duration::from_secs(60)).await;
        Err(AnalysisError::AnalyzerFailed {
            analyzer: self.kind(),
            message: "stalled".into(),
        })
    }
}

struct FailingAnalyzer;

#[async_trait]
impl Analyzer for FailingAnalyzer {
    fn kind(&self) -> AnalysisKind {
        AnalysisKind::CompetitorLandscape
    }

    async fn analyze(&self, _ctx: &AnalysisContext) -> Result<AnalysisResult, AnalysisError> {
        Err(AnalysisError::AnalyzerFailed {
            analyzer: self.kind(),
            message: "model quota exhausted".into(),
        })
    }
}

struct PanickingAnalyzer;

#[async_trait]
impl Analyzer for PanickingAnalyzer {
    fn kind(&self) -> AnalysisKind {
        AnalysisKind::AiPresence
    }

    async fn analyze(&self, _ctx: &AnalysisContext) -> Result<AnalysisResult, AnalysisError> {
        panic!("analyzer bug");
    }
}

async fn wait_for(flag: &AtomicBool) -> bool {
    for _ in 0..50 {
        if flag.load(Ordering::SeqCst) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    flag.load(Ordering::SeqCst)
}

async fn assert_failed_without_side_effects(h: &Harness, job_id: &str) {
    let job = h.store.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.completed_at.is_some());
    assert!(job.error.is_some());
    assert_eq!(h.store.get_report("alice", job_id).await, Ok(None));
    assert_eq!(h.billing.credits("alice").await, 2);
}

#[tokio::test]
async fn test_failing_analyzer_fails_job_and_aborts_siblings() {
    let dropped = Arc::new(AtomicBool::new(false));
    let analyzers: Vec<Arc<dyn Analyzer>> = vec![
        Arc::new(StalledAnalyzer {
            dropped: dropped.clone(),
        }),
        Arc::new(FailingAnalyzer),
    ];
    let h = harness_with(Arc::new(InMemoryJobStore::new()), analyzers).await;
    h.billing.grant_credits("alice", 2).await;
    let job_id = h.store.create_job(&format!("{}/", h.site), "alice").await.unwrap();

    let err = h.orchestrator.run_job(&job_id).await.unwrap_err();

    assert!(matches!(
        err,
        AnalysisError::AnalyzerFailed {
            analyzer: AnalysisKind::CompetitorLandscape,
            ..
        }
    ));
    assert_failed_without_side_effects(&h, &job_id).await;
    let job = h.store.get_job(&job_id).await.unwrap();
    assert!(job.error_details.as_deref().unwrap().contains("model quota exhausted"));
    assert!(wait_for(&dropped).await, "stalled analyzer was not aborted");
}

#[tokio::test]
async fn test_panicking_analyzer_fails_job() {
    let dropped = Arc::new(AtomicBool::new(false));
    let analyzers: Vec<Arc<dyn Analyzer>> = vec![
        Arc::new(PanickingAnalyzer),
        Arc::new(StalledAnalyzer {
            dropped: dropped.clone(),
        }),
    ];
    let h = harness_with(Arc::new(InMemoryJobStore::new()), analyzers).await;
    h.billing.grant_credits("alice", 2).await;
    let job_id = h.store.create_job(&format!("{}/", h.site), "alice").await.unwrap();

    let err = h.orchestrator.run_job(&job_id).await.unwrap_err();

    assert!(matches!(
        err,
        AnalysisError::AnalyzerFailed {
            analyzer: AnalysisKind::AiPresence,
            ..
        }
    ));
    assert_failed_without_side_effects(&h, &job_id).await;
    assert!(wait_for(&dropped).await, "stalled analyzer was not aborted");
}

/// Store whose writes misbehave in one chosen way
enum Fault {
    RejectCompletion,
    PanicOnProgress,
}

struct FaultyStore {
    inner: InMemoryJobStore,
    fault: Fault,
}

impl FaultyStore {
    fn new(fault: Fault) -> Self {
        Self {
            inner: InMemoryJobStore::new(),
            fault,
        }
    }
}

#[async_trait]
impl JobStore for FaultyStore {
    async fn create_job(&self, url: &str, owner_id: &str) -> Result<String, StoreError> {
        self.inner.create_job(url, owner_id).await
    }

    async fn update_job(&self, job_id: &str, update: JobUpdate) -> Result<(), StoreError> {
        match self.fault {
            Fault::RejectCompletion if update.status == Some(JobStatus::Completed) => {
                return Err(StoreError::Backend("write timed out".into()));
            }
            Fault::PanicOnProgress if update.progress.is_some() && update.status.is_none() => {
                panic!("store connection poisoned");
            }
            _ => {}
        }
        self.inner.update_job(job_id, update).await
    }

    async fn get_job(&self, job_id: &str) -> Result<AnalysisJob, StoreError> {
        self.inner.get_job(job_id).await
    }

    async fn save_report(&self, owner_id: &str, job_id: &str, report: Report) -> Result<(), StoreError> {
        self.inner.save_report(owner_id, job_id, report).await
    }

    async fn get_report(&self, owner_id: &str, job_id: &str) -> Result<Option<Report>, StoreError> {
        self.inner.get_report(owner_id, job_id).await
    }

    async fn delete_report(&self, owner_id: &str, job_id: &str) -> Result<(), StoreError> {
        self.inner.delete_report(owner_id, job_id).await
    }

    async fn share_report(&self, owner_id: &str, job_id: &str) -> Result<String, StoreError> {
        self.inner.share_report(owner_id, job_id).await
    }

    async fn get_public_report(&self, share_token: &str) -> Result<SharedReport, StoreError> {
        self.inner.get_public_report(share_token).await
    }
}

#[tokio::test]
async fn test_rejected_completion_write_fails_job() {
    let h = harness_with(Arc::new(FaultyStore::new(Fault::RejectCompletion)), default_analyzers()).await;
    h.billing.grant_credits("alice", 2).await;
    let job_id = h.store.create_job(&format!("{}/", h.site), "alice").await.unwrap();

    let err = h.orchestrator.run_job(&job_id).await.unwrap_err();

    assert!(matches!(err, AnalysisError::Store(StoreError::Backend(_))));
    assert_failed_without_side_effects(&h, &job_id).await;
}

#[tokio::test]
async fn test_panic_outside_analyzers_fails_background_job() {
    let h = harness_with(Arc::new(FaultyStore::new(Fault::PanicOnProgress)), default_analyzers()).await;
    h.billing.grant_credits("alice", 2).await;
    let job_id = h.orchestrator.submit(&format!("{}/", h.site), "alice").await.unwrap();

    let mut status = h.orchestrator.get_status(&job_id, "alice").await.unwrap();
    for _ in 0..100 {
        if status.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        status = h.orchestrator.get_status(&job_id, "alice").await.unwrap();
    }

    assert_eq!(status.status, JobStatus::Failed);
    let job = h.store.get_job(&job_id).await.unwrap();
    assert!(job.error_details.as_deref().unwrap().contains("store connection poisoned"));
    assert_failed_without_side_effects(&h, &job_id).await;
}

#[tokio::test]
async fn test_shared_report_is_redacted_unless_viewer_subscribes() {
    let h = harness().await;
    h.billing.subscribe("carol").await;
    let job_id = h.store.create_job(&format!("{}/", h.site), "alice").await.unwrap();
    h.orchestrator.run_job(&job_id).await.unwrap();

    assert_eq!(
        h.orchestrator.share_report(&job_id, "mallory").await,
        Err(StoreError::Forbidden(job_id.clone()))
    );
    let token = h.orchestrator.share_report(&job_id, "alice").await.unwrap();

    let anonymous = h.orchestrator.get_public_report(&token, None).await.unwrap();
    assert_eq!(anonymous.job_id, job_id);
    assert!(anonymous.view.redacted);
    assert!(anonymous.view.report.company_facts.key_products_services.is_empty());
    assert_eq!(anonymous.view_count, 1);
    assert!(anonymous.shared_at.is_some());

    let visitor = h.orchestrator.get_public_report(&token, Some("bob")).await.unwrap();
    assert!(visitor.view.redacted);
    assert_eq!(visitor.view_count, 2);

    let subscriber = h.orchestrator.get_public_report(&token, Some("carol")).await.unwrap();
    assert!(!subscriber.view.redacted);
    assert_eq!(subscriber.view.report.company_facts.name, "Acme");
    assert!(!subscriber.view.report.company_facts.key_products_services.is_empty());
    assert_eq!(subscriber.view.report.overall_score, anonymous.view.report.overall_score);
    assert_eq!(subscriber.view_count, 3);
}

#[tokio::test]
async fn test_deleted_shared_report_is_not_served() {
    let h = harness().await;
    let job_id = h.store.create_job(&format!("{}/", h.site), "alice").await.unwrap();
    h.orchestrator.run_job(&job_id).await.unwrap();
    let token = h.orchestrator.share_report(&job_id, "alice").await.unwrap();

    h.store.delete_report("alice", &job_id).await.unwrap();

    assert_eq!(
        h.orchestrator.get_public_report(&token, Some("alice")).await,
        Err(StoreError::NotFound(job_id.clone()))
    );
}
