//! Runs one analysis job end to end and records its progress.

use anyhow::Result;
use futures::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::Client;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::analyzers::{AnalysisContext, Analyzer, default_analyzers};
use crate::apis::{RedditClient, WikipediaClient};
use crate::billing::Billing;
use crate::config::Settings;
use crate::error::{AnalysisError, StoreError};
use crate::extractor::extract_company_facts;
use crate::fetcher::Fetcher;
use crate::http_client::{CRAWLER_USER_AGENT, build_api_client, build_http_client};
use crate::llm::LlmGateway;
use crate::models::{AnalysisResult, JobStatus, JobStatusView, Report};
use crate::report::{PublicReport, ReportView, build_report};
use crate::resolver::Resolver;
use crate::store::{JobStore, JobUpdate};

const PROGRESS_URL_VALIDATED: f64 = 0.10;
const PROGRESS_FACTS_EXTRACTED: f64 = 0.20;
const PROGRESS_PER_ANALYZER: f64 = 0.20;

/// Network-facing collaborators shared by every job
pub struct Services {
    pub resolver: Resolver,
    pub fetcher: Fetcher,
    pub gateway: Arc<LlmGateway>,
    pub wikipedia: Arc<WikipediaClient>,
    pub reddit: Arc<RedditClient>,
    /// Client for robots.txt, sitemap and llms.txt probes
    pub site_client: Client,
}

impl Services {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let fetch = &settings.fetch;
        let site_client = build_http_client(fetch.timeout, fetch.connect_timeout)?;
        let api_client = build_api_client(settings.api_timeout, fetch.connect_timeout, CRAWLER_USER_AGENT)?;

        let mut wikipedia = WikipediaClient::new(api_client.clone(), settings.llm.retry.clone());
        if let Some(url) = &settings.wikipedia_base_url {
            wikipedia = wikipedia.with_base_url(url);
        }
        let mut reddit = RedditClient::new(api_client, settings.reddit.clone(), settings.llm.retry.clone());
        if let Some(url) = &settings.reddit_base_url {
            reddit = reddit.with_base_url(url);
        }

        Ok(Self {
            resolver: Resolver::new(site_client.clone(), fetch.probe_timeout),
            fetcher: Fetcher::new(site_client.clone(), fetch.retry.clone()),
            gateway: Arc::new(LlmGateway::from_settings(&settings.llm)?),
            wikipedia: Arc::new(wikipedia),
            reddit: Arc::new(reddit),
            site_client,
        })
    }
}

/// Sequences resolver, fetcher, extractor and analyzers for each job
pub struct Orchestrator {
    services: Services,
    store: Arc<dyn JobStore>,
    billing: Arc<dyn Billing>,
    analyzers: Vec<Arc<dyn Analyzer>>,
}

impl Orchestrator {
    pub fn new(services: Services, store: Arc<dyn JobStore>, billing: Arc<dyn Billing>) -> Self {
        Self {
            services,
            store,
            billing,
            analyzers: default_analyzers(),
        }
    }

    pub fn with_analyzers(mut self, analyzers: Vec<Arc<dyn Analyzer>>) -> Self {
        self.analyzers = analyzers;
        self
    }

    /// Creates a job and processes it in the background; returns the job id at once
    pub async fn submit(self: &Arc<Self>, url: &str, owner_id: &str) -> Result<String, StoreError> {
        let job_id = self.store.create_job(url, owner_id).await?;
        let this = Arc::clone(self);
        let id = job_id.clone();
        tokio::spawn(async move {
            // The outcome is already recorded on the job
            if let Err(e) = this.run_job(&id).await {
                tracing::debug!(job_id = %id, error = %e, "Background job ended with an error");
            }
        });
        Ok(job_id)
    }

    /// `{jobId, status, progress, error?}` for the job's owner
    pub async fn get_status(&self, job_id: &str, owner_id: &str) -> Result<JobStatusView, StoreError> {
        let job = self.store.get_job(job_id).await?;
        if job.owner_id != owner_id {
            return Err(StoreError::Forbidden(job_id.to_string()));
        }
        Ok(JobStatusView::from(&job))
    }

    /// Processes a pending job to a terminal state.
    ///
    /// Once the job is known, every exit path (errors, a failed completion
    /// write, a panic in the pipeline) leaves it Completed or Failed.
    pub async fn run_job(&self, job_id: &str) -> Result<Report, AnalysisError> {
        let job = self.store.get_job(job_id).await?;
        if let Err(e) = self
            .store
            .update_job(job_id, JobUpdate::status(JobStatus::Processing))
            .await
        {
            return Err(self.fail(job_id, e.into()).await);
        }
        tracing::info!(job_id, url = %job.url, "Job started");

        let report = match AssertUnwindSafe(self.pipeline(job_id, &job.url)).catch_unwind().await {
            Ok(Ok(report)) => report,
            Ok(Err(err)) => return Err(self.fail(job_id, err).await),
            Err(panic) => {
                let err = AnalysisError::Internal(format!("pipeline panicked: {}", panic_message(panic.as_ref())));
                return Err(self.fail(job_id, err).await);
            }
        };

        if let Err(e) = self.store.save_report(&job.owner_id, job_id, report.clone()).await {
            return Err(self.fail(job_id, e.into()).await);
        }
        if let Err(e) = self.store.update_job(job_id, JobUpdate::completed()).await {
            if let Err(delete_err) = self.store.delete_report(&job.owner_id, job_id).await {
                tracing::error!(job_id, error = %delete_err, "Could not withdraw report of unfinished job");
            }
            return Err(self.fail(job_id, e.into()).await);
        }

        self.charge(&job.owner_id).await;
        tracing::info!(job_id, score = report.overall_score, "Job completed");
        Ok(report)
    }

    /// Best-effort Failed write; hands the error back for the caller to return
    async fn fail(&self, job_id: &str, err: AnalysisError) -> AnalysisError {
        tracing::error!(job_id, kind = ?err.kind(), error = %err, "Job failed");
        if let Err(e) = self
            .store
            .update_job(job_id, JobUpdate::failed(err.user_message(), err.to_string()))
            .await
        {
            tracing::error!(job_id, error = %e, "Could not record job failure");
        }
        err
    }

    /// Makes a job's report public; returns the share token
    pub async fn share_report(&self, job_id: &str, owner_id: &str) -> Result<String, StoreError> {
        self.store.share_report(owner_id, job_id).await
    }

    /// Shared report as seen by `viewer_id`: full for active subscribers, redacted otherwise
    pub async fn get_public_report(&self, share_token: &str, viewer_id: Option<&str>) -> Result<PublicReport, StoreError> {
        let shared = self.store.get_public_report(share_token).await?;

        let has_access = match viewer_id {
            Some(viewer) => match self.billing.has_active_subscription(viewer).await {
                Ok(active) => active,
                Err(e) => {
                    tracing::warn!(viewer, error = %e, "Subscription lookup failed, serving redacted report");
                    false
                }
            },
            None => false,
        };
        tracing::debug!(job_id = %shared.job_id, has_access, views = shared.sharing.view_count, "Public report read");

        Ok(PublicReport {
            view: ReportView::for_viewer(&shared.report, has_access),
            job_id: shared.job_id,
            view_count: shared.sharing.view_count,
            shared_at: shared.sharing.shared_at,
        })
    }

    async fn pipeline(&self, job_id: &str, raw_url: &str) -> Result<Report, AnalysisError> {
        let url = self.services.resolver.resolve(raw_url).await?;
        self.progress(job_id, PROGRESS_URL_VALIDATED).await;

        let page = self.services.fetcher.fetch(&url).await?;
        let facts = extract_company_facts(&page, &self.services.gateway).await;
        if !facts.has_name() {
            return Err(AnalysisError::NoFacts { url: page.url.clone() });
        }
        self.progress(job_id, PROGRESS_FACTS_EXTRACTED).await;
        tracing::info!(job_id, name = %facts.name, industry = %facts.industry, "Company facts extracted");

        let ctx = AnalysisContext {
            page: Arc::new(page),
            facts: Arc::new(facts),
            gateway: Arc::clone(&self.services.gateway),
            wikipedia: Arc::clone(&self.services.wikipedia),
            reddit: Arc::clone(&self.services.reddit),
            site_client: self.services.site_client.clone(),
        };
        let items = self.run_analyzers(job_id, ctx.clone()).await?;

        Ok(build_report(url.as_str(), &ctx.facts, items))
    }

    /// Runs every analyzer as its own task; the first failure or panic fails the job
    async fn run_analyzers(&self, job_id: &str, ctx: AnalysisContext) -> Result<Vec<AnalysisResult>, AnalysisError> {
        let mut tasks = FuturesUnordered::new();
        let mut abort_handles = Vec::new();

        for (index, analyzer) in self.analyzers.iter().enumerate() {
            let analyzer = Arc::clone(analyzer);
            let kind = analyzer.kind();
            let ctx = ctx.clone();
            let handle = tokio::spawn(async move { analyzer.analyze(&ctx).await });
            abort_handles.push(handle.abort_handle());
            tasks.push(async move { (index, kind, handle.await) });
        }

        let mut results: Vec<Option<AnalysisResult>> = vec![None; self.analyzers.len()];
        let mut completed = 0;
        while let Some((index, kind, joined)) = tasks.next().await {
            let outcome = match joined {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(AnalysisError::AnalyzerFailed { analyzer, message })) => {
                    Err(AnalysisError::AnalyzerFailed { analyzer, message })
                }
                Ok(Err(e)) => Err(AnalysisError::AnalyzerFailed {
                    analyzer: kind,
                    message: e.to_string(),
                }),
                Err(join_error) => Err(AnalysisError::AnalyzerFailed {
                    analyzer: kind,
                    message: join_error.to_string(),
                }),
            };

            match outcome {
                Ok(result) => {
                    completed += 1;
                    tracing::info!(job_id, analyzer = %kind, score = result.score, "Analyzer finished");
                    results[index] = Some(result);
                    self.progress(job_id, PROGRESS_FACTS_EXTRACTED + PROGRESS_PER_ANALYZER * completed as f64)
                        .await;
                }
                Err(err) => {
                    for handle in &abort_handles {
                        handle.abort();
                    }
                    return Err(err);
                }
            }
        }

        Ok(results.into_iter().flatten().collect())
    }

    async fn progress(&self, job_id: &str, progress: f64) {
        if let Err(e) = self.store.update_job(job_id, JobUpdate::progress(progress)).await {
            tracing::warn!(job_id, progress, error = %e, "Could not record progress");
        }
    }

    /// Takes one credit unless the owner is subscribed; billing errors never fail the job
    async fn charge(&self, owner_id: &str) {
        match self.billing.has_active_subscription(owner_id).await {
            Ok(true) => tracing::debug!(owner_id, "Active subscription, no credit taken"),
            Ok(false) => match self.billing.decrement_credit(owner_id).await {
                Ok(remaining) => tracing::debug!(owner_id, remaining, "Credit taken"),
                Err(e) => tracing::warn!(owner_id, error = %e, "Credit decrement failed"),
            },
            Err(e) => tracing::warn!(owner_id, error = %e, "Subscription lookup failed"),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
