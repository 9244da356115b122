//! Job and report persistence seam.
//!
//! The production system keeps jobs in a document database; the CLI and the
//! tests use [`InMemoryJobStore`].

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{AnalysisJob, JobStatus, Report, Sharing};

/// Partial update; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub progress: Option<f64>,
    pub status: Option<JobStatus>,
    pub error: Option<String>,
    pub error_details: Option<String>,
}

impl JobUpdate {
    pub fn progress(progress: f64) -> Self {
        Self {
            progress: Some(progress),
            ..Default::default()
        }
    }

    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn completed() -> Self {
        Self {
            progress: Some(1.0),
            status: Some(JobStatus::Completed),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>, error_details: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error: Some(error.into()),
            error_details: Some(error_details.into()),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, url: &str, owner_id: &str) -> Result<String, StoreError>;

    /// Applies a partial update. Progress never decreases and terminal jobs are frozen.
    async fn update_job(&self, job_id: &str, update: JobUpdate) -> Result<(), StoreError>;

    async fn get_job(&self, job_id: &str) -> Result<AnalysisJob, StoreError>;

    async fn save_report(&self, owner_id: &str, job_id: &str, report: Report) -> Result<(), StoreError>;

    /// `Ok(None)` while the job has no (visible) report
    async fn get_report(&self, owner_id: &str, job_id: &str) -> Result<Option<Report>, StoreError>;

    /// Soft delete; the stored report is flagged, not removed
    async fn delete_report(&self, owner_id: &str, job_id: &str) -> Result<(), StoreError>;

    /// Makes the job's report public and returns its share token.
    /// The token is minted once; later calls return the same one.
    async fn share_report(&self, owner_id: &str, job_id: &str) -> Result<String, StoreError>;

    /// Report behind a share token; each successful read counts one view
    async fn get_public_report(&self, share_token: &str) -> Result<SharedReport, StoreError>;
}

/// A publicly shared report with its sharing metadata
#[derive(Debug, Clone, PartialEq)]
pub struct SharedReport {
    pub job_id: String,
    pub report: Report,
    pub sharing: Sharing,
}

#[derive(Default)]
struct StoreState {
    jobs: HashMap<String, AnalysisJob>,
    reports: HashMap<String, Report>,
}

impl StoreState {
    fn owned_job(&self, owner_id: &str, job_id: &str) -> Result<&AnalysisJob, StoreError> {
        let job = self
            .jobs
            .get(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        if job.owner_id != owner_id {
            return Err(StoreError::Forbidden(job_id.to_string()));
        }
        Ok(job)
    }
}

#[derive(Default)]
pub struct InMemoryJobStore {
    state: RwLock<StoreState>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create_job(&self, url: &str, owner_id: &str) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let job = AnalysisJob {
            id: id.clone(),
            url: url.to_string(),
            owner_id: owner_id.to_string(),
            status: JobStatus::Pending,
            progress: 0.0,
            error: None,
            error_details: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            sharing: Sharing::default(),
        };
        self.state.write().await.jobs.insert(id.clone(), job);
        tracing::debug!(job_id = %id, url = %url, "Job created");
        Ok(id)
    }

    async fn update_job(&self, job_id: &str, update: JobUpdate) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        if job.status.is_terminal() {
            return Err(StoreError::Terminal(job_id.to_string()));
        }

        if let Some(progress) = update.progress {
            job.progress = job.progress.max(progress.clamp(0.0, 1.0));
        }
        if let Some(error) = update.error {
            job.error = Some(error);
        }
        if let Some(details) = update.error_details {
            job.error_details = Some(details);
        }
        let now = Utc::now();
        if let Some(status) = update.status {
            job.status = status;
            if status.is_terminal() {
                job.completed_at = Some(now);
            }
        }
        job.updated_at = now;
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<AnalysisJob, StoreError> {
        self.state
            .read()
            .await
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))
    }

    async fn save_report(&self, owner_id: &str, job_id: &str, report: Report) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let job = state.owned_job(owner_id, job_id)?;
        if job.status == JobStatus::Failed {
            return Err(StoreError::Terminal(job_id.to_string()));
        }
        state.reports.insert(job_id.to_string(), report);
        Ok(())
    }

    async fn get_report(&self, owner_id: &str, job_id: &str) -> Result<Option<Report>, StoreError> {
        let state = self.state.read().await;
        state.owned_job(owner_id, job_id)?;
        Ok(state.reports.get(job_id).filter(|report| !report.deleted).cloned())
    }

    async fn delete_report(&self, owner_id: &str, job_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.owned_job(owner_id, job_id)?;
        if let Some(report) = state.reports.get_mut(job_id) {
            report.deleted = true;
        }
        Ok(())
    }

    async fn share_report(&self, owner_id: &str, job_id: &str) -> Result<String, StoreError> {
        let mut state = self.state.write().await;
        state.owned_job(owner_id, job_id)?;
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;

        let sharing = &mut job.sharing;
        if let (true, Some(token)) = (sharing.public, &sharing.share_token) {
            return Ok(token.clone());
        }
        let token = Uuid::new_v4().simple().to_string();
        *sharing = Sharing {
            public: true,
            share_token: Some(token.clone()),
            shared_at: Some(Utc::now()),
            view_count: 0,
        };
        tracing::debug!(job_id, "Report shared");
        Ok(token)
    }

    async fn get_public_report(&self, share_token: &str) -> Result<SharedReport, StoreError> {
        // Write lock for the whole read so concurrent views never lose an increment
        let mut state = self.state.write().await;
        let StoreState { jobs, reports } = &mut *state;

        let job = jobs
            .values_mut()
            .find(|job| job.sharing.share_token.as_deref() == Some(share_token))
            .ok_or_else(|| StoreError::NotFound(share_token.to_string()))?;
        if !job.sharing.public {
            return Err(StoreError::Forbidden(job.id.clone()));
        }
        if job.status != JobStatus::Completed {
            return Err(StoreError::NotReady(job.id.clone()));
        }
        let report = reports
            .get(&job.id)
            .filter(|report| !report.deleted)
            .ok_or_else(|| StoreError::NotFound(job.id.clone()))?;

        job.sharing.view_count += 1;
        Ok(SharedReport {
            job_id: job.id.clone(),
            report: report.clone(),
            sharing: job.sharing.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CompanyFacts;

    fn report() -> Report {
        Report {
            url: "https://acme.com".into(),
            title: "Acme Report".into(),
            overall_score: 50.0,
            synthesis: String::new(),
            items: vec![],
            company_facts: CompanyFacts::default(),
            created_at: Utc::now(),
            deleted: false,
        }
    }

    #[tokio::test]
    async fn test_progress_never_decreases() {
        let store = InMemoryJobStore::new();
        let id = store.create_job("https://acme.com", "u1").await.unwrap();

        store.update_job(&id, JobUpdate::progress(0.4)).await.unwrap();
        store.update_job(&id, JobUpdate::progress(0.2)).await.unwrap();
        assert_eq!(store.get_job(&id).await.unwrap().progress, 0.4);
    }

    #[tokio::test]
    async fn test_terminal_jobs_are_frozen() {
        let store = InMemoryJobStore::new();
        let id = store.create_job("https://acme.com", "u1").await.unwrap();
        store.update_job(&id, JobUpdate::failed("nope", "HTTP 403")).await.unwrap();

        let job = store.get_job(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.completed_at.is_some());
        assert_eq!(job.error_details.as_deref(), Some("HTTP 403"));

        assert_eq!(
            store.update_job(&id, JobUpdate::progress(1.0)).await,
            Err(StoreError::Terminal(id.clone()))
        );
        assert_eq!(
            store.save_report("u1", &id, report()).await,
            Err(StoreError::Terminal(id.clone()))
        );
    }

    #[tokio::test]
    async fn test_reports_are_owner_scoped() {
        let store = InMemoryJobStore::new();
        let id = store.create_job("https://acme.com", "u1").await.unwrap();
        store.save_report("u1", &id, report()).await.unwrap();

        assert!(store.get_report("u1", &id).await.unwrap().is_some());
        assert_eq!(
            store.get_report("u2", &id).await,
            Err(StoreError::Forbidden(id.clone()))
        );
        assert_eq!(
            store.get_report("u1", "missing").await,
            Err(StoreError::NotFound("missing".into()))
        );
    }

    async fn completed_job(store: &InMemoryJobStore) -> String {
        let id = store.create_job("https://acme.com", "u1").await.unwrap();
        store.save_report("u1", &id, report()).await.unwrap();
        store.update_job(&id, JobUpdate::completed()).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_share_token_is_minted_once() {
        let store = InMemoryJobStore::new();
        let id = completed_job(&store).await;

        let token = store.share_report("u1", &id).await.unwrap();
        assert_eq!(store.share_report("u1", &id).await.unwrap(), token);
        assert_eq!(store.share_report("u2", &id).await, Err(StoreError::Forbidden(id.clone())));

        let job = store.get_job(&id).await.unwrap();
        assert!(job.sharing.public);
        assert!(job.sharing.shared_at.is_some());
        assert_eq!(job.sharing.view_count, 0);
    }

    #[tokio::test]
    async fn test_public_reads_count_views() {
        let store = InMemoryJobStore::new();
        let id = completed_job(&store).await;
        let token = store.share_report("u1", &id).await.unwrap();

        let first = store.get_public_report(&token).await.unwrap();
        let second = store.get_public_report(&token).await.unwrap();

        assert_eq!(first.job_id, id);
        assert_eq!(first.report.title, "Acme Report");
        assert_eq!(first.sharing.view_count, 1);
        assert_eq!(second.sharing.view_count, 2);
        assert_eq!(
            store.get_public_report("unknown").await,
            Err(StoreError::NotFound("unknown".into()))
        );
    }

    #[tokio::test]
    async fn test_concurrent_views_are_all_counted() {
        let store = std::sync::Arc::new(InMemoryJobStore::new());
        let id = completed_job(&store).await;
        let token = store.share_report("u1", &id).await.unwrap();

        let reads = (0..20).map(|_| {
            let store = store.clone();
            let token = token.clone();
            tokio::spawn(async move { store.get_public_report(&token).await })
        });
        for read in futures::future::join_all(reads).await {
            assert!(read.unwrap().is_ok());
        }

        assert_eq!(store.get_job(&id).await.unwrap().sharing.view_count, 20);
    }

    #[tokio::test]
    async fn test_public_read_hides_unfinished_and_deleted_reports() {
        let store = InMemoryJobStore::new();
        let pending = store.create_job("https://acme.com", "u1").await.unwrap();
        let token = store.share_report("u1", &pending).await.unwrap();
        assert_eq!(
            store.get_public_report(&token).await,
            Err(StoreError::NotReady(pending.clone()))
        );

        let id = completed_job(&store).await;
        let token = store.share_report("u1", &id).await.unwrap();
        store.delete_report("u1", &id).await.unwrap();
        assert_eq!(store.get_public_report(&token).await, Err(StoreError::NotFound(id.clone())));
        assert_eq!(store.get_job(&id).await.unwrap().sharing.view_count, 0);
    }

    #[tokio::test]
    async fn test_soft_delete_hides_report() {
        let store = InMemoryJobStore::new();
        let id = store.create_job("https://acme.com", "u1").await.unwrap();
        store.save_report("u1", &id, report()).await.unwrap();
        store.delete_report("u1", &id).await.unwrap();
        assert!(store.get_report("u1", &id).await.unwrap().is_none());
    }
}
