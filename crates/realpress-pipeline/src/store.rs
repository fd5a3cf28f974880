//! Store seams. Postgres ([`crate::PgStore`]) backs production; the in-process
//! [`crate::MemoryStore`] backs tests and local tooling.
//!
//! Every transition method that takes an id is guarded on the record still
//! being `processing` and returns `false` (or `None`) when that guard does
//! not hold. Times are taken from the store's own clock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use realpress_core::{Admission, SubmissionStage};
use uuid::Uuid;

use crate::collaborators::ContentScore;
use crate::error::StoreError;
use crate::types::{
    ContentRecord, ContentSummary, CrawlDomain, CrawlJob, JobFilter, JobStats, NewJob,
    NewSubmission, Submission,
};

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a pending job unless the URL hash is already queued or ingested.
    /// Returns the new id, or `None` for a duplicate.
    async fn enqueue(&self, job: &NewJob) -> Result<Option<i64>, StoreError>;

    /// Atomically claim the next eligible job.
    async fn claim_next(&self) -> Result<Option<CrawlJob>, StoreError>;

    async fn complete(&self, id: i64, content_id: i64) -> Result<bool, StoreError>;

    /// Return a processing job to pending, due `delay_secs` from now.
    /// Returns the new `scheduled_at`.
    async fn reschedule(
        &self,
        id: i64,
        delay_secs: i64,
        error: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn dead_letter(&self, id: i64, error: &str) -> Result<bool, StoreError>;

    /// Jobs claimed more than `lease_secs` ago and still `processing`.
    async fn stale_claims(&self, lease_secs: i64, limit: i64)
        -> Result<Vec<CrawlJob>, StoreError>;

    /// Reset a `failed` or `dead_letter` job to pending with zero attempts.
    async fn retry(&self, id: i64) -> Result<CrawlJob, StoreError>;

    /// Cancel any job that is not `completed` or already `cancelled`.
    async fn cancel(&self, id: i64) -> Result<CrawlJob, StoreError>;

    async fn get(&self, id: i64) -> Result<CrawlJob, StoreError>;

    async fn list(&self, filter: &JobFilter) -> Result<Vec<CrawlJob>, StoreError>;

    async fn stats(&self) -> Result<JobStats, StoreError>;

    /// Cheap liveness check for the health route.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait DomainLimiter: Send + Sync {
    /// Check and count one request in a single atomic step.
    async fn check_admission(&self, domain: &str, window_ms: i64)
        -> Result<Admission, StoreError>;

    /// Record the outcome of an admitted request. Never touches the window.
    async fn record_request(
        &self,
        domain: &str,
        success: bool,
        score: Option<f64>,
    ) -> Result<(), StoreError>;

    async fn set_allowed(&self, domain: &str, allowed: bool) -> Result<CrawlDomain, StoreError>;

    async fn set_priority(&self, domain: &str, is_priority: bool)
        -> Result<CrawlDomain, StoreError>;

    async fn configure(
        &self,
        domain: &str,
        crawl_delay_ms: Option<i32>,
        max_concurrent: Option<i32>,
    ) -> Result<CrawlDomain, StoreError>;

    async fn get_domain(&self, domain: &str) -> Result<CrawlDomain, StoreError>;

    async fn list_domains(&self, limit: i64, offset: i64) -> Result<Vec<CrawlDomain>, StoreError>;
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn find_by_url_hash(&self, url_hash: &str) -> Result<Option<i64>, StoreError>;

    /// Upsert content on its URL hash and attach a new score. Idempotent per URL.
    async fn save_scored(
        &self,
        content: &ContentRecord,
        score: &ContentScore,
    ) -> Result<i64, StoreError>;

    async fn summary(&self, content_id: i64) -> Result<ContentSummary, StoreError>;
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Create a submission, returning the in-flight one for the same URL if
    /// there is one. Already-ingested URLs are created completed.
    async fn create(&self, submission: &NewSubmission) -> Result<Submission, StoreError>;

    async fn claim_next(&self) -> Result<Option<Submission>, StoreError>;

    async fn update_stage(&self, id: Uuid, stage: SubmissionStage) -> Result<bool, StoreError>;

    async fn complete(&self, id: Uuid, content_id: i64) -> Result<bool, StoreError>;

    async fn reschedule(
        &self,
        id: Uuid,
        delay_secs: i64,
        error: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn dead_letter(&self, id: Uuid, error: &str) -> Result<bool, StoreError>;

    async fn stale_claims(
        &self,
        lease_secs: i64,
        limit: i64,
    ) -> Result<Vec<Submission>, StoreError>;

    /// Cancel any submission that is not `completed` or already `cancelled`.
    async fn cancel(&self, id: Uuid) -> Result<Submission, StoreError>;

    /// Requeue a `failed` or `dead_letter` submission with zero attempts,
    /// unless another submission for the URL is active.
    async fn retry(&self, id: Uuid) -> Result<Submission, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Submission, StoreError>;

    /// Pending submissions ordered ahead of this one; `None` unless pending.
    async fn queue_position(&self, id: Uuid) -> Result<Option<i64>, StoreError>;
}
