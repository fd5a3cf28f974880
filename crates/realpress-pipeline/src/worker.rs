//! Batch execution of claimed crawl jobs.
//!
//! A batch claims its jobs up front, then works through them in chunks of
//! `max_concurrent`. Jobs within a chunk run concurrently and a failure in
//! one never affects its siblings.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use realpress_core::{on_failure, FailureTransition};
use serde::Serialize;

use crate::error::{JobFailure, StoreError};
use crate::pipeline::{Pipeline, Target};
use crate::types::CrawlJob;

pub const MAX_BATCH_SIZE: usize = 50;
pub const MAX_BATCH_CONCURRENCY: usize = 10;

/// Upper bound on stale claims settled by one sweep.
pub(crate) const STALE_SWEEP_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Completed,
    /// Rescheduled with backoff.
    Retrying,
    DeadLettered,
    /// Cancelled while in flight; the run's result was discarded.
    Cancelled,
    /// The failure itself could not be recorded; the job is still
    /// `processing`.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobOutcome {
    pub job_id: i64,
    pub url: String,
    pub domain: String,
    pub status: OutcomeStatus,
    pub attempts: i32,
    pub rate_limited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_at: Option<DateTime<Utc>>,
}

impl JobOutcome {
    fn new(job: &CrawlJob, status: OutcomeStatus) -> Self {
        Self {
            job_id: job.id,
            url: job.url.clone(),
            domain: job.domain.clone(),
            status,
            attempts: job.attempts,
            rate_limited: false,
            content_id: None,
            error: None,
            retry_at: None,
        }
    }
}

/// Aggregate result of one batch run.
///
/// `processed == succeeded + failed + cancelled`; `rate_limited` and
/// `dead_lettered` are subsets of `failed`. `recovered` counts stale claims
/// settled before claiming and is not part of `processed`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResult {
    pub recovered: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub rate_limited: usize,
    pub dead_lettered: usize,
    pub cancelled: usize,
    pub jobs: Vec<JobOutcome>,
}

impl BatchResult {
    fn push(&mut self, outcome: JobOutcome) {
        self.processed += 1;
        match outcome.status {
            OutcomeStatus::Completed => self.succeeded += 1,
            OutcomeStatus::Cancelled => self.cancelled += 1,
            OutcomeStatus::DeadLettered => {
                self.failed += 1;
                self.dead_lettered += 1;
            }
            OutcomeStatus::Retrying | OutcomeStatus::Failed => self.failed += 1,
        }
        if outcome.rate_limited && outcome.status != OutcomeStatus::Cancelled {
            self.rate_limited += 1;
        }
        self.jobs.push(outcome);
    }
}

impl Pipeline {
    /// Claim up to `batch_size` jobs and run them, `max_concurrent` at a time.
    ///
    /// Stale claims are swept first (see [`Pipeline::recover_stale_jobs`]).
    /// Both limits are clamped to [`MAX_BATCH_SIZE`] and
    /// [`MAX_BATCH_CONCURRENCY`]; concurrency is at least 1.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] only if the very first claim fails. Later claim
    /// failures end claiming early and the batch runs what it holds.
    pub async fn run_batch(
        &self,
        batch_size: usize,
        max_concurrent: usize,
    ) -> Result<BatchResult, StoreError> {
        let batch_size = batch_size.min(MAX_BATCH_SIZE);
        let max_concurrent = max_concurrent.clamp(1, MAX_BATCH_CONCURRENCY);

        let recovered = match self.recover_stale_jobs().await {
            Ok(recovered) => recovered,
            Err(e) => {
                tracing::warn!(error = %e, "stale crawl job sweep failed");
                0
            }
        };

        let jobs = self.claim_batch(batch_size).await?;
        let mut result = BatchResult {
            recovered,
            ..BatchResult::default()
        };
        if jobs.is_empty() {
            tracing::debug!("no crawl jobs ready");
            return Ok(result);
        }

        tracing::info!(claimed = jobs.len(), max_concurrent, "running crawl batch");

        for chunk in jobs.chunks(max_concurrent) {
            let outcomes = join_all(chunk.iter().map(|job| self.process_job(job))).await;
            for outcome in outcomes {
                result.push(outcome);
            }
        }

        tracing::info!(
            recovered = result.recovered,
            processed = result.processed,
            succeeded = result.succeeded,
            failed = result.failed,
            rate_limited = result.rate_limited,
            dead_lettered = result.dead_lettered,
            cancelled = result.cancelled,
            "crawl batch finished"
        );
        Ok(result)
    }

    /// Fail jobs left `processing` past the claim lease, through the same
    /// backoff as any transient failure. Returns how many were settled.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the stale claims cannot be listed.
    pub async fn recover_stale_jobs(&self) -> Result<usize, StoreError> {
        let lease_secs = self.settings.claim_lease_secs;
        let stale = self
            .stores
            .jobs
            .stale_claims(lease_secs, STALE_SWEEP_LIMIT)
            .await?;

        let mut recovered = 0;
        for job in &stale {
            let outcome = self
                .settle_failure(job, JobFailure::ClaimExpired { lease_secs })
                .await;
            if matches!(
                outcome.status,
                OutcomeStatus::Retrying | OutcomeStatus::DeadLettered
            ) {
                recovered += 1;
            }
        }

        if recovered > 0 {
            tracing::warn!(recovered, lease_secs, "recovered stale crawl job claims");
        }
        Ok(recovered)
    }

    /// Claim up to `limit` jobs, stopping at the first empty claim.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the first claim fails.
    pub async fn claim_batch(&self, limit: usize) -> Result<Vec<CrawlJob>, StoreError> {
        let mut jobs = Vec::with_capacity(limit);
        while jobs.len() < limit {
            match self.stores.jobs.claim_next().await {
                Ok(Some(job)) => jobs.push(job),
                Ok(None) => break,
                Err(e) if jobs.is_empty() => return Err(e),
                Err(e) => {
                    tracing::error!(claimed = jobs.len(), error = %e, "claim failed; running partial batch");
                    break;
                }
            }
        }
        Ok(jobs)
    }

    async fn process_job(&self, job: &CrawlJob) -> JobOutcome {
        let target = Target {
            url: &job.url,
            url_hash: &job.url_hash,
            domain: &job.domain,
            source: &job.source,
        };

        match self.run_job(target).await {
            Ok(content_id) => match self.stores.jobs.complete(job.id, content_id).await {
                Ok(true) => {
                    tracing::info!(job_id = job.id, domain = %job.domain, content_id, "crawl job completed");
                    let mut outcome = JobOutcome::new(job, OutcomeStatus::Completed);
                    outcome.content_id = Some(content_id);
                    outcome
                }
                Ok(false) => {
                    tracing::info!(job_id = job.id, content_id, "crawl job cancelled in flight");
                    let mut outcome = JobOutcome::new(job, OutcomeStatus::Cancelled);
                    outcome.content_id = Some(content_id);
                    outcome
                }
                Err(e) => self.settle_failure(job, JobFailure::Store(e)).await,
            },
            Err(failure) => self.settle_failure(job, failure).await,
        }
    }

    async fn run_job(&self, target: Target<'_>) -> Result<i64, JobFailure> {
        self.admit(target.domain).await?;
        let (page, score) = self.fetch_and_score(target).await?;
        self.persist(target, page, &score).await
    }

    async fn settle_failure(&self, job: &CrawlJob, failure: JobFailure) -> JobOutcome {
        let message = failure.to_string();
        let rate_limited = matches!(failure, JobFailure::RateLimited(_));
        let transition = on_failure(job.attempts, job.max_attempts, failure.kind(), Utc::now());

        let (written, mut outcome) = match transition {
            FailureTransition::Retry { delay_secs, .. } => {
                tracing::warn!(
                    job_id = job.id,
                    domain = %job.domain,
                    attempts = job.attempts,
                    delay_secs,
                    error = %message,
                    "crawl job failed; retrying"
                );
                // The store stamps the due time from its own clock.
                let written = self
                    .stores
                    .jobs
                    .reschedule(job.id, delay_secs, &message)
                    .await;
                let mut outcome = JobOutcome::new(job, OutcomeStatus::Retrying);
                outcome.retry_at = written.as_ref().ok().copied().flatten();
                (written.map(|due| due.is_some()), outcome)
            }
            FailureTransition::DeadLetter => {
                tracing::error!(
                    job_id = job.id,
                    domain = %job.domain,
                    attempts = job.attempts,
                    error = %message,
                    "crawl job dead-lettered"
                );
                let written = self.stores.jobs.dead_letter(job.id, &message).await;
                (written, JobOutcome::new(job, OutcomeStatus::DeadLettered))
            }
        };

        match written {
            Ok(true) => {}
            Ok(false) => {
                outcome.status = OutcomeStatus::Cancelled;
                outcome.retry_at = None;
            }
            Err(e) => {
                tracing::error!(job_id = job.id, error = %e, "failed to record crawl job failure");
                outcome.status = OutcomeStatus::Failed;
                outcome.retry_at = None;
            }
        }
        outcome.rate_limited = rate_limited;
        outcome.error = Some(message);
        outcome
    }
}
