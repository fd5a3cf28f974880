//! User-facing submission queue: tiered priority, staged progress, and a
//! fast path for URLs that are already ingested.

use chrono::Utc;
use realpress_core::{normalize_url, on_failure, FailureTransition, JobStatus, SubmissionStage, Tier};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{JobFailure, PipelineError, StoreError};
use crate::pipeline::{Pipeline, Target};
use crate::types::{ContentSummary, NewSubmission, Submission};
use crate::worker::STALE_SWEEP_LIMIT;

const SUBMISSION_SOURCE: &str = "submission";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionResult {
    pub content_id: i64,
    pub url: String,
    pub title: Option<String>,
    pub composite_score: Option<f64>,
    pub classification: Option<String>,
    pub confidence: Option<f64>,
}

impl From<ContentSummary> for SubmissionResult {
    fn from(summary: ContentSummary) -> Self {
        Self {
            content_id: summary.content_id,
            url: summary.url,
            title: summary.title,
            composite_score: summary.composite_score,
            classification: summary.classification,
            confidence: summary.confidence,
        }
    }
}

/// Caller-facing projection of a submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionStatus {
    pub id: Uuid,
    pub url: String,
    pub tier: Tier,
    pub status: JobStatus,
    pub stage: SubmissionStage,
    pub progress: i16,
    /// Pending submissions ahead of this one. Present only while pending.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<i64>,
    /// Present only once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SubmissionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// `recovered` counts stale claims settled before claiming and is not part
/// of `processed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubmissionBatchResult {
    pub recovered: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub rate_limited: usize,
    pub dead_lettered: usize,
}

enum SubmissionRun {
    Completed,
    Retrying,
    DeadLettered,
    /// The record left `processing` underneath us.
    Abandoned,
}

impl Pipeline {
    /// Submit a URL for scoring at the given tier.
    ///
    /// Returns the in-flight submission for the same URL if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidUrl`] for an unparseable URL, or
    /// [`PipelineError::Store`] if the submission store fails.
    pub async fn submit(&self, raw_url: &str, tier: Tier) -> Result<Submission, PipelineError> {
        let url = normalize_url(raw_url)?;
        let submission = self
            .stores
            .submissions
            .create(&NewSubmission {
                url,
                tier,
                max_attempts: self.settings.max_attempts,
            })
            .await?;

        tracing::info!(
            submission_id = %submission.id,
            url = %submission.url,
            tier = %submission.tier,
            status = %submission.status,
            "submission accepted"
        );
        Ok(submission)
    }

    /// Current status, queue position, and result of a submission.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown id, or another
    /// [`StoreError`] if a store fails.
    pub async fn submission_status(&self, id: Uuid) -> Result<SubmissionStatus, StoreError> {
        let submission = self.stores.submissions.get(id).await?;

        let queue_position = if submission.status == JobStatus::Pending {
            self.stores.submissions.queue_position(id).await?
        } else {
            None
        };

        let result = match (submission.status, submission.content_id) {
            (JobStatus::Completed, Some(content_id)) => {
                Some(self.stores.content.summary(content_id).await?.into())
            }
            _ => None,
        };

        Ok(SubmissionStatus {
            id: submission.id,
            url: submission.url,
            tier: submission.tier,
            status: submission.status,
            stage: submission.stage,
            progress: submission.progress,
            queue_position,
            result,
            last_error: submission.last_error,
        })
    }

    /// Cancel a submission. A run in flight finishes, but its result is
    /// discarded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown id,
    /// [`StoreError::InvalidTransition`] for completed or cancelled
    /// submissions, or another [`StoreError`] if the store fails.
    pub async fn cancel_submission(&self, id: Uuid) -> Result<Submission, StoreError> {
        let submission = self.stores.submissions.cancel(id).await?;
        tracing::info!(submission_id = %id, "submission cancelled");
        Ok(submission)
    }

    /// Requeue a failed or dead-lettered submission with a fresh attempt
    /// budget.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown id,
    /// [`StoreError::InvalidTransition`] when the submission is not failed or
    /// dead-lettered or its URL has another active submission, or another
    /// [`StoreError`] if the store fails.
    pub async fn retry_submission(&self, id: Uuid) -> Result<Submission, StoreError> {
        let submission = self.stores.submissions.retry(id).await?;
        tracing::info!(submission_id = %id, "submission requeued");
        Ok(submission)
    }

    /// Fail submissions left `processing` past the claim lease. Returns how
    /// many were settled.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the stale claims cannot be listed.
    pub async fn recover_stale_submissions(&self) -> Result<usize, StoreError> {
        let lease_secs = self.settings.claim_lease_secs;
        let stale = self
            .stores
            .submissions
            .stale_claims(lease_secs, STALE_SWEEP_LIMIT)
            .await?;

        let mut recovered = 0;
        for submission in &stale {
            let (run, _) = self
                .settle_submission(submission, JobFailure::ClaimExpired { lease_secs })
                .await;
            if !matches!(run, SubmissionRun::Abandoned) {
                recovered += 1;
            }
        }

        if recovered > 0 {
            tracing::warn!(recovered, lease_secs, "recovered stale submission claims");
        }
        Ok(recovered)
    }

    /// Claim and drive up to `batch_size` submissions, one at a time, after
    /// sweeping stale claims.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if claiming fails before any submission is
    /// processed.
    pub async fn process_submissions(
        &self,
        batch_size: usize,
    ) -> Result<SubmissionBatchResult, StoreError> {
        let recovered = match self.recover_stale_submissions().await {
            Ok(recovered) => recovered,
            Err(e) => {
                tracing::warn!(error = %e, "stale submission sweep failed");
                0
            }
        };
        let mut result = SubmissionBatchResult {
            recovered,
            ..SubmissionBatchResult::default()
        };

        while result.processed < batch_size {
            let submission = match self.stores.submissions.claim_next().await {
                Ok(Some(submission)) => submission,
                Ok(None) => break,
                Err(e) if result.processed == 0 => return Err(e),
                Err(e) => {
                    tracing::error!(processed = result.processed, error = %e, "submission claim failed");
                    break;
                }
            };

            result.processed += 1;
            match self.drive_submission(&submission).await {
                (SubmissionRun::Completed, _) => result.succeeded += 1,
                (SubmissionRun::Retrying, rate_limited) => {
                    result.failed += 1;
                    result.rate_limited += usize::from(rate_limited);
                }
                (SubmissionRun::DeadLettered, rate_limited) => {
                    result.failed += 1;
                    result.dead_lettered += 1;
                    result.rate_limited += usize::from(rate_limited);
                }
                (SubmissionRun::Abandoned, _) => {}
            }
        }

        if result.processed > 0 || result.recovered > 0 {
            tracing::info!(
                recovered = result.recovered,
                processed = result.processed,
                succeeded = result.succeeded,
                failed = result.failed,
                rate_limited = result.rate_limited,
                dead_lettered = result.dead_lettered,
                "submission batch finished"
            );
        }
        Ok(result)
    }

    async fn drive_submission(&self, submission: &Submission) -> (SubmissionRun, bool) {
        match self.run_submission(submission).await {
            Ok(content_id) => match self.stores.submissions.complete(submission.id, content_id).await {
                Ok(true) => {
                    tracing::info!(submission_id = %submission.id, content_id, "submission completed");
                    (SubmissionRun::Completed, false)
                }
                Ok(false) => (SubmissionRun::Abandoned, false),
                Err(e) => self.settle_submission(submission, JobFailure::Store(e)).await,
            },
            Err(failure) => self.settle_submission(submission, failure).await,
        }
    }

    async fn run_submission(&self, submission: &Submission) -> Result<i64, JobFailure> {
        if let Some(content_id) = self
            .stores
            .content
            .find_by_url_hash(&submission.url_hash)
            .await?
        {
            tracing::debug!(submission_id = %submission.id, content_id, "submission already ingested");
            return Ok(content_id);
        }

        let target = Target {
            url: &submission.url,
            url_hash: &submission.url_hash,
            domain: &submission.domain,
            source: SUBMISSION_SOURCE,
        };

        self.admit(target.domain).await?;
        self.set_stage(submission.id, SubmissionStage::Fetching).await?;
        let page = match self.registry.extractor.extract(target.url).await {
            Ok(page) => page,
            Err(e) => {
                self.record_failure(target.domain).await;
                return Err(e.into());
            }
        };

        self.set_stage(submission.id, SubmissionStage::Scoring).await?;
        let score = self.score_page(target, &page).await?;

        self.set_stage(submission.id, SubmissionStage::Saving).await?;
        self.persist(target, page, &score).await
    }

    async fn set_stage(&self, id: Uuid, stage: SubmissionStage) -> Result<(), JobFailure> {
        if !self.stores.submissions.update_stage(id, stage).await? {
            tracing::debug!(submission_id = %id, stage = stage.as_str(), "stage update skipped");
        }
        Ok(())
    }

    async fn record_failure(&self, domain: &str) {
        if let Err(e) = self.stores.domains.record_request(domain, false, None).await {
            tracing::warn!(domain, error = %e, "failed to record domain request outcome");
        }
    }

    async fn settle_submission(
        &self,
        submission: &Submission,
        failure: JobFailure,
    ) -> (SubmissionRun, bool) {
        let message = failure.to_string();
        let rate_limited = matches!(failure, JobFailure::RateLimited(_));
        let (written, run) = match on_failure(
            submission.attempts,
            submission.max_attempts,
            failure.kind(),
            Utc::now(),
        ) {
            FailureTransition::Retry { delay_secs, .. } => {
                tracing::warn!(
                    submission_id = %submission.id,
                    attempts = submission.attempts,
                    delay_secs,
                    error = %message,
                    "submission failed; retrying"
                );
                let written = self
                    .stores
                    .submissions
                    .reschedule(submission.id, delay_secs, &message)
                    .await
                    .map(|due| due.is_some());
                (written, SubmissionRun::Retrying)
            }
            FailureTransition::DeadLetter => {
                tracing::error!(
                    submission_id = %submission.id,
                    attempts = submission.attempts,
                    error = %message,
                    "submission dead-lettered"
                );
                let written = self
                    .stores
                    .submissions
                    .dead_letter(submission.id, &message)
                    .await;
                (written, SubmissionRun::DeadLettered)
            }
        };

        match written {
            Ok(true) => (run, rate_limited),
            Ok(false) => (SubmissionRun::Abandoned, false),
            Err(e) => {
                tracing::error!(submission_id = %submission.id, error = %e, "failed to record submission failure");
                (run, rate_limited)
            }
        }
    }
}
