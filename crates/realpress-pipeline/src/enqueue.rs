//! Deduplicated enqueue of crawl jobs.

use realpress_core::{normalize_url, JobMetadata, UrlError};
use serde::Serialize;

use crate::error::PipelineError;
use crate::pipeline::Pipeline;
use crate::types::NewJob;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Created(i64),
    /// Already queued or already ingested.
    Duplicate,
    Invalid(UrlError),
}

/// Per-batch counts. `created + duplicates + invalid` equals the input length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnqueueSummary {
    pub created: usize,
    pub duplicates: usize,
    pub invalid: usize,
}

impl EnqueueSummary {
    fn add(&mut self, outcome: &EnqueueOutcome) {
        match outcome {
            EnqueueOutcome::Created(_) => self.created += 1,
            EnqueueOutcome::Duplicate => self.duplicates += 1,
            EnqueueOutcome::Invalid(_) => self.invalid += 1,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.created + self.duplicates + self.invalid
    }
}

impl Pipeline {
    /// Enqueue one URL unless its normalized form is already queued or
    /// ingested.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidMetadata`] for metadata missing
    /// required fields, or [`PipelineError::Store`] if the job store fails.
    /// An unparseable URL is an [`EnqueueOutcome::Invalid`], not an error.
    pub async fn enqueue_one(
        &self,
        raw_url: &str,
        metadata: &JobMetadata,
        priority: i32,
    ) -> Result<EnqueueOutcome, PipelineError> {
        metadata.validate()?;
        self.enqueue_validated(raw_url, metadata, priority).await
    }

    /// Enqueue a list of URLs with shared metadata and priority.
    ///
    /// Duplicates, including repeats within `urls`, and invalid URLs are
    /// counted rather than treated as errors.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidMetadata`] before anything is enqueued
    /// if the metadata is invalid, or [`PipelineError::Store`] if the job
    /// store fails part way through.
    pub async fn enqueue_batch<S: AsRef<str>>(
        &self,
        urls: &[S],
        metadata: &JobMetadata,
        priority: i32,
    ) -> Result<EnqueueSummary, PipelineError> {
        metadata.validate()?;

        let mut summary = EnqueueSummary::default();
        for raw in urls {
            let outcome = self
                .enqueue_validated(raw.as_ref(), metadata, priority)
                .await?;
            summary.add(&outcome);
        }

        tracing::info!(
            source = metadata.source_tag(),
            created = summary.created,
            duplicates = summary.duplicates,
            invalid = summary.invalid,
            "enqueued crawl batch"
        );
        Ok(summary)
    }

    async fn enqueue_validated(
        &self,
        raw_url: &str,
        metadata: &JobMetadata,
        priority: i32,
    ) -> Result<EnqueueOutcome, PipelineError> {
        let url = match normalize_url(raw_url) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(url = raw_url, error = %e, "skipping invalid URL");
                return Ok(EnqueueOutcome::Invalid(e));
            }
        };

        let job = NewJob {
            url,
            metadata: metadata.clone(),
            priority,
            max_attempts: self.settings.max_attempts,
        };
        match self.stores.jobs.enqueue(&job).await? {
            Some(id) => {
                tracing::debug!(job_id = id, url = %job.url.url, "enqueued crawl job");
                Ok(EnqueueOutcome::Created(id))
            }
            None => Ok(EnqueueOutcome::Duplicate),
        }
    }
}
