//! The pipeline handle and the per-URL steps shared by crawl jobs and
//! submissions.
//!
//! Entry points live next to the flow they drive: enqueue in
//! [`crate::enqueue`], batch runs in [`crate::worker`], and the submission
//! queue in [`crate::submissions`].

use std::sync::Arc;

use realpress_core::{Admission, AppConfig};

use crate::collaborators::{ContentScore, ExtractedPage, ScoreInput};
use crate::error::JobFailure;
use crate::registry::Registry;
use crate::store::{ContentStore, DomainLimiter, JobStore, SubmissionStore};
use crate::types::ContentRecord;

/// Store trait objects the pipeline reads and writes through.
#[derive(Clone)]
pub struct Stores {
    pub jobs: Arc<dyn JobStore>,
    pub domains: Arc<dyn DomainLimiter>,
    pub content: Arc<dyn ContentStore>,
    pub submissions: Arc<dyn SubmissionStore>,
}

impl Stores {
    /// Use one store for every seam.
    pub fn shared<T>(store: Arc<T>) -> Self
    where
        T: JobStore + DomainLimiter + ContentStore + SubmissionStore + 'static,
    {
        Self {
            jobs: store.clone(),
            domains: store.clone(),
            content: store.clone(),
            submissions: store,
        }
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Attempt budget given to newly enqueued jobs and submissions.
    pub max_attempts: i32,
    /// Rate-limit window length.
    pub window_ms: i64,
    /// Age after which a `processing` claim is presumed abandoned.
    pub claim_lease_secs: i64,
}

pub const DEFAULT_CLAIM_LEASE_SECS: i64 = 600;

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            window_ms: realpress_core::window::DEFAULT_WINDOW_MS,
            claim_lease_secs: DEFAULT_CLAIM_LEASE_SECS,
        }
    }
}

impl PipelineSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            window_ms: config.rate_window_ms(),
            claim_lease_secs: config.claim_lease_secs,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    pub(crate) stores: Stores,
    pub(crate) registry: Registry,
    pub(crate) settings: PipelineSettings,
}

/// The URL a single run works on, whichever queue it came from.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Target<'a> {
    pub url: &'a str,
    pub url_hash: &'a str,
    pub domain: &'a str,
    pub source: &'a str,
}

impl Pipeline {
    #[must_use]
    pub fn new(stores: Stores, registry: Registry, settings: PipelineSettings) -> Self {
        Self {
            stores,
            registry,
            settings,
        }
    }

    #[must_use]
    pub fn jobs(&self) -> &dyn JobStore {
        self.stores.jobs.as_ref()
    }

    #[must_use]
    pub fn domains(&self) -> &dyn DomainLimiter {
        self.stores.domains.as_ref()
    }

    #[must_use]
    pub fn content(&self) -> &dyn ContentStore {
        self.stores.content.as_ref()
    }

    #[must_use]
    pub fn settings(&self) -> PipelineSettings {
        self.settings
    }

    /// Count one request against the domain window.
    ///
    /// Fails open: a store error here admits the request.
    pub(crate) async fn admit(&self, domain: &str) -> Result<(), JobFailure> {
        match self
            .stores
            .domains
            .check_admission(domain, self.settings.window_ms)
            .await
        {
            Ok(Admission::Admitted { requests_in_window }) => {
                tracing::debug!(domain, requests_in_window, "domain admitted request");
                Ok(())
            }
            Ok(Admission::Rejected(reason)) => Err(JobFailure::RateLimited(reason)),
            Err(e) => {
                tracing::warn!(domain, error = %e, "domain admission check failed; admitting");
                Ok(())
            }
        }
    }

    /// Extract then score a page, recording the outcome on the domain.
    pub(crate) async fn fetch_and_score(
        &self,
        target: Target<'_>,
    ) -> Result<(ExtractedPage, ContentScore), JobFailure> {
        let page = match self.registry.extractor.extract(target.url).await {
            Ok(page) => page,
            Err(e) => {
                self.record(target.domain, false, None).await;
                return Err(e.into());
            }
        };

        let score = self.score_page(target, &page).await?;
        Ok((page, score))
    }

    /// Score an already-extracted page, recording the outcome on the domain.
    pub(crate) async fn score_page(
        &self,
        target: Target<'_>,
        page: &ExtractedPage,
    ) -> Result<ContentScore, JobFailure> {
        let input = ScoreInput::Text {
            text: page.text.clone(),
        };
        match self.registry.scorer.score(input).await {
            Ok(score) => {
                self.record(target.domain, true, Some(score.composite_score))
                    .await;
                Ok(score)
            }
            Err(e) => {
                self.record(target.domain, false, None).await;
                Err(e.into())
            }
        }
    }

    /// Upsert the content on its URL hash and attach the score.
    pub(crate) async fn persist(
        &self,
        target: Target<'_>,
        page: ExtractedPage,
        score: &ContentScore,
    ) -> Result<i64, JobFailure> {
        let record = ContentRecord {
            url: target.url.to_string(),
            url_hash: target.url_hash.to_string(),
            domain: target.domain.to_string(),
            title: page.title,
            description: page.description,
            body_text: page.text,
            content_hash: page.content_hash,
            source: target.source.to_string(),
        };
        Ok(self.stores.content.save_scored(&record, score).await?)
    }

    async fn record(&self, domain: &str, success: bool, score: Option<f64>) {
        if let Err(e) = self
            .stores
            .domains
            .record_request(domain, success, score)
            .await
        {
            tracing::warn!(domain, error = %e, "failed to record domain request outcome");
        }
    }
}
