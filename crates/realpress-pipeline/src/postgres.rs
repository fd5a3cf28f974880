//! Postgres-backed stores, delegating to `realpress-db`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use realpress_core::{Admission, SubmissionStage};
use realpress_db::{
    CrawlJobFilter, NewContent, NewContentScore, NewCrawlJob, NewSubmission as NewSubmissionRow,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::collaborators::ContentScore;
use crate::error::StoreError;
use crate::store::{ContentStore, DomainLimiter, JobStore, SubmissionStore};
use crate::types::{
    ContentRecord, ContentSummary, CrawlDomain, CrawlJob, JobFilter, JobStats, NewJob,
    NewSubmission, Submission,
};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn enqueue(&self, job: &NewJob) -> Result<Option<i64>, StoreError> {
        let metadata = serde_json::to_value(&job.metadata).map_err(|e| StoreError::Corrupt {
            id: job.url.hash.clone(),
            reason: format!("metadata: {e}"),
        })?;
        let id = realpress_db::enqueue_crawl_job(
            &self.pool,
            &NewCrawlJob {
                url: &job.url.url,
                url_hash: &job.url.hash,
                domain: &job.url.domain,
                source: job.metadata.source_tag(),
                metadata: &metadata,
                priority: job.priority,
                max_attempts: job.max_attempts,
            },
        )
        .await?;
        Ok(id)
    }

    async fn claim_next(&self) -> Result<Option<CrawlJob>, StoreError> {
        realpress_db::claim_next_crawl_job(&self.pool)
            .await?
            .map(CrawlJob::try_from)
            .transpose()
    }

    async fn complete(&self, id: i64, content_id: i64) -> Result<bool, StoreError> {
        Ok(realpress_db::complete_crawl_job(&self.pool, id, content_id).await?)
    }

    async fn reschedule(
        &self,
        id: i64,
        delay_secs: i64,
        error: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(realpress_db::reschedule_crawl_job(&self.pool, id, delay_secs, error).await?)
    }

    async fn dead_letter(&self, id: i64, error: &str) -> Result<bool, StoreError> {
        Ok(realpress_db::dead_letter_crawl_job(&self.pool, id, error).await?)
    }

    async fn stale_claims(
        &self,
        lease_secs: i64,
        limit: i64,
    ) -> Result<Vec<CrawlJob>, StoreError> {
        let rows = realpress_db::stale_crawl_jobs(&self.pool, lease_secs, limit).await?;
        rows.into_iter().map(CrawlJob::try_from).collect()
    }

    async fn retry(&self, id: i64) -> Result<CrawlJob, StoreError> {
        CrawlJob::try_from(realpress_db::retry_crawl_job(&self.pool, id).await?)
    }

    async fn cancel(&self, id: i64) -> Result<CrawlJob, StoreError> {
        CrawlJob::try_from(realpress_db::cancel_crawl_job(&self.pool, id).await?)
    }

    async fn get(&self, id: i64) -> Result<CrawlJob, StoreError> {
        CrawlJob::try_from(realpress_db::get_crawl_job(&self.pool, id).await?)
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<CrawlJob>, StoreError> {
        let rows = realpress_db::list_crawl_jobs(
            &self.pool,
            &CrawlJobFilter {
                status: filter.status.map(|s| s.as_str().to_string()),
                domain: filter.domain.clone(),
                limit: filter.limit,
                offset: filter.offset,
            },
        )
        .await?;
        rows.into_iter().map(CrawlJob::try_from).collect()
    }

    async fn stats(&self) -> Result<JobStats, StoreError> {
        Ok(realpress_db::crawl_job_stats(&self.pool).await?.into())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(realpress_db::health_check(&self.pool).await?)
    }
}

#[async_trait]
impl DomainLimiter for PgStore {
    async fn check_admission(
        &self,
        domain: &str,
        window_ms: i64,
    ) -> Result<Admission, StoreError> {
        Ok(realpress_db::check_domain_admission(&self.pool, domain, window_ms).await?)
    }

    async fn record_request(
        &self,
        domain: &str,
        success: bool,
        score: Option<f64>,
    ) -> Result<(), StoreError> {
        Ok(realpress_db::record_domain_request(&self.pool, domain, success, score).await?)
    }

    async fn set_allowed(&self, domain: &str, allowed: bool) -> Result<CrawlDomain, StoreError> {
        let row = if allowed {
            realpress_db::unblock_domain(&self.pool, domain).await?
        } else {
            realpress_db::block_domain(&self.pool, domain).await?
        };
        Ok(row.into())
    }

    async fn set_priority(
        &self,
        domain: &str,
        is_priority: bool,
    ) -> Result<CrawlDomain, StoreError> {
        Ok(realpress_db::set_domain_priority(&self.pool, domain, is_priority)
            .await?
            .into())
    }

    async fn configure(
        &self,
        domain: &str,
        crawl_delay_ms: Option<i32>,
        max_concurrent: Option<i32>,
    ) -> Result<CrawlDomain, StoreError> {
        Ok(
            realpress_db::configure_domain(&self.pool, domain, crawl_delay_ms, max_concurrent)
                .await?
                .into(),
        )
    }

    async fn get_domain(&self, domain: &str) -> Result<CrawlDomain, StoreError> {
        Ok(realpress_db::get_domain(&self.pool, domain).await?.into())
    }

    async fn list_domains(&self, limit: i64, offset: i64) -> Result<Vec<CrawlDomain>, StoreError> {
        let rows = realpress_db::list_domains(&self.pool, limit, offset).await?;
        Ok(rows.into_iter().map(CrawlDomain::from).collect())
    }
}

#[async_trait]
impl ContentStore for PgStore {
    async fn find_by_url_hash(&self, url_hash: &str) -> Result<Option<i64>, StoreError> {
        Ok(realpress_db::find_content_id_by_url_hash(&self.pool, url_hash).await?)
    }

    async fn save_scored(
        &self,
        content: &ContentRecord,
        score: &ContentScore,
    ) -> Result<i64, StoreError> {
        let id = realpress_db::save_scored_content(
            &self.pool,
            &NewContent {
                url: &content.url,
                url_hash: &content.url_hash,
                domain: &content.domain,
                title: content.title.as_deref(),
                description: content.description.as_deref(),
                body_text: &content.body_text,
                content_hash: &content.content_hash,
                source: &content.source,
            },
            &NewContentScore {
                composite_score: score.composite_score,
                classification: score.classification.as_str(),
                confidence: score.confidence,
                provider_details: &score.provider_details,
            },
        )
        .await?;
        Ok(id)
    }

    async fn summary(&self, content_id: i64) -> Result<ContentSummary, StoreError> {
        Ok(realpress_db::get_content_summary(&self.pool, content_id)
            .await?
            .into())
    }
}

#[async_trait]
impl SubmissionStore for PgStore {
    async fn create(&self, submission: &NewSubmission) -> Result<Submission, StoreError> {
        let row = realpress_db::create_submission(
            &self.pool,
            &NewSubmissionRow {
                url: &submission.url.url,
                url_hash: &submission.url.hash,
                domain: &submission.url.domain,
                tier: submission.tier.as_str(),
                priority: submission.tier.priority(),
                max_attempts: submission.max_attempts,
            },
        )
        .await?;
        Submission::try_from(row)
    }

    async fn claim_next(&self) -> Result<Option<Submission>, StoreError> {
        realpress_db::claim_next_submission(&self.pool)
            .await?
            .map(Submission::try_from)
            .transpose()
    }

    async fn update_stage(&self, id: Uuid, stage: SubmissionStage) -> Result<bool, StoreError> {
        Ok(realpress_db::update_submission_stage(&self.pool, id, stage).await?)
    }

    async fn complete(&self, id: Uuid, content_id: i64) -> Result<bool, StoreError> {
        Ok(realpress_db::complete_submission(&self.pool, id, content_id).await?)
    }

    async fn reschedule(
        &self,
        id: Uuid,
        delay_secs: i64,
        error: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(realpress_db::reschedule_submission(&self.pool, id, delay_secs, error).await?)
    }

    async fn dead_letter(&self, id: Uuid, error: &str) -> Result<bool, StoreError> {
        Ok(realpress_db::dead_letter_submission(&self.pool, id, error).await?)
    }

    async fn stale_claims(
        &self,
        lease_secs: i64,
        limit: i64,
    ) -> Result<Vec<Submission>, StoreError> {
        let rows = realpress_db::stale_submissions(&self.pool, lease_secs, limit).await?;
        rows.into_iter().map(Submission::try_from).collect()
    }

    async fn cancel(&self, id: Uuid) -> Result<Submission, StoreError> {
        Submission::try_from(realpress_db::cancel_submission(&self.pool, id).await?)
    }

    async fn retry(&self, id: Uuid) -> Result<Submission, StoreError> {
        Submission::try_from(realpress_db::retry_submission(&self.pool, id).await?)
    }

    async fn get(&self, id: Uuid) -> Result<Submission, StoreError> {
        Submission::try_from(realpress_db::get_submission(&self.pool, id).await?)
    }

    async fn queue_position(&self, id: Uuid) -> Result<Option<i64>, StoreError> {
        Ok(realpress_db::submission_queue_position(&self.pool, id).await?)
    }
}
