//! Store-agnostic records passed between the pipeline and its stores.

use chrono::{DateTime, Utc};
use realpress_core::{JobMetadata, JobStatus, NormalizedUrl, SubmissionStage, Tier};
use realpress_db::{ContentSummaryRow, CrawlDomainRow, CrawlJobRow, CrawlJobStats, SubmissionRow};
use serde::Serialize;
use uuid::Uuid;

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlJob {
    pub id: i64,
    pub url: String,
    pub url_hash: String,
    pub domain: String,
    pub source: String,
    pub metadata: JobMetadata,
    pub priority: i32,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub content_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<CrawlJobRow> for CrawlJob {
    type Error = StoreError;

    fn try_from(row: CrawlJobRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StoreError::Corrupt {
            id: row.id.to_string(),
            reason,
        };
        let status = row
            .status
            .parse::<JobStatus>()
            .map_err(|e| corrupt(e.to_string()))?;
        let metadata = serde_json::from_value::<JobMetadata>(row.metadata.clone())
            .map_err(|e| corrupt(format!("metadata: {e}")))?;

        Ok(Self {
            id: row.id,
            url: row.url,
            url_hash: row.url_hash,
            domain: row.domain,
            source: row.source,
            metadata,
            priority: row.priority,
            status,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            scheduled_at: row.scheduled_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            last_error: row.last_error,
            content_id: row.content_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A job to enqueue. The source tag comes from `metadata`.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub url: NormalizedUrl,
    pub metadata: JobMetadata,
    pub priority: i32,
    pub max_attempts: i32,
}

#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub domain: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub dead_letter: i64,
    pub cancelled: i64,
    pub total: i64,
}

impl JobStats {
    pub fn count(&mut self, status: JobStatus) {
        match status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Processing => self.processing += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::DeadLetter => self.dead_letter += 1,
            JobStatus::Cancelled => self.cancelled += 1,
        }
        self.total += 1;
    }
}

impl From<CrawlJobStats> for JobStats {
    fn from(stats: CrawlJobStats) -> Self {
        Self {
            pending: stats.pending,
            processing: stats.processing,
            completed: stats.completed,
            failed: stats.failed,
            dead_letter: stats.dead_letter,
            cancelled: stats.cancelled,
            total: stats.total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlDomain {
    pub domain: String,
    pub allowed: bool,
    pub is_priority: bool,
    pub crawl_delay_ms: i32,
    pub max_concurrent: i32,
    pub requests_in_window: i64,
    pub window_start: DateTime<Utc>,
    pub success_count: i64,
    pub failure_count: i64,
    #[serde(skip)]
    pub scored_count: i64,
    pub avg_score: Option<f64>,
    pub last_request_at: Option<DateTime<Utc>>,
}

impl From<CrawlDomainRow> for CrawlDomain {
    fn from(row: CrawlDomainRow) -> Self {
        Self {
            domain: row.domain,
            allowed: row.allowed,
            is_priority: row.is_priority,
            crawl_delay_ms: row.crawl_delay_ms,
            max_concurrent: row.max_concurrent,
            requests_in_window: row.requests_in_window,
            window_start: row.window_start,
            success_count: row.success_count,
            failure_count: row.failure_count,
            scored_count: row.scored_count,
            avg_score: row.avg_score,
            last_request_at: row.last_request_at,
        }
    }
}

/// Extracted content ready to persist.
#[derive(Debug, Clone)]
pub struct ContentRecord {
    pub url: String,
    pub url_hash: String,
    pub domain: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub body_text: String,
    pub content_hash: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentSummary {
    pub content_id: i64,
    pub url: String,
    pub title: Option<String>,
    pub composite_score: Option<f64>,
    pub classification: Option<String>,
    pub confidence: Option<f64>,
}

impl From<ContentSummaryRow> for ContentSummary {
    fn from(row: ContentSummaryRow) -> Self {
        Self {
            content_id: row.content_id,
            url: row.url,
            title: row.title,
            composite_score: row.composite_score,
            classification: row.classification,
            confidence: row.confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    pub id: Uuid,
    pub url: String,
    pub url_hash: String,
    pub domain: String,
    pub tier: Tier,
    pub priority: i32,
    pub status: JobStatus,
    pub stage: SubmissionStage,
    pub progress: i16,
    pub attempts: i32,
    pub max_attempts: i32,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub content_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<SubmissionRow> for Submission {
    type Error = StoreError;

    fn try_from(row: SubmissionRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StoreError::Corrupt {
            id: row.id.to_string(),
            reason,
        };
        let tier = row
            .tier
            .parse::<Tier>()
            .map_err(|e| corrupt(e.to_string()))?;
        let status = row
            .status
            .parse::<JobStatus>()
            .map_err(|e| corrupt(e.to_string()))?;
        let stage = row
            .stage
            .parse::<SubmissionStage>()
            .map_err(|e| corrupt(e.to_string()))?;

        Ok(Self {
            id: row.id,
            url: row.url,
            url_hash: row.url_hash,
            domain: row.domain,
            tier,
            priority: row.priority,
            status,
            stage,
            progress: row.progress,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            scheduled_at: row.scheduled_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            last_error: row.last_error,
            content_id: row.content_id,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub url: NormalizedUrl,
    pub tier: Tier,
    pub max_attempts: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_row(status: &str, metadata: serde_json::Value) -> CrawlJobRow {
        let now = Utc::now();
        CrawlJobRow {
            id: 7,
            url: "https://example.com/a".to_string(),
            url_hash: "00".repeat(32),
            domain: "example.com".to_string(),
            source: "manual".to_string(),
            metadata,
            priority: 0,
            status: status.to_string(),
            attempts: 0,
            max_attempts: 3,
            scheduled_at: now,
            started_at: None,
            completed_at: None,
            last_error: None,
            content_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn job_row_converts_with_typed_status_and_metadata() {
        let job = CrawlJob::try_from(job_row(
            "dead_letter",
            serde_json::json!({"source": "manual"}),
        ))
        .unwrap();
        assert_eq!(job.status, JobStatus::DeadLetter);
        assert_eq!(job.metadata, JobMetadata::Manual);
    }

    #[test]
    fn unknown_status_is_a_corrupt_record() {
        let err = CrawlJob::try_from(job_row("running", serde_json::json!({"source": "manual"})))
            .unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { ref id, .. } if id == "7"));
    }

    #[test]
    fn untagged_metadata_is_a_corrupt_record() {
        let err = CrawlJob::try_from(job_row("pending", serde_json::json!({}))).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn stats_count_by_status() {
        let mut stats = JobStats::default();
        stats.count(JobStatus::Pending);
        stats.count(JobStatus::Pending);
        stats.count(JobStatus::Cancelled);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.total, 3);
    }
}
