//! Database operations for `crawl_jobs`.
//!
//! Every status write is a single guarded `UPDATE`, so overlapping batch runs
//! can share the table without coordination.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

const JOB_COLUMNS: &str = "id, url, url_hash, domain, source, metadata, priority, status, \
     attempts, max_attempts, scheduled_at, started_at, completed_at, last_error, content_id, \
     created_at, updated_at";

/// A row from the `crawl_jobs` table.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct CrawlJobRow {
    pub id: i64,
    pub url: String,
    pub url_hash: String,
    pub domain: String,
    pub source: String,
    pub metadata: serde_json::Value,
    pub priority: i32,
    pub status: String,
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

/// Fields for a new job. `url` must already be normalized.
#[derive(Debug, Clone)]
pub struct NewCrawlJob<'a> {
    pub url: &'a str,
    pub url_hash: &'a str,
    pub domain: &'a str,
    pub source: &'a str,
    pub metadata: &'a serde_json::Value,
    pub priority: i32,
    pub max_attempts: i32,
}

#[derive(Debug, Clone, Default)]
pub struct CrawlJobFilter {
    pub status: Option<String>,
    pub domain: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

/// Job counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlJobStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub dead_letter: i64,
    pub cancelled: i64,
    pub total: i64,
}

/// Insert a pending job unless its URL hash is already queued or ingested.
///
/// Returns the new job id, or `None` for a duplicate.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn enqueue_crawl_job(
    pool: &PgPool,
    job: &NewCrawlJob<'_>,
) -> Result<Option<i64>, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO crawl_jobs \
             (url, url_hash, domain, source, metadata, priority, max_attempts) \
         SELECT $1, $2, $3, $4, $5, $6, $7 \
         WHERE NOT EXISTS (SELECT 1 FROM content WHERE url_hash = $2) \
         ON CONFLICT (url_hash) DO NOTHING \
         RETURNING id",
    )
    .bind(job.url)
    .bind(job.url_hash)
    .bind(job.domain)
    .bind(job.source)
    .bind(job.metadata)
    .bind(job.priority)
    .bind(job.max_attempts)
    .fetch_optional(pool)
    .await?;

    Ok(id)
}

/// Claim the next eligible job and mark it `processing`.
///
/// Eligible means pending, due, and under its attempt limit. Ordering is
/// priority descending, then oldest `scheduled_at`, then lowest id.
/// `SKIP LOCKED` lets concurrent claimers pass over rows another
/// transaction is already taking.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn claim_next_crawl_job(pool: &PgPool) -> Result<Option<CrawlJobRow>, DbError> {
    let row = sqlx::query_as::<_, CrawlJobRow>(&format!(
        "UPDATE crawl_jobs \
         SET status = 'processing', attempts = attempts + 1, \
             started_at = NOW(), updated_at = NOW() \
         WHERE id = ( \
             SELECT id FROM crawl_jobs \
             WHERE status = 'pending' \
               AND scheduled_at <= NOW() \
               AND attempts < max_attempts \
             ORDER BY priority DESC, scheduled_at ASC, id ASC \
             FOR UPDATE SKIP LOCKED \
             LIMIT 1 \
         ) \
         RETURNING {JOB_COLUMNS}"
    ))
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Claim up to `limit` jobs, stopping at the first empty claim.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a claim fails. Jobs claimed before the
/// failure stay `processing`.
pub async fn claim_crawl_jobs(pool: &PgPool, limit: usize) -> Result<Vec<CrawlJobRow>, DbError> {
    let mut claimed = Vec::with_capacity(limit);
    while claimed.len() < limit {
        match claim_next_crawl_job(pool).await? {
            Some(row) => claimed.push(row),
            None => break,
        }
    }
    Ok(claimed)
}

/// Mark a processing job `completed` and link its content.
///
/// Returns `false` when the job is no longer `processing`, which happens
/// when it was cancelled while in flight.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn complete_crawl_job(
    pool: &PgPool,
    id: i64,
    content_id: i64,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE crawl_jobs \
         SET status = 'completed', completed_at = NOW(), content_id = $2, \
             last_error = NULL, updated_at = NOW() \
         WHERE id = $1 AND status = 'processing'",
    )
    .bind(id)
    .bind(content_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Put a processing job back to `pending`, due `delay_secs` from the
/// database clock.
///
/// Returns the new `scheduled_at`, or `None` when the job is no longer
/// `processing`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn reschedule_crawl_job(
    pool: &PgPool,
    id: i64,
    delay_secs: i64,
    error: &str,
) -> Result<Option<DateTime<Utc>>, DbError> {
    let scheduled_at = sqlx::query_scalar::<_, DateTime<Utc>>(
        "UPDATE crawl_jobs \
         SET status = 'pending', scheduled_at = NOW() + $2 * INTERVAL '1 second', \
             last_error = $3, updated_at = NOW() \
         WHERE id = $1 AND status = 'processing' \
         RETURNING scheduled_at",
    )
    .bind(id)
    .bind(delay_secs)
    .bind(error)
    .fetch_optional(pool)
    .await?;

    Ok(scheduled_at)
}

/// Jobs that have sat in `processing` for longer than `lease_secs`, oldest
/// claim first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn stale_crawl_jobs(
    pool: &PgPool,
    lease_secs: i64,
    limit: i64,
) -> Result<Vec<CrawlJobRow>, DbError> {
    let rows = sqlx::query_as::<_, CrawlJobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM crawl_jobs \
         WHERE status = 'processing' \
           AND started_at < NOW() - $1 * INTERVAL '1 second' \
         ORDER BY started_at ASC, id ASC \
         LIMIT $2"
    ))
    .bind(lease_secs)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Move a processing job to `dead_letter`.
///
/// Returns `false` when the job is no longer `processing`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn dead_letter_crawl_job(pool: &PgPool, id: i64, error: &str) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE crawl_jobs \
         SET status = 'dead_letter', completed_at = NOW(), last_error = $2, updated_at = NOW() \
         WHERE id = $1 AND status = 'processing'",
    )
    .bind(id)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Reset a `failed` or `dead_letter` job to a fresh pending job, due now.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] for an unknown id,
/// [`DbError::InvalidTransition`] when the job is in any other status, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn retry_crawl_job(pool: &PgPool, id: i64) -> Result<CrawlJobRow, DbError> {
    let row = sqlx::query_as::<_, CrawlJobRow>(&format!(
        "UPDATE crawl_jobs \
         SET status = 'pending', attempts = 0, last_error = NULL, \
             scheduled_at = NOW(), started_at = NULL, completed_at = NULL, updated_at = NOW() \
         WHERE id = $1 AND status IN ('failed', 'dead_letter') \
         RETURNING {JOB_COLUMNS}"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(row),
        None => Err(transition_error(pool, id, "failed or dead_letter").await),
    }
}

/// Cancel a job that is neither `completed` nor already `cancelled`.
///
/// A job cancelled while `processing` finishes its current run, but the
/// completion write will not apply.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] for an unknown id,
/// [`DbError::InvalidTransition`] for completed or cancelled jobs, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn cancel_crawl_job(pool: &PgPool, id: i64) -> Result<CrawlJobRow, DbError> {
    let row = sqlx::query_as::<_, CrawlJobRow>(&format!(
        "UPDATE crawl_jobs \
         SET status = 'cancelled', completed_at = NOW(), updated_at = NOW() \
         WHERE id = $1 AND status NOT IN ('completed', 'cancelled') \
         RETURNING {JOB_COLUMNS}"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(row),
        None => Err(transition_error(pool, id, "not completed or cancelled").await),
    }
}

/// Fetch one job by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_crawl_job(pool: &PgPool, id: i64) -> Result<CrawlJobRow, DbError> {
    sqlx::query_as::<_, CrawlJobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM crawl_jobs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// List jobs, newest first, optionally filtered by status and domain.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_crawl_jobs(
    pool: &PgPool,
    filter: &CrawlJobFilter,
) -> Result<Vec<CrawlJobRow>, DbError> {
    let rows = sqlx::query_as::<_, CrawlJobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM crawl_jobs \
         WHERE ($1::text IS NULL OR status = $1) \
           AND ($2::text IS NULL OR domain = $2) \
         ORDER BY created_at DESC, id DESC \
         LIMIT $3 OFFSET $4"
    ))
    .bind(filter.status.as_deref())
    .bind(filter.domain.as_deref())
    .bind(filter.limit)
    .bind(filter.offset)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Count jobs in each status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn crawl_job_stats(pool: &PgPool) -> Result<CrawlJobStats, DbError> {
    let counts = sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM crawl_jobs GROUP BY status",
    )
    .fetch_all(pool)
    .await?;

    Ok(CrawlJobStats::from_counts(counts))
}

impl CrawlJobStats {
    /// Fold `(status, count)` pairs into the per-status fields.
    ///
    /// Unknown statuses still count toward `total`.
    #[must_use]
    pub fn from_counts<I>(counts: I) -> Self
    where
        I: IntoIterator<Item = (String, i64)>,
    {
        let mut stats = Self::default();
        for (status, count) in counts {
            match status.as_str() {
                "pending" => stats.pending += count,
                "processing" => stats.processing += count,
                "completed" => stats.completed += count,
                "failed" => stats.failed += count,
                "dead_letter" => stats.dead_letter += count,
                "cancelled" => stats.cancelled += count,
                _ => {}
            }
            stats.total += count;
        }
        stats
    }
}

async fn transition_error(pool: &PgPool, id: i64, expected_status: &'static str) -> DbError {
    let exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM crawl_jobs WHERE id = $1)")
            .bind(id)
            .fetch_one(pool)
            .await;

    match exists {
        Ok(true) => DbError::InvalidTransition {
            id: id.to_string(),
            expected_status,
        },
        Ok(false) => DbError::NotFound,
        Err(e) => DbError::Sqlx(e),
    }
}
