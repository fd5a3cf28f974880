//! Database operations for `submissions`, the user-facing single-URL queue.
//!
//! Same claim and backoff shape as `crawl_jobs`, plus a stage label and
//! progress percentage for polling clients.

use chrono::{DateTime, Utc};
use realpress_core::SubmissionStage;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const RETRY_PRECONDITION: &str = "failed or dead_letter, with no other active submission";

const SUBMISSION_COLUMNS: &str = "id, url, url_hash, domain, tier, priority, status, stage, \
     progress, attempts, max_attempts, scheduled_at, started_at, completed_at, last_error, \
     content_id, created_at, updated_at";

/// A row from the `submissions` table.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SubmissionRow {
    pub id: Uuid,
    pub url: String,
    pub url_hash: String,
    pub domain: String,
    pub tier: String,
    pub priority: i32,
    pub status: String,
    pub stage: String,
    pub progress: i16,
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

#[derive(Debug, Clone)]
pub struct NewSubmission<'a> {
    pub url: &'a str,
    pub url_hash: &'a str,
    pub domain: &'a str,
    pub tier: &'a str,
    pub priority: i32,
    pub max_attempts: i32,
}

/// Create a submission, or return the one already in flight for this URL.
///
/// When the URL is already in the content index the new row is written
/// straight to `completed` with stage `done`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails.
pub async fn create_submission(
    pool: &PgPool,
    submission: &NewSubmission<'_>,
) -> Result<SubmissionRow, DbError> {
    if let Some(existing) = find_active_submission(pool, submission.url_hash).await? {
        return Ok(existing);
    }

    let done = SubmissionStage::Done;
    let row = sqlx::query_as::<_, SubmissionRow>(&format!(
        "INSERT INTO submissions \
             (id, url, url_hash, domain, tier, priority, max_attempts, \
              status, stage, progress, content_id, completed_at) \
         SELECT $1, $2, $3, $4, $5, $6, $7, \
                CASE WHEN c.id IS NULL THEN 'pending' ELSE 'completed' END, \
                CASE WHEN c.id IS NULL THEN $8 ELSE $9 END, \
                CASE WHEN c.id IS NULL THEN $10::smallint ELSE $11::smallint END, \
                c.id, \
                CASE WHEN c.id IS NULL THEN NULL ELSE NOW() END \
         FROM (SELECT 1) AS one \
         LEFT JOIN content c ON c.url_hash = $3 \
         ON CONFLICT (url_hash) WHERE status IN ('pending', 'processing') DO NOTHING \
         RETURNING {SUBMISSION_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(submission.url)
    .bind(submission.url_hash)
    .bind(submission.domain)
    .bind(submission.tier)
    .bind(submission.priority)
    .bind(submission.max_attempts)
    .bind(SubmissionStage::Queued.as_str())
    .bind(done.as_str())
    .bind(SubmissionStage::Queued.progress())
    .bind(done.progress())
    .fetch_optional(pool)
    .await?;

    if let Some(row) = row {
        return Ok(row);
    }

    // Lost a race with a concurrent submit of the same URL.
    find_active_submission(pool, submission.url_hash)
        .await?
        .ok_or(DbError::NotFound)
}

/// Claim the next eligible submission, using the crawl-job ordering rule.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn claim_next_submission(pool: &PgPool) -> Result<Option<SubmissionRow>, DbError> {
    let row = sqlx::query_as::<_, SubmissionRow>(&format!(
        "UPDATE submissions \
         SET status = 'processing', attempts = attempts + 1, \
             started_at = NOW(), updated_at = NOW() \
         WHERE id = ( \
             SELECT id FROM submissions \
             WHERE status = 'pending' \
               AND scheduled_at <= NOW() \
               AND attempts < max_attempts \
             ORDER BY priority DESC, scheduled_at ASC, created_at ASC, id ASC \
             FOR UPDATE SKIP LOCKED \
             LIMIT 1 \
         ) \
         RETURNING {SUBMISSION_COLUMNS}"
    ))
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Advance a processing submission's stage label and progress.
///
/// Returns `false` when the submission is no longer `processing`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn update_submission_stage(
    pool: &PgPool,
    id: Uuid,
    stage: SubmissionStage,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE submissions SET stage = $2, progress = $3, updated_at = NOW() \
         WHERE id = $1 AND status = 'processing'",
    )
    .bind(id)
    .bind(stage.as_str())
    .bind(stage.progress())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Mark a processing submission `completed` with its content.
///
/// Returns `false` when the submission is no longer `processing`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn complete_submission(
    pool: &PgPool,
    id: Uuid,
    content_id: i64,
) -> Result<bool, DbError> {
    let done = SubmissionStage::Done;
    let result = sqlx::query(
        "UPDATE submissions \
         SET status = 'completed', stage = $3, progress = $4, content_id = $2, \
             completed_at = NOW(), last_error = NULL, updated_at = NOW() \
         WHERE id = $1 AND status = 'processing'",
    )
    .bind(id)
    .bind(content_id)
    .bind(done.as_str())
    .bind(done.progress())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Put a processing submission back to `pending` with stage `retrying`,
/// due `delay_secs` from the database clock.
///
/// Returns the new `scheduled_at`, or `None` when the submission is no
/// longer `processing`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn reschedule_submission(
    pool: &PgPool,
    id: Uuid,
    delay_secs: i64,
    error: &str,
) -> Result<Option<DateTime<Utc>>, DbError> {
    let retrying = SubmissionStage::Retrying;
    let scheduled_at = sqlx::query_scalar::<_, DateTime<Utc>>(
        "UPDATE submissions \
         SET status = 'pending', stage = $4, progress = $5, \
             scheduled_at = NOW() + $2 * INTERVAL '1 second', \
             last_error = $3, updated_at = NOW() \
         WHERE id = $1 AND status = 'processing' \
         RETURNING scheduled_at",
    )
    .bind(id)
    .bind(delay_secs)
    .bind(error)
    .bind(retrying.as_str())
    .bind(retrying.progress())
    .fetch_optional(pool)
    .await?;

    Ok(scheduled_at)
}

/// Submissions that have sat in `processing` for longer than `lease_secs`,
/// oldest claim first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn stale_submissions(
    pool: &PgPool,
    lease_secs: i64,
    limit: i64,
) -> Result<Vec<SubmissionRow>, DbError> {
    let rows = sqlx::query_as::<_, SubmissionRow>(&format!(
        "SELECT {SUBMISSION_COLUMNS} FROM submissions \
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

/// Move a processing submission to `dead_letter` with stage `failed`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn dead_letter_submission(
    pool: &PgPool,
    id: Uuid,
    error: &str,
) -> Result<bool, DbError> {
    let failed = SubmissionStage::Failed;
    let result = sqlx::query(
        "UPDATE submissions \
         SET status = 'dead_letter', stage = $3, progress = $4, last_error = $2, \
             completed_at = NOW(), updated_at = NOW() \
         WHERE id = $1 AND status = 'processing'",
    )
    .bind(id)
    .bind(error)
    .bind(failed.as_str())
    .bind(failed.progress())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Cancel a submission that is neither `completed` nor already `cancelled`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] for an unknown id,
/// [`DbError::InvalidTransition`] for completed or cancelled submissions, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn cancel_submission(pool: &PgPool, id: Uuid) -> Result<SubmissionRow, DbError> {
    let cancelled = SubmissionStage::Cancelled;
    let row = sqlx::query_as::<_, SubmissionRow>(&format!(
        "UPDATE submissions \
         SET status = 'cancelled', stage = $2, progress = $3, \
             completed_at = NOW(), updated_at = NOW() \
         WHERE id = $1 AND status NOT IN ('completed', 'cancelled') \
         RETURNING {SUBMISSION_COLUMNS}"
    ))
    .bind(id)
    .bind(cancelled.as_str())
    .bind(cancelled.progress())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(row),
        None => Err(transition_error(pool, id, "not completed or cancelled").await),
    }
}

/// Reset a `failed` or `dead_letter` submission to a fresh queued one.
///
/// Refused while another submission for the same URL is in flight, since
/// only one may be active per URL.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] for an unknown id,
/// [`DbError::InvalidTransition`] when the status does not allow a retry or
/// the URL already has an active submission, or [`DbError::Sqlx`] if the
/// query fails.
pub async fn retry_submission(pool: &PgPool, id: Uuid) -> Result<SubmissionRow, DbError> {
    let queued = SubmissionStage::Queued;
    let row = sqlx::query_as::<_, SubmissionRow>(&format!(
        "UPDATE submissions \
         SET status = 'pending', stage = $2, progress = $3, attempts = 0, \
             last_error = NULL, scheduled_at = NOW(), started_at = NULL, \
             completed_at = NULL, updated_at = NOW() \
         WHERE id = $1 AND status IN ('failed', 'dead_letter') \
           AND NOT EXISTS ( \
               SELECT 1 FROM submissions active \
               WHERE active.url_hash = submissions.url_hash \
                 AND active.status IN ('pending', 'processing') \
           ) \
         RETURNING {SUBMISSION_COLUMNS}"
    ))
    .bind(id)
    .bind(queued.as_str())
    .bind(queued.progress())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(row),
        None => Err(transition_error(pool, id, RETRY_PRECONDITION).await),
    }
}

/// Fetch one submission by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_submission(pool: &PgPool, id: Uuid) -> Result<SubmissionRow, DbError> {
    sqlx::query_as::<_, SubmissionRow>(&format!(
        "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Number of pending submissions that would be claimed before this one.
///
/// `None` unless the submission itself is pending.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn submission_queue_position(pool: &PgPool, id: Uuid) -> Result<Option<i64>, DbError> {
    // Row comparison mixes sides so one operator reads as "higher priority,
    // then earlier on each tie-break column".
    let position = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(other.id) \
         FROM submissions me \
         LEFT JOIN submissions other \
           ON other.status = 'pending' \
          AND other.id <> me.id \
          AND (other.priority, me.scheduled_at, me.created_at, me.id) \
              > (me.priority, other.scheduled_at, other.created_at, other.id) \
         WHERE me.id = $1 AND me.status = 'pending' \
         GROUP BY me.id",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(position)
}

async fn find_active_submission(
    pool: &PgPool,
    url_hash: &str,
) -> Result<Option<SubmissionRow>, DbError> {
    let row = sqlx::query_as::<_, SubmissionRow>(&format!(
        "SELECT {SUBMISSION_COLUMNS} FROM submissions \
         WHERE url_hash = $1 AND status IN ('pending', 'processing') \
         LIMIT 1"
    ))
    .bind(url_hash)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

async fn transition_error(pool: &PgPool, id: Uuid, expected_status: &'static str) -> DbError {
    let exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM submissions WHERE id = $1)")
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
