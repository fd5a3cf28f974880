//! Database operations for `crawl_domains`: admission and domain policy.

use chrono::{DateTime, Utc};
use realpress_core::{window_cap, Admission, RejectReason};
use sqlx::PgPool;

use crate::DbError;

const DOMAIN_COLUMNS: &str = "domain, allowed, is_priority, crawl_delay_ms, max_concurrent, \
     requests_in_window, window_start, success_count, failure_count, scored_count, avg_score, \
     last_request_at, created_at, updated_at";

/// A row from the `crawl_domains` table.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct CrawlDomainRow {
    pub domain: String,
    pub allowed: bool,
    pub is_priority: bool,
    pub crawl_delay_ms: i32,
    pub max_concurrent: i32,
    pub requests_in_window: i64,
    pub window_start: DateTime<Utc>,
    pub success_count: i64,
    pub failure_count: i64,
    pub scored_count: i64,
    pub avg_score: Option<f64>,
    pub last_request_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Check and count one request against a domain's window in a single statement.
///
/// The row is created with default policy on first sight. The conditional
/// `UPDATE` either restarts an expired window at 1 or increments a window
/// still under its cap; when it matches nothing the request is rejected and
/// the row is read back only to report why.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails.
pub async fn check_domain_admission(
    pool: &PgPool,
    domain: &str,
    window_ms: i64,
) -> Result<Admission, DbError> {
    ensure_domain(pool, domain).await?;

    let admitted = sqlx::query_scalar::<_, i64>(
        "UPDATE crawl_domains SET \
             requests_in_window = CASE \
                 WHEN NOW() - window_start >= $2::float8 * INTERVAL '1 millisecond' THEN 1 \
                 ELSE requests_in_window + 1 END, \
             window_start = CASE \
                 WHEN NOW() - window_start >= $2::float8 * INTERVAL '1 millisecond' THEN NOW() \
                 ELSE window_start END, \
             last_request_at = NOW(), \
             updated_at = NOW() \
         WHERE domain = $1 \
           AND allowed \
           AND (NOW() - window_start >= $2::float8 * INTERVAL '1 millisecond' \
                OR requests_in_window < \
                   ($2::bigint / GREATEST(crawl_delay_ms, 1)) * GREATEST(max_concurrent, 0)) \
         RETURNING requests_in_window",
    )
    .bind(domain)
    .bind(window_ms)
    .fetch_optional(pool)
    .await?;

    if let Some(requests_in_window) = admitted {
        return Ok(Admission::Admitted { requests_in_window });
    }

    let (allowed, crawl_delay_ms, max_concurrent) = sqlx::query_as::<_, (bool, i32, i32)>(
        "SELECT allowed, crawl_delay_ms, max_concurrent FROM crawl_domains WHERE domain = $1",
    )
    .bind(domain)
    .fetch_one(pool)
    .await?;

    let reason = if allowed {
        RejectReason::WindowFull {
            cap: window_cap(window_ms, crawl_delay_ms, max_concurrent),
        }
    } else {
        RejectReason::Blocked
    };

    Ok(Admission::Rejected(reason))
}

/// Record the outcome of an admitted request.
///
/// Bumps the success or failure counter and folds `score` into the running
/// mean. The window counter is left alone; admission already counted it.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn record_domain_request(
    pool: &PgPool,
    domain: &str,
    success: bool,
    score: Option<f64>,
) -> Result<(), DbError> {
    ensure_domain(pool, domain).await?;

    sqlx::query(
        "UPDATE crawl_domains SET \
             success_count = success_count + CASE WHEN $2 THEN 1 ELSE 0 END, \
             failure_count = failure_count + CASE WHEN $2 THEN 0 ELSE 1 END, \
             avg_score = CASE \
                 WHEN $3::float8 IS NULL THEN avg_score \
                 ELSE (COALESCE(avg_score, 0) * scored_count + $3::float8) / (scored_count + 1) END, \
             scored_count = scored_count + CASE WHEN $3::float8 IS NULL THEN 0 ELSE 1 END, \
             last_request_at = NOW(), \
             updated_at = NOW() \
         WHERE domain = $1",
    )
    .bind(domain)
    .bind(success)
    .bind(score)
    .execute(pool)
    .await?;

    Ok(())
}

/// Block a domain. Admission rejects it until unblocked.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn block_domain(pool: &PgPool, domain: &str) -> Result<CrawlDomainRow, DbError> {
    set_allowed(pool, domain, false).await
}

/// Clear a domain's block flag.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn unblock_domain(pool: &PgPool, domain: &str) -> Result<CrawlDomainRow, DbError> {
    set_allowed(pool, domain, true).await
}

/// Mark or unmark a domain as priority.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn set_domain_priority(
    pool: &PgPool,
    domain: &str,
    is_priority: bool,
) -> Result<CrawlDomainRow, DbError> {
    let row = sqlx::query_as::<_, CrawlDomainRow>(&format!(
        "INSERT INTO crawl_domains (domain, is_priority) VALUES ($1, $2) \
         ON CONFLICT (domain) DO UPDATE SET is_priority = EXCLUDED.is_priority, updated_at = NOW() \
         RETURNING {DOMAIN_COLUMNS}"
    ))
    .bind(domain)
    .bind(is_priority)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Update a domain's crawl delay and concurrency. `None` keeps the current value.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails, including when a value
/// violates the table's range checks.
pub async fn configure_domain(
    pool: &PgPool,
    domain: &str,
    crawl_delay_ms: Option<i32>,
    max_concurrent: Option<i32>,
) -> Result<CrawlDomainRow, DbError> {
    let row = sqlx::query_as::<_, CrawlDomainRow>(&format!(
        "INSERT INTO crawl_domains (domain, crawl_delay_ms, max_concurrent) \
         VALUES ($1, COALESCE($2, 1000), COALESCE($3, 1)) \
         ON CONFLICT (domain) DO UPDATE SET \
             crawl_delay_ms = COALESCE($2, crawl_domains.crawl_delay_ms), \
             max_concurrent = COALESCE($3, crawl_domains.max_concurrent), \
             updated_at = NOW() \
         RETURNING {DOMAIN_COLUMNS}"
    ))
    .bind(domain)
    .bind(crawl_delay_ms)
    .bind(max_concurrent)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch one domain row.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the domain has never been seen, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_domain(pool: &PgPool, domain: &str) -> Result<CrawlDomainRow, DbError> {
    sqlx::query_as::<_, CrawlDomainRow>(&format!(
        "SELECT {DOMAIN_COLUMNS} FROM crawl_domains WHERE domain = $1"
    ))
    .bind(domain)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// List domains, priority domains first, then alphabetically.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_domains(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<Vec<CrawlDomainRow>, DbError> {
    let rows = sqlx::query_as::<_, CrawlDomainRow>(&format!(
        "SELECT {DOMAIN_COLUMNS} FROM crawl_domains \
         ORDER BY is_priority DESC, domain ASC \
         LIMIT $1 OFFSET $2"
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

async fn ensure_domain(pool: &PgPool, domain: &str) -> Result<(), DbError> {
    sqlx::query("INSERT INTO crawl_domains (domain) VALUES ($1) ON CONFLICT (domain) DO NOTHING")
        .bind(domain)
        .execute(pool)
        .await?;
    Ok(())
}

async fn set_allowed(pool: &PgPool, domain: &str, allowed: bool) -> Result<CrawlDomainRow, DbError> {
    let row = sqlx::query_as::<_, CrawlDomainRow>(&format!(
        "INSERT INTO crawl_domains (domain, allowed) VALUES ($1, $2) \
         ON CONFLICT (domain) DO UPDATE SET allowed = EXCLUDED.allowed, updated_at = NOW() \
         RETURNING {DOMAIN_COLUMNS}"
    ))
    .bind(domain)
    .bind(allowed)
    .fetch_one(pool)
    .await?;

    Ok(row)
}
