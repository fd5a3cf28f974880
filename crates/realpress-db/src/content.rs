//! Database operations for `content` and `content_scores`.

use sqlx::PgPool;

use crate::DbError;

/// Fields for a content upsert keyed on `url_hash`.
#[derive(Debug, Clone)]
pub struct NewContent<'a> {
    pub url: &'a str,
    pub url_hash: &'a str,
    pub domain: &'a str,
    pub title: Option<&'a str>,
    pub description: Option<&'a str>,
    pub body_text: &'a str,
    pub content_hash: &'a str,
    pub source: &'a str,
}

#[derive(Debug, Clone)]
pub struct NewContentScore<'a> {
    pub composite_score: f64,
    pub classification: &'a str,
    pub confidence: f64,
    pub provider_details: &'a serde_json::Value,
}

/// A content record joined with its most recent score.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ContentSummaryRow {
    pub content_id: i64,
    pub url: String,
    pub title: Option<String>,
    pub composite_score: Option<f64>,
    pub classification: Option<String>,
    pub confidence: Option<f64>,
}

/// Look up the content id already ingested for a URL hash.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_content_id_by_url_hash(
    pool: &PgPool,
    url_hash: &str,
) -> Result<Option<i64>, DbError> {
    let id = sqlx::query_scalar::<_, i64>("SELECT id FROM content WHERE url_hash = $1")
        .bind(url_hash)
        .fetch_optional(pool)
        .await?;

    Ok(id)
}

/// Upsert content on `url_hash` and record a score for it, in one transaction.
///
/// Re-processing the same URL refreshes the content row in place and appends
/// a new score, so duplicate executions never create a second content row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either write fails; neither is kept.
pub async fn save_scored_content(
    pool: &PgPool,
    content: &NewContent<'_>,
    score: &NewContentScore<'_>,
) -> Result<i64, DbError> {
    let mut tx = pool.begin().await?;

    let content_id: i64 = sqlx::query_scalar(
        "INSERT INTO content \
             (url, url_hash, domain, title, description, body_text, content_hash, source) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (url_hash) DO UPDATE SET \
             title = EXCLUDED.title, \
             description = EXCLUDED.description, \
             body_text = EXCLUDED.body_text, \
             content_hash = EXCLUDED.content_hash, \
             updated_at = NOW() \
         RETURNING id",
    )
    .bind(content.url)
    .bind(content.url_hash)
    .bind(content.domain)
    .bind(content.title)
    .bind(content.description)
    .bind(content.body_text)
    .bind(content.content_hash)
    .bind(content.source)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO content_scores \
             (content_id, composite_score, classification, confidence, provider_details) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(content_id)
    .bind(score.composite_score)
    .bind(score.classification)
    .bind(score.confidence)
    .bind(score.provider_details)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(content_id)
}

/// Fetch a content record with its latest score.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no content has this id, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_content_summary(
    pool: &PgPool,
    content_id: i64,
) -> Result<ContentSummaryRow, DbError> {
    sqlx::query_as::<_, ContentSummaryRow>(
        "SELECT c.id AS content_id, c.url, c.title, \
                s.composite_score, s.classification, s.confidence \
         FROM content c \
         LEFT JOIN LATERAL ( \
             SELECT composite_score, classification, confidence \
             FROM content_scores \
             WHERE content_id = c.id \
             ORDER BY created_at DESC, id DESC \
             LIMIT 1 \
         ) s ON TRUE \
         WHERE c.id = $1",
    )
    .bind(content_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}
