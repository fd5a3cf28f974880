//! Postgres access for the crawl pipeline: pool setup, migrations, and one
//! module of free query functions per table.

use std::time::Duration;

use realpress_core::AppConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

// Resolved against this crate's manifest: <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    /// A conditional update matched no row in the expected state.
    #[error("{id} cannot transition: expected status {expected_status}")]
    InvalidTransition {
        id: String,
        expected_status: &'static str,
    },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// # Errors
///
/// Returns [`sqlx::Error`] if the pool cannot connect within the acquire
/// timeout.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Apply pending migrations and return how many ran.
///
/// # Errors
///
/// Returns [`DbError::Migration`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, DbError> {
    let before = applied_migrations(pool).await;
    MIGRATOR.run(pool).await?;
    let after = applied_migrations(pool).await;
    Ok(usize::try_from(after - before).unwrap_or(0))
}

// _sqlx_migrations is absent on a fresh database; that counts as zero.
async fn applied_migrations(pool: &PgPool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
        .fetch_one(pool)
        .await
        .unwrap_or(0)
}

/// Round-trip a trivial query to prove the pool has a live connection.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pool_keeps_one_warm_connection() {
        let config = PoolConfig::default();
        assert_eq!(config.min_connections, 1);
        assert!(config.max_connections >= config.min_connections);
    }

    #[test]
    fn invalid_transition_names_the_expected_status() {
        let err = DbError::InvalidTransition {
            id: "42".to_string(),
            expected_status: "processing",
        };
        assert_eq!(
            err.to_string(),
            "42 cannot transition: expected status processing"
        );
    }
}

pub mod content;
pub mod crawl_domains;
pub mod crawl_jobs;
pub mod seed;
pub mod submissions;

pub use content::{
    find_content_id_by_url_hash, get_content_summary, save_scored_content, ContentSummaryRow,
    NewContent, NewContentScore,
};
pub use crawl_domains::{
    block_domain, check_domain_admission, configure_domain, get_domain, list_domains,
    record_domain_request, set_domain_priority, unblock_domain, CrawlDomainRow,
};
pub use crawl_jobs::{
    cancel_crawl_job, claim_crawl_jobs, claim_next_crawl_job, complete_crawl_job,
    crawl_job_stats, dead_letter_crawl_job, enqueue_crawl_job, get_crawl_job, list_crawl_jobs,
    reschedule_crawl_job, retry_crawl_job, stale_crawl_jobs, CrawlJobFilter, CrawlJobRow,
    CrawlJobStats, NewCrawlJob,
};
pub use seed::seed_domains;
pub use submissions::{
    cancel_submission, claim_next_submission, complete_submission, create_submission,
    dead_letter_submission, get_submission, reschedule_submission, retry_submission,
    stale_submissions, submission_queue_position, update_submission_stage, NewSubmission,
    SubmissionRow,
};
