use realpress_core::DomainPolicyConfig;
use sqlx::PgPool;

use crate::DbError;

/// Upsert domain policy from config into `crawl_domains`.
///
/// Fields left unset in config keep their stored value, or the column
/// default for new rows. Window and outcome counters are never touched.
/// All upserts run inside a single transaction.
///
/// Returns the number of domains processed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any database operation fails.
pub async fn seed_domains(pool: &PgPool, domains: &[DomainPolicyConfig]) -> Result<usize, DbError> {
    let mut tx = pool.begin().await?;
    let mut count = 0usize;

    for entry in domains {
        sqlx::query(
            "INSERT INTO crawl_domains (domain, allowed, is_priority, crawl_delay_ms, max_concurrent) \
             VALUES ($1, COALESCE($2, TRUE), COALESCE($3, FALSE), COALESCE($4, 1000), COALESCE($5, 1)) \
             ON CONFLICT (domain) DO UPDATE SET \
                 allowed = COALESCE($2, crawl_domains.allowed), \
                 is_priority = COALESCE($3, crawl_domains.is_priority), \
                 crawl_delay_ms = COALESCE($4, crawl_domains.crawl_delay_ms), \
                 max_concurrent = COALESCE($5, crawl_domains.max_concurrent), \
                 updated_at = NOW()",
        )
        .bind(entry.normalized_domain())
        .bind(entry.allowed)
        .bind(entry.priority)
        .bind(entry.crawl_delay_ms)
        .bind(entry.max_concurrent)
        .execute(&mut *tx)
        .await?;

        count += 1;
    }

    tx.commit().await?;

    Ok(count)
}
