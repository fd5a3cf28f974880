//! Live integration tests for realpress-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/realpress-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use realpress_core::{normalize_url, Admission, DomainPolicyConfig, RejectReason, Tier};
use realpress_db::{
    block_domain, cancel_crawl_job, cancel_submission, check_domain_admission, claim_crawl_jobs,
    claim_next_crawl_job, claim_next_submission, complete_crawl_job, configure_domain,
    crawl_job_stats, create_submission, dead_letter_crawl_job, dead_letter_submission,
    enqueue_crawl_job, get_crawl_job, get_content_summary, get_domain, get_submission,
    list_crawl_jobs, record_domain_request, reschedule_crawl_job, retry_crawl_job,
    retry_submission, save_scored_content, seed_domains, stale_crawl_jobs, stale_submissions,
    submission_queue_position, unblock_domain, CrawlJobFilter, DbError, NewContent,
    NewContentScore, NewCrawlJob, NewSubmission,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn enqueue(pool: &sqlx::PgPool, raw_url: &str, priority: i32) -> Option<i64> {
    let normalized = normalize_url(raw_url).expect("test URL must normalize");
    let metadata = serde_json::json!({"source": "manual"});
    enqueue_crawl_job(
        pool,
        &NewCrawlJob {
            url: &normalized.url,
            url_hash: &normalized.hash,
            domain: &normalized.domain,
            source: "manual",
            metadata: &metadata,
            priority,
            max_attempts: 3,
        },
    )
    .await
    .expect("enqueue_crawl_job failed")
}

async fn ingest(pool: &sqlx::PgPool, raw_url: &str, score: f64) -> i64 {
    let normalized = normalize_url(raw_url).expect("test URL must normalize");
    let details = serde_json::json!({"model": "test"});
    save_scored_content(
        pool,
        &NewContent {
            url: &normalized.url,
            url_hash: &normalized.hash,
            domain: &normalized.domain,
            title: Some("A title"),
            description: None,
            body_text: "body",
            content_hash: "deadbeef",
            source: "test",
        },
        &NewContentScore {
            composite_score: score,
            classification: "human",
            confidence: 0.9,
            provider_details: &details,
        },
    )
    .await
    .expect("save_scored_content failed")
}

// ---------------------------------------------------------------------------
// Section 1: Enqueue and dedup
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn enqueue_same_url_twice_is_a_duplicate(pool: sqlx::PgPool) {
    assert!(enqueue(&pool, "https://example.com/story", 0).await.is_some());
    assert!(enqueue(&pool, "https://EXAMPLE.com/story/#top", 0)
        .await
        .is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn enqueue_skips_urls_already_ingested(pool: sqlx::PgPool) {
    ingest(&pool, "https://example.com/old", 0.2).await;
    assert!(enqueue(&pool, "https://example.com/old", 0).await.is_none());
}

// ---------------------------------------------------------------------------
// Section 2: Claim ordering and lifecycle
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn claim_prefers_higher_priority(pool: sqlx::PgPool) {
    enqueue(&pool, "https://example.com/low", -5).await;
    enqueue(&pool, "https://example.com/high", 10).await;

    let first = claim_next_crawl_job(&pool).await.unwrap().unwrap();
    assert_eq!(first.url, "https://example.com/high");
    assert_eq!(first.status, "processing");
    assert_eq!(first.attempts, 1);
    assert!(first.started_at.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn claim_batch_stops_when_queue_is_empty(pool: sqlx::PgPool) {
    enqueue(&pool, "https://example.com/a", 0).await;
    enqueue(&pool, "https://example.com/b", 0).await;

    let claimed = claim_crawl_jobs(&pool, 5).await.unwrap();
    assert_eq!(claimed.len(), 2);
    assert!(claim_next_crawl_job(&pool).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn concurrent_claims_never_share_a_job(pool: sqlx::PgPool) {
    for i in 0..20 {
        enqueue(&pool, &format!("https://example.com/{i}"), 0).await;
    }

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            claim_crawl_jobs(&pool, 5).await.unwrap()
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.extend(handle.await.unwrap().into_iter().map(|row| row.id));
    }
    let total = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), total, "a job was claimed twice");
    assert_eq!(total, 20);
}

#[sqlx::test(migrations = "../../migrations")]
async fn rescheduled_job_is_not_claimable_until_due(pool: sqlx::PgPool) {
    enqueue(&pool, "https://example.com/a", 0).await;
    let job = claim_next_crawl_job(&pool).await.unwrap().unwrap();

    let before = chrono::Utc::now();
    let scheduled_at = reschedule_crawl_job(&pool, job.id, 120, "timeout")
        .await
        .unwrap()
        .expect("job was processing");
    assert!(scheduled_at > before + chrono::Duration::seconds(100));

    assert!(claim_next_crawl_job(&pool).await.unwrap().is_none());
    let stored = get_crawl_job(&pool, job.id).await.unwrap();
    assert_eq!(stored.status, "pending");
    assert_eq!(stored.scheduled_at, scheduled_at);
    assert_eq!(stored.last_error.as_deref(), Some("timeout"));

    assert!(reschedule_crawl_job(&pool, job.id, 1, "again")
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn stale_claims_are_those_past_the_lease(pool: sqlx::PgPool) {
    enqueue(&pool, "https://example.com/old", 0).await;
    enqueue(&pool, "https://example.com/fresh", 0).await;
    let old = claim_next_crawl_job(&pool).await.unwrap().unwrap();
    claim_next_crawl_job(&pool).await.unwrap().unwrap();

    assert!(stale_crawl_jobs(&pool, 600, 10).await.unwrap().is_empty());

    sqlx::query("UPDATE crawl_jobs SET started_at = NOW() - INTERVAL '1 hour' WHERE id = $1")
        .bind(old.id)
        .execute(&pool)
        .await
        .unwrap();

    let stale = stale_crawl_jobs(&pool, 600, 10).await.unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].id, old.id);
}

#[sqlx::test(migrations = "../../migrations")]
async fn completion_after_cancel_is_a_no_op(pool: sqlx::PgPool) {
    enqueue(&pool, "https://example.com/a", 0).await;
    let job = claim_next_crawl_job(&pool).await.unwrap().unwrap();
    let content_id = ingest(&pool, "https://example.com/a", 0.1).await;

    cancel_crawl_job(&pool, job.id).await.unwrap();
    assert!(!complete_crawl_job(&pool, job.id, content_id).await.unwrap());

    let stored = get_crawl_job(&pool, job.id).await.unwrap();
    assert_eq!(stored.status, "cancelled");
    assert!(stored.content_id.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn cancel_rejects_completed_jobs(pool: sqlx::PgPool) {
    enqueue(&pool, "https://example.com/a", 0).await;
    let job = claim_next_crawl_job(&pool).await.unwrap().unwrap();
    let content_id = ingest(&pool, "https://example.com/a", 0.1).await;
    assert!(complete_crawl_job(&pool, job.id, content_id).await.unwrap());

    let err = cancel_crawl_job(&pool, job.id).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidTransition { .. }));
}

#[sqlx::test(migrations = "../../migrations")]
async fn retry_resets_dead_letter_jobs(pool: sqlx::PgPool) {
    enqueue(&pool, "https://example.com/a", 0).await;
    let job = claim_next_crawl_job(&pool).await.unwrap().unwrap();
    assert!(dead_letter_crawl_job(&pool, job.id, "gone").await.unwrap());

    let retried = retry_crawl_job(&pool, job.id).await.unwrap();
    assert_eq!(retried.status, "pending");
    assert_eq!(retried.attempts, 0);
    assert!(retried.last_error.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn retry_rejects_pending_and_unknown_jobs(pool: sqlx::PgPool) {
    let id = enqueue(&pool, "https://example.com/a", 0).await.unwrap();
    assert!(matches!(
        retry_crawl_job(&pool, id).await,
        Err(DbError::InvalidTransition { .. })
    ));
    assert!(matches!(
        retry_crawl_job(&pool, id + 1000).await,
        Err(DbError::NotFound)
    ));
}

#[sqlx::test(migrations = "../../migrations")]
async fn list_and_stats_reflect_statuses(pool: sqlx::PgPool) {
    enqueue(&pool, "https://example.com/a", 0).await;
    enqueue(&pool, "https://other.org/b", 0).await;
    let job = claim_next_crawl_job(&pool).await.unwrap().unwrap();
    dead_letter_crawl_job(&pool, job.id, "gone").await.unwrap();

    let stats = crawl_job_stats(&pool).await.unwrap();
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.dead_letter, 1);
    assert_eq!(stats.total, 2);

    let filter = CrawlJobFilter {
        status: Some("pending".to_string()),
        domain: None,
        limit: 10,
        offset: 0,
    };
    let pending = list_crawl_jobs(&pool, &filter).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_ne!(pending[0].id, job.id);
}

// ---------------------------------------------------------------------------
// Section 3: Domain admission
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn admission_caps_requests_per_window(pool: sqlx::PgPool) {
    // 1 s window over the default 1 s delay: a cap of one request.
    let first = check_domain_admission(&pool, "example.com", 1_000)
        .await
        .unwrap();
    assert_eq!(
        first,
        Admission::Admitted {
            requests_in_window: 1
        }
    );

    let second = check_domain_admission(&pool, "example.com", 1_000)
        .await
        .unwrap();
    assert_eq!(
        second,
        Admission::Rejected(RejectReason::WindowFull { cap: 1 })
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn admission_rejects_blocked_domains(pool: sqlx::PgPool) {
    block_domain(&pool, "spam.test").await.unwrap();
    assert_eq!(
        check_domain_admission(&pool, "spam.test", 60_000)
            .await
            .unwrap(),
        Admission::Rejected(RejectReason::Blocked)
    );

    unblock_domain(&pool, "spam.test").await.unwrap();
    assert!(check_domain_admission(&pool, "spam.test", 60_000)
        .await
        .unwrap()
        .is_admitted());
}

#[sqlx::test(migrations = "../../migrations")]
async fn concurrent_admissions_never_exceed_the_cap(pool: sqlx::PgPool) {
    configure_domain(&pool, "hot.example", Some(10_000), Some(1))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..12 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            check_domain_admission(&pool, "hot.example", 60_000)
                .await
                .unwrap()
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap().is_admitted() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 6);
}

#[sqlx::test(migrations = "../../migrations")]
async fn record_request_tracks_outcomes_and_mean_score(pool: sqlx::PgPool) {
    check_domain_admission(&pool, "example.com", 60_000)
        .await
        .unwrap();
    record_domain_request(&pool, "example.com", true, Some(0.2))
        .await
        .unwrap();
    record_domain_request(&pool, "example.com", true, Some(0.6))
        .await
        .unwrap();
    record_domain_request(&pool, "example.com", false, None)
        .await
        .unwrap();

    let row = get_domain(&pool, "example.com").await.unwrap();
    assert_eq!(row.success_count, 2);
    assert_eq!(row.failure_count, 1);
    assert_eq!(row.requests_in_window, 1);
    let avg = row.avg_score.unwrap();
    assert!((avg - 0.4).abs() < 1e-9, "avg was {avg}");
}

#[sqlx::test(migrations = "../../migrations")]
async fn seed_domains_keeps_unset_fields(pool: sqlx::PgPool) {
    configure_domain(&pool, "example.com", Some(3_000), Some(2))
        .await
        .unwrap();

    let seeded = seed_domains(
        &pool,
        &[DomainPolicyConfig {
            domain: "www.Example.com".to_string(),
            allowed: None,
            priority: Some(true),
            crawl_delay_ms: None,
            max_concurrent: None,
        }],
    )
    .await
    .unwrap();
    assert_eq!(seeded, 1);

    let row = get_domain(&pool, "example.com").await.unwrap();
    assert!(row.is_priority);
    assert_eq!(row.crawl_delay_ms, 3_000);
    assert_eq!(row.max_concurrent, 2);
}

// ---------------------------------------------------------------------------
// Section 4: Submissions
// ---------------------------------------------------------------------------

fn new_submission<'a>(
    normalized: &'a realpress_core::NormalizedUrl,
    tier: Tier,
) -> NewSubmission<'a> {
    NewSubmission {
        url: &normalized.url,
        url_hash: &normalized.hash,
        domain: &normalized.domain,
        tier: tier.as_str(),
        priority: tier.priority(),
        max_attempts: 3,
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn submission_for_ingested_url_completes_immediately(pool: sqlx::PgPool) {
    let content_id = ingest(&pool, "https://example.com/known", 0.8).await;
    let normalized = normalize_url("https://example.com/known").unwrap();

    let row = create_submission(&pool, &new_submission(&normalized, Tier::Free))
        .await
        .unwrap();
    assert_eq!(row.status, "completed");
    assert_eq!(row.stage, "done");
    assert_eq!(row.progress, 100);
    assert_eq!(row.content_id, Some(content_id));

    let summary = get_content_summary(&pool, content_id).await.unwrap();
    assert_eq!(summary.composite_score, Some(0.8));
}

#[sqlx::test(migrations = "../../migrations")]
async fn resubmitting_an_active_url_returns_the_same_submission(pool: sqlx::PgPool) {
    let normalized = normalize_url("https://example.com/new").unwrap();
    let first = create_submission(&pool, &new_submission(&normalized, Tier::Free))
        .await
        .unwrap();
    let second = create_submission(&pool, &new_submission(&normalized, Tier::Pro))
        .await
        .unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(first.status, "pending");
    assert_eq!(first.stage, "queued");
}

#[sqlx::test(migrations = "../../migrations")]
async fn queue_position_counts_submissions_ahead(pool: sqlx::PgPool) {
    let a = normalize_url("https://example.com/a").unwrap();
    let b = normalize_url("https://example.com/b").unwrap();
    let c = normalize_url("https://example.com/c").unwrap();

    let free = create_submission(&pool, &new_submission(&a, Tier::Free))
        .await
        .unwrap();
    let enterprise = create_submission(&pool, &new_submission(&b, Tier::Enterprise))
        .await
        .unwrap();
    let pro = create_submission(&pool, &new_submission(&c, Tier::Pro))
        .await
        .unwrap();

    assert_eq!(
        submission_queue_position(&pool, enterprise.id).await.unwrap(),
        Some(0)
    );
    assert_eq!(
        submission_queue_position(&pool, pro.id).await.unwrap(),
        Some(1)
    );
    assert_eq!(
        submission_queue_position(&pool, free.id).await.unwrap(),
        Some(2)
    );

    let claimed = claim_next_submission(&pool).await.unwrap().unwrap();
    assert_eq!(claimed.id, enterprise.id);
    assert_eq!(
        submission_queue_position(&pool, enterprise.id).await.unwrap(),
        None
    );
    assert_eq!(
        submission_queue_position(&pool, free.id).await.unwrap(),
        Some(1)
    );

    let stored = get_submission(&pool, free.id).await.unwrap();
    assert_eq!(stored.priority, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn stale_submissions_are_those_past_the_lease(pool: sqlx::PgPool) {
    let normalized = normalize_url("https://example.com/a").unwrap();
    create_submission(&pool, &new_submission(&normalized, Tier::Free))
        .await
        .unwrap();
    let claimed = claim_next_submission(&pool).await.unwrap().unwrap();
    assert!(stale_submissions(&pool, 600, 10).await.unwrap().is_empty());

    sqlx::query("UPDATE submissions SET started_at = NOW() - INTERVAL '1 hour' WHERE id = $1")
        .bind(claimed.id)
        .execute(&pool)
        .await
        .unwrap();

    let stale = stale_submissions(&pool, 600, 10).await.unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].id, claimed.id);
}

#[sqlx::test(migrations = "../../migrations")]
async fn cancelled_submission_frees_the_url(pool: sqlx::PgPool) {
    let normalized = normalize_url("https://example.com/a").unwrap();
    let first = create_submission(&pool, &new_submission(&normalized, Tier::Free))
        .await
        .unwrap();

    let cancelled = cancel_submission(&pool, first.id).await.unwrap();
    assert_eq!(cancelled.status, "cancelled");
    assert_eq!(cancelled.stage, "cancelled");
    assert_eq!(cancelled.progress, 0);

    let err = cancel_submission(&pool, first.id).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidTransition { .. }));

    let second = create_submission(&pool, &new_submission(&normalized, Tier::Free))
        .await
        .unwrap();
    assert_ne!(second.id, first.id);
    assert_eq!(second.status, "pending");
}

#[sqlx::test(migrations = "../../migrations")]
async fn retry_requeues_dead_letter_submissions(pool: sqlx::PgPool) {
    let normalized = normalize_url("https://example.com/a").unwrap();
    create_submission(&pool, &new_submission(&normalized, Tier::Free))
        .await
        .unwrap();
    let claimed = claim_next_submission(&pool).await.unwrap().unwrap();
    assert!(dead_letter_submission(&pool, claimed.id, "gone")
        .await
        .unwrap());

    let retried = retry_submission(&pool, claimed.id).await.unwrap();
    assert_eq!(retried.status, "pending");
    assert_eq!(retried.stage, "queued");
    assert_eq!(retried.attempts, 0);
    assert!(retried.last_error.is_none());

    let err = retry_submission(&pool, claimed.id).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidTransition { .. }));
    let err = retry_submission(&pool, uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, DbError::NotFound));
}

#[sqlx::test(migrations = "../../migrations")]
async fn retry_is_refused_while_the_url_has_an_active_submission(pool: sqlx::PgPool) {
    let normalized = normalize_url("https://example.com/a").unwrap();
    create_submission(&pool, &new_submission(&normalized, Tier::Free))
        .await
        .unwrap();
    let claimed = claim_next_submission(&pool).await.unwrap().unwrap();
    assert!(dead_letter_submission(&pool, claimed.id, "gone")
        .await
        .unwrap());
    let active = create_submission(&pool, &new_submission(&normalized, Tier::Free))
        .await
        .unwrap();
    assert_eq!(active.status, "pending");

    let err = retry_submission(&pool, claimed.id).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidTransition { .. }));
}
