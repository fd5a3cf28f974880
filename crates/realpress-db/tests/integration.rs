//! Offline unit tests for realpress-db pool configuration and row types.
//! These tests do not require a live database connection.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use chrono::Utc;
use realpress_core::{AppConfig, Environment};
use realpress_db::{CrawlDomainRow, CrawlJobRow, CrawlJobStats, DbError, PoolConfig};

fn app_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        domains_path: PathBuf::from("./config/domains.yaml"),
        cron_secret: None,
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        batch_size: 10,
        batch_max_concurrent: 3,
        batch_cron: "0 */5 * * * *".to_string(),
        max_attempts: 3,
        rate_window_secs: 60,
        claim_lease_secs: 600,
        fetch_timeout_secs: 30,
        user_agent: "ua".to_string(),
        scorer_url: "http://localhost:8000".to_string(),
    }
}

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let pool_config = PoolConfig::from_app_config(&app_config());
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[test]
fn crawl_job_row_has_expected_fields() {
    let now = Utc::now();
    let row = CrawlJobRow {
        id: 1,
        url: "https://example.com/a".to_string(),
        url_hash: "ab".repeat(32),
        domain: "example.com".to_string(),
        source: "import".to_string(),
        metadata: serde_json::json!({"source": "import"}),
        priority: 0,
        status: "pending".to_string(),
        attempts: 0,
        max_attempts: 3,
        scheduled_at: now,
        started_at: None,
        completed_at: None,
        last_error: None,
        content_id: None,
        created_at: now,
        updated_at: now,
    };

    assert_eq!(row.status, "pending");
    assert_eq!(row.url_hash.len(), 64);
    assert!(row.content_id.is_none());
}

#[test]
fn crawl_domain_row_has_expected_fields() {
    let now = Utc::now();
    let row = CrawlDomainRow {
        domain: "example.com".to_string(),
        allowed: true,
        is_priority: false,
        crawl_delay_ms: 1000,
        max_concurrent: 1,
        requests_in_window: 0,
        window_start: now,
        success_count: 0,
        failure_count: 0,
        scored_count: 0,
        avg_score: None,
        last_request_at: None,
        created_at: now,
        updated_at: now,
    };

    assert!(row.allowed);
    assert!(row.avg_score.is_none());
}

#[test]
fn stats_fold_counts_and_total() {
    let stats = CrawlJobStats::from_counts(vec![
        ("pending".to_string(), 4),
        ("dead_letter".to_string(), 2),
        ("completed".to_string(), 10),
    ]);
    assert_eq!(stats.pending, 4);
    assert_eq!(stats.dead_letter, 2);
    assert_eq!(stats.completed, 10);
    assert_eq!(stats.processing, 0);
    assert_eq!(stats.total, 16);
}

#[test]
fn not_found_error_message() {
    assert_eq!(DbError::NotFound.to_string(), "record not found");
}
