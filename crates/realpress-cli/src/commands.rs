//! Command handlers. Each one runs against a Postgres-backed [`Pipeline`]
//! built from the loaded config.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use realpress_core::{normalize::domain_from_host, AppConfig, JobMetadata};
use realpress_pipeline::{
    DomainLimiter, JobStore, PgStore, Pipeline, PipelineSettings, Registry, Stores,
    MAX_BATCH_CONCURRENCY, MAX_BATCH_SIZE,
};

use crate::DomainCommands;

/// # Errors
///
/// Returns an error if the HTTP collaborators cannot be built.
pub(crate) fn build_pipeline(pool: sqlx::PgPool, config: &AppConfig) -> anyhow::Result<Pipeline> {
    Ok(Pipeline::new(
        Stores::shared(Arc::new(PgStore::new(pool))),
        Registry::http(config)?,
        PipelineSettings::from_app_config(config),
    ))
}

/// URLs from a list file: trimmed, with blank lines and `#` comments dropped.
pub(crate) fn parse_url_list(contents: &str) -> Vec<&str> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

pub(crate) async fn run_enqueue(
    pipeline: &Pipeline,
    file: &Path,
    source: &str,
    priority: i32,
) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read URL list {}", file.display()))?;
    let urls = parse_url_list(&contents);
    if urls.is_empty() {
        println!("no URLs found in {}", file.display());
        return Ok(());
    }

    let metadata = JobMetadata::for_source(source)?;
    let summary = pipeline.enqueue_batch(urls.as_slice(), &metadata, priority).await?;
    println!(
        "enqueued {} of {} URL(s): {} duplicate, {} invalid",
        summary.created,
        summary.total(),
        summary.duplicates,
        summary.invalid
    );
    Ok(())
}

pub(crate) async fn run_batch(
    pipeline: &Pipeline,
    batch_size: usize,
    max_concurrent: usize,
) -> anyhow::Result<()> {
    let result = pipeline
        .run_batch(
            batch_size.min(MAX_BATCH_SIZE),
            max_concurrent.clamp(1, MAX_BATCH_CONCURRENCY),
        )
        .await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

pub(crate) async fn run_stats(pipeline: &Pipeline) -> anyhow::Result<()> {
    let stats = pipeline.jobs().stats().await?;
    let rows = [
        ("pending", stats.pending),
        ("processing", stats.processing),
        ("completed", stats.completed),
        ("failed", stats.failed),
        ("dead_letter", stats.dead_letter),
        ("cancelled", stats.cancelled),
    ];

    println!("{:<14}COUNT", "STATUS");
    for (status, count) in rows {
        println!("{status:<14}{count}");
    }
    println!("{:<14}{}", "total", stats.total);
    Ok(())
}

pub(crate) async fn run_retry(pipeline: &Pipeline, id: i64) -> anyhow::Result<()> {
    let job = pipeline
        .jobs()
        .retry(id)
        .await
        .with_context(|| format!("could not retry job {id}"))?;
    println!("job {} is {} ({})", job.id, job.status, job.url);
    Ok(())
}

pub(crate) async fn run_cancel(pipeline: &Pipeline, id: i64) -> anyhow::Result<()> {
    let job = pipeline
        .jobs()
        .cancel(id)
        .await
        .with_context(|| format!("could not cancel job {id}"))?;
    println!("job {} is {} ({})", job.id, job.status, job.url);
    Ok(())
}

pub(crate) async fn run_domain(pipeline: &Pipeline, command: DomainCommands) -> anyhow::Result<()> {
    let limiter = pipeline.domains();
    let row = match command {
        DomainCommands::Block { domain } => {
            limiter.set_allowed(&domain_from_host(&domain), false).await?
        }
        DomainCommands::Unblock { domain } => {
            limiter.set_allowed(&domain_from_host(&domain), true).await?
        }
        DomainCommands::Priority { domain, enabled } => {
            limiter.set_priority(&domain_from_host(&domain), enabled).await?
        }
    };

    println!(
        "{}: allowed={} priority={} delay={}ms concurrency={}",
        row.domain, row.allowed, row.is_priority, row.crawl_delay_ms, row.max_concurrent
    );
    Ok(())
}
