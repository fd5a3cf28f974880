//! Background batch scheduling.
//!
//! Registers one cron job that drains the crawl queue and then the
//! submission queue using the configured batch sizes.

use std::sync::Arc;

use realpress_core::AppConfig;
use realpress_pipeline::Pipeline;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process. Dropping it shuts down all scheduled jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised, the
/// cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(
    pipeline: Pipeline,
    config: Arc<AppConfig>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_batch_job(&scheduler, pipeline, config).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_batch_job(
    scheduler: &JobScheduler,
    pipeline: Pipeline,
    config: Arc<AppConfig>,
) -> Result<(), JobSchedulerError> {
    let schedule = config.batch_cron.clone();
    let pipeline = Arc::new(pipeline);

    let job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
        let pipeline = Arc::clone(&pipeline);
        let config = Arc::clone(&config);

        Box::pin(async move {
            run_scheduled_batch(&pipeline, &config).await;
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(schedule = %schedule, "scheduler: registered crawl batch job");
    Ok(())
}

async fn run_scheduled_batch(pipeline: &Pipeline, config: &AppConfig) {
    match pipeline
        .run_batch(config.batch_size, config.batch_max_concurrent)
        .await
    {
        Ok(result) if result.processed > 0 || result.recovered > 0 => tracing::info!(
            recovered = result.recovered,
            processed = result.processed,
            succeeded = result.succeeded,
            failed = result.failed,
            rate_limited = result.rate_limited,
            dead_lettered = result.dead_lettered,
            "scheduler: crawl batch complete"
        ),
        Ok(_) => tracing::debug!("scheduler: crawl queue empty"),
        Err(e) => tracing::error!(error = %e, "scheduler: crawl batch failed"),
    }

    match pipeline.process_submissions(config.batch_size).await {
        Ok(result) if result.processed > 0 || result.recovered > 0 => tracing::info!(
            recovered = result.recovered,
            processed = result.processed,
            succeeded = result.succeeded,
            failed = result.failed,
            "scheduler: submission batch complete"
        ),
        Ok(_) => tracing::debug!("scheduler: submission queue empty"),
        Err(e) => tracing::error!(error = %e, "scheduler: submission batch failed"),
    }
}
