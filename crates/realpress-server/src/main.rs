mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use realpress_pipeline::{PgStore, Pipeline, PipelineSettings, Registry, Stores};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, AppState, BatchDefaults},
    middleware::CronAuth,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(realpress_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = realpress_db::PoolConfig::from_app_config(&config);
    let pool = realpress_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = realpress_db::run_migrations(&pool).await?;
    tracing::info!(applied, "database migrations up to date");

    seed_domains(&pool, &config).await?;

    let store = Arc::new(PgStore::new(pool));
    let pipeline = Pipeline::new(
        Stores::shared(store),
        Registry::http(&config)?,
        PipelineSettings::from_app_config(&config),
    );

    let _scheduler = scheduler::build_scheduler(pipeline.clone(), Arc::clone(&config)).await?;

    let cron = CronAuth::from_config(&config);
    let state = AppState {
        pipeline,
        batch: BatchDefaults::from_app_config(&config),
    };
    let app = build_app(state, cron);

    tracing::info!(addr = %config.bind_addr, env = %config.env, "realpress server listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Apply the domain policy file when present. A missing file is not an error.
async fn seed_domains(
    pool: &sqlx::PgPool,
    config: &realpress_core::AppConfig,
) -> anyhow::Result<()> {
    if !config.domains_path.exists() {
        tracing::info!(path = %config.domains_path.display(), "no domain policy file; skipping seed");
        return Ok(());
    }

    let file = realpress_core::load_domains(&config.domains_path)?;
    let seeded = realpress_db::seed_domains(pool, &file.domains).await?;
    tracing::info!(seeded, path = %config.domains_path.display(), "seeded domain policy");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
