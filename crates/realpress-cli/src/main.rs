mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "realpress-cli")]
#[command(about = "RealPress crawl pipeline operator interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Enqueue the URLs listed in a file, one per line
    Enqueue {
        /// Path to the URL list; blank lines and `#` comments are skipped
        #[arg(long)]
        file: std::path::PathBuf,
        /// Source tag recorded on each job (`import` or `manual`)
        #[arg(long, default_value = "import")]
        source: String,
        /// Queue priority; higher is claimed first
        #[arg(long, default_value = "0")]
        priority: i32,
    },
    /// Run one crawl batch and print the result
    RunBatch {
        /// Jobs to claim (capped at 50)
        #[arg(long)]
        batch_size: Option<usize>,
        /// Jobs processed concurrently (1 to 10)
        #[arg(long)]
        max_concurrent: Option<usize>,
    },
    /// Print job counts by status
    Stats,
    /// Move a failed or dead-lettered job back to pending
    Retry { id: i64 },
    /// Cancel a job that has not completed
    Cancel { id: i64 },
    /// Manage per-domain crawl policy
    Domain {
        #[command(subcommand)]
        command: DomainCommands,
    },
    /// Apply pending database migrations
    Migrate,
}

#[derive(Debug, Subcommand)]
enum DomainCommands {
    /// Stop crawling a domain
    Block { domain: String },
    /// Resume crawling a domain
    Unblock { domain: String },
    /// Mark or unmark a domain as priority
    Priority {
        domain: String,
        /// Pass `--enabled false` to clear the flag
        #[arg(long, default_value = "true", action = clap::ArgAction::Set)]
        enabled: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = realpress_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = realpress_db::PoolConfig::from_app_config(&config);
    let pool = realpress_db::connect_pool(&config.database_url, pool_config).await?;

    if matches!(cli.command, Commands::Migrate) {
        let applied = realpress_db::run_migrations(&pool).await?;
        println!("applied {applied} migration(s)");
        return Ok(());
    }

    let pipeline = commands::build_pipeline(pool, &config)?;
    match cli.command {
        Commands::Enqueue {
            file,
            source,
            priority,
        } => commands::run_enqueue(&pipeline, &file, &source, priority).await,
        Commands::RunBatch {
            batch_size,
            max_concurrent,
        } => {
            let batch_size = batch_size.unwrap_or(config.batch_size);
            let max_concurrent = max_concurrent.unwrap_or(config.batch_max_concurrent);
            commands::run_batch(&pipeline, batch_size, max_concurrent).await
        }
        Commands::Stats => commands::run_stats(&pipeline).await,
        Commands::Retry { id } => commands::run_retry(&pipeline, id).await,
        Commands::Cancel { id } => commands::run_cancel(&pipeline, id).await,
        Commands::Domain { command } => commands::run_domain(&pipeline, command).await,
        Commands::Migrate => Ok(()),
    }
}

#[cfg(test)]
mod tests;
