use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub domains_path: PathBuf,
    /// Shared secret for the batch trigger. `None` disables the trigger
    /// outside development.
    pub cron_secret: Option<String>,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub batch_size: usize,
    pub batch_max_concurrent: usize,
    pub batch_cron: String,
    pub max_attempts: i32,
    pub rate_window_secs: u64,
    /// How long a claim may stay `processing` before it is treated as
    /// abandoned and failed through the normal backoff.
    pub claim_lease_secs: i64,
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    pub scorer_url: String,
}

impl AppConfig {
    /// Rate-limit window length in milliseconds.
    #[must_use]
    pub fn rate_window_ms(&self) -> i64 {
        i64::try_from(self.rate_window_secs.saturating_mul(1_000)).unwrap_or(i64::MAX)
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("domains_path", &self.domains_path)
            .field("database_url", &"[redacted]")
            .field(
                "cron_secret",
                &self.cron_secret.as_ref().map(|_| "[redacted]"),
            )
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("batch_size", &self.batch_size)
            .field("batch_max_concurrent", &self.batch_max_concurrent)
            .field("batch_cron", &self.batch_cron)
            .field("max_attempts", &self.max_attempts)
            .field("rate_window_secs", &self.rate_window_secs)
            .field("claim_lease_secs", &self.claim_lease_secs)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("scorer_url", &self.scorer_url)
            .finish()
    }
}
