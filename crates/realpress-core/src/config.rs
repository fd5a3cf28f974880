use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does not read `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_positive_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let value = or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))?;
        if value == 0 {
            return Err(invalid(var, "must be at least 1".to_string()));
        }
        Ok(value)
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("REALPRESS_ENV", "development"))?;

    let bind_addr = or_default("REALPRESS_BIND_ADDR", "0.0.0.0:3000")
        .parse::<SocketAddr>()
        .map_err(|e| invalid("REALPRESS_BIND_ADDR", e.to_string()))?;
    let log_level = or_default("REALPRESS_LOG_LEVEL", "info");
    let domains_path = PathBuf::from(or_default(
        "REALPRESS_DOMAINS_PATH",
        "./config/domains.yaml",
    ));
    let cron_secret = lookup("REALPRESS_CRON_SECRET")
        .ok()
        .filter(|s| !s.trim().is_empty());

    let db_max_connections = parse_u32("REALPRESS_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("REALPRESS_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("REALPRESS_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let batch_size = parse_positive_usize("REALPRESS_BATCH_SIZE", "10")?;
    let batch_max_concurrent = parse_positive_usize("REALPRESS_BATCH_MAX_CONCURRENT", "3")?;
    let batch_cron = or_default("REALPRESS_BATCH_CRON", "0 */5 * * * *");

    let max_attempts = or_default("REALPRESS_MAX_ATTEMPTS", "3")
        .parse::<i32>()
        .map_err(|e| invalid("REALPRESS_MAX_ATTEMPTS", e.to_string()))?;
    if max_attempts < 1 {
        return Err(invalid(
            "REALPRESS_MAX_ATTEMPTS",
            "must be at least 1".to_string(),
        ));
    }

    let rate_window_secs = parse_u64("REALPRESS_RATE_WINDOW_SECS", "60")?;
    if rate_window_secs == 0 {
        return Err(invalid(
            "REALPRESS_RATE_WINDOW_SECS",
            "must be at least 1".to_string(),
        ));
    }

    let claim_lease_secs = or_default("REALPRESS_CLAIM_LEASE_SECS", "600")
        .parse::<i64>()
        .map_err(|e| invalid("REALPRESS_CLAIM_LEASE_SECS", e.to_string()))?;
    if claim_lease_secs < 1 {
        return Err(invalid(
            "REALPRESS_CLAIM_LEASE_SECS",
            "must be at least 1".to_string(),
        ));
    }

    let fetch_timeout_secs = parse_u64("REALPRESS_FETCH_TIMEOUT_SECS", "30")?;
    let user_agent = or_default("REALPRESS_USER_AGENT", "realpress/0.1 (+crawler)");
    let scorer_url = or_default("REALPRESS_SCORER_URL", "http://localhost:8000")
        .trim_end_matches('/')
        .to_string();

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        domains_path,
        cron_secret,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        batch_size,
        batch_max_concurrent,
        batch_cron,
        max_attempts,
        rate_window_secs,
        claim_lease_secs,
        fetch_timeout_secs,
        user_agent,
        scorer_url,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEnvVar`] for anything other than
/// `development`, `test`, or `production`.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "REALPRESS_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
