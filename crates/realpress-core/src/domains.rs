//! Domain policy seed file (`config/domains.yaml`).

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::normalize::domain_from_host;
use crate::ConfigError;

/// One domain entry. Unset fields keep whatever the database already holds.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DomainPolicyConfig {
    pub domain: String,
    #[serde(default)]
    pub allowed: Option<bool>,
    #[serde(default)]
    pub priority: Option<bool>,
    #[serde(default)]
    pub crawl_delay_ms: Option<i32>,
    #[serde(default)]
    pub max_concurrent: Option<i32>,
}

impl DomainPolicyConfig {
    /// The domain key as stored: lowercased with `www.` removed.
    #[must_use]
    pub fn normalized_domain(&self) -> String {
        domain_from_host(&self.domain)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DomainsFile {
    #[serde(default)]
    pub domains: Vec<DomainPolicyConfig>,
}

/// Load and validate domain policy from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_domains(path: &Path) -> Result<DomainsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::DomainsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_domains(&content)
}

/// Parse and validate domain policy from YAML text.
///
/// # Errors
///
/// Returns `ConfigError` if the text cannot be parsed or fails validation.
pub fn parse_domains(content: &str) -> Result<DomainsFile, ConfigError> {
    let domains_file: DomainsFile =
        serde_yaml::from_str(content).map_err(ConfigError::DomainsFileParse)?;

    validate_domains(&domains_file)?;

    Ok(domains_file)
}

fn validate_domains(domains_file: &DomainsFile) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for entry in &domains_file.domains {
        let domain = entry.normalized_domain();
        if domain.is_empty() {
            return Err(ConfigError::Validation(
                "domain must be non-empty".to_string(),
            ));
        }
        if domain.contains('/') || domain.contains(char::is_whitespace) {
            return Err(ConfigError::Validation(format!(
                "'{}' is not a bare hostname",
                entry.domain
            )));
        }

        if let Some(delay) = entry.crawl_delay_ms {
            if delay < 1 {
                return Err(ConfigError::Validation(format!(
                    "domain '{domain}' has crawl_delay_ms {delay}; must be at least 1"
                )));
            }
        }

        if let Some(concurrency) = entry.max_concurrent {
            if concurrency < 0 {
                return Err(ConfigError::Validation(format!(
                    "domain '{domain}' has max_concurrent {concurrency}; must not be negative"
                )));
            }
        }

        if !seen.insert(domain.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate domain: '{domain}'"
            )));
        }
    }

    Ok(())
}
