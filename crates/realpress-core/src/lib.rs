//! Shared domain types and configuration for the realpress crawl pipeline.

pub mod app_config;
pub mod backoff;
pub mod config;
pub mod domains;
pub mod error;
pub mod jobs;
pub mod submission;
pub mod tier;
pub mod normalize;
pub mod window;

pub use app_config::{AppConfig, Environment};
pub use backoff::{backoff_delay_secs, on_failure, FailureKind, FailureTransition};
pub use config::{load_app_config, load_app_config_from_env};
pub use domains::{load_domains, parse_domains, DomainPolicyConfig, DomainsFile};
pub use error::{ConfigError, CoreError};
pub use jobs::{JobMetadata, JobStatus};
pub use submission::SubmissionStage;
pub use tier::Tier;
pub use normalize::{normalize_url, url_hash, NormalizedUrl, UrlError};
pub use window::{window_cap, Admission, DomainWindow, RejectReason};
