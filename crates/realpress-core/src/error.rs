use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read domains file {path}: {source}")]
    DomainsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse domains file: {0}")]
    DomainsFileParse(#[from] serde_yaml::Error),

    #[error("domain config validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid job status: {0}")]
    InvalidStatus(String),

    #[error("invalid tier: {0}")]
    InvalidTier(String),

    #[error("invalid job metadata: {0}")]
    InvalidMetadata(String),
}
