use realpress_core::{CoreError, FailureKind, RejectReason, UrlError};
use realpress_db::DbError;
use thiserror::Error;

use crate::collaborators::{ExtractionError, ScoringError};

/// Errors from a job, domain, content, or submission store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("{id} cannot transition: expected status {expected_status}")]
    InvalidTransition {
        id: String,
        expected_status: &'static str,
    },

    /// A stored row that no longer parses into its domain type.
    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error(transparent)]
    Db(DbError),
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => StoreError::NotFound,
            DbError::InvalidTransition {
                id,
                expected_status,
            } => StoreError::InvalidTransition {
                id,
                expected_status,
            },
            other => StoreError::Db(other),
        }
    }
}

/// Errors returned to callers of request-level pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    InvalidUrl(#[from] UrlError),

    #[error(transparent)]
    InvalidMetadata(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a single job run failed.
///
/// The `Display` text is what lands in the job's `last_error`.
#[derive(Debug, Error)]
pub enum JobFailure {
    #[error("rate limited: {0}")]
    RateLimited(RejectReason),

    #[error(transparent)]
    Extraction(ExtractionError),

    /// Failures that no retry can fix.
    #[error(transparent)]
    Permanent(ExtractionError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The claim outlived its lease without settling, so the worker that
    /// held it is presumed gone.
    #[error("claim expired after {lease_secs}s in processing")]
    ClaimExpired { lease_secs: i64 },
}

impl JobFailure {
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            JobFailure::RateLimited(_) => FailureKind::RateLimited,
            JobFailure::Permanent(_) => FailureKind::Permanent,
            JobFailure::Extraction(_)
            | JobFailure::Scoring(_)
            | JobFailure::Store(_)
            | JobFailure::ClaimExpired { .. } => FailureKind::Transient,
        }
    }
}

impl From<ExtractionError> for JobFailure {
    fn from(err: ExtractionError) -> Self {
        if err.is_permanent() {
            JobFailure::Permanent(err)
        } else {
            JobFailure::Extraction(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_message_is_prefixed() {
        let failure = JobFailure::RateLimited(RejectReason::Blocked);
        assert_eq!(failure.to_string(), "rate limited: domain is blocked");
        assert_eq!(failure.kind(), FailureKind::RateLimited);
    }

    #[test]
    fn permanent_extraction_errors_are_classified_permanent() {
        let failure = JobFailure::from(ExtractionError::Permanent {
            url: "https://example.com/gone".to_string(),
            status: 404,
        });
        assert!(matches!(failure, JobFailure::Permanent(_)));
        assert_eq!(failure.kind(), FailureKind::Permanent);
    }

    #[test]
    fn thin_content_is_transient() {
        let failure = JobFailure::from(ExtractionError::TooShort {
            url: "https://example.com/a".to_string(),
            len: 20,
        });
        assert_eq!(failure.kind(), FailureKind::Transient);
    }

    #[test]
    fn expired_claims_retry_like_transient_failures() {
        let failure = JobFailure::ClaimExpired { lease_secs: 600 };
        assert_eq!(failure.to_string(), "claim expired after 600s in processing");
        assert_eq!(failure.kind(), FailureKind::Transient);
    }

    #[test]
    fn db_not_found_maps_to_store_not_found() {
        assert!(matches!(
            StoreError::from(DbError::NotFound),
            StoreError::NotFound
        ));
    }
}
