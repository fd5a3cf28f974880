//! Crawl job lifecycle states and typed per-source metadata.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreError;

/// Lifecycle state of a crawl job or submission.
///
/// `Pending -> Processing -> {Completed | Pending (backoff) | DeadLetter}`,
/// and any state other than `Completed` can be moved to `Cancelled`.
/// `Failed` is only ever set by an operator; the pipeline never parks a job
/// there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    DeadLetter,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::DeadLetter,
        JobStatus::Cancelled,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::DeadLetter => "dead_letter",
            JobStatus::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::DeadLetter | JobStatus::Cancelled
        )
    }

    #[must_use]
    pub fn is_cancellable(self) -> bool {
        !matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }

    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::DeadLetter)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::InvalidStatus(s.to_string()))
    }
}

/// Producer-specific job metadata, keyed by the job's source tag.
///
/// Stored as JSONB next to the `source` column; the serde tag doubles as the
/// source tag so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum JobMetadata {
    /// Bulk import from a URL list.
    Import {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        batch_id: Option<String>,
    },
    /// A content-source connector (RSS feed, sitemap, partner API).
    Connector {
        connector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        external_id: Option<String>,
    },
    /// Mirrors a user submission into the crawl queue.
    Submission { submission_id: Uuid },
    /// Operator-entered URL.
    Manual,
}

impl JobMetadata {
    #[must_use]
    pub fn source_tag(&self) -> &'static str {
        match self {
            JobMetadata::Import { .. } => "import",
            JobMetadata::Connector { .. } => "connector",
            JobMetadata::Submission { .. } => "submission",
            JobMetadata::Manual => "manual",
        }
    }

    /// Build the default metadata for a bare source tag.
    ///
    /// Only sources that need no extra fields can be built this way;
    /// `connector` and `submission` must be supplied as full metadata.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidMetadata`] for unknown tags or tags that
    /// carry required fields.
    pub fn for_source(tag: &str) -> Result<Self, CoreError> {
        match tag {
            "import" => Ok(JobMetadata::Import { batch_id: None }),
            "manual" => Ok(JobMetadata::Manual),
            "connector" | "submission" => Err(CoreError::InvalidMetadata(format!(
                "source '{tag}' requires metadata fields"
            ))),
            other => Err(CoreError::InvalidMetadata(format!(
                "unknown source '{other}'"
            ))),
        }
    }

    /// Check the fields each variant needs before the job is enqueued.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidMetadata`] when a required field is blank.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            JobMetadata::Connector { connector, .. } if connector.trim().is_empty() => Err(
                CoreError::InvalidMetadata("connector name must be non-empty".to_string()),
            ),
            JobMetadata::Import {
                batch_id: Some(id),
            } if id.trim().is_empty() => Err(CoreError::InvalidMetadata(
                "import batch_id must be non-empty when present".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

impl Default for JobMetadata {
    fn default() -> Self {
        JobMetadata::Import { batch_id: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert_eq!(
            "running".parse::<JobStatus>(),
            Err(CoreError::InvalidStatus("running".to_string()))
        );
    }

    #[test]
    fn only_completed_and_cancelled_block_cancellation() {
        assert!(JobStatus::Pending.is_cancellable());
        assert!(JobStatus::Processing.is_cancellable());
        assert!(JobStatus::DeadLetter.is_cancellable());
        assert!(!JobStatus::Completed.is_cancellable());
        assert!(!JobStatus::Cancelled.is_cancellable());
    }

    #[test]
    fn retry_allowed_only_from_failed_or_dead_letter() {
        assert!(JobStatus::Failed.is_retryable());
        assert!(JobStatus::DeadLetter.is_retryable());
        assert!(!JobStatus::Pending.is_retryable());
        assert!(!JobStatus::Completed.is_retryable());
    }

    #[test]
    fn metadata_serializes_with_source_tag() {
        let meta = JobMetadata::Connector {
            connector: "rss".to_string(),
            external_id: Some("item-9".to_string()),
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["source"], "connector");
        assert_eq!(json["connector"], "rss");
        assert_eq!(meta.source_tag(), "connector");
    }

    #[test]
    fn manual_metadata_is_just_the_tag() {
        let json = serde_json::to_string(&JobMetadata::Manual).unwrap();
        assert_eq!(json, r#"{"source":"manual"}"#);
    }

    #[test]
    fn connector_metadata_requires_name() {
        let meta = JobMetadata::Connector {
            connector: " ".to_string(),
            external_id: None,
        };
        assert!(meta.validate().is_err());
    }

    #[test]
    fn for_source_rejects_tags_with_required_fields() {
        assert_eq!(
            JobMetadata::for_source("import").unwrap(),
            JobMetadata::Import { batch_id: None }
        );
        assert!(JobMetadata::for_source("connector").is_err());
        assert!(JobMetadata::for_source("bogus").is_err());
    }
}
