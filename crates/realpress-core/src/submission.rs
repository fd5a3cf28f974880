//! Human-facing progress stages for user submissions.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStage {
    Queued,
    Fetching,
    Scoring,
    Saving,
    Retrying,
    Done,
    Failed,
    Cancelled,
}

impl SubmissionStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStage::Queued => "queued",
            SubmissionStage::Fetching => "fetching",
            SubmissionStage::Scoring => "scoring",
            SubmissionStage::Saving => "saving",
            SubmissionStage::Retrying => "retrying",
            SubmissionStage::Done => "done",
            SubmissionStage::Failed => "failed",
            SubmissionStage::Cancelled => "cancelled",
        }
    }

    /// Progress percentage reported while a submission sits in this stage.
    #[must_use]
    pub fn progress(self) -> i16 {
        match self {
            SubmissionStage::Queued
            | SubmissionStage::Retrying
            | SubmissionStage::Failed
            | SubmissionStage::Cancelled => 0,
            SubmissionStage::Fetching => 10,
            SubmissionStage::Scoring => 50,
            SubmissionStage::Saving => 80,
            SubmissionStage::Done => 100,
        }
    }
}

impl std::fmt::Display for SubmissionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            SubmissionStage::Queued,
            SubmissionStage::Fetching,
            SubmissionStage::Scoring,
            SubmissionStage::Saving,
            SubmissionStage::Retrying,
            SubmissionStage::Done,
            SubmissionStage::Failed,
            SubmissionStage::Cancelled,
        ]
        .into_iter()
        .find(|stage| stage.as_str() == s)
        .ok_or_else(|| CoreError::InvalidStatus(format!("unknown stage '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_increases_through_the_happy_path() {
        let path = [
            SubmissionStage::Queued,
            SubmissionStage::Fetching,
            SubmissionStage::Scoring,
            SubmissionStage::Saving,
            SubmissionStage::Done,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].progress() < pair[1].progress());
        }
        assert_eq!(SubmissionStage::Done.progress(), 100);
    }

    #[test]
    fn parses_its_own_labels() {
        assert_eq!(
            "saving".parse::<SubmissionStage>().unwrap(),
            SubmissionStage::Saving
        );
        assert!("uploading".parse::<SubmissionStage>().is_err());
    }
}
