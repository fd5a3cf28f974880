//! Contracts for the external collaborators a job runs through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scores below this are classified human-written.
pub const HUMAN_THRESHOLD: f64 = 0.35;
/// Scores above this are classified AI-generated.
pub const AI_THRESHOLD: f64 = 0.65;

/// Article content pulled out of a fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub domain: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub text: String,
    /// Lowercase hex SHA-256 of `text`.
    pub content_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// The origin answered, definitively, that this resource is unavailable.
    #[error("permanent HTTP {status} from {url}")]
    Permanent { url: String, status: u16 },

    #[error("extracted text too short for {url}: {len} chars")]
    TooShort { url: String, len: usize },

    #[error("extraction failed for {url}: {reason}")]
    Failed { url: String, reason: String },
}

impl ExtractionError {
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(self, ExtractionError::Permanent { .. })
    }
}

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<ExtractedPage, ExtractionError>;
}

/// What to score: article text, or an image by URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoreInput {
    Text { text: String },
    Image { image_url: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Human,
    Mixed,
    AiGenerated,
}

impl Classification {
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score < HUMAN_THRESHOLD {
            Classification::Human
        } else if score > AI_THRESHOLD {
            Classification::AiGenerated
        } else {
            Classification::Mixed
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Human => "human",
            Classification::Mixed => "mixed",
            Classification::AiGenerated => "ai_generated",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentScore {
    /// Probability the content is AI-generated, in `[0, 1]`.
    pub composite_score: f64,
    pub classification: Classification,
    pub confidence: f64,
    pub provider_details: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoringError {
    #[error("scoring request failed: {0}")]
    Request(String),

    #[error("scoring service returned HTTP {0}")]
    Status(u16),

    #[error("invalid scoring response: {0}")]
    InvalidResponse(String),
}

/// Scores content. Treated as a pure function by the pipeline.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, input: ScoreInput) -> Result<ContentScore, ScoringError>;
}
