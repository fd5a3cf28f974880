//! HTTP client for the external AI-content detection service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::collaborators::{Classification, ContentScore, ScoreInput, Scorer, ScoringError};

#[derive(Debug, Serialize)]
struct TextDetectRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct ImageDetectRequest<'a> {
    image_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    score: f64,
    confidence: f64,
    model: String,
}

/// Posts text to `{base}/api/detect/text` and images to
/// `{base}/api/detect/image`.
pub struct HttpScorer {
    client: Client,
    base_url: String,
}

impl HttpScorer {
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, timeout_secs: u64, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<DetectResponse, ScoringError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ScoringError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScoringError::Status(status.as_u16()));
        }

        response
            .json::<DetectResponse>()
            .await
            .map_err(|e| ScoringError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl Scorer for HttpScorer {
    async fn score(&self, input: ScoreInput) -> Result<ContentScore, ScoringError> {
        let (kind, response) = match &input {
            ScoreInput::Text { text } => (
                "text",
                self.post("/api/detect/text", &TextDetectRequest { text })
                    .await?,
            ),
            ScoreInput::Image { image_url } => (
                "image",
                self.post("/api/detect/image", &ImageDetectRequest { image_url })
                    .await?,
            ),
        };
        into_content_score(kind, response)
    }
}

fn into_content_score(kind: &str, response: DetectResponse) -> Result<ContentScore, ScoringError> {
    if !(0.0..=1.0).contains(&response.score) {
        return Err(ScoringError::InvalidResponse(format!(
            "score {} outside [0, 1]",
            response.score
        )));
    }
    if !(0.0..=1.0).contains(&response.confidence) {
        return Err(ScoringError::InvalidResponse(format!(
            "confidence {} outside [0, 1]",
            response.confidence
        )));
    }

    Ok(ContentScore {
        composite_score: response.score,
        classification: Classification::from_score(response.score),
        confidence: response.confidence,
        provider_details: serde_json::json!({
            "provider": "detect",
            "input": kind,
            "model": response.model,
            "score": response.score,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_score_is_invalid() {
        let err = into_content_score(
            "text",
            DetectResponse {
                score: 1.2,
                confidence: 0.9,
                model: "m".to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, ScoringError::InvalidResponse(_)));
    }

    #[test]
    fn provider_details_carry_the_model() {
        let score = into_content_score(
            "image",
            DetectResponse {
                score: 0.8,
                confidence: 0.7,
                model: "umm-maybe/AI-image-detector".to_string(),
            },
        )
        .unwrap();
        assert_eq!(score.classification, Classification::AiGenerated);
        assert_eq!(score.provider_details["model"], "umm-maybe/AI-image-detector");
        assert_eq!(score.provider_details["input"], "image");
    }
}
