use axum::{body::Bytes, extract::State, Extension, Json};
use realpress_pipeline::{BatchResult, MAX_BATCH_CONCURRENCY, MAX_BATCH_SIZE};
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{map_store_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Default, Deserialize)]
pub(super) struct RunBatchRequest {
    pub batch_size: Option<usize>,
    pub max_concurrent: Option<usize>,
}

/// Body is optional; an empty body runs with the configured defaults.
pub(super) async fn run_batch(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    body: Bytes,
) -> Result<Json<ApiResponse<BatchResult>>, ApiError> {
    let request: RunBatchRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RunBatchRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            ApiError::new(
                req_id.0.clone(),
                "validation_error",
                format!("invalid batch request: {e}"),
            )
        })?
    };

    let batch_size = request
        .batch_size
        .unwrap_or(state.batch.batch_size)
        .min(MAX_BATCH_SIZE);
    let max_concurrent = request
        .max_concurrent
        .unwrap_or(state.batch.max_concurrent)
        .clamp(1, MAX_BATCH_CONCURRENCY);

    let result = state
        .pipeline
        .run_batch(batch_size, max_concurrent)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e, "conflict"))?;

    Ok(Json(ApiResponse::new(result, req_id.0)))
}
