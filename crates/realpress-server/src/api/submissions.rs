use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use realpress_core::{JobStatus, Tier};
use realpress_pipeline::SubmissionStatus;
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_pipeline_error, map_store_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct CreateSubmissionRequest {
    pub url: String,
    pub tier: Option<String>,
}

/// `202 Accepted` while queued, `200 OK` when the URL was already scored.
pub(super) async fn create_submission(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CreateSubmissionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SubmissionStatus>>), ApiError> {
    let tier = body
        .tier
        .as_deref()
        .map(str::parse::<Tier>)
        .transpose()
        .map_err(|e| ApiError::new(req_id.0.clone(), "validation_error", e.to_string()))?
        .unwrap_or_default();

    let submission = state
        .pipeline
        .submit(&body.url, tier)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    let status = state
        .pipeline
        .submission_status(submission.id)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e, "conflict"))?;

    let code = if status.status == JobStatus::Completed {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    Ok((code, Json(ApiResponse::new(status, req_id.0))))
}

pub(super) async fn get_submission(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<SubmissionStatus>>, ApiError> {
    let status = state
        .pipeline
        .submission_status(id)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e, "conflict"))?;

    Ok(Json(ApiResponse::new(status, req_id.0)))
}

pub(super) async fn cancel_submission(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<SubmissionStatus>>, ApiError> {
    state
        .pipeline
        .cancel_submission(id)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e, "not_cancellable"))?;

    let status = state
        .pipeline
        .submission_status(id)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e, "conflict"))?;
    Ok(Json(ApiResponse::new(status, req_id.0)))
}

pub(super) async fn retry_submission(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<SubmissionStatus>>, ApiError> {
    state
        .pipeline
        .retry_submission(id)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e, "not_retryable"))?;

    let status = state
        .pipeline
        .submission_status(id)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e, "conflict"))?;
    Ok(Json(ApiResponse::new(status, req_id.0)))
}
