use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use realpress_core::{JobMetadata, JobStatus};
use realpress_pipeline::{CrawlJob, EnqueueSummary, JobFilter, JobStats, JobStore};
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{
    map_pipeline_error, map_store_error, normalize_limit, normalize_offset, ApiError,
    ApiResponse, AppState,
};

/// Upper bound on URLs accepted in one enqueue request.
const MAX_URLS_PER_REQUEST: usize = 1_000;

#[derive(Debug, Deserialize)]
pub(super) struct CreateJobsRequest {
    pub urls: Vec<String>,
    pub source: Option<String>,
    pub priority: Option<i32>,
    pub metadata: Option<JobMetadata>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ListJobsQuery {
    pub status: Option<String>,
    pub domain: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Resolve job metadata from an explicit metadata object or a bare source tag.
fn resolve_metadata(
    source: Option<&str>,
    metadata: Option<JobMetadata>,
) -> Result<JobMetadata, String> {
    match (source, metadata) {
        (Some(tag), Some(meta)) if tag != meta.source_tag() => Err(format!(
            "source '{tag}' does not match metadata source '{}'",
            meta.source_tag()
        )),
        (_, Some(meta)) => Ok(meta),
        (Some(tag), None) => JobMetadata::for_source(tag).map_err(|e| e.to_string()),
        (None, None) => Ok(JobMetadata::default()),
    }
}

pub(super) async fn create_jobs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CreateJobsRequest>,
) -> Result<Json<ApiResponse<EnqueueSummary>>, ApiError> {
    if body.urls.is_empty() {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "urls must contain at least one URL",
        ));
    }
    if body.urls.len() > MAX_URLS_PER_REQUEST {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            format!("at most {MAX_URLS_PER_REQUEST} urls per request"),
        ));
    }

    let metadata = resolve_metadata(body.source.as_deref(), body.metadata)
        .map_err(|message| ApiError::new(req_id.0.clone(), "validation_error", message))?;

    let summary = state
        .pipeline
        .enqueue_batch(body.urls.as_slice(), &metadata, body.priority.unwrap_or(0))
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(summary, req_id.0)))
}

pub(super) async fn list_jobs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<ApiResponse<Vec<CrawlJob>>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<JobStatus>)
        .transpose()
        .map_err(|e| ApiError::new(req_id.0.clone(), "validation_error", e.to_string()))?;

    let filter = JobFilter {
        status,
        domain: query.domain,
        limit: normalize_limit(query.limit),
        offset: normalize_offset(query.offset),
    };
    let jobs = state
        .pipeline
        .jobs()
        .list(&filter)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e, "conflict"))?;

    Ok(Json(ApiResponse::new(jobs, req_id.0)))
}

pub(super) async fn job_stats(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<JobStats>>, ApiError> {
    let stats = state
        .pipeline
        .jobs()
        .stats()
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e, "conflict"))?;

    Ok(Json(ApiResponse::new(stats, req_id.0)))
}

pub(super) async fn get_job(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<CrawlJob>>, ApiError> {
    let job = state
        .pipeline
        .jobs()
        .get(id)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e, "conflict"))?;

    Ok(Json(ApiResponse::new(job, req_id.0)))
}

pub(super) async fn retry_job(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<CrawlJob>>, ApiError> {
    let job = state
        .pipeline
        .jobs()
        .retry(id)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e, "not_retryable"))?;

    tracing::info!(job_id = id, "crawl job queued for retry");
    Ok(Json(ApiResponse::new(job, req_id.0)))
}

pub(super) async fn cancel_job(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<CrawlJob>>, ApiError> {
    let job = state
        .pipeline
        .jobs()
        .cancel(id)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e, "not_cancellable"))?;

    tracing::info!(job_id = id, "crawl job cancelled");
    Ok(Json(ApiResponse::new(job, req_id.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_source_tag_builds_metadata() {
        assert_eq!(
            resolve_metadata(Some("manual"), None).unwrap(),
            JobMetadata::Manual
        );
        assert_eq!(resolve_metadata(None, None).unwrap(), JobMetadata::default());
    }

    #[test]
    fn conflicting_source_and_metadata_are_rejected() {
        let err = resolve_metadata(Some("import"), Some(JobMetadata::Manual)).unwrap_err();
        assert!(err.contains("does not match"));
    }

    #[test]
    fn source_requiring_fields_is_rejected_without_metadata() {
        assert!(resolve_metadata(Some("connector"), None).is_err());
    }
}
