mod batch;
mod domains;
mod jobs;
mod submissions;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use realpress_core::AppConfig;
use realpress_pipeline::{JobStore, Pipeline, PipelineError, StoreError};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{request_id, require_cron_secret, CronAuth, RequestId};

/// Batch sizes used when a trigger request does not specify them.
#[derive(Debug, Clone, Copy)]
pub struct BatchDefaults {
    pub batch_size: usize,
    pub max_concurrent: usize,
}

impl BatchDefaults {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_concurrent: config.batch_max_concurrent,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub batch: BatchDefaults,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(data: T, request_id: String) -> Self {
        Self {
            data,
            meta: ResponseMeta::new(request_id),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" | "not_cancellable" | "not_retryable" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

pub(super) fn normalize_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}

/// Map a store error to an API error. `conflict_code` names the 409 code for
/// a rejected state transition.
pub(super) fn map_store_error(
    request_id: String,
    error: &StoreError,
    conflict_code: &'static str,
) -> ApiError {
    match error {
        StoreError::NotFound => ApiError::new(request_id, "not_found", "resource not found"),
        StoreError::InvalidTransition { .. } => {
            ApiError::new(request_id, conflict_code, error.to_string())
        }
        StoreError::Corrupt { .. } | StoreError::Db(_) => {
            tracing::error!(error = %error, "store operation failed");
            ApiError::new(request_id, "internal_error", "store operation failed")
        }
    }
}

pub(super) fn map_pipeline_error(request_id: String, error: &PipelineError) -> ApiError {
    match error {
        PipelineError::InvalidUrl(e) => ApiError::new(request_id, "validation_error", e.to_string()),
        PipelineError::InvalidMetadata(e) => {
            ApiError::new(request_id, "validation_error", e.to_string())
        }
        PipelineError::Store(e) => map_store_error(request_id, e, "conflict"),
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn cron_router(cron: CronAuth) -> Router<AppState> {
    Router::new()
        .route("/api/v1/batch/run", post(batch::run_batch))
        .layer(axum::middleware::from_fn_with_state(
            cron,
            require_cron_secret,
        ))
}

pub fn build_app(state: AppState, cron: CronAuth) -> Router {
    let routes = Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/jobs", get(jobs::list_jobs).post(jobs::create_jobs))
        .route("/api/v1/jobs/stats", get(jobs::job_stats))
        .route("/api/v1/jobs/{id}", get(jobs::get_job))
        .route("/api/v1/jobs/{id}/retry", post(jobs::retry_job))
        .route("/api/v1/jobs/{id}/cancel", post(jobs::cancel_job))
        .route("/api/v1/domains", get(domains::list_domains))
        .route(
            "/api/v1/domains/{domain}",
            get(domains::get_domain).put(domains::update_domain),
        )
        .route("/api/v1/domains/{domain}/block", post(domains::block_domain))
        .route(
            "/api/v1/domains/{domain}/unblock",
            post(domains::unblock_domain),
        )
        .route("/api/v1/submissions", post(submissions::create_submission))
        .route("/api/v1/submissions/{id}", get(submissions::get_submission))
        .route(
            "/api/v1/submissions/{id}/cancel",
            post(submissions::cancel_submission),
        )
        .route(
            "/api/v1/submissions/{id}/retry",
            post(submissions::retry_submission),
        );

    Router::new()
        .merge(routes)
        .merge(cron_router(cron))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match state.pipeline.jobs().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

#[cfg(test)]
#[path = "routes_test.rs"]
mod tests;
