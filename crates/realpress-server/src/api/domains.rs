use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use realpress_core::normalize::domain_from_host;
use realpress_pipeline::{CrawlDomain, DomainLimiter};
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{
    map_store_error, normalize_limit, normalize_offset, ApiError, ApiResponse, AppState,
};

#[derive(Debug, Deserialize)]
pub(super) struct ListDomainsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct UpdateDomainRequest {
    pub is_priority: Option<bool>,
    pub crawl_delay_ms: Option<i32>,
    pub max_concurrent: Option<i32>,
}

impl UpdateDomainRequest {
    fn validate(&self) -> Result<(), &'static str> {
        if self.is_priority.is_none() && self.crawl_delay_ms.is_none() && self.max_concurrent.is_none()
        {
            return Err("at least one of is_priority, crawl_delay_ms, max_concurrent is required");
        }
        if self.crawl_delay_ms.is_some_and(|d| d < 1) {
            return Err("crawl_delay_ms must be at least 1");
        }
        if self.max_concurrent.is_some_and(|c| c < 0) {
            return Err("max_concurrent must be non-negative");
        }
        Ok(())
    }
}

pub(super) async fn list_domains(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ListDomainsQuery>,
) -> Result<Json<ApiResponse<Vec<CrawlDomain>>>, ApiError> {
    let domains = state
        .pipeline
        .domains()
        .list_domains(normalize_limit(query.limit), normalize_offset(query.offset))
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e, "conflict"))?;

    Ok(Json(ApiResponse::new(domains, req_id.0)))
}

pub(super) async fn get_domain(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(domain): Path<String>,
) -> Result<Json<ApiResponse<CrawlDomain>>, ApiError> {
    let row = state
        .pipeline
        .domains()
        .get_domain(&domain_from_host(&domain))
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e, "conflict"))?;

    Ok(Json(ApiResponse::new(row, req_id.0)))
}

pub(super) async fn block_domain(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(domain): Path<String>,
) -> Result<Json<ApiResponse<CrawlDomain>>, ApiError> {
    set_allowed(&state, req_id, &domain, false).await
}

pub(super) async fn unblock_domain(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(domain): Path<String>,
) -> Result<Json<ApiResponse<CrawlDomain>>, ApiError> {
    set_allowed(&state, req_id, &domain, true).await
}

async fn set_allowed(
    state: &AppState,
    req_id: RequestId,
    domain: &str,
    allowed: bool,
) -> Result<Json<ApiResponse<CrawlDomain>>, ApiError> {
    let domain = domain_from_host(domain);
    let row = state
        .pipeline
        .domains()
        .set_allowed(&domain, allowed)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e, "conflict"))?;

    tracing::info!(domain = %domain, allowed, "domain access updated");
    Ok(Json(ApiResponse::new(row, req_id.0)))
}

pub(super) async fn update_domain(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(domain): Path<String>,
    Json(body): Json<UpdateDomainRequest>,
) -> Result<Json<ApiResponse<CrawlDomain>>, ApiError> {
    body.validate()
        .map_err(|message| ApiError::new(req_id.0.clone(), "validation_error", message))?;

    let domain = domain_from_host(&domain);
    let limiter = state.pipeline.domains();
    let map_err = |e| map_store_error(req_id.0.clone(), &e, "conflict");

    let mut row = None;
    if let Some(is_priority) = body.is_priority {
        row = Some(limiter.set_priority(&domain, is_priority).await.map_err(map_err)?);
    }
    if body.crawl_delay_ms.is_some() || body.max_concurrent.is_some() {
        row = Some(
            limiter
                .configure(&domain, body.crawl_delay_ms, body.max_concurrent)
                .await
                .map_err(map_err)?,
        );
    }
    let row = match row {
        Some(row) => row,
        None => limiter.get_domain(&domain).await.map_err(map_err)?,
    };

    tracing::info!(domain = %domain, "domain policy updated");
    Ok(Json(ApiResponse::new(row, req_id.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(
        is_priority: Option<bool>,
        crawl_delay_ms: Option<i32>,
        max_concurrent: Option<i32>,
    ) -> UpdateDomainRequest {
        UpdateDomainRequest {
            is_priority,
            crawl_delay_ms,
            max_concurrent,
        }
    }

    #[test]
    fn empty_update_is_rejected() {
        assert!(request(None, None, None).validate().is_err());
    }

    #[test]
    fn zero_delay_and_negative_concurrency_are_rejected() {
        assert!(request(None, Some(0), None).validate().is_err());
        assert!(request(None, None, Some(-1)).validate().is_err());
        assert!(request(None, Some(500), Some(0)).validate().is_ok());
    }
}
