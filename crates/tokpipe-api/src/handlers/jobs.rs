//! Job progress, retry and seeding handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use tokpipe_models::{BatchSummary, JobId, JobProgressView, PipelineResult, ProductId};

use crate::error::{ApiError, ApiResult};
use crate::handlers::{validate_id, MAX_BATCH};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    /// Comma-separated job ids
    pub ids: String,
}

/// Progress snapshots for UI polling; unknown ids are omitted.
pub async fn job_progress(
    State(state): State<AppState>,
    Query(query): Query<ProgressQuery>,
) -> ApiResult<Json<Vec<JobProgressView>>> {
    let ids = query
        .ids
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| validate_id(s).map(JobId::from))
        .collect::<ApiResult<Vec<_>>>()?;

    if ids.is_empty() {
        return Err(ApiError::bad_request("ids must list at least one job id"));
    }
    if ids.len() > MAX_BATCH {
        return Err(ApiError::bad_request(format!(
            "at most {} job ids per request",
            MAX_BATCH
        )));
    }

    Ok(Json(state.orchestrator.job_progress(&ids).await?))
}

pub async fn retry_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<PipelineResult>> {
    let job_id: JobId = validate_id(&job_id)?.into();
    Ok(Json(state.orchestrator.retry_job(&job_id).await?))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BulkRetryRequest {
    #[validate(length(min = 1, max = 100))]
    pub job_ids: Vec<String>,
}

/// Retry every listed job; per-item outcomes are counted, never fatal.
pub async fn bulk_retry(
    State(state): State<AppState>,
    Json(request): Json<BulkRetryRequest>,
) -> ApiResult<Json<BatchSummary>> {
    request.validate()?;
    let ids = request
        .job_ids
        .iter()
        .map(|s| validate_id(s).map(JobId::from))
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(Json(state.orchestrator.bulk_retry(&ids).await))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FromProductRequest {
    #[validate(length(min = 1, max = 100))]
    pub product_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FromProductResponse {
    #[serde(flatten)]
    pub summary: BatchSummary,
    pub job_ids: Vec<JobId>,
}

pub async fn create_from_products(
    State(state): State<AppState>,
    Json(request): Json<FromProductRequest>,
) -> ApiResult<Json<FromProductResponse>> {
    request.validate()?;
    let ids = request
        .product_ids
        .iter()
        .map(|s| validate_id(s).map(ProductId::from))
        .collect::<ApiResult<Vec<_>>>()?;

    let (summary, job_ids) = state.orchestrator.create_jobs_from_products(&ids).await;
    Ok(Json(FromProductResponse { summary, job_ids }))
}
