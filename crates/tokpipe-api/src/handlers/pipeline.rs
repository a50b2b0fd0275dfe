//! Pipeline run and sweep handlers.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use tokpipe_models::{BatchSummary, JobId, PipelineOptions, PipelineResult, SweepSummary};

use crate::error::ApiResult;
use crate::handlers::validate_id;
use crate::state::AppState;

/// Run the auto pipeline for one job. An empty body uses the configured
/// defaults.
pub async fn run_pipeline(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    body: Option<Json<PipelineOptions>>,
) -> ApiResult<Json<PipelineResult>> {
    let job_id: JobId = validate_id(&job_id)?.into();
    let options = body.map(|Json(o)| o).unwrap_or_default();

    info!(job_id = %job_id, "Pipeline run requested");
    let result = state.orchestrator.run_auto_pipeline(&job_id, &options).await?;
    Ok(Json(result))
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ProcessPendingRequest {
    #[validate(range(min = 1, max = 100))]
    #[serde(default)]
    pub limit: Option<usize>,
}

const DEFAULT_PENDING_LIMIT: usize = 10;

pub async fn process_pending(
    State(state): State<AppState>,
    body: Option<Json<ProcessPendingRequest>>,
) -> ApiResult<Json<BatchSummary>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    request.validate()?;

    let limit = request.limit.unwrap_or(DEFAULT_PENDING_LIMIT);
    let summary = state.orchestrator.process_pending_pipelines(limit).await?;
    Ok(Json(summary))
}

/// Trigger one posting sweep immediately.
pub async fn run_sweep(State(state): State<AppState>) -> ApiResult<Json<SweepSummary>> {
    let summary = state.orchestrator.process_scheduled_jobs().await?;
    Ok(Json(summary))
}
