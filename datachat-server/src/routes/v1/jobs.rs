//! Job tracker routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use utoipa::OpenApi;
use uuid::Uuid;

use crate::error::ServerError;
use crate::schemas::v1::job::{JobResponse, StageResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(job_stats, get_job),
    components(schemas(JobResponse, StageResponse))
)]
pub struct JobsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs/stats", get(job_stats))
        .route("/jobs/{message_id}", get(get_job))
}

/// Queue depth and the number of jobs lost since start-up.
#[utoipa::path(
    get,
    path = "/v1/jobs/stats",
    tag = "jobs",
    responses((status = 200, description = "Pipeline counters", body = Value))
)]
pub async fn job_stats(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "queued": state.orchestrator.queued(),
        "lost":   state.orchestrator.tracker().lost_jobs(),
    }))
}

#[utoipa::path(
    get,
    path = "/v1/jobs/{message_id}",
    tag = "jobs",
    params(("message_id" = Uuid, Path, description = "Message the job answers")),
    responses(
        (status = 200, description = "Job retrieved", body = JobResponse),
        (status = 404, description = "Job not found"),
    )
)]
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<Uuid>,
) -> Result<Json<JobResponse>, ServerError> {
    let view = state.orchestrator.status(message_id).await?;
    Ok(Json(view.into()))
}
