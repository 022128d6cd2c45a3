//! Job endpoints

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use jobforge_core::{EnqueueParams, Job, JobId, JobStatus, ListParams, SystemStats};

use crate::error::ApiError;
use crate::request_id::RequestId;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    #[serde(default)]
    pub command: Option<String>,
    pub priority: Option<String>,
    #[serde(alias = "timeout_ms")]
    pub timeout: Option<i64>,
    pub max_retries: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

/// Submit a command for asynchronous execution
pub async fn create_job(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(body): Json<CreateJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let params = EnqueueParams {
        command: body.command.unwrap_or_default(),
        priority: body.priority,
        timeout_ms: body.timeout,
        max_retries: body.max_retries,
    };

    let job = state
        .jobs
        .enqueue(params)
        .await
        .map_err(|e| ApiError::from_core(e, Some(request_id)))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "job_id": job.id,
            "status": "queued",
            "message": "job accepted for execution",
        })),
    ))
}

/// Fetch the full record for one job
pub async fn get_job(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    let job_id = parse_job_id(&id, request_id)?;
    let job = state
        .jobs
        .get(job_id)
        .map_err(|e| ApiError::from_core(e, Some(request_id)))?;
    Ok(Json(job))
}

/// Enumerate jobs with an optional status filter and pagination
pub async fn list_jobs(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = parse_integer("limit", query.limit, request_id)?;
    let offset = parse_integer("offset", query.offset, request_id)?;

    let page = state
        .jobs
        .list(ListParams {
            status: query.status,
            limit,
            offset,
        })
        .map_err(|e| ApiError::from_core(e, Some(request_id)))?;

    Ok(Json(json!({
        "jobs": page.items,
        "total": page.total,
        "limit": page.limit,
        "offset": page.offset,
    })))
}

/// Cancel a job; terminal jobs are returned unchanged
pub async fn cancel_job(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let job_id = parse_job_id(&id, request_id)?;
    let job = state
        .jobs
        .cancel(job_id)
        .await
        .map_err(|e| ApiError::from_core(e, Some(request_id)))?;

    let message = match job.status {
        JobStatus::Cancelled => "job cancelled".to_string(),
        other => format!("job already {}", other),
    };

    Ok(Json(json!({
        "job_id": job.id,
        "status": job.status,
        "message": message,
    })))
}

/// Queue depths, status counts and worker liveness
pub async fn stats(State(state): State<AppState>) -> Json<SystemStats> {
    Json(state.jobs.stats().await)
}

fn parse_job_id(raw: &str, request_id: RequestId) -> Result<JobId, ApiError> {
    Uuid::parse_str(raw).map_err(|_| {
        ApiError::bad_request(format!("invalid job id '{}'", raw))
            .with_details(json!({ "field": "id", "value": raw }))
            .with_request_id(request_id)
    })
}

fn parse_integer(
    field: &str,
    value: Option<String>,
    request_id: RequestId,
) -> Result<Option<i64>, ApiError> {
    match value {
        None => Ok(None),
        Some(raw) => raw.parse::<i64>().map(Some).map_err(|_| {
            ApiError::bad_request(format!("{} must be an integer", field))
                .with_details(json!({ "field": field, "value": raw }))
                .with_request_id(request_id)
        }),
    }
}
