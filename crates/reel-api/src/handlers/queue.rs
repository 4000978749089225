//! Job queue handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;
use validator::Validate;

use reel_models::{JobId, JobStatus, QueueStats, QueueType, RawJob};
use reel_queue::NewJob;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Enqueue a job. The body is the payload plus optional `job_id` and `priority`.
pub async fn enqueue_job(
    State(state): State<AppState>,
    Path(queue_type): Path<String>,
    Json(doc): Json<Map<String, Value>>,
) -> ApiResult<Json<EnqueueResponse>> {
    let queue_type: QueueType = queue_type.parse()?;
    let job = state
        .queues
        .get(queue_type)
        .enqueue(NewJob::from_document(doc)?)
        .await?;

    metrics::record_job_enqueued(queue_type);
    Ok(Json(EnqueueResponse {
        job_id: job.job_id,
        status: job.status,
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ClaimRequest {
    #[validate(length(min = 1, max = 128))]
    pub worker_id: String,
}

#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub job: Option<RawJob>,
    pub message: &'static str,
}

/// Atomically claim the next eligible job.
pub async fn claim_job(
    State(state): State<AppState>,
    Path(queue_type): Path<String>,
    Json(request): Json<ClaimRequest>,
) -> ApiResult<Json<ClaimResponse>> {
    let queue_type: QueueType = queue_type.parse()?;
    request.validate()?;

    let job = state.queues.get(queue_type).claim(&request.worker_id).await?;
    let message = match &job {
        Some(job) => {
            metrics::record_job_claimed(queue_type);
            info!(queue = %queue_type, job_id = %job.job_id, worker_id = %request.worker_id, "Job claimed");
            "Job claimed"
        }
        None => "No jobs available",
    };

    Ok(Json(ClaimResponse { job, message }))
}

#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    pub success: bool,
    pub status: JobStatus,
    pub job_id: JobId,
}

/// Mark a claimed job completed. Body: `worker_id` plus result fields.
pub async fn complete_job(
    State(state): State<AppState>,
    Path((queue_type, job_id)): Path<(String, String)>,
    Json(mut body): Json<Map<String, Value>>,
) -> ApiResult<Json<CompleteResponse>> {
    let queue_type: QueueType = queue_type.parse()?;
    let worker_id = match body.remove("worker_id") {
        Some(Value::String(id)) if !id.is_empty() => id,
        _ => return Err(ApiError::bad_request("worker_id is required")),
    };
    let job_id = JobId::from_string(job_id);

    let job = state
        .queues
        .get(queue_type)
        .complete(&job_id, &worker_id, body)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Job not found in processing: {}", job_id)))?;

    metrics::record_job_completed(queue_type);
    Ok(Json(CompleteResponse {
        success: true,
        status: job.status,
        job_id: job.job_id,
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct FailRequest {
    #[validate(length(min = 1, max = 128))]
    pub worker_id: String,
    #[serde(default)]
    pub error_message: String,
}

#[derive(Debug, Serialize)]
pub struct FailResponse {
    pub success: bool,
    pub status: JobStatus,
    pub retry_count: u32,
    pub message: &'static str,
}

/// Report a failed attempt; the job is retried or parked in `failed`.
pub async fn fail_job(
    State(state): State<AppState>,
    Path((queue_type, job_id)): Path<(String, String)>,
    Json(request): Json<FailRequest>,
) -> ApiResult<Json<FailResponse>> {
    let queue_type: QueueType = queue_type.parse()?;
    request.validate()?;
    let job_id = JobId::from_string(job_id);

    let outcome = state
        .queues
        .get(queue_type)
        .fail(&job_id, &request.worker_id, &request.error_message)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Job not found in processing: {}", job_id)))?;

    let message = if outcome.status == JobStatus::Pending {
        metrics::record_job_retried(queue_type);
        "Job will retry"
    } else {
        metrics::record_job_failed(queue_type);
        "Job failed permanently"
    };

    Ok(Json(FailResponse {
        success: true,
        status: outcome.status,
        retry_count: outcome.retry_count,
        message,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub new_status: String,
}

/// Move a job to another state (operator recovery).
pub async fn update_job_status(
    State(state): State<AppState>,
    Path((queue_type, job_id)): Path<(String, String)>,
    Json(request): Json<StatusRequest>,
) -> ApiResult<Json<Value>> {
    let queue_type: QueueType = queue_type.parse()?;
    let new_status: JobStatus = request.new_status.parse()?;
    let job_id = JobId::from_string(job_id);

    let change = state
        .queues
        .get(queue_type)
        .set_status(&job_id, new_status)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Job not found: {}", job_id)))?;

    info!(
        queue = %queue_type,
        job_id = %job_id,
        old_status = %change.old_status,
        new_status = %change.job.status,
        "Job status updated"
    );
    Ok(Json(json!({
        "success": true,
        "job_id": change.job.job_id,
        "old_status": change.old_status,
        "new_status": change.job.status,
    })))
}

/// Fetch one job from any state.
pub async fn get_job(
    State(state): State<AppState>,
    Path((queue_type, job_id)): Path<(String, String)>,
) -> ApiResult<Json<RawJob>> {
    let queue_type: QueueType = queue_type.parse()?;
    let job_id = JobId::from_string(job_id);

    state
        .queues
        .get(queue_type)
        .get(&job_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Job not found: {}", job_id)))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<RawJob>,
    pub count: usize,
}

/// List jobs in one state (default `pending`).
pub async fn list_jobs(
    State(state): State<AppState>,
    Path(queue_type): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<JobListResponse>> {
    let queue_type: QueueType = queue_type.parse()?;
    let status = match query.status.as_deref() {
        Some(s) => s.parse()?,
        None => JobStatus::Pending,
    };

    let jobs = state.queues.get(queue_type).list(status).await?;
    Ok(Json(JobListResponse {
        count: jobs.len(),
        jobs,
    }))
}

pub async fn queue_stats(
    State(state): State<AppState>,
    Path(queue_type): Path<String>,
) -> ApiResult<Json<QueueStats>> {
    let queue_type: QueueType = queue_type.parse()?;
    Ok(Json(state.queues.get(queue_type).stats().await?))
}

/// Delete every job of every queue.
pub async fn reset_queues(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let mut deleted = Map::new();
    for (queue_type, queue) in state.queues.iter() {
        let removed = queue.reset().await?;
        deleted.insert(queue_type.as_str().to_string(), json!(removed));
    }

    Ok(Json(json!({"success": true, "deleted": deleted})))
}
