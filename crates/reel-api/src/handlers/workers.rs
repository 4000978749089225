//! Worker liveness handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use reel_models::{Heartbeat, QueueType, WorkerRecord, WorkerStat};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Record a heartbeat, registering the worker on first sight.
pub async fn worker_heartbeat(
    State(state): State<AppState>,
    Path(queue_type): Path<String>,
    Json(beat): Json<Heartbeat>,
) -> ApiResult<Json<Value>> {
    let queue_type: QueueType = queue_type.parse()?;
    let record = state.workers.heartbeat(queue_type, &beat).await?;
    Ok(Json(json!({"success": true, "worker_id": record.worker_id})))
}

#[derive(Debug, Deserialize)]
pub struct StatQuery {
    pub stat: String,
}

/// Bump `jobs_completed` or `jobs_failed`.
pub async fn increment_worker_stat(
    State(state): State<AppState>,
    Path((queue_type, worker_id)): Path<(String, String)>,
    Query(query): Query<StatQuery>,
) -> ApiResult<Json<Value>> {
    let queue_type: QueueType = queue_type.parse()?;
    let stat: WorkerStat = query.stat.parse()?;

    let record = state
        .workers
        .increment(queue_type, &worker_id, stat)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Worker not found: {}", worker_id)))?;

    let mut body = serde_json::Map::new();
    body.insert("success".to_string(), json!(true));
    body.insert(stat.as_str().to_string(), json!(record.stat(stat)));
    Ok(Json(Value::Object(body)))
}

#[derive(Debug, Serialize)]
pub struct WorkerListResponse {
    pub workers: Vec<WorkerRecord>,
    pub count: usize,
}

/// Workers of one queue type, most recently seen first.
pub async fn list_workers(
    State(state): State<AppState>,
    Path(queue_type): Path<String>,
) -> ApiResult<Json<WorkerListResponse>> {
    let queue_type: QueueType = queue_type.parse()?;
    let workers = state.workers.list(queue_type).await?;
    Ok(Json(WorkerListResponse {
        count: workers.len(),
        workers,
    }))
}
