//! Sequence counter handlers.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Map, Value};

use reel_models::CounterKind;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CounterResponse {
    pub counter: CounterKind,
    pub value: u64,
}

pub async fn increment_counter(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> ApiResult<Json<CounterResponse>> {
    let kind: CounterKind = kind.parse()?;
    let value = state.counters.increment(kind).await?;
    Ok(Json(CounterResponse { counter: kind, value }))
}

pub async fn get_counter(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> ApiResult<Json<CounterResponse>> {
    let kind: CounterKind = kind.parse()?;
    let value = state.counters.get(kind).await?;
    Ok(Json(CounterResponse { counter: kind, value }))
}

pub async fn reset_counters(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.counters.reset().await?;

    let counters: Map<String, Value> = CounterKind::ALL
        .iter()
        .map(|kind| (kind.key().to_string(), json!(0)))
        .collect();
    Ok(Json(json!({"success": true, "counters": counters})))
}
