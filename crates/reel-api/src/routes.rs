//! API routes.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    claim_job, complete_job, delete_file, download_file, enqueue_job, fail_job, get_counter, get_job, health,
    increment_counter, increment_worker_stat, list_dir, list_jobs, list_root, list_workers, make_dir, queue_stats,
    reset_counters, reset_queues, root, update_job_status, upload_file, worker_heartbeat,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, rate_limit_middleware, request_id, request_logging, security_headers, RateLimiterCache};
use crate::security::require_api_key;
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let file_routes = Router::new()
        .route("/files/*path", get(download_file).post(upload_file).delete(delete_file))
        .route("/list", get(list_root))
        .route("/list/*path", get(list_dir))
        .route("/mkdir/*path", post(make_dir));

    let queue_routes = Router::new()
        .route("/queue/reset", post(reset_queues))
        .route("/queue/:queue_type/jobs", get(list_jobs).post(enqueue_job))
        .route("/queue/:queue_type/claim", post(claim_job))
        .route("/queue/:queue_type/stats", get(queue_stats))
        .route("/queue/:queue_type/jobs/:job_id", get(get_job))
        .route("/queue/:queue_type/jobs/:job_id/complete", post(complete_job))
        .route("/queue/:queue_type/jobs/:job_id/fail", post(fail_job))
        .route("/queue/:queue_type/jobs/:job_id/status", post(update_job_status));

    let worker_routes = Router::new()
        .route("/workers/:queue_type", get(list_workers))
        .route("/workers/:queue_type/heartbeat", post(worker_heartbeat))
        .route("/workers/:queue_type/:worker_id/increment", post(increment_worker_stat));

    let counter_routes = Router::new()
        .route("/counter/reset", post(reset_counters))
        .route("/counter/increment/:kind", post(increment_counter))
        .route("/counter/:kind", get(get_counter));

    let rate_limiter = Arc::new(RateLimiterCache::new(state.config.rate_limit_rps));

    // Everything except health and metrics requires the shared key
    let protected_routes = Router::new()
        .merge(file_routes)
        .merge(queue_routes)
        .merge(worker_routes)
        .merge(counter_routes)
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .layer(middleware::from_fn_with_state(rate_limiter, rate_limit_middleware));

    let health_routes = Router::new()
        .route("/", get(root))
        .route("/health", get(health));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(protected_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        // Uploads carry rendered videos; the multipart extractor's default cap is far too small
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
