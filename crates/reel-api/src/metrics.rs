//! Prometheus metrics for the file server.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use reel_models::QueueType;

/// Install the Prometheus recorder and return its render handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "reel_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "reel_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "reel_http_requests_in_flight";

    // Queue transitions
    pub const JOBS_ENQUEUED_TOTAL: &str = "reel_jobs_enqueued_total";
    pub const JOBS_CLAIMED_TOTAL: &str = "reel_jobs_claimed_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "reel_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "reel_jobs_failed_total";
    pub const JOBS_RETRIED_TOTAL: &str = "reel_jobs_retried_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "reel_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

fn record_job(name: &'static str, queue_type: QueueType) {
    let labels = [("queue", queue_type.as_str().to_string())];
    counter!(name, &labels).increment(1);
}

pub fn record_job_enqueued(queue_type: QueueType) {
    record_job(names::JOBS_ENQUEUED_TOTAL, queue_type);
}

pub fn record_job_claimed(queue_type: QueueType) {
    record_job(names::JOBS_CLAIMED_TOTAL, queue_type);
}

pub fn record_job_completed(queue_type: QueueType) {
    record_job(names::JOBS_COMPLETED_TOTAL, queue_type);
}

pub fn record_job_failed(queue_type: QueueType) {
    record_job(names::JOBS_FAILED_TOTAL, queue_type);
}

pub fn record_job_retried(queue_type: QueueType) {
    record_job(names::JOBS_RETRIED_TOTAL, queue_type);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Collapse unbounded path parts (file paths, job and worker ids) so label
/// cardinality stays fixed.
fn sanitize_path(path: &str) -> String {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let sanitized: Vec<&str> = match segments.as_slice() {
        ["files" | "list" | "mkdir", ..] => vec![segments[0], ":path"],
        ["queue", kind, "jobs", _, rest @ ..] => {
            let mut out = vec!["queue", *kind, "jobs", ":id"];
            out.extend_from_slice(rest);
            out
        }
        ["workers", kind, _, "increment"] => vec!["workers", *kind, ":worker_id", "increment"],
        _ => segments.clone(),
    };
    format!("/{}", sanitized.join("/"))
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(sanitize_path("/files/organized/KC/4/audio.wav"), "/files/:path");
        assert_eq!(
            sanitize_path("/queue/audio/jobs/550e8400-e29b/complete"),
            "/queue/audio/jobs/:id/complete"
        );
        assert_eq!(sanitize_path("/queue/video/jobs"), "/queue/video/jobs");
        assert_eq!(
            sanitize_path("/workers/audio/gpu_box_1/increment"),
            "/workers/audio/:worker_id/increment"
        );
        assert_eq!(sanitize_path("/health"), "/health");
    }
}
