//! Router tests driven through `tower::ServiceExt::oneshot`.

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use reel_api::{create_router, ApiConfig, AppState};
use reel_queue::QueueConfig;

const KEY: &str = "test-key";
const BOUNDARY: &str = "reel-test-boundary";

async fn app(dir: &TempDir) -> Router {
    let config = ApiConfig {
        api_key: KEY.to_string(),
        queue: QueueConfig {
            allow_network_fs: true,
            ..QueueConfig::default().with_data_dir(dir.path())
        },
        ..ApiConfig::default()
    };
    let state = AppState::new(config).await.unwrap();
    create_router(state, None)
}

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri).header("x-api-key", KEY);
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn upload_request(uri: &str, contents: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"audio.wav\"\r\nContent-Type: application/octet-stream\r\n\r\n",
        b = BOUNDARY
    )
    .into_bytes();
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("x-api-key", KEY)
        .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, request).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health_is_public() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_missing_or_wrong_key_is_unauthorized() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let request = Request::builder().uri("/queue/audio/stats").body(Body::empty()).unwrap();
    let (status, body) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Invalid API key");

    let request = Request::builder()
        .uri("/queue/audio/stats")
        .header("x-api-key", "nope")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, request).await.0, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_queue_type_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let (status, _) = send_json(&app, request(Method::GET, "/queue/podcast/stats", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_enqueue_claim_complete_flow() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let (status, body) = send_json(
        &app,
        request(
            Method::POST,
            "/queue/audio/jobs",
            Some(json!({"job_id": "a1", "script_text": "hello", "channel_code": "KC"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"job_id": "a1", "status": "pending"}));

    // Same id again conflicts
    let (status, _) = send_json(&app, request(Method::POST, "/queue/audio/jobs", Some(json!({"job_id": "a1"})))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = send_json(&app, request(Method::POST, "/queue/audio/claim", Some(json!({"worker_id": "w1"})))).await;
    assert_eq!(body["message"], "Job claimed");
    assert_eq!(body["job"]["job_id"], "a1");
    assert_eq!(body["job"]["status"], "processing");
    assert_eq!(body["job"]["worker_id"], "w1");
    assert_eq!(body["job"]["script_text"], "hello");

    let (_, body) = send_json(&app, request(Method::POST, "/queue/audio/claim", Some(json!({"worker_id": "w2"})))).await;
    assert_eq!(body["job"], Value::Null);
    assert_eq!(body["message"], "No jobs available");

    // Only the claiming worker may complete
    let (status, _) = send_json(
        &app,
        request(Method::POST, "/queue/audio/jobs/a1/complete", Some(json!({"worker_id": "w2"}))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send_json(
        &app,
        request(
            Method::POST,
            "/queue/audio/jobs/a1/complete",
            Some(json!({"worker_id": "w1", "audio_path": "organized/KC/a1.wav"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");

    let (_, body) = send_json(&app, request(Method::GET, "/queue/audio/jobs/a1", None)).await;
    assert_eq!(body["audio_path"], "organized/KC/a1.wav");

    let (_, body) = send_json(&app, request(Method::GET, "/queue/audio/stats", None)).await;
    assert_eq!(body["completed"], 1);
    assert_eq!(body["pending"], 0);

    let (_, body) = send_json(&app, request(Method::GET, "/queue/audio/jobs?status=completed", None)).await;
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn test_fail_retries_then_parks_job() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    send_json(&app, request(Method::POST, "/queue/video/jobs", Some(json!({"job_id": "v1"})))).await;

    let mut last = Value::Null;
    for _ in 0..3 {
        let (_, claimed) =
            send_json(&app, request(Method::POST, "/queue/video/claim", Some(json!({"worker_id": "w1"})))).await;
        assert_eq!(claimed["job"]["job_id"], "v1");

        let (status, body) = send_json(
            &app,
            request(
                Method::POST,
                "/queue/video/jobs/v1/fail",
                Some(json!({"worker_id": "w1", "error_message": "ffmpeg crashed"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        last = body;
    }

    assert_eq!(last["status"], "failed");
    assert_eq!(last["retry_count"], 3);
    assert_eq!(last["message"], "Job failed permanently");

    let (_, body) = send_json(&app, request(Method::GET, "/queue/video/jobs/v1", None)).await;
    assert_eq!(body["error_message"], "ffmpeg crashed");
}

#[tokio::test]
async fn test_worker_heartbeat_and_stats() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let (status, body) = send_json(
        &app,
        request(
            Method::POST,
            "/workers/audio/heartbeat",
            Some(json!({"worker_id": "gpu-1", "status": "busy", "current_job": "a9"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["worker_id"], "gpu-1");

    let (_, body) = send_json(
        &app,
        request(Method::POST, "/workers/audio/gpu-1/increment?stat=jobs_completed", None),
    )
    .await;
    assert_eq!(body["jobs_completed"], 1);

    let (status, _) = send_json(
        &app,
        request(Method::POST, "/workers/audio/ghost/increment?stat=jobs_completed", None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_json(&app, request(Method::POST, "/workers/audio/gpu-1/increment?stat=bogus", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send_json(&app, request(Method::GET, "/workers/audio", None)).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["workers"][0]["status"], "busy");
    assert_eq!(body["workers"][0]["current_job"], "a9");
}

#[tokio::test]
async fn test_counters_increment_and_reset() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    for expected in 1..=2 {
        let (_, body) = send_json(&app, request(Method::POST, "/counter/increment/audio", None)).await;
        assert_eq!(body, json!({"counter": "audio", "value": expected}));
    }

    let (_, body) = send_json(&app, request(Method::GET, "/counter/video", None)).await;
    assert_eq!(body["value"], 0);

    let (status, _) = send_json(&app, request(Method::POST, "/counter/increment/podcast", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send_json(&app, request(Method::POST, "/counter/reset", None)).await;
    assert_eq!(body["counters"]["audio_counter"], 0);

    let (_, body) = send_json(&app, request(Method::GET, "/counter/audio", None)).await;
    assert_eq!(body["value"], 0);
}

#[tokio::test]
async fn test_upload_download_list_delete() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let (status, body) = send_json(&app, upload_request("/files/organized/KC/a1.wav", b"RIFF-data")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["size"], 9);
    assert_eq!(body["path"], "organized/KC/a1.wav");
    assert_eq!(body["filename"], "audio.wav");

    let (status, bytes) = send(&app, request(Method::GET, "/files/organized/KC/a1.wav", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"RIFF-data");

    let (_, body) = send_json(&app, request(Method::GET, "/list/organized/KC", None)).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["items"][0]["name"], "a1.wav");
    assert_eq!(body["items"][0]["type"], "file");

    let (status, _) = send_json(&app, request(Method::GET, "/list/organized/KC/a1.wav", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send_json(&app, request(Method::DELETE, "/files/organized/KC/a1.wav", None)).await;
    assert_eq!(body["success"], true);

    let (status, _) = send(&app, request(Method::GET, "/files/organized/KC/a1.wav", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send_json(&app, request(Method::DELETE, "/files/organized/KC/a1.wav", None)).await;
    assert_eq!(body["message"], "File already deleted");
}

#[tokio::test]
async fn test_mkdir_then_list_root() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let (status, _) = send_json(&app, request(Method::POST, "/mkdir/images/nature", None)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send_json(&app, request(Method::GET, "/list", None)).await;
    let names: Vec<&str> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"images"));
}

#[tokio::test]
async fn test_path_traversal_is_forbidden() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let (status, _) = send_json(&app, request(Method::GET, "/files/a/%2E%2E/%2E%2E/etc/passwd", None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send_json(&app, request(Method::GET, "/list/..%2F..", None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_status_endpoint_requeues_claimed_job() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    send_json(&app, request(Method::POST, "/queue/audio/jobs", Some(json!({"job_id": "a1"})))).await;
    send_json(&app, request(Method::POST, "/queue/audio/claim", Some(json!({"worker_id": "w1"})))).await;

    let (status, body) = send_json(
        &app,
        request(Method::POST, "/queue/audio/jobs/a1/status", Some(json!({"new_status": "pending"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"success": true, "job_id": "a1", "old_status": "processing", "new_status": "pending"})
    );

    let (_, job) = send_json(&app, request(Method::GET, "/queue/audio/jobs/a1", None)).await;
    assert_eq!(job["status"], "pending");
    assert_eq!(job["retry_count"], 0);
    assert!(job["worker_id"].is_null());

    let (_, stats) = send_json(&app, request(Method::GET, "/queue/audio/stats", None)).await;
    assert_eq!(stats["pending"], 1);
    assert_eq!(stats["processing"], 0);
}

#[tokio::test]
async fn test_status_endpoint_rejects_bad_requests() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    send_json(&app, request(Method::POST, "/queue/audio/jobs", Some(json!({"job_id": "a1"})))).await;

    let (status, _) = send_json(
        &app,
        request(Method::POST, "/queue/audio/jobs/a1/status", Some(json!({"new_status": "processing"}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_json(
        &app,
        request(Method::POST, "/queue/audio/jobs/a1/status", Some(json!({"new_status": "bogus"}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_json(
        &app,
        request(Method::POST, "/queue/audio/jobs/missing/status", Some(json!({"new_status": "failed"}))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Still untouched
    let (_, job) = send_json(&app, request(Method::GET, "/queue/audio/jobs/a1", None)).await;
    assert_eq!(job["status"], "pending");
}

#[tokio::test]
async fn test_unknown_list_status_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let (status, _) = send_json(&app, request(Method::GET, "/queue/audio/jobs?status=bogus", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_non_integer_priority_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let (status, _) = send_json(
        &app,
        request(Method::POST, "/queue/audio/jobs", Some(json!({"job_id": "a1", "priority": "5"}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, stats) = send_json(&app, request(Method::GET, "/queue/audio/stats", None)).await;
    assert_eq!(stats["total"], 0);
}

#[tokio::test]
async fn test_reset_clears_every_queue() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    send_json(&app, request(Method::POST, "/queue/audio/jobs", Some(json!({"job_id": "a1"})))).await;
    send_json(&app, request(Method::POST, "/queue/audio/jobs", Some(json!({"job_id": "a2"})))).await;
    send_json(&app, request(Method::POST, "/queue/video/jobs", Some(json!({"job_id": "v1"})))).await;
    send_json(&app, request(Method::POST, "/queue/video/claim", Some(json!({"worker_id": "w1"})))).await;

    let (status, body) = send_json(&app, request(Method::POST, "/queue/reset", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["deleted"], json!({"audio": 2, "video": 1, "shorts": 0}));

    for queue in ["audio", "video", "shorts"] {
        let (_, stats) = send_json(&app, request(Method::GET, &format!("/queue/{}/stats", queue), None)).await;
        assert_eq!(stats["total"], 0);
    }
}
