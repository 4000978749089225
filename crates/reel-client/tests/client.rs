//! File server client tests against a mock server.

use std::time::Duration;

use serde_json::{json, Map};
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reel_client::{ClientConfig, ClientError, FileServerClient};
use reel_models::{AudioPayload, JobId, JobStatus, QueueType, WorkerStat};

const KEY: &str = "test-key";

async fn client(server: &MockServer) -> FileServerClient {
    let mut config = ClientConfig::new(server.uri(), KEY);
    config.max_retries = 1;
    FileServerClient::new(config).unwrap()
}

#[tokio::test]
async fn test_claim_returns_typed_job() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/queue/audio/claim"))
        .and(header("x-api-key", KEY))
        .and(body_partial_json(json!({"worker_id": "w1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job": {
                "job_id": "job-1",
                "status": "processing",
                "priority": 0,
                "created_at": "2024-05-01T10:00:00Z",
                "retry_count": 0,
                "worker_id": "w1",
                "channel_code": "KC",
                "video_number": 4,
                "date": "2024-05-01",
                "organized_path": "/organized/KC/4"
            },
            "message": "Job claimed"
        })))
        .mount(&server)
        .await;

    let job = client(&server)
        .await
        .claim::<AudioPayload>(QueueType::Audio, "w1")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(job.job_id, JobId::from("job-1"));
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.payload.video_number, "4");
}

#[tokio::test]
async fn test_claim_with_null_job_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/queue/video/claim"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"job": null, "message": "No jobs available"})),
        )
        .mount(&server)
        .await;

    let job = client(&server)
        .await
        .claim::<Map<String, serde_json::Value>>(QueueType::Video, "w1")
        .await
        .unwrap();
    assert!(job.is_none());
}

#[tokio::test]
async fn test_complete_not_found_means_already_resolved() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/queue/audio/jobs/job-1/complete"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Job not found"})))
        .mount(&server)
        .await;

    let result = client(&server)
        .await
        .complete(QueueType::Audio, &JobId::from("job-1"), "w1", Map::new())
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_complete_sends_result_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/queue/audio/jobs/job-1/complete"))
        .and(body_partial_json(json!({"worker_id": "w1", "gofile_link": "https://x"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true, "status": "completed", "job_id": "job-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut result = Map::new();
    result.insert("gofile_link".into(), json!("https://x"));
    let response = client(&server)
        .await
        .complete(QueueType::Audio, &JobId::from("job-1"), "w1", result)
        .await
        .unwrap()
        .unwrap();
    assert!(response.success);
    assert_eq!(response.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_fail_reports_retry_state() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/queue/video/jobs/job-2/fail"))
        .and(body_partial_json(json!({"worker_id": "w1", "error_message": "boom"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true, "status": "pending", "retry_count": 1, "message": "Job will retry"
        })))
        .mount(&server)
        .await;

    let response = client(&server)
        .await
        .fail(QueueType::Video, &JobId::from("job-2"), "w1", "boom")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.status, JobStatus::Pending);
    assert_eq!(response.retry_count, 1);
}

#[tokio::test]
async fn test_wrong_key_is_unauthorized_and_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/queue/audio/stats"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid API key"})))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server).await.stats(QueueType::Audio).await;
    assert!(matches!(result, Err(ClientError::Unauthorized)));
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/queue/shorts/stats"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let result = client(&server).await.stats(QueueType::Shorts).await;
    assert!(matches!(result, Err(ClientError::Api { status: 503, .. })));
}

#[tokio::test]
async fn test_increment_stat() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/workers/audio/w1/increment"))
        .and(query_param("stat", "jobs_completed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "jobs_completed": 7})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/workers/audio/ghost/increment"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client(&server).await;
    assert_eq!(
        client
            .increment_stat(QueueType::Audio, "w1", WorkerStat::JobsCompleted)
            .await
            .unwrap(),
        Some(7)
    );
    assert_eq!(
        client
            .increment_stat(QueueType::Audio, "ghost", WorkerStat::JobsCompleted)
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn test_download_streams_to_disk_and_missing_text_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/organized/KC/audio.wav"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/organized/KC/script.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("nested/audio.wav");
    let client = client(&server).await;

    let written = client.download_file("organized/KC/audio.wav", &dest).await.unwrap();
    assert_eq!(written, 4096);
    assert_eq!(std::fs::read(&dest).unwrap().len(), 4096);

    assert!(client.fetch_text("/organized/KC/script.txt").await.unwrap().is_none());
}

#[tokio::test]
async fn test_upload_file_multipart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/files/organized/KC/video.mp4"))
        .and(header("x-api-key", KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true, "path": "organized/KC/video.mp4", "size": 5, "filename": "video.mp4"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let local = dir.path().join("video.mp4");
    std::fs::write(&local, b"hello").unwrap();

    let response = client(&server)
        .await
        .upload_file(&local, "organized/KC/video.mp4")
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(response.size, 5);
}

#[tokio::test]
async fn test_enqueue_sends_id_and_priority() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/queue/video/jobs"))
        .and(body_partial_json(json!({"priority": 1, "channel_code": "KC"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"job_id": "server-id", "status": "pending"})),
        )
        .mount(&server)
        .await;

    let job_id = client(&server)
        .await
        .enqueue(QueueType::Video, &json!({"channel_code": "KC"}), 1)
        .await
        .unwrap();
    assert_eq!(job_id, JobId::from("server-id"));
}

/// Client whose first attempt times out while the server is still working.
async fn impatient_client(server: &MockServer) -> FileServerClient {
    let mut config = ClientConfig::new(server.uri(), KEY);
    config.max_retries = 1;
    config.timeout = Duration::from_millis(100);
    config.retry_base_delay = Duration::from_millis(10);
    FileServerClient::new(config).unwrap()
}

async fn mount_slow_success_then_404(server: &MockServer, route: &str, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(body)
                .set_delay(Duration::from_millis(500)),
        )
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Job not found in processing"})))
        .mount(server)
        .await;
}

fn stored_job(status: &str, worker_id: Option<&str>, error_message: Option<&str>) -> serde_json::Value {
    json!({
        "job_id": "job-9",
        "status": status,
        "priority": 0,
        "created_at": "2024-05-01T10:00:00Z",
        "completed_at": "2024-05-01T10:05:00Z",
        "last_failed_at": "2024-05-01T10:05:00Z",
        "retry_count": 1,
        "worker_id": worker_id,
        "error_message": error_message,
        "channel_code": "KC"
    })
}

#[tokio::test]
async fn test_complete_committed_before_lost_response_counts_as_done() {
    let server = MockServer::start().await;
    mount_slow_success_then_404(
        &server,
        "/queue/audio/jobs/job-9/complete",
        json!({"success": true, "status": "completed", "job_id": "job-9"}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/queue/audio/jobs/job-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored_job("completed", Some("w1"), None)))
        .expect(1)
        .mount(&server)
        .await;

    let response = impatient_client(&server)
        .await
        .complete(QueueType::Audio, &JobId::from("job-9"), "w1", Map::new())
        .await
        .unwrap();

    let response = response.expect("completion by this worker must be reported as done");
    assert!(response.success);
    assert_eq!(response.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_retried_complete_for_another_workers_job_is_already_resolved() {
    let server = MockServer::start().await;
    mount_slow_success_then_404(
        &server,
        "/queue/audio/jobs/job-9/complete",
        json!({"success": true, "status": "completed", "job_id": "job-9"}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/queue/audio/jobs/job-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored_job("completed", Some("w2"), None)))
        .mount(&server)
        .await;

    let response = impatient_client(&server)
        .await
        .complete(QueueType::Audio, &JobId::from("job-9"), "w1", Map::new())
        .await
        .unwrap();
    assert!(response.is_none());
}

#[tokio::test]
async fn test_fail_committed_before_lost_response_reports_retry() {
    let server = MockServer::start().await;
    mount_slow_success_then_404(
        &server,
        "/queue/audio/jobs/job-9/fail",
        json!({"success": true, "status": "pending", "retry_count": 1, "message": "Job will retry"}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/queue/audio/jobs/job-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored_job("pending", None, Some("tts down"))))
        .mount(&server)
        .await;

    let response = impatient_client(&server)
        .await
        .fail(QueueType::Audio, &JobId::from("job-9"), "w1", "tts down")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.status, JobStatus::Pending);
    assert_eq!(response.retry_count, 1);
}
