//! Remote backend against a mock file server.

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reel_client::{ClientConfig, FileServerClient};
use reel_models::{JobId, JobStatus, QueueType};
use reel_worker::{QueueBackend, RemoteBackend};

fn backend(server: &MockServer) -> RemoteBackend {
    let client = FileServerClient::new(ClientConfig::new(server.uri(), "secret")).unwrap();
    RemoteBackend::new(client)
}

#[tokio::test]
async fn test_claim_with_empty_queue() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/queue/audio/claim"))
        .and(header("x-api-key", "secret"))
        .and(body_partial_json(json!({"worker_id": "w1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job": null, "message": "No jobs available"})))
        .expect(1)
        .mount(&server)
        .await;

    let job = backend(&server).claim(QueueType::Audio, "w1").await.unwrap();
    assert!(job.is_none());
}

#[tokio::test]
async fn test_claim_decodes_job() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/queue/video/claim"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job": {
                "job_id": "j1",
                "status": "processing",
                "priority": 1,
                "created_at": "2024-05-01T10:00:00Z",
                "worker_id": "w1",
                "channel_code": "KC"
            },
            "message": "Job claimed"
        })))
        .mount(&server)
        .await;

    let job = backend(&server).claim(QueueType::Video, "w1").await.unwrap().unwrap();
    assert_eq!(job.job_id.as_str(), "j1");
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.payload["channel_code"], "KC");
}

#[tokio::test]
async fn test_complete_of_unheld_job_is_already_resolved() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/queue/audio/jobs/j1/complete"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Job not found in processing: j1"})))
        .mount(&server)
        .await;

    let completed = backend(&server)
        .complete(QueueType::Audio, &JobId::from_string("j1"), "w1", Default::default())
        .await
        .unwrap();
    assert!(!completed);
}

#[tokio::test]
async fn test_fail_reports_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/queue/audio/jobs/j1/fail"))
        .and(body_partial_json(json!({"worker_id": "w1", "error_message": "boom"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "status": "pending",
            "retry_count": 1,
            "message": "Job will retry"
        })))
        .mount(&server)
        .await;

    let report = backend(&server)
        .fail(QueueType::Audio, &JobId::from_string("j1"), "w1", "boom")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.status, JobStatus::Pending);
    assert_eq!(report.retry_count, 1);
}

#[tokio::test]
async fn test_fetch_missing_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/organized/KC/1/audio.wav"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "File not found"})))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("audio.wav");
    let found = backend(&server)
        .fetch_file("organized/KC/1/audio.wav", &dest)
        .await
        .unwrap();
    assert!(!found);
    assert!(!dest.exists());
}
