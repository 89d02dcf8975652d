//! API integration tests
//!
//! Tests for HTTP API endpoints using axum's test utilities.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use encodeforge::config::Config;
use encodeforge::server::{create_router, AppContext};
use encodeforge::state::{Job, JobState, Terminal};
use encodeforge_common::JobId;
use http_body_util::BodyExt;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

/// Create a test context whose storage lives in a temp directory
fn create_test_context() -> (AppContext, TempDir) {
    let temp = tempdir().unwrap();
    let mut config = Config::default();
    config.storage.upload_root = temp.path().join("uploads");
    config.storage.output_root = temp.path().join("encoded");
    config.storage.max_upload_bytes = 1024;
    (AppContext::new(config), temp)
}

/// Helper to get response body as string
async fn body_to_string(body: Body) -> String {
    let bytes = body.collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn multipart_body(boundary: &str, field: &str, file_name: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

fn upload_request(field: &str, file_name: &str, content: &[u8]) -> Request<Body> {
    let boundary = "encodeforge-test-boundary";
    Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(multipart_body(boundary, field, file_name, content)))
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (ctx, _temp) = create_test_context();
    let app = create_router(ctx);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_to_string(response.into_body()).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["active_jobs"], 0);
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_list_jobs_empty() {
    let (ctx, _temp) = create_test_context();
    let app = create_router(ctx);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/jobs")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_string(response.into_body()).await;
    assert_eq!(body, "[]");
}

#[tokio::test]
async fn test_get_unknown_job() {
    let (ctx, _temp) = create_test_context();
    let app = create_router(ctx);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/jobs/does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_to_string(response.into_body()).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["kind"], "not_found");
    assert!(json["error"]
        .as_str()
        .unwrap()
        .contains("No transcoding job found for does-not-exist"));
}

#[tokio::test]
async fn test_get_job_invalid_id() {
    let (ctx, _temp) = create_test_context();
    let app = create_router(ctx);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/jobs/bad.id")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_unknown_job() {
    let (ctx, _temp) = create_test_context();
    let app = create_router(ctx);

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/jobs/ghost")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

fn delete_request(id: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(format!("/api/jobs/{}", id))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_delete_active_then_finished_job() {
    let (ctx, temp) = create_test_context();
    let registry = ctx.registry.clone();
    let app = create_router(ctx);

    let id = JobId::parse("in-flight").unwrap();
    let sender = registry
        .create(Job::new(
            id.clone(),
            temp.path().join("uploads/in-flight.mp4"),
            temp.path().join("encoded/in-flight"),
        ))
        .unwrap();

    let response = app.clone().oneshot(delete_request("in-flight")).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("already_running"));
    assert!(registry.get(&id).is_some());

    sender.finish(Terminal::completed());
    for _ in 0..200 {
        if registry.get(&id).map(|v| v.state) == Some(JobState::Completed) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let response = app.clone().oneshot(delete_request("in-flight")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(registry.get(&id).is_none());

    let response = app.oneshot(delete_request("in-flight")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_events_for_unknown_job() {
    let (ctx, _temp) = create_test_context();
    let app = create_router(ctx);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/jobs/ghost/events")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("event: error"));
    assert!(body.contains("No transcoding job found for ghost"));
}

#[tokio::test]
async fn test_rpc_status_unknown_job() {
    let (ctx, _temp) = create_test_context();
    let app = create_router(ctx);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/rpc/transcoding.VideoStatusService/StatusVideo")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"uuid": "ghost"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rpc_notify_missing_upload() {
    let (ctx, _temp) = create_test_context();
    let registry = ctx.registry.clone();
    let app = create_router(ctx);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/rpc/transcoding.Transcoder/NotifyUploadComplete")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"uuid": "never-uploaded"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_to_string(response.into_body()).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status_code"], 404);
    assert!(json["message"].as_str().unwrap().contains("not found"));

    // The failed job is still recorded for late observers.
    let id = JobId::parse("never-uploaded").unwrap();
    assert!(registry.get(&id).is_some());
}

#[tokio::test]
async fn test_rpc_notify_malformed_id() {
    let (ctx, _temp) = create_test_context();
    let app = create_router(ctx);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/rpc/transcoding.Transcoder/NotifyUploadComplete")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"uuid": "../etc/passwd"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_to_string(response.into_body()).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status_code"], 400);
}

#[tokio::test]
async fn test_upload_rejects_extension() {
    let (ctx, temp) = create_test_context();
    let app = create_router(ctx);

    let response = app
        .oneshot(upload_request("video", "notes.txt", b"hello"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("unsupported file type"));

    // Nothing was written.
    assert!(!temp.path().join("uploads").exists());
}

#[tokio::test]
async fn test_upload_without_video_field() {
    let (ctx, _temp) = create_test_context();
    let app = create_router(ctx);

    let response = app
        .oneshot(upload_request("attachment", "clip.mp4", b"data"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("'video'"));
}

#[tokio::test]
async fn test_upload_over_limit() {
    let (ctx, temp) = create_test_context();
    let app = create_router(ctx);

    let content = vec![0u8; 4096];
    let response = app
        .oneshot(upload_request("video", "clip.mp4", &content))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("limit"));

    let uploads = temp.path().join("uploads");
    if uploads.exists() {
        assert_eq!(std::fs::read_dir(&uploads).unwrap().count(), 0);
    }
}

#[tokio::test]
async fn test_unknown_route() {
    let (ctx, _temp) = create_test_context();
    let app = create_router(ctx);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
