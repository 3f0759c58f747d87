//! HTTP route tests using tower's oneshot.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use mailshot::server::router;
use mailshot::{Dispatcher, MemoryFactory, MemoryTransport};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> (Router, Arc<MemoryTransport>) {
    let factory = MemoryFactory::new();
    let transport = factory.transport();
    (router(Arc::new(Dispatcher::new(factory))), transport)
}

fn smtp_config() -> Value {
    json!({
        "host": "smtp.example.com",
        "port": 587,
        "auth": {"user": "me@example.com", "pass": "secret"}
    })
}

async fn post(app: Router, uri: &str, body: String) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// ============================================================================
// GET /health
// ============================================================================

#[tokio::test]
async fn health_reports_ok_with_timestamp() {
    let (app, _) = app();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "OK");
    let timestamp = body["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
}

// ============================================================================
// POST /email
// ============================================================================

#[tokio::test]
async fn email_returns_message_id_and_response() {
    let (app, transport) = app();
    transport.echo_message_id("<abc@example.com>");

    let body = json!({
        "smtpConfig": smtp_config(),
        "from": "me@example.com",
        "to": ["a@example.com", "b@example.com"],
        "subject": "Hello",
        "text": "Hi there"
    });
    let (status, body) = post(app, "/email", body.to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "message": "Email sent successfully",
            "messageId": "<abc@example.com>",
            "response": "250 2.0.0 OK: queued"
        })
    );
    assert_eq!(transport.sent()[0].message.to, "a@example.com, b@example.com");
}

#[tokio::test]
async fn email_validation_issues_are_a_400_list() {
    let (app, transport) = app();

    let body = json!({
        "smtpConfig": {"host": "", "auth": {"user": "not-an-email", "pass": ""}},
        "from": "me@example.com",
        "to": "bad-address",
        "subject": ""
    });
    let (status, body) = post(app, "/email", body.to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let issues: Vec<&str> = body["error"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(issues.contains(&"SMTP host is required"));
    assert!(issues.contains(&"Invalid email address"));
    assert!(issues.contains(&"Password is required"));
    assert!(issues.contains(&"Subject is required"));
    assert_eq!(transport.send_calls(), 0);
}

#[tokio::test]
async fn file_paths_in_json_are_never_read() {
    let (app, transport) = app();
    let path = std::env::temp_dir().join(format!("mailshot-{}.txt", uuid::Uuid::new_v4()));
    tokio::fs::write(&path, b"server-local contents").await.unwrap();

    let body = json!({
        "smtpConfig": smtp_config(),
        "from": "me@example.com",
        "to": "you@example.com",
        "subject": "Hello",
        "text": "Hi",
        "attachments": {"filename": "leak.txt", "path": path}
    });
    let (status, body) = post(app, "/email", body.to_string()).await;
    tokio::fs::remove_file(&path).await.unwrap();

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!(["Attachment 0 content is required"]));
    assert_eq!(transport.send_calls(), 0);
}

#[tokio::test]
async fn malformed_json_is_a_400() {
    let (app, _) = app();

    let (status, body) = post(app, "/email", "{not json".to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_array());
}

#[tokio::test]
async fn verify_failure_is_a_500_with_message() {
    let (app, transport) = app();
    transport.fail_verify("Invalid login: 535 Authentication failed");

    let body = json!({
        "smtpConfig": smtp_config(),
        "from": "me@example.com",
        "to": "you@example.com",
        "subject": "Hello",
        "text": "Hi"
    });
    let (status, body) = post(app, "/email", body.to_string()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("535 Authentication failed"));
}

// ============================================================================
// POST /bulk-email
// ============================================================================

#[tokio::test]
async fn bulk_reports_per_job_outcomes() {
    let (app, transport) = app();
    transport.reject("bounce@example.com");

    let body = json!({
        "smtpConfig": smtp_config(),
        "emails": [
            {"from": "me@example.com", "to": "ok@example.com", "subject": "One", "text": "1"},
            {"from": "me@example.com", "to": ["bounce@example.com"], "subject": "Two", "text": "2"}
        ]
    });
    let (status, body) = post(app, "/bulk-email", body.to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["total"], 2);
    assert_eq!(body["successful"], 1);
    assert_eq!(body["failed"], 1);
    assert_eq!(body["results"][0]["to"], "ok@example.com");
    assert_eq!(body["results"][0]["success"], true);
    assert_eq!(body["results"][1]["to"], json!(["bounce@example.com"]));
    assert_eq!(body["results"][1]["success"], false);
    assert!(body["results"][1]["error"].is_string());
}

#[tokio::test]
async fn bulk_validation_issues_name_the_job() {
    let (app, _) = app();

    let body = json!({
        "smtpConfig": smtp_config(),
        "emails": [
            {"from": "me@example.com", "to": "ok@example.com", "subject": "One"},
            {"from": "me@example.com", "to": "nope", "subject": "Two"}
        ]
    });
    let (status, body) = post(app, "/bulk-email", body.to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        json!(["emails[1]: Invalid recipient email address: nope"])
    );
}

#[tokio::test]
async fn bulk_connectivity_failure_is_a_500() {
    let (app, transport) = app();
    transport.fail_verify("connect ETIMEDOUT");

    let body = json!({
        "smtpConfig": smtp_config(),
        "emails": [{"from": "me@example.com", "to": "ok@example.com", "subject": "One"}]
    });
    let (status, body) = post(app, "/bulk-email", body.to_string()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("ETIMEDOUT"));
    assert_eq!(transport.close_count(), 1);
}
