use axum::http::{header, HeaderName, HeaderValue};
use serde_json::Value;

use crate::test_utils::TestApp;

#[tokio::test]
async fn health_endpoint_reports_status_and_uptime() {
    let app = TestApp::new().await;
    let response = app.server.get("/health").await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "freqdash-api");
    assert!(body["uptimeSeconds"].as_u64().is_some());
}

#[tokio::test]
async fn cache_stats_are_open_in_development() {
    let app = TestApp::new().await;
    let response = app.server.get("/api/cache/stats").await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    assert_eq!(body["connected"], true);
    assert!(body["totalKeys"].as_u64().is_some());
}

#[tokio::test]
async fn protected_routes_without_configured_key_fail_closed() {
    let app = TestApp::with_environment("production", None).await;
    let response = app.server.get("/api/cache/stats").await;
    assert_eq!(response.status_code(), 500);
    assert_eq!(response.json::<Value>()["error"], "Server configuration error");
}

#[tokio::test]
async fn protected_routes_check_bearer_token() {
    let app = TestApp::with_environment("production", Some("s3cret")).await;

    let missing = app.server.get("/api/cache/stats").await;
    assert_eq!(missing.status_code(), 401);
    assert_eq!(missing.json::<Value>()["error"], "Missing or invalid authentication");

    let wrong = app
        .server
        .get("/api/cache/stats")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer nope"))
        .await;
    assert_eq!(wrong.status_code(), 401);
    assert_eq!(wrong.json::<Value>()["error"], "Invalid authentication token");

    let ok = app
        .server
        .get("/api/cache/stats")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"))
        .await;
    assert_eq!(ok.status_code(), 200);

    let pairs = app
        .server
        .get(&format!("/api/backtests/{}/available-pairs", uuid::Uuid::new_v4()))
        .await;
    assert_eq!(pairs.status_code(), 401);
}

#[tokio::test]
async fn unprotected_routes_ignore_auth_in_production() {
    let app = TestApp::with_environment("production", Some("s3cret")).await;
    assert_eq!(app.server.get("/health").await.status_code(), 200);
    assert_eq!(app.server.get("/api/backtests").await.status_code(), 200);
}

#[tokio::test]
async fn protected_routes_are_rate_limited_per_client() {
    let app = TestApp::with_environment("production", Some("s3cret")).await;
    let bearer = HeaderValue::from_static("Bearer s3cret");

    for _ in 0..100 {
        let response = app
            .server
            .get("/api/cache/stats")
            .add_header(header::AUTHORIZATION, bearer.clone())
            .add_header(HeaderName::from_static("x-forwarded-for"), HeaderValue::from_static("203.0.113.7"))
            .await;
        assert_eq!(response.status_code(), 200);
    }

    let limited = app
        .server
        .get("/api/cache/stats")
        .add_header(header::AUTHORIZATION, bearer.clone())
        .add_header(HeaderName::from_static("x-forwarded-for"), HeaderValue::from_static("203.0.113.7"))
        .await;
    assert_eq!(limited.status_code(), 400);
    let body: Value = limited.json();
    assert_eq!(body["error"], "Security validation failed");
    assert_eq!(body["details"], serde_json::json!(["Rate limit exceeded"]));

    let other_client = app
        .server
        .get("/api/cache/stats")
        .add_header(header::AUTHORIZATION, bearer)
        .add_header(HeaderName::from_static("x-forwarded-for"), HeaderValue::from_static("198.51.100.2"))
        .await;
    assert_eq!(other_client.status_code(), 200);

    assert_eq!(app.server.get("/health").await.status_code(), 200);
}

#[tokio::test]
async fn protected_routes_reject_forged_proxy_headers() {
    let app = TestApp::new().await;

    let forged = app
        .server
        .get("/api/cache/stats")
        .add_header(HeaderName::from_static("x-forwarded-host"), HeaderValue::from_static("dash.example, evil.example"))
        .await;
    assert_eq!(forged.status_code(), 400);
    let body: Value = forged.json();
    assert_eq!(body["error"], "Security validation failed");
    assert_eq!(
        body["details"],
        serde_json::json!(["Suspicious x-forwarded-host header"])
    );

    let odd_type = app
        .server
        .get(&format!("/api/backtests/{}/available-pairs", uuid::Uuid::new_v4()))
        .add_header(header::CONTENT_TYPE, HeaderValue::from_static("application/xml"))
        .await;
    assert_eq!(odd_type.status_code(), 400);
    assert_eq!(
        odd_type.json::<Value>()["details"],
        serde_json::json!(["Unsupported content type: application/xml"])
    );

    let plain = app.server.get("/api/cache/stats").await;
    assert_eq!(plain.status_code(), 200);
}
