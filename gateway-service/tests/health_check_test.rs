mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use common::TestApp;
use tower::util::ServiceExt;

#[tokio::test]
async fn health_check_returns_200() {
    let app = TestApp::new();

    let (status, body) = app.send(Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "gateway-service");
    assert_eq!(body["checks"]["database"], "up");
}

#[tokio::test]
async fn unknown_routes_are_404() {
    let app = TestApp::new();

    let (status, body) = app.send(Method::GET, "/v1/nowhere", None, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "route not found");
}

#[tokio::test]
async fn responses_carry_security_headers_and_a_request_id() {
    let app = TestApp::new();

    let response = app.send_raw(Method::GET, "/health", None, None).await;
    let headers = response.headers();

    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert!(headers.contains_key("x-frame-options"));
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn incoming_request_id_is_echoed() {
    let app = TestApp::new();
    let request = Request::builder()
        .method(Method::GET)
        .uri("/health")
        .header("x-request-id", "req-abc-123")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.headers()["x-request-id"], "req-abc-123");
}

#[tokio::test]
async fn metrics_endpoint_is_404_without_a_recorder() {
    let app = TestApp::new();

    let (status, _) = app.send(Method::GET, "/metrics", None, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
