//! Middleware tests.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use tower::ServiceExt;

use odata_domain::EntityModel;
use odata_storage::MemoryDataStore;

use super::*;
use crate::http::{create_router, AppState};

/// The service router wrapped in the full middleware stack, in the order the
/// binary applies it (last `.layer()` is outermost).
fn test_app_with_middleware(metrics: Arc<RequestMetrics>) -> Router {
    let storage = Arc::new(MemoryDataStore::with_entity_sets(["People", "Orders"]));
    create_router(AppState::new(storage, Arc::new(EntityModel::sample())))
        .layer(RequestLoggingLayer::new())
        .layer(TracingLayer::new())
        .layer(MetricsLayer::new(metrics))
        .layer(RequestIdLayer::new())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn response_request_id(response: &axum::response::Response) -> String {
    response
        .headers()
        .get(REQUEST_ID_HEADER)
        .expect("response should carry x-request-id")
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_requests_pass_through_full_stack() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let app = test_app_with_middleware(Arc::new(RequestMetrics::new()));
    let response = app.oneshot(get("/People")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_are_collected_per_route_bucket() {
    let metrics = Arc::new(RequestMetrics::new());
    let app = test_app_with_middleware(Arc::clone(&metrics));

    let response = app.clone().oneshot(get("/People")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.clone().oneshot(get("/Nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let batch = Request::builder()
        .method("POST")
        .uri("/$batch")
        .header(header::CONTENT_TYPE, "multipart/mixed; boundary=b")
        .body(Body::from("--b--"))
        .unwrap();
    let response = app.oneshot(batch).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(metrics.get_request_count(), 3);
    assert_eq!(metrics.get_success_count(), 2);
    assert_eq!(metrics.get_client_error_count(), 1);
    assert_eq!(metrics.get_batch_count(), 1);
}

#[tokio::test]
async fn test_request_id_is_generated_and_propagated() {
    let app = test_app_with_middleware(Arc::new(RequestMetrics::new()));

    let response = app.clone().oneshot(get("/People")).await.unwrap();
    let generated = response_request_id(&response);
    assert!(
        uuid::Uuid::parse_str(&generated).is_ok(),
        "generated request id should be a UUID"
    );

    let request = Request::builder()
        .uri("/People")
        .header(REQUEST_ID_HEADER, "client-req-7")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response_request_id(&response), "client-req-7");
}

#[tokio::test]
async fn test_unusable_request_id_is_replaced() {
    let app = test_app_with_middleware(Arc::new(RequestMetrics::new()));
    let request = Request::builder()
        .uri("/People")
        .header(REQUEST_ID_HEADER, "x".repeat(500))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert!(uuid::Uuid::parse_str(&response_request_id(&response)).is_ok());
}

#[tokio::test]
async fn test_cors_preflight_for_batch() {
    let storage = Arc::new(MemoryDataStore::new());
    let app = create_router(AppState::new(storage, Arc::new(EntityModel::sample())))
        .layer(cors_layer());

    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/$batch")
                .header("Origin", "http://example.com")
                .header("Access-Control-Request-Method", "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .contains_key("access-control-allow-origin"));
}
