//! Shared test utilities for the OData API tests.

// Each test file uses a different subset of these helpers.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    http::{header, Request, StatusCode},
};
use tower::ServiceExt;

use odata_api::http::{create_router, AppState};
use odata_domain::EntityModel;
use odata_server::handlers::batch::codec::decode_responses;
use odata_server::handlers::batch::{BatchResponse, BatchResponseItem};
use odata_server::SubResponse;
use odata_storage::MemoryDataStore;

/// Boundary used by every batch the helpers build.
pub const BOUNDARY: &str = "batch_36522ad7";

/// Fresh storage with the sample model's entity sets.
pub fn create_storage() -> Arc<MemoryDataStore> {
    let model = EntityModel::sample();
    Arc::new(MemoryDataStore::with_entity_sets(
        model.entity_sets.keys().cloned(),
    ))
}

/// Create a test app over `storage` serving the sample model.
pub fn create_test_app(storage: &Arc<MemoryDataStore>) -> axum::Router {
    let state = AppState::new(Arc::clone(storage), Arc::new(EntityModel::sample()));
    create_router(state)
}

// =============================================================================
// Multipart Builders
// =============================================================================

/// An `application/http` part with an optional JSON body and Content-ID.
pub fn http_part(method: &str, url: &str, body: Option<&str>, content_id: Option<&str>) -> String {
    let mut part = String::from(
        "Content-Type: application/http\r\nContent-Transfer-Encoding: binary\r\n",
    );
    if let Some(id) = content_id {
        part.push_str(&format!("Content-ID: {id}\r\n"));
    }
    part.push_str(&format!("\r\n{method} {url} HTTP/1.1\r\n"));
    match body {
        Some(body) => part.push_str(&format!(
            "Content-Type: application/json\r\n\r\n{body}\r\n"
        )),
        None => part.push_str("\r\n"),
    }
    part
}

pub fn create_person(id: u32, name: &str) -> String {
    http_part(
        "POST",
        "People",
        Some(&format!(r#"{{"ID": {id}, "Name": "{name}"}}"#)),
        None,
    )
}

/// Joins parts into a multipart body closed with `--boundary--`.
pub fn multipart(boundary: &str, parts: &[String]) -> String {
    let mut body = String::new();
    for part in parts {
        body.push_str(&format!("--{boundary}\r\n{part}"));
    }
    body.push_str(&format!("--{boundary}--\r\n"));
    body
}

/// A changeset part wrapping `parts`.
pub fn changeset(boundary: &str, parts: &[String]) -> String {
    format!(
        "Content-Type: multipart/mixed; boundary={boundary}\r\n\r\n{}",
        multipart(boundary, parts)
    )
}

// =============================================================================
// Request Helpers
// =============================================================================

/// Raw result of a `$batch` call.
pub struct BatchCall {
    pub status: StatusCode,
    pub content_type: String,
    pub body: Bytes,
}

impl BatchCall {
    /// Decodes the multipart response body.
    pub fn decode(&self) -> BatchResponse {
        decode_responses(&self.content_type, &self.body).expect("well-formed batch response")
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("JSON body")
    }
}

pub async fn post_batch_with(app: axum::Router, content_type: &str, body: String) -> BatchCall {
    let request = Request::builder()
        .method("POST")
        .uri("/$batch")
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    BatchCall {
        status,
        content_type,
        body,
    }
}

/// Posts `parts` as a batch with [`BOUNDARY`].
pub async fn post_batch(app: axum::Router, parts: &[String]) -> BatchCall {
    post_batch_with(
        app,
        &format!("multipart/mixed; boundary={BOUNDARY}"),
        multipart(BOUNDARY, parts),
    )
    .await
}

/// GET `uri` and return status and JSON body.
pub async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

// =============================================================================
// Response Accessors
// =============================================================================

pub fn statuses(responses: &[SubResponse]) -> Vec<u16> {
    responses.iter().map(|r| r.status.as_u16()).collect()
}

/// Statuses of every response in document order, changesets flattened.
pub fn all_statuses(response: &BatchResponse) -> Vec<u16> {
    response.responses().map(|r| r.status.as_u16()).collect()
}

pub fn single(item: &BatchResponseItem) -> &SubResponse {
    match item {
        BatchResponseItem::Single(response) => response,
        other => panic!("expected a single response, got {other:?}"),
    }
}

pub fn changeset_responses(item: &BatchResponseItem) -> &[SubResponse] {
    match item {
        BatchResponseItem::Changeset(responses) => responses,
        other => panic!("expected a changeset response, got {other:?}"),
    }
}

pub fn body_json(response: &SubResponse) -> serde_json::Value {
    serde_json::from_slice(&response.body).expect("JSON sub-response body")
}
