//! HTTP route definitions and handlers.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{
        header::{ALLOW, CONTENT_TYPE},
        HeaderMap, HeaderValue, Method, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, warn};

use odata_domain::{split_service_path, RESERVED_BATCH};
use odata_server::{error_codes, ApiError, RequestContext, SubRequest, SubResponse};
use odata_storage::DataStore;

use super::state::AppState;
use crate::middleware::REQUEST_ID_HEADER;
use crate::observability::{metrics_handler, MetricsState};

/// Default request body size limit (10MB).
///
/// Sized for `$batch` envelopes; matches the `batch.body_limit_bytes`
/// configuration default.
pub const DEFAULT_BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Default path of the Prometheus endpoint.
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

/// Routes served with the application state.
///
/// Everything that is not an operational endpoint falls through to
/// [`odata_request`], which separates `$batch` from resource requests.
fn api_routes<S: DataStore>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/ready", get(readiness_check::<S>))
        .fallback(odata_request::<S>)
}

/// Creates the HTTP router with the default body size limit.
pub fn create_router<S: DataStore>(state: AppState<S>) -> Router {
    create_router_with_body_limit(state, DEFAULT_BODY_LIMIT)
}

/// Creates the HTTP router with a custom body size limit.
pub fn create_router_with_body_limit<S: DataStore>(
    state: AppState<S>,
    body_limit: usize,
) -> Router {
    api_routes::<S>()
        .route("/health", get(health_check))
        .with_state(Arc::new(state))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
}

/// Creates the HTTP router with the Prometheus endpoint at `/metrics`.
pub fn create_router_with_observability<S: DataStore>(
    state: AppState<S>,
    metrics_state: MetricsState,
) -> Router {
    create_router_with_observability_and_limit(
        state,
        metrics_state,
        DEFAULT_METRICS_PATH,
        DEFAULT_BODY_LIMIT,
    )
}

/// Creates the HTTP router with observability endpoints, a custom metrics
/// path and a custom body size limit.
///
/// The body limit applies to the service routes only.
pub fn create_router_with_observability_and_limit<S: DataStore>(
    state: AppState<S>,
    metrics_state: MetricsState,
    metrics_path: &str,
    body_limit: usize,
) -> Router {
    let api_router = api_routes::<S>()
        .with_state(Arc::new(state))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit));

    let observability_router = Router::new()
        .route(metrics_path, get(metrics_handler))
        .route("/health", get(health_check))
        .with_state(metrics_state);

    api_router.merge(observability_router)
}

// ============================================================
// Response Conversion
// ============================================================

fn into_http(response: SubResponse) -> Response {
    let mut http_response = Response::new(Body::from(response.body));
    *http_response.status_mut() = response.status;
    *http_response.headers_mut() = response.headers;
    http_response
}

fn error_response(error: &ApiError) -> Response {
    into_http(SubResponse::from_api_error(error))
}

/// Maps a body extraction failure, preserving 413 for oversized bodies.
fn body_rejection(rejection: BytesRejection) -> Response {
    let message = rejection.body_text();
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        error_response(&ApiError::new(error_codes::PAYLOAD_TOO_LARGE, message))
    } else {
        error_response(&ApiError::validation_error(message))
    }
}

fn request_context(headers: &HeaderMap) -> RequestContext {
    RequestContext::new(
        headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    )
}

// ============================================================
// Service Requests
// ============================================================

/// Serves every non-operational request.
///
/// `$batch` under the service root goes to the batch engine; anything else
/// is executed as a single request by the service.
async fn odata_request<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => return body_rejection(rejection),
    };
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    let context = request_context(&headers);

    let (path, _) = split_service_path(&target, &state.service_root);
    if path == RESERVED_BATCH {
        return batch_request(&state, method, target, headers, body, context).await;
    }

    let request = SubRequest {
        method,
        url: target,
        headers,
        body,
        content_id: None,
    };
    into_http(state.service.handle(request, context).await)
}

/// Handles `$batch`.
///
/// Envelope problems produce one JSON error for the whole request; once the
/// envelope decodes, the response is always `200` with per-part statuses.
async fn batch_request<S: DataStore>(
    state: &AppState<S>,
    method: Method,
    target: String,
    headers: HeaderMap,
    body: Bytes,
    mut context: RequestContext,
) -> Response {
    if method != Method::POST {
        let mut response = error_response(&ApiError::method_not_allowed(format!(
            "method {method} is not allowed on $batch"
        )));
        response
            .headers_mut()
            .insert(ALLOW, HeaderValue::from_static("POST"));
        return response;
    }

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let envelope = SubRequest {
        method,
        url: target,
        headers,
        body: Bytes::new(),
        content_id: None,
    };
    if let Err(e) = state.service.apply_hook(&envelope, &mut context).await {
        return into_http(SubResponse::from(e));
    }

    match state.batch.handle(&content_type, &body, &context).await {
        Ok(encoded) => into_http(SubResponse::binary(&encoded.content_type, encoded.body)),
        Err(e) => {
            warn!(
                request_id = context.request_id.as_deref().unwrap_or_default(),
                error = %e,
                "batch envelope rejected"
            );
            error_response(&ApiError::from(&e))
        }
    }
}

// ============================================================
// Health and Readiness Checks
// ============================================================

/// Basic health check - returns 200 if the server is running.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Readiness check - returns 200 when the storage backend reports healthy,
/// 503 otherwise.
///
/// Failure details are logged, not returned.
async fn readiness_check<S: DataStore>(State(state): State<Arc<AppState<S>>>) -> impl IntoResponse {
    let storage = match state.storage().health_check().await {
        Ok(status) if status.healthy => "ok",
        Ok(status) => {
            error!(
                message = status.message.as_deref().unwrap_or_default(),
                "Readiness check failed: storage unhealthy"
            );
            "unavailable"
        }
        Err(e) => {
            error!("Readiness check failed: storage unavailable: {}", e);
            "unavailable"
        }
    };

    let (status, label) = if storage == "ok" {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
    };
    (
        status,
        Json(serde_json::json!({
            "status": label,
            "checks": { "storage": storage }
        })),
    )
}
