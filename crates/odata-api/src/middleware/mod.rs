//! API middleware.
//!
//! Includes:
//! - Request ID generation and propagation
//! - Request logging
//! - Per-request tracing spans
//! - Metrics collection
//! - CORS configuration

mod logging;
mod metrics;
mod request_id;
mod tracing_layer;

pub use logging::RequestLoggingLayer;
pub use metrics::{route_label, MetricsLayer, RequestMetrics};
pub use request_id::{RequestIdLayer, REQUEST_ID_HEADER};
pub use tracing_layer::TracingLayer;

use tower_http::cors::{Any, CorsLayer};

/// Creates a permissive CORS layer.
///
/// Exposes the OData and request id headers so browser clients can read
/// them from batch responses.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any)
}

#[cfg(test)]
mod tests;
