//! odata-api: HTTP layer for the OData service
//!
//! This crate provides the API layer including:
//! - HTTP endpoints via Axum (`$batch`, resource requests, probes)
//! - Middleware (request id, logging, tracing, metrics, CORS)
//! - Observability setup (logging, Prometheus)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 odata-api                    │
//! ├─────────────────────────────────────────────┤
//! │  http/          - Routes and app state      │
//! │  middleware/    - Request id, logs, metrics │
//! │  observability/ - Logging and Prometheus    │
//! └─────────────────────────────────────────────┘
//! ```

pub mod http;
pub mod middleware;
pub mod observability;
