//! Metrics collection middleware.
//!
//! Collects HTTP request metrics through the `metrics` facade, exported by
//! `metrics-exporter-prometheus`.
//!
//! # Metrics Emitted
//!
//! - `odata_http_requests_total` - Counter with labels: method, route, status_class
//! - `odata_http_request_duration_seconds` - Histogram with the same labels
//!
//! Resource paths are open-ended, so the `route` label is a bucket
//! (`$batch`, `resource`, or the operational endpoint path) rather than the
//! raw URI.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    task::{Context, Poll},
    time::Instant,
};

use axum::{
    extract::MatchedPath,
    http::{Request, Response},
};
use tower::{Layer, Service};

/// Maps a request path to a bounded route label.
pub fn route_label(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        p if p.trim_end_matches('/').ends_with("/$batch") => "$batch",
        _ => "resource",
    }
}

/// Collected request metrics.
///
/// Keeps atomic counters that tests can read back, alongside the facade
/// metrics exported to Prometheus.
#[derive(Debug, Default)]
pub struct RequestMetrics {
    request_count: AtomicU64,
    total_duration_us: AtomicU64,
    success_count: AtomicU64,
    client_error_count: AtomicU64,
    server_error_count: AtomicU64,
    batch_count: AtomicU64,
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one completed request.
    pub fn record(&self, method: &str, route: &'static str, status: u16, duration_us: u64) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.total_duration_us
            .fetch_add(duration_us, Ordering::Relaxed);
        if route == "$batch" {
            self.batch_count.fetch_add(1, Ordering::Relaxed);
        }

        let status_class = match status {
            200..=299 => {
                self.success_count.fetch_add(1, Ordering::Relaxed);
                "2xx"
            }
            400..=499 => {
                self.client_error_count.fetch_add(1, Ordering::Relaxed);
                "4xx"
            }
            500..=599 => {
                self.server_error_count.fetch_add(1, Ordering::Relaxed);
                "5xx"
            }
            _ => "other",
        };

        let labels = [
            ("method", method.to_string()),
            ("route", route.to_string()),
            ("status_class", status_class.to_string()),
        ];
        metrics::counter!("odata_http_requests_total", &labels).increment(1);
        metrics::histogram!("odata_http_request_duration_seconds", &labels)
            .record(duration_us as f64 / 1_000_000.0);
    }

    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn get_success_count(&self) -> u64 {
        self.success_count.load(Ordering::Relaxed)
    }

    pub fn get_client_error_count(&self) -> u64 {
        self.client_error_count.load(Ordering::Relaxed)
    }

    pub fn get_server_error_count(&self) -> u64 {
        self.server_error_count.load(Ordering::Relaxed)
    }

    /// Number of requests addressed to `$batch`.
    pub fn get_batch_count(&self) -> u64 {
        self.batch_count.load(Ordering::Relaxed)
    }

    /// Average duration in microseconds; prefer the Prometheus histogram in
    /// production.
    pub fn get_avg_duration_us(&self) -> u64 {
        let count = self.request_count.load(Ordering::Relaxed);
        if count == 0 {
            0
        } else {
            self.total_duration_us.load(Ordering::Relaxed) / count
        }
    }
}

/// Layer that collects request metrics.
#[derive(Clone)]
pub struct MetricsLayer {
    metrics: Arc<RequestMetrics>,
}

impl MetricsLayer {
    pub fn new(metrics: Arc<RequestMetrics>) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> Arc<RequestMetrics> {
        Arc::clone(&self.metrics)
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            metrics: Arc::clone(&self.metrics),
        }
    }
}

/// Service that records metrics for each request.
#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    metrics: Arc<RequestMetrics>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for MetricsService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let start = Instant::now();
        let method = request.method().to_string();
        let route = match request.extensions().get::<MatchedPath>() {
            Some(matched) => route_label(matched.as_str()),
            None => route_label(request.uri().path()),
        };
        let metrics = Arc::clone(&self.metrics);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let response = inner.call(request).await?;
            let status = response.status().as_u16();
            metrics.record(&method, route, status, start.elapsed().as_micros() as u64);
            Ok(response)
        })
    }
}
