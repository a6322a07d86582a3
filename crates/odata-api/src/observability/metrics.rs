//! Prometheus metrics infrastructure.
//!
//! # Metrics Exposed
//!
//! - `odata_http_requests_total` - HTTP requests by method, route, status class
//! - `odata_http_request_duration_seconds` - HTTP request duration histogram
//! - `odata_batch_requests_total` - `$batch` requests by outcome
//! - `odata_batch_parts_total` - Executed batch parts by kind and outcome
//! - `odata_changesets_total` - Changesets by outcome
//! - `odata_batch_duration_seconds` - Batch execution duration histogram

use std::sync::Arc;

use axum::{extract::State, http::header::CONTENT_TYPE, response::IntoResponse};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use odata_server::handlers::batch::register_batch_metrics;

/// Shared state containing the Prometheus handle for metrics rendering.
#[derive(Clone)]
pub struct MetricsState {
    handle: Arc<PrometheusHandle>,
}

impl MetricsState {
    pub fn new(handle: PrometheusHandle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Renders the current metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to install Prometheus recorder: recorder already installed")]
    AlreadyInstalled,
}

/// Installs the Prometheus recorder and describes the service metrics.
///
/// Must run once, before anything records a metric.
pub fn init_metrics() -> Result<MetricsState, MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|_| MetricsError::AlreadyInstalled)?;

    register_http_metrics();
    register_batch_metrics();

    Ok(MetricsState::new(handle))
}

fn register_http_metrics() {
    metrics::describe_counter!("odata_http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "odata_http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
}

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Handler for the metrics endpoint.
pub async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    ([(CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], state.render())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Only one recorder can be installed per process, so these tests build
    // a detached recorder instead of calling `init_metrics`.

    #[test]
    fn test_metrics_state_renders_recorded_counters() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let state = MetricsState::new(recorder.handle());

        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("odata_changesets_total", "outcome" => "committed").increment(2);
        });

        let output = state.clone().render();
        assert!(output.contains("odata_changesets_total"));
        assert!(output.contains("outcome=\"committed\""));
    }
}
