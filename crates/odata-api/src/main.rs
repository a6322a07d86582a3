//! OData Server Binary
//!
//! # Usage
//!
//! ```bash
//! # With config file
//! odata --config config.yaml
//!
//! # With environment variables only
//! ODATA_SERVER__PORT=9090 odata
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tower_http::timeout::TimeoutLayer;
use tracing::{error, info};

use odata_api::http::{
    create_router_with_body_limit, create_router_with_observability_and_limit, AppState,
};
use odata_api::middleware::{
    cors_layer, MetricsLayer, RequestIdLayer, RequestLoggingLayer, RequestMetrics, TracingLayer,
};
use odata_api::observability::{init_logging, init_metrics, LoggingConfig};
use odata_server::{RequireHeader, ServerConfig, Service};
use odata_storage::{DataStore, MemoryDataStore};

/// OData v4 server with `$batch` and changeset support
#[derive(Parser, Debug)]
#[command(name = "odata")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = if let Some(config_path) = args.config {
        ServerConfig::load(&config_path)?
    } else {
        ServerConfig::from_env()?
    };

    init_logging(LoggingConfig::from_settings(&config.logging));
    info!(version = env!("CARGO_PKG_VERSION"), "Starting OData server");

    let model = Arc::new(config.load_model()?);
    info!(
        namespace = %model.namespace,
        entity_sets = model.entity_sets.len(),
        "Entity model loaded"
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    match config.storage.backend.as_str() {
        "memory" => {
            info!("Using in-memory storage backend");
            let storage = Arc::new(MemoryDataStore::with_entity_sets(
                model.entity_sets.keys().cloned(),
            ));
            run_server(storage, model, addr, &config).await
        }
        other => {
            error!("Unknown storage backend: {}", other);
            anyhow::bail!("Unknown storage backend: {}", other);
        }
    }
}

fn build_router<S: DataStore>(
    storage: Arc<S>,
    model: Arc<odata_domain::EntityModel>,
    config: &ServerConfig,
) -> anyhow::Result<axum::Router> {
    let mut service = Service::new(storage, model);
    if let Some(header) = &config.server.required_header {
        info!(header = %header, "Requiring identity header on every request");
        service = service.with_hook(Arc::new(RequireHeader::new(header.clone(), "user")));
    }

    let state = AppState::from_service(service)
        .with_service_root(config.server.service_root.clone())
        .with_batch_limits(config.batch.limits());

    let router = if config.metrics.enabled {
        let metrics_state = init_metrics()?;
        info!(path = %config.metrics.path, "Metrics enabled");
        create_router_with_observability_and_limit(
            state,
            metrics_state,
            &config.metrics.path,
            config.batch.body_limit_bytes,
        )
    } else {
        create_router_with_body_limit(state, config.batch.body_limit_bytes)
    };

    // Last layer is outermost: the request id exists before anything logs.
    Ok(router
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(RequestLoggingLayer::new())
        .layer(TracingLayer::new())
        .layer(MetricsLayer::new(Arc::new(RequestMetrics::new())))
        .layer(cors_layer())
        .layer(RequestIdLayer::new()))
}

/// Runs the HTTP server until a shutdown signal arrives.
///
/// In-flight requests are allowed to finish; a batch whose future is dropped
/// by the timeout layer rolls back its open changeset.
async fn run_server<S: DataStore>(
    storage: Arc<S>,
    model: Arc<odata_domain::EntityModel>,
    addr: SocketAddr,
    config: &ServerConfig,
) -> anyhow::Result<()> {
    let router = build_router(storage, model, config)?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, service_root = %config.server.service_root, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
