//! Application state for HTTP handlers.

use std::sync::Arc;

use odata_domain::EntityModel;
use odata_server::{BatchHandler, BatchLimits, Service};
use odata_storage::DataStore;

/// Application state shared across all HTTP handlers.
///
/// Top-level resource requests go straight to the [`Service`]; `$batch`
/// requests go through the [`BatchHandler`], which wraps a clone of the same
/// service so both paths share storage, hook and change tracker.
pub struct AppState<S: DataStore> {
    pub service: Service<S>,
    pub batch: BatchHandler<S>,
    /// Path prefix the service is mounted at.
    pub service_root: String,
}

impl<S: DataStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            batch: self.batch.clone(),
            service_root: self.service_root.clone(),
        }
    }
}

impl<S: DataStore> AppState<S> {
    /// Creates state serving `model` from `storage` with default batch limits.
    pub fn new(storage: Arc<S>, model: Arc<EntityModel>) -> Self {
        Self::from_service(Service::new(storage, model))
    }

    /// Creates state around an already configured service.
    pub fn from_service(service: Service<S>) -> Self {
        Self {
            batch: BatchHandler::new(service.clone()),
            service,
            service_root: "/".to_string(),
        }
    }

    pub fn with_batch_limits(mut self, limits: BatchLimits) -> Self {
        self.batch = self.batch.with_limits(limits);
        self
    }

    /// Mounts the service under `service_root`.
    pub fn with_service_root(mut self, service_root: impl Into<String>) -> Self {
        let service_root = service_root.into();
        self.service = self.service.with_service_root(service_root.clone());
        self.batch = BatchHandler::new(self.service.clone()).with_limits(self.batch.limits());
        self.service_root = service_root;
        self
    }

    pub fn storage(&self) -> &Arc<S> {
        self.service.storage()
    }
}
