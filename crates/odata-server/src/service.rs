//! The single-request service entry point.
//!
//! [`Service::execute`] is the one code path every request takes: top-level
//! HTTP requests, independent batch parts and changeset members. Only the
//! [`ExecutionScope`] it runs against differs.
//!
//! ```text
//! SubRequest ─► pre-request hook ─► parse_path ─► classify ─► Dispatcher ─► SubResponse
//!                  │ reject                                         │
//!                  └──────────────► 403 ◄───────── errors ──────────┘
//! ```

use std::sync::Arc;

use http::{Method, StatusCode};
use odata_domain::{
    classify, parse_path, split_service_path, ChangeLog, ChangeTracker, EntityModel,
    PendingChanges, RouteContext, DEFAULT_CHANGE_LOG_CAPACITY,
};
use odata_storage::DataStore;
use serde_json::{json, Value};
use tracing::{debug, error, instrument, warn};

use crate::context::{ExecutionScope, QueryOptions, RequestContext};
use crate::error::{HandlerError, HandlerResult};
use crate::handlers::Dispatcher;
use crate::hook::{AllowAll, PreRequestHook};
use crate::request::{SubRequest, SubResponse};

/// Request service bound to one store and one entity model.
pub struct Service<S: DataStore> {
    storage: Arc<S>,
    dispatcher: Dispatcher,
    hook: Arc<dyn PreRequestHook>,
    tracker: Arc<dyn ChangeTracker>,
    service_root: String,
}

impl<S: DataStore> Clone for Service<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            dispatcher: self.dispatcher.clone(),
            hook: Arc::clone(&self.hook),
            tracker: Arc::clone(&self.tracker),
            service_root: self.service_root.clone(),
        }
    }
}

impl<S: DataStore> Service<S> {
    /// Creates a service with the default handlers, no hook and an in-memory
    /// change log.
    pub fn new(storage: Arc<S>, model: Arc<EntityModel>) -> Self {
        Self {
            storage,
            dispatcher: Dispatcher::new(model),
            hook: Arc::new(AllowAll),
            tracker: Arc::new(ChangeLog::with_capacity(DEFAULT_CHANGE_LOG_CAPACITY)),
            service_root: "/".to_string(),
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn PreRequestHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn ChangeTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Sets the path prefix under which the service is mounted (e.g. `/odata`).
    pub fn with_service_root(mut self, service_root: impl Into<String>) -> Self {
        self.service_root = service_root.into();
        self
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn model(&self) -> &EntityModel {
        self.dispatcher.model()
    }

    pub fn tracker(&self) -> &Arc<dyn ChangeTracker> {
        &self.tracker
    }

    /// Serves one request against the ambient store.
    ///
    /// Change events recorded by a successful request are published before
    /// returning.
    #[instrument(skip_all, fields(method = %request.method, url = %request.url))]
    pub async fn handle(&self, request: SubRequest, context: RequestContext) -> SubResponse {
        let mut changes = PendingChanges::new();
        let response = {
            let mut scope = ExecutionScope::new(self.storage.as_ref(), &mut changes);
            self.execute(&request, context, &mut scope).await
        };

        if changes.is_empty() {
            return response;
        }
        if response.is_error() {
            let discarded = changes.discard();
            debug!(discarded_events = discarded, "events of failed request discarded");
        } else {
            self.tracker.publish(changes.take()).await;
        }
        response
    }

    /// Runs one request against `scope`.
    ///
    /// Never fails: every error becomes an error response. The request's
    /// `Content-ID` is echoed on the response.
    pub async fn execute(
        &self,
        request: &SubRequest,
        mut context: RequestContext,
        scope: &mut ExecutionScope<'_>,
    ) -> SubResponse {
        let response = match self.try_execute(request, &mut context, scope).await {
            Ok(response) => response,
            Err(e) => {
                if e.status().is_server_error() {
                    error!(
                        method = %request.method,
                        url = %request.url,
                        error = %e,
                        "request failed"
                    );
                } else {
                    debug!(
                        method = %request.method,
                        url = %request.url,
                        status = e.status().as_u16(),
                        error = %e,
                        "request rejected"
                    );
                }
                SubResponse::from(e)
            }
        };
        response.with_content_id(request.content_id.clone())
    }

    /// Runs the pre-request hook and merges any claims it returns.
    ///
    /// Also used by the HTTP layer on the outer `$batch` request, so that
    /// claims derived from it reach every part.
    pub async fn apply_hook(
        &self,
        request: &SubRequest,
        context: &mut RequestContext,
    ) -> HandlerResult<()> {
        match self.hook.before_request(request, context).await {
            Ok(Some(claims)) => {
                context.merge_claims(claims);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(rejection) => {
                warn!(
                    method = %request.method,
                    url = %request.url,
                    reason = %rejection,
                    "request rejected by pre-request hook"
                );
                Err(HandlerError::Forbidden(rejection.reason))
            }
        }
    }

    async fn try_execute(
        &self,
        request: &SubRequest,
        context: &mut RequestContext,
        scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse> {
        self.apply_hook(request, context).await?;

        let (path, query) = split_service_path(&request.url, &self.service_root);
        if path.is_empty() {
            if request.method == Method::GET {
                return Ok(self.service_document());
            }
            return Err(HandlerError::MethodNotAllowed {
                method: request.method.to_string(),
                allowed: &["GET"],
            });
        }

        let model = self.dispatcher.model();
        let descriptor = parse_path(path, model)?;
        let route_context = if context.in_batch {
            RouteContext::batch()
        } else {
            RouteContext::top_level()
        };
        let route = classify(&descriptor, model, &route_context)?;
        context.type_cast = route.type_cast.clone();
        context.query = QueryOptions::parse(query)?;

        self.dispatcher
            .dispatch(&route, &descriptor, request, context, scope)
            .await
    }

    /// The service document listing entity sets and singletons.
    pub fn service_document(&self) -> SubResponse {
        let value: Vec<Value> = self
            .model()
            .entity_sets
            .iter()
            .map(|(name, schema)| {
                json!({
                    "name": name,
                    "kind": if schema.singleton { "Singleton" } else { "EntitySet" },
                    "url": name,
                })
            })
            .collect();
        SubResponse::json(
            StatusCode::OK,
            &json!({
                "@odata.context": "$metadata",
                "value": value,
            }),
        )
    }
}
