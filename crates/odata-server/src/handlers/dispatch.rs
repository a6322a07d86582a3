//! Route dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use odata_domain::{
    CountTarget, EntityModel, RefTarget, ResourceDescriptor, ResourceKind, Route,
};
use odata_storage::UpdateMode;
use tracing::debug;

use super::entity::{EntitySetHandler, StorageEntityHandler};
use super::property::{PropertyResolver, StoragePropertyResolver};
use super::Invocation;
use crate::context::{ExecutionScope, RequestContext};
use crate::error::{HandlerError, HandlerResult};
use crate::request::{SubRequest, SubResponse};

/// Maps a classified route and a request method onto exactly one handler
/// operation.
///
/// Entity sets without a registered handler are served by
/// [`StorageEntityHandler`].
#[derive(Clone)]
pub struct Dispatcher {
    model: Arc<EntityModel>,
    default_handler: Arc<dyn EntitySetHandler>,
    handlers: HashMap<String, Arc<dyn EntitySetHandler>>,
    resolver: Arc<dyn PropertyResolver>,
}

impl Dispatcher {
    pub fn new(model: Arc<EntityModel>) -> Self {
        Self {
            model,
            default_handler: Arc::new(StorageEntityHandler::new()),
            handlers: HashMap::new(),
            resolver: Arc::new(StoragePropertyResolver::new()),
        }
    }

    /// Registers a handler for one entity set.
    pub fn with_handler(
        mut self,
        entity_set: impl Into<String>,
        handler: Arc<dyn EntitySetHandler>,
    ) -> Self {
        self.handlers.insert(entity_set.into(), handler);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn PropertyResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn model(&self) -> &EntityModel {
        &self.model
    }

    fn handler_for(&self, entity_set: &str) -> &dyn EntitySetHandler {
        self.handlers
            .get(entity_set)
            .unwrap_or(&self.default_handler)
            .as_ref()
    }

    pub async fn dispatch(
        &self,
        route: &Route,
        descriptor: &ResourceDescriptor,
        request: &SubRequest,
        context: &RequestContext,
        scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse> {
        let method = request.method.as_str();
        if !route.kind.allows(method) {
            return Err(HandlerError::MethodNotAllowed {
                method: method.to_string(),
                allowed: route.kind.allowed_methods(),
            });
        }
        if route.kind == ResourceKind::Metadata {
            return Err(HandlerError::NotImplemented(
                "metadata document generation is not supported".to_string(),
            ));
        }

        let entity_set = descriptor.entity_set();
        let schema = self.model.require_entity_set(entity_set)?;
        let key = if descriptor.has_key() {
            Some(descriptor.entity_key().canonical(entity_set, schema)?)
        } else {
            None
        };
        let call = Invocation {
            entity_set,
            schema,
            model: &self.model,
            request,
            context,
            key: key.as_deref(),
        };
        let handler = self.handler_for(entity_set);

        debug!(
            entity_set = %entity_set,
            kind = route.kind.label(),
            method = %method,
            "dispatching request"
        );

        match (&route.kind, method) {
            (ResourceKind::Collection, "GET") => handler.read_collection(&call, scope).await,
            (ResourceKind::Collection, "POST") => handler.create(&call, scope).await,
            (ResourceKind::Entity, "GET") => handler.read_entity(&call, scope).await,
            (ResourceKind::Entity, "PATCH") => {
                handler.update_entity(&call, UpdateMode::Merge, scope).await
            }
            (ResourceKind::Entity, "PUT") => {
                handler.update_entity(&call, UpdateMode::Replace, scope).await
            }
            (ResourceKind::Entity, "DELETE") => handler.delete_entity(&call, scope).await,
            (ResourceKind::MediaValue, "GET") => handler.read_media(&call, scope).await,
            (ResourceKind::Count(CountTarget::Collection), "GET") => {
                handler.count(&call, scope).await
            }
            (ResourceKind::Count(CountTarget::Navigation { property }), "GET") => {
                self.resolver.count_navigation(&call, property, scope).await
            }
            (ResourceKind::Ref(RefTarget::Entity), "GET") => {
                handler.read_entity_ref(&call, scope).await
            }
            (ResourceKind::Ref(RefTarget::Collection), "GET") => {
                handler.read_collection_ref(&call, scope).await
            }
            (ResourceKind::Ref(RefTarget::Navigation { property }), "GET") => {
                self.resolver.navigation_refs(&call, property, scope).await
            }
            (ResourceKind::Singleton, "GET") => handler.read_singleton(&call, scope).await,
            (ResourceKind::Singleton, "PATCH") => {
                handler
                    .update_singleton(&call, UpdateMode::Merge, scope)
                    .await
            }
            (ResourceKind::Singleton, "PUT") => {
                handler
                    .update_singleton(&call, UpdateMode::Replace, scope)
                    .await
            }
            (ResourceKind::Property(access), "GET")
            | (ResourceKind::SingletonProperty(access), "GET") => {
                self.resolver.resolve(&call, access, scope).await
            }
            (kind, _) => Err(HandlerError::MethodNotAllowed {
                method: method.to_string(),
                allowed: kind.allowed_methods(),
            }),
        }
    }
}
