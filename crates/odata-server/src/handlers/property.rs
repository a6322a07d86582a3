//! Property access: navigation, stream, structural and complex properties.

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use odata_domain::{DomainError, EntitySetSchema, PropertyAccess, PropertyKind};
use odata_storage::{ListOptions, Record, StorageError, StoredEntity};
use serde_json::{json, Map, Value};

use super::entity::{entity_body, references_body, SINGLETON_KEY};
use super::{entity_path, key_value_text, Invocation};
use crate::context::ExecutionScope;
use crate::error::{HandlerError, HandlerResult};
use crate::request::SubResponse;

#[async_trait]
pub trait PropertyResolver: Send + Sync + 'static {
    /// Reads a property of the addressed entity (or singleton).
    async fn resolve(
        &self,
        call: &Invocation<'_>,
        access: &PropertyAccess,
        scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse>;

    /// `Set(key)/Nav/$count`
    async fn count_navigation(
        &self,
        call: &Invocation<'_>,
        property: &str,
        scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse>;

    /// `Set(key)/Nav/$ref`
    async fn navigation_refs(
        &self,
        call: &Invocation<'_>,
        property: &str,
        scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse>;
}

/// Resolves properties from the records held by the bound store.
///
/// Single-valued navigations follow a foreign key on the source entity;
/// collection-valued navigations select the target entities whose foreign key
/// holds the source's key.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoragePropertyResolver;

struct Navigation<'m> {
    target: &'m str,
    target_schema: &'m EntitySetSchema,
    collection: bool,
    foreign_key: &'m str,
}

impl StoragePropertyResolver {
    pub fn new() -> Self {
        Self
    }

    async fn source(
        &self,
        call: &Invocation<'_>,
        scope: &ExecutionScope<'_>,
    ) -> HandlerResult<Record> {
        if call.schema.singleton {
            return match scope.store.get(call.entity_set, SINGLETON_KEY).await {
                Ok(entity) => Ok(entity.record),
                Err(StorageError::EntityNotFound { .. }) => Ok(Map::new()),
                Err(e) => Err(e.into()),
            };
        }
        let key = call.require_key()?;
        Ok(scope.store.get(call.entity_set, key).await?.record)
    }

    fn navigation<'m>(
        &self,
        call: &Invocation<'m>,
        property: &str,
    ) -> HandlerResult<Navigation<'m>> {
        let schema = call
            .schema
            .property(property)
            .ok_or_else(|| DomainError::PropertyNotFound {
                entity_set: call.entity_set.to_string(),
                property: property.to_string(),
            })?;
        match &schema.kind {
            PropertyKind::Navigation {
                target,
                collection,
                foreign_key,
            } => Ok(Navigation {
                target,
                target_schema: call.model.require_entity_set(target)?,
                collection: *collection,
                foreign_key,
            }),
            _ => Err(HandlerError::bad_request(format!(
                "'{property}' is not a navigation property"
            ))),
        }
    }

    /// The single related entity, or `None` when the foreign key is unset.
    async fn related_entity(
        &self,
        nav: &Navigation<'_>,
        source: &Record,
        scope: &ExecutionScope<'_>,
    ) -> HandlerResult<Option<StoredEntity>> {
        let Some(key) = source.get(nav.foreign_key).and_then(key_value_text) else {
            return Ok(None);
        };
        Ok(Some(scope.store.get(nav.target, &key).await?))
    }

    /// Related entities of a collection-valued navigation, in key order.
    async fn related_entities(
        &self,
        call: &Invocation<'_>,
        nav: &Navigation<'_>,
        scope: &ExecutionScope<'_>,
    ) -> HandlerResult<Vec<StoredEntity>> {
        let source_key = call.key.unwrap_or(SINGLETON_KEY);
        let all = scope
            .store
            .list(nav.target, &ListOptions::default())
            .await?;
        Ok(all
            .into_iter()
            .filter(|entity| {
                entity
                    .record
                    .get(nav.foreign_key)
                    .and_then(key_value_text)
                    .is_some_and(|fk| fk == source_key)
            })
            .collect())
    }
}

#[async_trait]
impl PropertyResolver for StoragePropertyResolver {
    async fn resolve(
        &self,
        call: &Invocation<'_>,
        access: &PropertyAccess,
        scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse> {
        let source = self.source(call, scope).await?;

        match access {
            PropertyAccess::Navigation { property, .. } => {
                let nav = self.navigation(call, property)?;
                if nav.collection {
                    let query = &call.context.query;
                    let related = self.related_entities(call, &nav, scope).await?;
                    let value: Vec<Value> = ListOptions {
                        skip: query.skip,
                        top: query.top,
                    }
                    .apply(related.into_iter())
                    .into_iter()
                    .map(|entity| Value::Object(entity.record))
                    .collect();
                    Ok(SubResponse::json(
                        StatusCode::OK,
                        &json!({
                            "@odata.context": format!("$metadata#{}", nav.target),
                            "value": value,
                        }),
                    ))
                } else {
                    match self.related_entity(&nav, &source, scope).await? {
                        Some(entity) => Ok(SubResponse::json(
                            StatusCode::OK,
                            &entity_body(nav.target, entity.record),
                        )),
                        None => Ok(SubResponse::no_content()),
                    }
                }
            }
            PropertyAccess::Stream { property } => match source.get(property) {
                Some(Value::String(content)) => Ok(SubResponse::binary(
                    "application/octet-stream",
                    Bytes::from(content.clone()),
                )),
                Some(Value::Object(stream)) => {
                    let content_type = stream
                        .get("contentType")
                        .and_then(Value::as_str)
                        .unwrap_or("application/octet-stream");
                    let content = stream
                        .get("content")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    Ok(SubResponse::binary(
                        content_type,
                        Bytes::from(content.to_string()),
                    ))
                }
                _ => Ok(SubResponse::no_content()),
            },
            PropertyAccess::Structural {
                property,
                raw_value,
            } => property_response(call, property, source.get(property), *raw_value),
            PropertyAccess::Complex {
                property,
                path,
                raw_value,
            } => {
                let mut current = source.get(property);
                for member in path {
                    current = match current {
                        Some(Value::Object(object)) => object.get(member),
                        Some(Value::Null) | None => None,
                        Some(_) => {
                            return Err(HandlerError::bad_request(format!(
                                "'{member}' cannot be addressed on a primitive value"
                            )))
                        }
                    };
                }
                let label = std::iter::once(property.as_str())
                    .chain(path.iter().map(String::as_str))
                    .collect::<Vec<_>>()
                    .join("/");
                property_response(call, &label, current, *raw_value)
            }
        }
    }

    async fn count_navigation(
        &self,
        call: &Invocation<'_>,
        property: &str,
        scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse> {
        // Surfaces 404 for a missing source entity.
        self.source(call, scope).await?;
        let nav = self.navigation(call, property)?;
        let related = self.related_entities(call, &nav, scope).await?;
        Ok(SubResponse::text(StatusCode::OK, related.len().to_string()))
    }

    async fn navigation_refs(
        &self,
        call: &Invocation<'_>,
        property: &str,
        scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse> {
        let source = self.source(call, scope).await?;
        let nav = self.navigation(call, property)?;
        if nav.collection {
            let related = self.related_entities(call, &nav, scope).await?;
            return Ok(SubResponse::json(
                StatusCode::OK,
                &references_body(nav.target, nav.target_schema, related.iter().map(|e| &e.record)),
            ));
        }
        match self.related_entity(&nav, &source, scope).await? {
            Some(entity) => Ok(SubResponse::json(
                StatusCode::OK,
                &json!({
                    "@odata.context": "$metadata#$ref",
                    "@odata.id": entity_path(nav.target, nav.target_schema, &entity.record),
                }),
            )),
            None => Ok(SubResponse::no_content()),
        }
    }
}

fn property_response(
    call: &Invocation<'_>,
    label: &str,
    value: Option<&Value>,
    raw_value: bool,
) -> HandlerResult<SubResponse> {
    let value = match value {
        None | Some(Value::Null) => return Ok(SubResponse::no_content()),
        Some(value) => value,
    };
    if raw_value {
        return match value {
            Value::String(s) => Ok(SubResponse::text(StatusCode::OK, s.clone())),
            Value::Number(n) => Ok(SubResponse::text(StatusCode::OK, n.to_string())),
            Value::Bool(b) => Ok(SubResponse::text(StatusCode::OK, b.to_string())),
            _ => Err(HandlerError::bad_request(format!(
                "$value requires a primitive value, '{label}' is structured"
            ))),
        };
    }
    Ok(SubResponse::json(
        StatusCode::OK,
        &json!({
            "@odata.context": format!("$metadata#{}/{label}", call.entity_set),
            "value": value,
        }),
    ))
}
