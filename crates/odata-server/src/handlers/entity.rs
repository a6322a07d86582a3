//! Entity set handlers.

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use odata_domain::{ChangeEvent, ChangeType, EntitySetSchema};
use odata_storage::{ListOptions, Record, StorageError, UpdateMode};
use serde_json::{json, Map, Value};
use tracing::debug;
use uuid::Uuid;

use super::{canonical_key, entity_path, Invocation};
use crate::context::{ExecutionScope, RequestContext};
use crate::error::{HandlerError, HandlerResult};
use crate::request::SubResponse;

/// Storage key under which a singleton's state is kept.
pub const SINGLETON_KEY: &str = "$singleton";

const ODATA_TYPE: &str = "@odata.type";
const ODATA_CONTEXT: &str = "@odata.context";
const MEDIA_CONTENT: &str = "@odata.mediaContent";
const MEDIA_CONTENT_TYPE: &str = "@odata.mediaContentType";

/// Operations on one entity set.
///
/// Core CRUD is required; media, singleton and reference operations default
/// to `501 Not Implemented`.
#[async_trait]
pub trait EntitySetHandler: Send + Sync + 'static {
    async fn read_collection(
        &self,
        call: &Invocation<'_>,
        scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse>;

    async fn count(
        &self,
        call: &Invocation<'_>,
        scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse>;

    async fn create(
        &self,
        call: &Invocation<'_>,
        scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse>;

    async fn read_entity(
        &self,
        call: &Invocation<'_>,
        scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse>;

    async fn update_entity(
        &self,
        call: &Invocation<'_>,
        mode: UpdateMode,
        scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse>;

    async fn delete_entity(
        &self,
        call: &Invocation<'_>,
        scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse>;

    async fn read_media(
        &self,
        call: &Invocation<'_>,
        _scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse> {
        Err(not_implemented("media streams", call))
    }

    async fn read_singleton(
        &self,
        call: &Invocation<'_>,
        _scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse> {
        Err(not_implemented("singletons", call))
    }

    async fn update_singleton(
        &self,
        call: &Invocation<'_>,
        _mode: UpdateMode,
        _scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse> {
        Err(not_implemented("singletons", call))
    }

    async fn read_entity_ref(
        &self,
        call: &Invocation<'_>,
        _scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse> {
        Err(not_implemented("entity references", call))
    }

    async fn read_collection_ref(
        &self,
        call: &Invocation<'_>,
        _scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse> {
        Err(not_implemented("collection references", call))
    }
}

fn not_implemented(what: &str, call: &Invocation<'_>) -> HandlerError {
    HandlerError::NotImplemented(format!(
        "{what} are not supported by the handler for '{}'",
        call.entity_set
    ))
}

/// Default handler backed directly by the bound entity store.
///
/// Validates payloads against the entity set schema: declared properties
/// only, required properties present and non-null, key properties immutable.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageEntityHandler;

impl StorageEntityHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EntitySetHandler for StorageEntityHandler {
    async fn read_collection(
        &self,
        call: &Invocation<'_>,
        scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse> {
        let query = &call.context.query;
        let cast = effective_cast(call.schema, call.context);

        // A cast filters by type, so paging has to happen after filtering.
        let entities = if cast.is_some() {
            let all = scope
                .store
                .list(call.entity_set, &ListOptions::default())
                .await?;
            let matching = all
                .into_iter()
                .filter(|entity| matches_cast(&entity.record, cast));
            ListOptions {
                skip: query.skip,
                top: query.top,
            }
            .apply(matching)
        } else {
            scope
                .store
                .list(
                    call.entity_set,
                    &ListOptions {
                        skip: query.skip,
                        top: query.top,
                    },
                )
                .await?
        };

        let value: Vec<Value> = entities
            .into_iter()
            .map(|entity| Value::Object(entity.record))
            .collect();
        Ok(SubResponse::json(
            StatusCode::OK,
            &json!({
                ODATA_CONTEXT: format!("$metadata#{}", call.entity_set),
                "value": value,
            }),
        ))
    }

    async fn count(
        &self,
        call: &Invocation<'_>,
        scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse> {
        let cast = effective_cast(call.schema, call.context);
        let count = match cast {
            None => scope.store.count(call.entity_set).await?,
            Some(_) => {
                scope
                    .store
                    .list(call.entity_set, &ListOptions::default())
                    .await?
                    .iter()
                    .filter(|entity| matches_cast(&entity.record, cast))
                    .count() as u64
            }
        };
        Ok(SubResponse::text(StatusCode::OK, count.to_string()))
    }

    async fn create(
        &self,
        call: &Invocation<'_>,
        scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse> {
        let mut record = parse_record(&call.request.body)?;
        apply_type_cast(call.schema, call.context, &mut record)?;
        validate_declared(call.entity_set, call.schema, &record)?;

        if let [key_name] = call.schema.key.as_slice() {
            if record.get(key_name).map_or(true, Value::is_null) {
                record.insert(key_name.clone(), Value::String(Uuid::new_v4().to_string()));
            }
        }
        validate_required(call.entity_set, call.schema, &record)?;

        let key = canonical_key(call.entity_set, call.schema, &record)?;
        let stored = scope.store.insert(call.entity_set, &key, record).await?;
        debug!(entity_set = %call.entity_set, key = %key, "entity created");

        scope.record(ChangeEvent::new(
            call.entity_set,
            &key,
            ChangeType::Added,
            Some(Value::Object(stored.record.clone())),
        ));

        let location = entity_path(call.entity_set, call.schema, &stored.record)
            .unwrap_or_else(|| format!("{}('{}')", call.entity_set, key));
        Ok(SubResponse::json(
            StatusCode::CREATED,
            &entity_body(call.entity_set, stored.record),
        )
        .with_location(&location))
    }

    async fn read_entity(
        &self,
        call: &Invocation<'_>,
        scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse> {
        let key = call.require_key()?;
        let entity = scope.store.get(call.entity_set, key).await?;
        if !matches_cast(&entity.record, effective_cast(call.schema, call.context)) {
            return Err(StorageError::EntityNotFound {
                entity_set: call.entity_set.to_string(),
                key: key.to_string(),
            }
            .into());
        }
        Ok(SubResponse::json(
            StatusCode::OK,
            &entity_body(call.entity_set, entity.record),
        ))
    }

    async fn update_entity(
        &self,
        call: &Invocation<'_>,
        mode: UpdateMode,
        scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse> {
        let key = call.require_key()?;
        let mut record = parse_record(&call.request.body)?;
        apply_type_cast(call.schema, call.context, &mut record)?;
        validate_declared(call.entity_set, call.schema, &record)?;

        let existing = scope.store.get(call.entity_set, key).await?;
        for key_name in &call.schema.key {
            match (record.get(key_name), existing.record.get(key_name)) {
                (Some(incoming), Some(current)) if incoming != current => {
                    return Err(HandlerError::bad_request(format!(
                        "key property '{key_name}' cannot be changed"
                    )));
                }
                (None, Some(current)) => {
                    record.insert(key_name.clone(), current.clone());
                }
                _ => {}
            }
        }
        if mode == UpdateMode::Replace {
            validate_required(call.entity_set, call.schema, &record)?;
        }

        let updated = scope
            .store
            .update(call.entity_set, key, record, mode)
            .await?;
        scope.record(ChangeEvent::new(
            call.entity_set,
            key,
            ChangeType::Updated,
            Some(Value::Object(updated.record)),
        ));
        Ok(SubResponse::no_content())
    }

    async fn delete_entity(
        &self,
        call: &Invocation<'_>,
        scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse> {
        let key = call.require_key()?;
        scope.store.delete(call.entity_set, key).await?;
        scope.record(ChangeEvent::new(
            call.entity_set,
            key,
            ChangeType::Deleted,
            None,
        ));
        Ok(SubResponse::no_content())
    }

    async fn read_media(
        &self,
        call: &Invocation<'_>,
        scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse> {
        let key = call.require_key()?;
        let entity = scope.store.get(call.entity_set, key).await?;
        let content_type = entity
            .record
            .get(MEDIA_CONTENT_TYPE)
            .and_then(Value::as_str)
            .unwrap_or("application/octet-stream");
        match entity.record.get(MEDIA_CONTENT) {
            Some(Value::String(content)) => Ok(SubResponse::binary(
                content_type,
                Bytes::from(content.clone()),
            )),
            _ => Ok(SubResponse::no_content()),
        }
    }

    async fn read_singleton(
        &self,
        call: &Invocation<'_>,
        scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse> {
        let record = match scope.store.get(call.entity_set, SINGLETON_KEY).await {
            Ok(entity) => entity.record,
            Err(StorageError::EntityNotFound { .. }) => Map::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(SubResponse::json(
            StatusCode::OK,
            &entity_body(call.entity_set, record),
        ))
    }

    async fn update_singleton(
        &self,
        call: &Invocation<'_>,
        mode: UpdateMode,
        scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse> {
        let mut record = parse_record(&call.request.body)?;
        apply_type_cast(call.schema, call.context, &mut record)?;
        validate_declared(call.entity_set, call.schema, &record)?;
        if mode == UpdateMode::Replace {
            validate_required(call.entity_set, call.schema, &record)?;
        }

        let updated = match scope
            .store
            .update(call.entity_set, SINGLETON_KEY, record.clone(), mode)
            .await
        {
            Ok(updated) => updated,
            Err(StorageError::EntityNotFound { .. }) => {
                scope
                    .store
                    .insert(call.entity_set, SINGLETON_KEY, record)
                    .await?
            }
            Err(e) => return Err(e.into()),
        };
        scope.record(ChangeEvent::new(
            call.entity_set,
            SINGLETON_KEY,
            ChangeType::Updated,
            Some(Value::Object(updated.record)),
        ));
        Ok(SubResponse::no_content())
    }

    async fn read_entity_ref(
        &self,
        call: &Invocation<'_>,
        scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse> {
        let key = call.require_key()?;
        let entity = scope.store.get(call.entity_set, key).await?;
        let id = entity_path(call.entity_set, call.schema, &entity.record);
        Ok(SubResponse::json(
            StatusCode::OK,
            &json!({
                ODATA_CONTEXT: "$metadata#$ref",
                "@odata.id": id,
            }),
        ))
    }

    async fn read_collection_ref(
        &self,
        call: &Invocation<'_>,
        scope: &mut ExecutionScope<'_>,
    ) -> HandlerResult<SubResponse> {
        let query = &call.context.query;
        let entities = scope
            .store
            .list(
                call.entity_set,
                &ListOptions {
                    skip: query.skip,
                    top: query.top,
                },
            )
            .await?;
        Ok(SubResponse::json(
            StatusCode::OK,
            &references_body(call.entity_set, call.schema, entities.iter().map(|e| &e.record)),
        ))
    }
}

/// `{"@odata.context": "$metadata#Collection($ref)", "value": [{"@odata.id": ..}]}`
pub(crate) fn references_body<'r>(
    entity_set: &str,
    schema: &EntitySetSchema,
    records: impl Iterator<Item = &'r Record>,
) -> Value {
    let value: Vec<Value> = records
        .filter_map(|record| entity_path(entity_set, schema, record))
        .map(|id| json!({ "@odata.id": id }))
        .collect();
    json!({
        ODATA_CONTEXT: "$metadata#Collection($ref)",
        "value": value,
    })
}

/// An entity payload with its `@odata.context` annotation first.
pub(crate) fn entity_body(entity_set: &str, record: Record) -> Value {
    let mut body = Map::with_capacity(record.len() + 1);
    body.insert(
        ODATA_CONTEXT.to_string(),
        Value::String(format!("$metadata#{entity_set}/$entity")),
    );
    body.extend(record);
    Value::Object(body)
}

fn parse_record(body: &Bytes) -> HandlerResult<Record> {
    if body.is_empty() {
        return Err(HandlerError::bad_request("request body is required"));
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(record)) => Ok(record),
        Ok(_) => Err(HandlerError::bad_request("request body must be a JSON object")),
        Err(e) => Err(HandlerError::bad_request(format!("invalid JSON body: {e}"))),
    }
}

/// The cast that narrows results, if it differs from the set's own type.
fn effective_cast<'a>(schema: &EntitySetSchema, context: &'a RequestContext) -> Option<&'a str> {
    context
        .type_cast
        .as_deref()
        .filter(|cast| *cast != schema.entity_type)
}

fn record_type(record: &Record) -> Option<&str> {
    record
        .get(ODATA_TYPE)
        .and_then(Value::as_str)
        .map(|t| t.trim_start_matches('#'))
}

fn matches_cast(record: &Record, cast: Option<&str>) -> bool {
    match cast {
        None => true,
        Some(cast) => record_type(record) == Some(cast),
    }
}

/// Checks a payload's `@odata.type` against the path cast and stamps the cast
/// onto payloads that carry no type of their own.
fn apply_type_cast(
    schema: &EntitySetSchema,
    context: &RequestContext,
    record: &mut Record,
) -> HandlerResult<()> {
    if let Some(declared) = record.get(ODATA_TYPE) {
        if !declared.is_string() {
            return Err(HandlerError::bad_request("@odata.type must be a string"));
        }
    }

    let declared = record_type(record).map(str::to_string);
    match (context.type_cast.as_deref(), declared) {
        (Some(cast), Some(declared)) if cast != declared => {
            Err(HandlerError::bad_request(format!(
                "payload type '{declared}' does not match type cast '{cast}'"
            )))
        }
        (Some(cast), None) if cast != schema.entity_type => {
            record.insert(ODATA_TYPE.to_string(), Value::String(format!("#{cast}")));
            Ok(())
        }
        _ => Ok(()),
    }
}

fn validate_declared(
    entity_set: &str,
    schema: &EntitySetSchema,
    record: &Record,
) -> HandlerResult<()> {
    for name in record.keys() {
        if name.starts_with('@') {
            continue;
        }
        match schema.property(name) {
            None => {
                return Err(HandlerError::bad_request(format!(
                    "property '{name}' is not declared on '{entity_set}'"
                )))
            }
            Some(property) if property.is_navigation() => {
                return Err(HandlerError::bad_request(format!(
                    "navigation property '{name}' cannot be written inline"
                )))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn validate_required(
    entity_set: &str,
    schema: &EntitySetSchema,
    record: &Record,
) -> HandlerResult<()> {
    for name in schema.required_properties() {
        if record.get(name).map_or(true, Value::is_null) {
            return Err(HandlerError::bad_request(format!(
                "required property '{name}' of '{entity_set}' is missing or null"
            )));
        }
    }
    Ok(())
}
