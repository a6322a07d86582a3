//! Request handlers.
//!
//! - [`EntitySetHandler`]: per entity set operations (collection, entity,
//!   media, singleton, references)
//! - [`PropertyResolver`]: navigation, stream, structural and complex
//!   property access
//! - [`Dispatcher`]: picks exactly one operation from a classified route and
//!   the request method
//! - [`batch`]: `$batch` envelope codec and executors

pub mod batch;
mod dispatch;
mod entity;
mod property;

pub use dispatch::Dispatcher;
pub use entity::{EntitySetHandler, StorageEntityHandler, SINGLETON_KEY};
pub use property::{PropertyResolver, StoragePropertyResolver};

use odata_domain::{format_key_literal, EntityModel, EntitySetSchema};
use odata_storage::Record;
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::{HandlerError, HandlerResult};
use crate::request::SubRequest;

/// Everything a handler needs to know about the call it is serving.
#[derive(Clone, Copy)]
pub struct Invocation<'a> {
    pub entity_set: &'a str,
    pub schema: &'a EntitySetSchema,
    pub model: &'a EntityModel,
    pub request: &'a SubRequest,
    pub context: &'a RequestContext,
    /// Canonical storage key of the addressed entity, if any.
    pub key: Option<&'a str>,
}

impl<'a> Invocation<'a> {
    /// The addressed key, failing if the route carried none.
    pub fn require_key(&self) -> HandlerResult<&'a str> {
        self.key.ok_or_else(|| {
            HandlerError::Internal(format!("no key addressed on '{}'", self.entity_set))
        })
    }
}

/// Renders a key property value the way the storage key stores it.
pub(crate) fn key_value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Computes the canonical storage key of an entity from its key properties.
///
/// Matches what [`odata_domain::EntityKey::canonical`] produces for a path
/// addressing the same entity.
pub(crate) fn canonical_key(
    entity_set: &str,
    schema: &EntitySetSchema,
    record: &Record,
) -> HandlerResult<String> {
    let mut parts = Vec::with_capacity(schema.key.len());
    for name in &schema.key {
        let value = record
            .get(name)
            .and_then(key_value_text)
            .ok_or_else(|| {
                HandlerError::bad_request(format!(
                    "key property '{name}' of '{entity_set}' must be a non-null primitive"
                ))
            })?;
        if schema.key.len() == 1 {
            return Ok(value);
        }
        parts.push(format!("{name}={value}"));
    }
    Ok(parts.join(","))
}

/// Service-relative path of an entity (`People(1)`, `Lines(OrderID=7,LineNo=2)`).
pub(crate) fn entity_path(
    entity_set: &str,
    schema: &EntitySetSchema,
    record: &Record,
) -> Option<String> {
    let literals: Option<Vec<(String, String)>> = schema
        .key
        .iter()
        .map(|name| {
            record
                .get(name)
                .and_then(format_key_literal)
                .map(|literal| (name.clone(), literal))
        })
        .collect();
    let literals = literals?;
    match literals.as_slice() {
        [] => None,
        [(_, literal)] => Some(format!("{entity_set}({literal})")),
        pairs => {
            let rendered: Vec<String> = pairs
                .iter()
                .map(|(name, literal)| format!("{name}={literal}"))
                .collect();
            Some(format!("{entity_set}({})", rendered.join(",")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odata_domain::PropertySchema;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_canonical_key_single_and_composite() {
        let people = EntitySetSchema::new("Demo.Person").with_key("ID");
        assert_eq!(
            canonical_key("People", &people, &record(json!({"ID": 7}))).unwrap(),
            "7"
        );
        assert_eq!(
            canonical_key("People", &people, &record(json!({"ID": "ada"}))).unwrap(),
            "ada"
        );
        assert!(canonical_key("People", &people, &record(json!({"ID": null}))).is_err());

        let lines = EntitySetSchema::new("Demo.Line")
            .with_key("OrderID")
            .with_key("LineNo")
            .with_property("Qty", PropertySchema::primitive());
        assert_eq!(
            canonical_key("Lines", &lines, &record(json!({"LineNo": 2, "OrderID": 7}))).unwrap(),
            "OrderID=7,LineNo=2"
        );
    }

    #[test]
    fn test_entity_path() {
        let people = EntitySetSchema::new("Demo.Person").with_key("ID");
        assert_eq!(
            entity_path("People", &people, &record(json!({"ID": "o'neil"}))).as_deref(),
            Some("People('o''neil')")
        );
        let lines = EntitySetSchema::new("Demo.Line")
            .with_key("OrderID")
            .with_key("LineNo");
        assert_eq!(
            entity_path("Lines", &lines, &record(json!({"OrderID": 7, "LineNo": 2}))).as_deref(),
            Some("Lines(OrderID=7,LineNo=2)")
        );
    }
}
