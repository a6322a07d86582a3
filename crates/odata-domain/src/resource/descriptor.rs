//! The parsed shape of a request path.

use std::fmt;

use serde_json::Value;

use crate::error::{DomainError, DomainResult};
use crate::model::EntitySetSchema;

/// Key predicate of an addressed entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EntityKey {
    /// No key predicate (collection or singleton).
    #[default]
    None,
    /// `Set(value)`.
    Single(String),
    /// `Set(A=1,B='x')`, in the order written.
    Composite(Vec<(String, String)>),
}

impl EntityKey {
    pub fn is_none(&self) -> bool {
        matches!(self, EntityKey::None)
    }

    pub fn is_some(&self) -> bool {
        !self.is_none()
    }

    /// Returns the canonical storage key for this predicate.
    ///
    /// A single key maps to its unquoted value. Composite keys are rendered as
    /// `Name=value` pairs joined by `,` in the entity set's declared key order,
    /// so `Set(B='x',A=1)` and `Set(A=1,B='x')` address the same entity.
    pub fn canonical(&self, entity_set: &str, schema: &EntitySetSchema) -> DomainResult<String> {
        match self {
            EntityKey::None => Err(DomainError::InvalidKey {
                entity_set: entity_set.to_string(),
                reason: "no key predicate".to_string(),
            }),
            EntityKey::Single(value) => {
                if schema.key.len() > 1 {
                    return Err(DomainError::InvalidKey {
                        entity_set: entity_set.to_string(),
                        reason: format!(
                            "composite key ({}) requires named key values",
                            schema.key.join(",")
                        ),
                    });
                }
                Ok(value.clone())
            }
            EntityKey::Composite(pairs) => {
                if pairs.len() != schema.key.len() {
                    return Err(DomainError::InvalidKey {
                        entity_set: entity_set.to_string(),
                        reason: format!("expected key properties ({})", schema.key.join(",")),
                    });
                }
                let mut parts = Vec::with_capacity(schema.key.len());
                for name in &schema.key {
                    let value = pairs
                        .iter()
                        .find(|(candidate, _)| candidate == name)
                        .map(|(_, value)| value)
                        .ok_or_else(|| DomainError::InvalidKey {
                            entity_set: entity_set.to_string(),
                            reason: format!("missing key property '{name}'"),
                        })?;
                    if schema.key.len() == 1 {
                        return Ok(value.clone());
                    }
                    parts.push(format!("{name}={value}"));
                }
                Ok(parts.join(","))
            }
        }
    }
}

/// Formats a JSON key value as an OData key literal (`'text'` or `42`).
pub fn format_key_literal(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(format!("'{}'", s.replace('\'', "''"))),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parsed representation of a request path.
///
/// Created once per request by [`parse_path`](super::parse_path) and never
/// mutated afterwards; all fields are read through accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub(crate) entity_set: String,
    pub(crate) entity_key: EntityKey,
    pub(crate) navigation_property: Option<String>,
    pub(crate) property_segments: Vec<String>,
    pub(crate) is_count: bool,
    pub(crate) is_ref: bool,
    pub(crate) is_value: bool,
    pub(crate) type_cast: Option<String>,
}

impl ResourceDescriptor {
    pub(crate) fn new(entity_set: impl Into<String>) -> Self {
        Self {
            entity_set: entity_set.into(),
            entity_key: EntityKey::None,
            navigation_property: None,
            property_segments: Vec::new(),
            is_count: false,
            is_ref: false,
            is_value: false,
            type_cast: None,
        }
    }

    pub fn entity_set(&self) -> &str {
        &self.entity_set
    }

    pub fn entity_key(&self) -> &EntityKey {
        &self.entity_key
    }

    pub fn has_key(&self) -> bool {
        self.entity_key.is_some()
    }

    pub fn navigation_property(&self) -> Option<&str> {
        self.navigation_property.as_deref()
    }

    pub fn property_segments(&self) -> &[String] {
        &self.property_segments
    }

    pub fn is_count(&self) -> bool {
        self.is_count
    }

    pub fn is_ref(&self) -> bool {
        self.is_ref
    }

    pub fn is_value(&self) -> bool {
        self.is_value
    }

    pub fn type_cast(&self) -> Option<&str> {
        self.type_cast.as_deref()
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.entity_set)?;
        match &self.entity_key {
            EntityKey::None => {}
            EntityKey::Single(value) => write!(f, "({value})")?,
            EntityKey::Composite(pairs) => {
                let rendered: Vec<String> =
                    pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "({})", rendered.join(","))?;
            }
        }
        if let Some(cast) = &self.type_cast {
            write!(f, "/{cast}")?;
        }
        if let Some(nav) = &self.navigation_property {
            write!(f, "/{nav}")?;
        }
        for segment in &self.property_segments {
            write!(f, "/{segment}")?;
        }
        if self.is_count {
            write!(f, "/$count")?;
        }
        if self.is_ref {
            write!(f, "/$ref")?;
        }
        if self.is_value {
            write!(f, "/$value")?;
        }
        Ok(())
    }
}
