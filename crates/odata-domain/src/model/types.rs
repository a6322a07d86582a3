//! Core type definitions for the entity model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// What kind of value a property holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyKind {
    /// A primitive value (string, number, boolean, ...).
    Primitive,
    /// A structured value without identity.
    Complex,
    /// A named stream (binary content).
    Stream,
    /// A relationship to entities of another set.
    ///
    /// For a single-valued navigation `foreign_key` is a property of the
    /// source entity holding the target's key. For a collection-valued
    /// navigation it is a property of each target entity holding the
    /// source's key.
    Navigation {
        target: String,
        #[serde(default)]
        collection: bool,
        foreign_key: String,
    },
}

/// Schema of a single property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(flatten)]
    pub kind: PropertyKind,
    /// Whether create/replace payloads must carry a non-null value.
    #[serde(default)]
    pub required: bool,
}

impl PropertySchema {
    pub fn primitive() -> Self {
        Self {
            kind: PropertyKind::Primitive,
            required: false,
        }
    }

    pub fn required() -> Self {
        Self {
            kind: PropertyKind::Primitive,
            required: true,
        }
    }

    pub fn complex() -> Self {
        Self {
            kind: PropertyKind::Complex,
            required: false,
        }
    }

    pub fn stream() -> Self {
        Self {
            kind: PropertyKind::Stream,
            required: false,
        }
    }

    pub fn navigation(target: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            kind: PropertyKind::Navigation {
                target: target.into(),
                collection: false,
                foreign_key: foreign_key.into(),
            },
            required: false,
        }
    }

    pub fn navigation_collection(
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            kind: PropertyKind::Navigation {
                target: target.into(),
                collection: true,
                foreign_key: foreign_key.into(),
            },
            required: false,
        }
    }

    pub fn is_navigation(&self) -> bool {
        matches!(self.kind, PropertyKind::Navigation { .. })
    }
}

/// Schema of an entity set or singleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySetSchema {
    /// Namespace-qualified entity type name (e.g. `Demo.Person`).
    pub entity_type: String,
    /// Key property names, in key order. Empty for singletons.
    #[serde(default)]
    pub key: Vec<String>,
    /// Whether this is a singleton (addressed without a key).
    #[serde(default)]
    pub singleton: bool,
    /// Whether entities carry a media stream (`$value`).
    #[serde(default)]
    pub media: bool,
    /// Declared properties by name.
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
}

impl EntitySetSchema {
    /// Creates an entity set of the given entity type.
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            key: Vec::new(),
            singleton: false,
            media: false,
            properties: BTreeMap::new(),
        }
    }

    /// Creates a singleton of the given entity type.
    pub fn singleton(entity_type: impl Into<String>) -> Self {
        Self {
            singleton: true,
            ..Self::new(entity_type)
        }
    }

    /// Adds a key property (declared as a required primitive).
    pub fn with_key(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.properties
            .insert(name.clone(), PropertySchema::required());
        self.key.push(name);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    pub fn with_media(mut self) -> Self {
        self.media = true;
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertySchema> {
        self.properties.get(name)
    }

    /// Names of properties that must be present and non-null on create/replace.
    pub fn required_properties(&self) -> impl Iterator<Item = &str> {
        self.properties
            .iter()
            .filter(|(_, schema)| schema.required)
            .map(|(name, _)| name.as_str())
    }
}

/// The service's entity model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityModel {
    /// Schema namespace (e.g. `Demo`).
    pub namespace: String,
    /// Entity sets and singletons by name.
    #[serde(default)]
    pub entity_sets: BTreeMap<String, EntitySetSchema>,
}

impl EntityModel {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            entity_sets: BTreeMap::new(),
        }
    }

    pub fn with_entity_set(mut self, name: impl Into<String>, schema: EntitySetSchema) -> Self {
        self.entity_sets.insert(name.into(), schema);
        self
    }

    pub fn entity_set(&self, name: &str) -> Option<&EntitySetSchema> {
        self.entity_sets.get(name)
    }

    /// Looks up an entity set, failing with `EntitySetNotFound`.
    pub fn require_entity_set(&self, name: &str) -> DomainResult<&EntitySetSchema> {
        self.entity_set(name)
            .ok_or_else(|| DomainError::EntitySetNotFound {
                name: name.to_string(),
            })
    }

    /// Checks the model for dangling references and missing keys.
    pub fn validate(&self) -> DomainResult<()> {
        for (name, set) in &self.entity_sets {
            if name.is_empty() || name.starts_with('$') {
                return Err(invalid_model(format!("invalid entity set name '{name}'")));
            }
            if !is_qualified_name(&set.entity_type) {
                return Err(invalid_model(format!(
                    "entity set '{name}' has unqualified entity type '{}'",
                    set.entity_type
                )));
            }
            if set.singleton && !set.key.is_empty() {
                return Err(invalid_model(format!("singleton '{name}' cannot declare a key")));
            }
            if !set.singleton && set.key.is_empty() {
                return Err(invalid_model(format!("entity set '{name}' has no key")));
            }
            for key in &set.key {
                match set.properties.get(key).map(|p| &p.kind) {
                    Some(PropertyKind::Primitive) => {}
                    _ => {
                        return Err(invalid_model(format!(
                            "key property '{key}' of '{name}' must be a declared primitive"
                        )))
                    }
                }
            }
            for (property, schema) in &set.properties {
                if let PropertyKind::Navigation {
                    target,
                    foreign_key,
                    ..
                } = &schema.kind
                {
                    let target_set = self.entity_sets.get(target).ok_or_else(|| {
                        invalid_model(format!(
                            "navigation '{name}/{property}' targets unknown set '{target}'"
                        ))
                    })?;
                    if foreign_key.is_empty() {
                        return Err(invalid_model(format!(
                            "navigation '{name}/{property}' has an empty foreign key"
                        )));
                    }
                    if target_set.singleton {
                        return Err(invalid_model(format!(
                            "navigation '{name}/{property}' cannot target singleton '{target}'"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// A small sample model (people and their orders, plus a `Me` singleton),
    /// used when no model file is configured.
    pub fn sample() -> Self {
        let ns = "Demo";
        EntityModel::new(ns)
            .with_entity_set(
                "People",
                EntitySetSchema::new(format!("{ns}.Person"))
                    .with_key("ID")
                    .with_property("Name", PropertySchema::required())
                    .with_property("Email", PropertySchema::primitive())
                    .with_property("Address", PropertySchema::complex())
                    .with_property("Photo", PropertySchema::stream())
                    .with_property(
                        "Orders",
                        PropertySchema::navigation_collection("Orders", "PersonID"),
                    ),
            )
            .with_entity_set(
                "Orders",
                EntitySetSchema::new(format!("{ns}.Order"))
                    .with_key("ID")
                    .with_property("PersonID", PropertySchema::required())
                    .with_property("Total", PropertySchema::primitive())
                    .with_property("Customer", PropertySchema::navigation("People", "PersonID")),
            )
            .with_entity_set(
                "Documents",
                EntitySetSchema::new(format!("{ns}.Document"))
                    .with_key("ID")
                    .with_property("Title", PropertySchema::required())
                    .with_media(),
            )
            .with_entity_set(
                "Me",
                EntitySetSchema::singleton(format!("{ns}.Person"))
                    .with_property("Name", PropertySchema::primitive())
                    .with_property("Address", PropertySchema::complex()),
            )
    }
}

fn invalid_model(message: String) -> DomainError {
    DomainError::InvalidModel { message }
}

/// Returns true if `value` is a namespace-qualified name (`Namespace.TypeName`).
///
/// Every dot-separated part must be a non-empty identifier.
pub fn is_qualified_name(value: &str) -> bool {
    let mut parts = 0;
    for part in value.split('.') {
        let mut chars = part.chars();
        match chars.next() {
            Some(c) if c.is_alphabetic() || c == '_' => {}
            _ => return false,
        }
        if !chars.all(|c| c.is_alphanumeric() || c == '_') {
            return false;
        }
        parts += 1;
    }
    parts >= 2
}
