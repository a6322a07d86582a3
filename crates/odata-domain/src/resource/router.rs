//! Resource classification.
//!
//! [`classify`] turns a [`ResourceDescriptor`] into a [`Route`]: a closed
//! [`ResourceKind`] plus the validated type cast. The server matches on the
//! kind and the HTTP method to pick exactly one handler operation, so every
//! decision about what a path *means* lives here and can be tested without
//! any HTTP types.
//!
//! Decision order (each branch terminal):
//!
//! 1. reserved service paths (`$metadata`, `$batch`)
//! 2. `$count`
//! 3. `$ref`
//! 4. singletons
//! 5. collections (no key)
//! 6. entities and media values (key, no property)
//! 7. property access (key and property)

use super::descriptor::ResourceDescriptor;
use super::path::{RESERVED_BATCH, RESERVED_METADATA};
use crate::error::{DomainError, DomainResult};
use crate::model::{is_qualified_name, EntityModel, EntitySetSchema, PropertyKind};

/// Where a request is being routed from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteContext {
    /// True for sub-requests embedded in a `$batch` body.
    pub in_batch: bool,
}

impl RouteContext {
    pub fn top_level() -> Self {
        Self { in_batch: false }
    }

    pub fn batch() -> Self {
        Self { in_batch: true }
    }
}

/// What a `$count` segment counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountTarget {
    Collection,
    Navigation { property: String },
}

/// What a `$ref` segment references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefTarget {
    Entity,
    Collection,
    Navigation { property: String },
}

/// Access to a named property of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyAccess {
    /// Related entities reached through a navigation property.
    Navigation {
        property: String,
        target: String,
        collection: bool,
    },
    /// A named stream property.
    Stream { property: String },
    /// A primitive property, optionally as its raw `$value`.
    Structural { property: String, raw_value: bool },
    /// A complex property, optionally drilling into nested members.
    Complex {
        property: String,
        path: Vec<String>,
        raw_value: bool,
    },
}

impl PropertyAccess {
    pub fn property(&self) -> &str {
        match self {
            PropertyAccess::Navigation { property, .. }
            | PropertyAccess::Stream { property }
            | PropertyAccess::Structural { property, .. }
            | PropertyAccess::Complex { property, .. } => property,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PropertyAccess::Navigation { .. } => "navigation",
            PropertyAccess::Stream { .. } => "stream",
            PropertyAccess::Structural { .. } => "structural",
            PropertyAccess::Complex { .. } => "complex",
        }
    }
}

/// The closed set of resource kinds a path can address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    /// The service metadata document (top level only).
    Metadata,
    Collection,
    Entity,
    /// The media stream of a media entity (`Set(key)/$value`).
    MediaValue,
    Count(CountTarget),
    Ref(RefTarget),
    Singleton,
    /// A property reached through a singleton.
    SingletonProperty(PropertyAccess),
    /// A property reached through a keyed entity.
    Property(PropertyAccess),
}

impl ResourceKind {
    /// HTTP methods this kind of resource accepts.
    pub fn allowed_methods(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::Collection => &["GET", "POST"],
            ResourceKind::Entity => &["GET", "PATCH", "PUT", "DELETE"],
            ResourceKind::Singleton => &["GET", "PATCH", "PUT"],
            ResourceKind::Metadata
            | ResourceKind::MediaValue
            | ResourceKind::Count(_)
            | ResourceKind::Ref(_)
            | ResourceKind::SingletonProperty(_)
            | ResourceKind::Property(_) => &["GET"],
        }
    }

    /// Whether `method` (upper case) is accepted by this kind.
    pub fn allows(&self, method: &str) -> bool {
        self.allowed_methods().contains(&method)
    }

    /// Short name used in logs and metric labels.
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Metadata => "metadata",
            ResourceKind::Collection => "collection",
            ResourceKind::Entity => "entity",
            ResourceKind::MediaValue => "media_value",
            ResourceKind::Count(_) => "count",
            ResourceKind::Ref(_) => "ref",
            ResourceKind::Singleton => "singleton",
            ResourceKind::SingletonProperty(access) | ResourceKind::Property(access) => {
                access.label()
            }
        }
    }
}

/// A classified request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub kind: ResourceKind,
    /// Validated `Namespace.TypeName` cast, if the path carried one.
    pub type_cast: Option<String>,
}

/// Classifies a parsed path against the entity model.
pub fn classify(
    descriptor: &ResourceDescriptor,
    model: &EntityModel,
    context: &RouteContext,
) -> DomainResult<Route> {
    let type_cast = match descriptor.type_cast() {
        Some(cast) if !is_qualified_name(cast) => {
            return Err(DomainError::InvalidTypeCast {
                value: cast.to_string(),
            })
        }
        cast => cast.map(str::to_string),
    };

    let kind = classify_kind(descriptor, model, context)?;
    Ok(Route { kind, type_cast })
}

fn classify_kind(
    descriptor: &ResourceDescriptor,
    model: &EntityModel,
    context: &RouteContext,
) -> DomainResult<ResourceKind> {
    let set = descriptor.entity_set();

    // 1. reserved service paths
    if set == RESERVED_METADATA || set == RESERVED_BATCH {
        if context.in_batch || set == RESERVED_BATCH {
            return Err(DomainError::ReservedPath {
                segment: set.to_string(),
            });
        }
        return Ok(ResourceKind::Metadata);
    }

    let schema = model.require_entity_set(set)?;
    let has_key = descriptor.has_key();
    let navigation = descriptor.navigation_property();

    if (descriptor.is_count() || descriptor.is_ref()) && !descriptor.property_segments().is_empty()
    {
        return Err(DomainError::invalid_request(
            "$count and $ref cannot follow a property path",
        ));
    }

    // 2. $count
    if descriptor.is_count() {
        return match (has_key, navigation) {
            (true, Some(property)) => {
                require_collection_navigation(set, schema, property)?;
                Ok(ResourceKind::Count(CountTarget::Navigation {
                    property: property.to_string(),
                }))
            }
            (false, None) if !schema.singleton => Ok(ResourceKind::Count(CountTarget::Collection)),
            (true, None) => Err(DomainError::invalid_request(
                "$count is not defined on a single entity",
            )),
            _ => Err(DomainError::invalid_request(format!(
                "$count is not supported on '{descriptor}'"
            ))),
        };
    }

    // 3. $ref
    if descriptor.is_ref() {
        return match (has_key, navigation) {
            (true, Some(property)) => {
                let property_schema = require_property(set, schema, property)?;
                if !property_schema.is_navigation() {
                    return Err(DomainError::invalid_request(format!(
                        "$ref is only valid on navigation properties, '{property}' is not one"
                    )));
                }
                Ok(ResourceKind::Ref(RefTarget::Navigation {
                    property: property.to_string(),
                }))
            }
            (true, None) => Ok(ResourceKind::Ref(RefTarget::Entity)),
            (false, None) if !schema.singleton => Ok(ResourceKind::Ref(RefTarget::Collection)),
            _ => Err(DomainError::invalid_request(format!(
                "$ref is not supported on '{descriptor}'"
            ))),
        };
    }

    // 4. singletons
    if schema.singleton {
        return match navigation {
            None if descriptor.is_value() => Err(DomainError::invalid_request(
                "$value is not supported on a singleton",
            )),
            None => Ok(ResourceKind::Singleton),
            Some(property) => Ok(ResourceKind::SingletonProperty(resolve_property(
                set, schema, property, descriptor,
            )?)),
        };
    }

    // 5. collections
    if !has_key {
        if navigation.is_some() {
            return Err(DomainError::invalid_request(
                "properties can only be addressed on a single entity",
            ));
        }
        if descriptor.is_value() {
            return Err(DomainError::invalid_request(
                "$value is not supported on a collection",
            ));
        }
        return Ok(ResourceKind::Collection);
    }

    // 6. entity or media value
    let Some(property) = navigation else {
        if descriptor.is_value() {
            if !schema.media {
                return Err(DomainError::invalid_request(format!(
                    "entity set '{set}' does not contain media entities"
                )));
            }
            return Ok(ResourceKind::MediaValue);
        }
        return Ok(ResourceKind::Entity);
    };

    // 7. property access
    Ok(ResourceKind::Property(resolve_property(
        set, schema, property, descriptor,
    )?))
}

fn require_property<'a>(
    set: &str,
    schema: &'a EntitySetSchema,
    property: &str,
) -> DomainResult<&'a crate::model::PropertySchema> {
    schema
        .property(property)
        .ok_or_else(|| DomainError::PropertyNotFound {
            entity_set: set.to_string(),
            property: property.to_string(),
        })
}

fn require_collection_navigation(
    set: &str,
    schema: &EntitySetSchema,
    property: &str,
) -> DomainResult<()> {
    match &require_property(set, schema, property)?.kind {
        PropertyKind::Navigation {
            collection: true, ..
        } => Ok(()),
        _ => Err(DomainError::invalid_request(format!(
            "$count requires a collection-valued navigation property, '{property}' is not one"
        ))),
    }
}

fn resolve_property(
    set: &str,
    schema: &EntitySetSchema,
    property: &str,
    descriptor: &ResourceDescriptor,
) -> DomainResult<PropertyAccess> {
    let nested = descriptor.property_segments();
    let property_schema = require_property(set, schema, property)?;

    let no_nesting = |kind: &str| {
        if nested.is_empty() {
            Ok(())
        } else {
            Err(DomainError::invalid_request(format!(
                "{kind} property '{property}' has no members to address"
            )))
        }
    };

    match &property_schema.kind {
        PropertyKind::Navigation {
            target, collection, ..
        } => {
            if descriptor.is_value() {
                return Err(DomainError::invalid_request(format!(
                    "$value is not supported on navigation property '{property}'"
                )));
            }
            no_nesting("navigation")?;
            Ok(PropertyAccess::Navigation {
                property: property.to_string(),
                target: target.clone(),
                collection: *collection,
            })
        }
        PropertyKind::Stream => {
            no_nesting("stream")?;
            Ok(PropertyAccess::Stream {
                property: property.to_string(),
            })
        }
        PropertyKind::Primitive => {
            no_nesting("primitive")?;
            Ok(PropertyAccess::Structural {
                property: property.to_string(),
                raw_value: descriptor.is_value(),
            })
        }
        PropertyKind::Complex => Ok(PropertyAccess::Complex {
            property: property.to_string(),
            path: nested.to_vec(),
            raw_value: descriptor.is_value(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::parse_path;

    fn route(path: &str) -> DomainResult<Route> {
        let model = EntityModel::sample();
        let descriptor = parse_path(path, &model)?;
        classify(&descriptor, &model, &RouteContext::batch())
    }

    fn kind(path: &str) -> ResourceKind {
        route(path).unwrap().kind
    }

    #[test]
    fn test_reserved_paths_rejected_in_batch() {
        assert_eq!(
            route("$metadata").unwrap_err(),
            DomainError::ReservedPath {
                segment: "$metadata".to_string()
            }
        );
        assert!(matches!(
            route("$batch").unwrap_err(),
            DomainError::ReservedPath { .. }
        ));
    }

    #[test]
    fn test_metadata_reachable_at_top_level() {
        let model = EntityModel::sample();
        let descriptor = parse_path("$metadata", &model).unwrap();
        let route = classify(&descriptor, &model, &RouteContext::top_level()).unwrap();
        assert_eq!(route.kind, ResourceKind::Metadata);

        let descriptor = parse_path("$batch", &model).unwrap();
        assert!(classify(&descriptor, &model, &RouteContext::top_level()).is_err());
    }

    #[test]
    fn test_count_branches() {
        assert_eq!(kind("People/$count"), ResourceKind::Count(CountTarget::Collection));
        assert_eq!(
            kind("People(1)/Orders/$count"),
            ResourceKind::Count(CountTarget::Navigation {
                property: "Orders".to_string()
            })
        );
        assert!(matches!(
            route("People(1)/$count").unwrap_err(),
            DomainError::InvalidRequest { .. }
        ));
        assert!(route("Orders(1)/Customer/$count").is_err());
        assert!(route("Me/$count").is_err());
    }

    #[test]
    fn test_ref_branches() {
        assert_eq!(kind("People(1)/$ref"), ResourceKind::Ref(RefTarget::Entity));
        assert_eq!(kind("People/$ref"), ResourceKind::Ref(RefTarget::Collection));
        assert_eq!(
            kind("People(1)/Orders/$ref"),
            ResourceKind::Ref(RefTarget::Navigation {
                property: "Orders".to_string()
            })
        );
        // $ref on a stream property
        assert!(route("People(1)/Photo/$ref").is_err());
    }

    #[test]
    fn test_singleton_branches() {
        assert_eq!(kind("Me"), ResourceKind::Singleton);
        assert_eq!(
            kind("Me/Name"),
            ResourceKind::SingletonProperty(PropertyAccess::Structural {
                property: "Name".to_string(),
                raw_value: false
            })
        );
        assert!(route("Me/$value").is_err());
    }

    #[test]
    fn test_collection_branches() {
        assert_eq!(kind("People"), ResourceKind::Collection);
        assert!(route("People/$value").is_err());
        assert!(route("People/Orders").is_err());
    }

    #[test]
    fn test_entity_and_media_value() {
        assert_eq!(kind("People(1)"), ResourceKind::Entity);
        assert_eq!(kind("Documents(1)/$value"), ResourceKind::MediaValue);
        assert!(route("People(1)/$value").is_err());
    }

    #[test]
    fn test_property_branches() {
        assert_eq!(
            kind("People(1)/Orders"),
            ResourceKind::Property(PropertyAccess::Navigation {
                property: "Orders".to_string(),
                target: "Orders".to_string(),
                collection: true
            })
        );
        assert_eq!(
            kind("Orders(1)/Customer"),
            ResourceKind::Property(PropertyAccess::Navigation {
                property: "Customer".to_string(),
                target: "People".to_string(),
                collection: false
            })
        );
        assert_eq!(
            kind("People(1)/Photo"),
            ResourceKind::Property(PropertyAccess::Stream {
                property: "Photo".to_string()
            })
        );
        assert_eq!(
            kind("People(1)/Name/$value"),
            ResourceKind::Property(PropertyAccess::Structural {
                property: "Name".to_string(),
                raw_value: true
            })
        );
        assert_eq!(
            kind("People(1)/Address/City"),
            ResourceKind::Property(PropertyAccess::Complex {
                property: "Address".to_string(),
                path: vec!["City".to_string()],
                raw_value: false
            })
        );
    }

    #[test]
    fn test_invalid_property_combinations() {
        assert!(route("People(1)/Orders/$value").is_err());
        assert!(route("People(1)/Name/First").is_err());
        assert!(matches!(
            route("People(1)/Nickname").unwrap_err(),
            DomainError::PropertyNotFound { .. }
        ));
    }

    #[test]
    fn test_type_cast_does_not_change_branch() {
        let plain = route("People").unwrap();
        let cast = route("People/Demo.Person").unwrap();
        assert_eq!(plain.kind, cast.kind);
        assert_eq!(cast.type_cast.as_deref(), Some("Demo.Person"));
        assert!(plain.type_cast.is_none());
    }

    #[test]
    fn test_allowed_methods() {
        assert!(ResourceKind::Collection.allows("POST"));
        assert!(!ResourceKind::Collection.allows("DELETE"));
        assert!(ResourceKind::Entity.allows("PATCH"));
        assert!(!ResourceKind::Singleton.allows("DELETE"));
        assert_eq!(ResourceKind::Count(CountTarget::Collection).allowed_methods(), &["GET"]);
    }
}
