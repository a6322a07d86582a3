//! URL path parser producing [`ResourceDescriptor`]s.
//!
//! Accepted grammar (after the service root and query string are removed):
//!
//! ```text
//! path      := set [ "(" key ")" ] { "/" segment }
//! key       := literal | name "=" literal { "," name "=" literal }
//! literal   := "'" chars "'"  ('' escapes a quote) | unquoted token
//! segment   := "$count" | "$ref" | "$value" | Namespace.TypeName | property
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, none_of, satisfy},
    combinator::{all_consuming, map, opt, recognize},
    multi::{fold_many0, separated_list1},
    sequence::{delimited, pair, preceded},
    IResult,
};

use super::descriptor::{EntityKey, ResourceDescriptor};
use crate::error::{DomainError, DomainResult};
use crate::model::{is_qualified_name, EntityModel};

/// The service metadata document path.
pub const RESERVED_METADATA: &str = "$metadata";
/// The batch endpoint path.
pub const RESERVED_BATCH: &str = "$batch";

const COUNT: &str = "$count";
const REF: &str = "$ref";
const VALUE: &str = "$value";

/// Splits a request target into its service-relative path and query string.
///
/// Accepts absolute URLs (`http://host/svc/People?$top=1`), absolute paths
/// (`/svc/People`) and service-relative paths (`People`). `service_root` is
/// the path prefix the service is mounted at (`/` or `/svc`).
pub fn split_service_path<'a>(target: &'a str, service_root: &str) -> (&'a str, Option<&'a str>) {
    let (without_query, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    };

    // Drop scheme and authority from absolute URLs.
    let path = match without_query.find("://") {
        Some(scheme_end) => {
            let after_scheme = &without_query[scheme_end + 3..];
            after_scheme
                .find('/')
                .map_or("", |slash| &after_scheme[slash..])
        }
        None => without_query,
    };

    let root = service_root.trim_end_matches('/');
    let path = if !root.is_empty() && path.starts_with(root) {
        let rest = &path[root.len()..];
        if rest.is_empty() || rest.starts_with('/') {
            rest
        } else {
            path
        }
    } else {
        path
    };

    (path.trim_start_matches('/'), query)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_alphabetic() || c == '_' || c == '$'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))(input)
}

fn quoted_literal(input: &str) -> IResult<&str, String> {
    delimited(
        char('\''),
        fold_many0(
            alt((map(tag("''"), |_| '\''), none_of("'"))),
            String::new,
            |mut acc, c| {
                acc.push(c);
                acc
            },
        ),
        char('\''),
    )(input)
}

fn unquoted_literal(input: &str) -> IResult<&str, String> {
    map(
        take_while1(|c: char| !matches!(c, ',' | '(' | ')' | '=' | '\'')),
        |s: &str| s.to_string(),
    )(input)
}

fn literal(input: &str) -> IResult<&str, String> {
    alt((quoted_literal, unquoted_literal))(input)
}

fn named_value(input: &str) -> IResult<&str, (String, String)> {
    map(
        pair(identifier, preceded(char('='), literal)),
        |(name, value)| (name.to_string(), value),
    )(input)
}

fn key_predicate(input: &str) -> IResult<&str, EntityKey> {
    delimited(
        char('('),
        alt((
            map(separated_list1(char(','), named_value), EntityKey::Composite),
            map(literal, EntityKey::Single),
        )),
        char(')'),
    )(input)
}

fn first_segment(input: &str) -> IResult<&str, (&str, Option<EntityKey>)> {
    all_consuming(pair(identifier, opt(key_predicate)))(input)
}

/// Parses a service-relative path into a [`ResourceDescriptor`].
///
/// The reserved `$metadata` and `$batch` paths parse to a descriptor naming
/// the reserved segment; whether they are reachable is decided by the router.
pub fn parse_path(path: &str, model: &EntityModel) -> DomainResult<ResourceDescriptor> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(DomainError::invalid_path(path, "empty resource path"));
    }

    // Decode per segment so an encoded '/' inside a key stays in its segment.
    let decoded = trimmed
        .split('/')
        .map(|segment| {
            urlencoding::decode(segment)
                .map(|segment| segment.into_owned())
                .map_err(|_| {
                    DomainError::invalid_path(path, "path is not valid UTF-8 after decoding")
                })
        })
        .collect::<DomainResult<Vec<String>>>()?;

    let mut segments = decoded.iter().map(String::as_str);
    let head = segments.next().unwrap_or_default();

    let (name, key) = first_segment(head)
        .map(|(_, parsed)| parsed)
        .map_err(|_| DomainError::invalid_path(path, format!("malformed segment '{head}'")))?;

    let mut descriptor = ResourceDescriptor::new(name);

    if name == RESERVED_METADATA || name == RESERVED_BATCH {
        if key.is_some() || segments.next().is_some() {
            return Err(DomainError::invalid_path(
                path,
                format!("'{name}' cannot be followed by further segments"),
            ));
        }
        return Ok(descriptor);
    }

    let schema = model.require_entity_set(name)?;
    if let Some(key) = key {
        if schema.singleton {
            return Err(DomainError::InvalidKey {
                entity_set: name.to_string(),
                reason: "singletons are addressed without a key".to_string(),
            });
        }
        descriptor.entity_key = key;
    }

    let mut terminal: Option<&str> = None;
    for segment in segments {
        if segment.is_empty() {
            return Err(DomainError::invalid_path(path, "empty path segment"));
        }
        if let Some(previous) = terminal {
            return Err(DomainError::invalid_path(
                path,
                format!("'{previous}' must be the last segment"),
            ));
        }

        match segment {
            COUNT => descriptor.is_count = true,
            REF => descriptor.is_ref = true,
            VALUE => descriptor.is_value = true,
            _ if segment.contains('.') => {
                if !is_qualified_name(segment) {
                    return Err(DomainError::InvalidTypeCast {
                        value: segment.to_string(),
                    });
                }
                if descriptor.type_cast.is_some() {
                    return Err(DomainError::invalid_path(path, "only one type cast is allowed"));
                }
                descriptor.type_cast = Some(segment.to_string());
                continue;
            }
            _ => {
                if segment.contains('(') {
                    return Err(DomainError::invalid_path(
                        path,
                        format!("key predicates are not supported on '{segment}'"),
                    ));
                }
                let (rest, property) = identifier(segment).map_err(|_| {
                    DomainError::invalid_path(path, format!("malformed segment '{segment}'"))
                })?;
                if !rest.is_empty() || property.starts_with('$') {
                    return Err(DomainError::invalid_path(
                        path,
                        format!("unsupported segment '{segment}'"),
                    ));
                }
                if descriptor.navigation_property.is_none() {
                    descriptor.navigation_property = Some(property.to_string());
                } else {
                    descriptor.property_segments.push(property.to_string());
                }
                continue;
            }
        }
        terminal = Some(segment);
    }

    if [descriptor.is_count, descriptor.is_ref, descriptor.is_value]
        .iter()
        .filter(|flag| **flag)
        .count()
        > 1
    {
        return Err(DomainError::invalid_path(
            path,
            "$count, $ref and $value are mutually exclusive",
        ));
    }

    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> EntityModel {
        EntityModel::sample()
    }

    #[test]
    fn test_parse_collection() {
        let d = parse_path("People", &model()).unwrap();
        assert_eq!(d.entity_set(), "People");
        assert!(!d.has_key());
        assert!(d.navigation_property().is_none());
    }

    #[test]
    fn test_parse_single_key_forms() {
        let d = parse_path("People(1)", &model()).unwrap();
        assert_eq!(d.entity_key(), &EntityKey::Single("1".to_string()));

        let d = parse_path("People('o''neil')", &model()).unwrap();
        assert_eq!(d.entity_key(), &EntityKey::Single("o'neil".to_string()));

        let d = parse_path("People(ID=7)", &model()).unwrap();
        assert_eq!(
            d.entity_key(),
            &EntityKey::Composite(vec![("ID".to_string(), "7".to_string())])
        );
    }

    #[test]
    fn test_parse_percent_encoded_slash_stays_in_key() {
        let d = parse_path("People('a%2Fb')", &model()).unwrap();
        assert_eq!(d.entity_key(), &EntityKey::Single("a/b".to_string()));

        let d = parse_path("People(%27a%2Fb%27)/Orders", &model()).unwrap();
        assert_eq!(d.entity_key(), &EntityKey::Single("a/b".to_string()));
        assert_eq!(d.navigation_property(), Some("Orders"));

        assert!(parse_path("People(1)%2FOrders", &model()).is_err());
    }

    #[test]
    fn test_parse_quoted_key_with_reserved_characters() {
        let d = parse_path("People('a,b(c)')", &model()).unwrap();
        assert_eq!(d.entity_key(), &EntityKey::Single("a,b(c)".to_string()));
    }

    #[test]
    fn test_parse_percent_encoded_key() {
        let d = parse_path("People('Ada%20Lovelace')", &model()).unwrap();
        assert_eq!(d.entity_key(), &EntityKey::Single("Ada Lovelace".to_string()));
    }

    #[test]
    fn test_parse_navigation_and_flags() {
        let d = parse_path("People(1)/Orders/$count", &model()).unwrap();
        assert_eq!(d.navigation_property(), Some("Orders"));
        assert!(d.is_count());

        let d = parse_path("People(1)/Orders/$ref", &model()).unwrap();
        assert!(d.is_ref());

        let d = parse_path("Documents(3)/$value", &model()).unwrap();
        assert!(d.is_value());
        assert!(d.navigation_property().is_none());
    }

    #[test]
    fn test_parse_property_segments() {
        let d = parse_path("People(1)/Address/City", &model()).unwrap();
        assert_eq!(d.navigation_property(), Some("Address"));
        assert_eq!(d.property_segments(), &["City".to_string()]);
    }

    #[test]
    fn test_parse_type_cast() {
        let d = parse_path("People/Demo.Employee", &model()).unwrap();
        assert_eq!(d.type_cast(), Some("Demo.Employee"));
        assert!(d.navigation_property().is_none());

        let err = parse_path("People/Demo.", &model()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTypeCast { .. }));
    }

    #[test]
    fn test_parse_reserved_paths() {
        let d = parse_path("$metadata", &model()).unwrap();
        assert_eq!(d.entity_set(), RESERVED_METADATA);
        let d = parse_path("$batch", &model()).unwrap();
        assert_eq!(d.entity_set(), RESERVED_BATCH);
        assert!(parse_path("$batch/People", &model()).is_err());
    }

    #[test]
    fn test_parse_unknown_entity_set() {
        let err = parse_path("Planets", &model()).unwrap_err();
        assert_eq!(
            err,
            DomainError::EntitySetNotFound {
                name: "Planets".to_string()
            }
        );
    }

    #[test]
    fn test_parse_rejects_malformed_paths() {
        let m = model();
        assert!(parse_path("", &m).is_err());
        assert!(parse_path("People(", &m).is_err());
        assert!(parse_path("People()", &m).is_err());
        assert!(parse_path("People(1)//Orders", &m).is_err());
        assert!(parse_path("People/$count/$ref", &m).is_err());
        assert!(parse_path("People(1)/Orders(2)", &m).is_err());
        assert!(parse_path("Me(1)", &m).is_err());
    }

    #[test]
    fn test_split_service_path() {
        assert_eq!(split_service_path("People", "/"), ("People", None));
        assert_eq!(
            split_service_path("/odata/People(1)?$select=Name", "/odata"),
            ("People(1)", Some("$select=Name"))
        );
        assert_eq!(
            split_service_path("http://localhost:8080/odata/People", "/odata"),
            ("People", None)
        );
        assert_eq!(split_service_path("/odataX/People", "/odata"), ("odataX/People", None));
        assert_eq!(split_service_path("https://host", "/"), ("", None));
    }

    #[test]
    fn test_descriptor_display_round_trips_shape() {
        let d = parse_path("People(1)/Orders/$count", &model()).unwrap();
        assert_eq!(d.to_string(), "People(1)/Orders/$count");
    }
}
