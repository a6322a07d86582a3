//! Property-based tests for the path parser.

use proptest::prelude::*;

use super::{classify, parse_path, EntityKey, RouteContext};
use crate::model::EntityModel;

/// Key text that survives percent-decoding and segment splitting.
fn key_text_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ,()=']{1,24}"
}

proptest! {
    #[test]
    fn test_quoted_keys_round_trip(key in key_text_strategy()) {
        let model = EntityModel::sample();
        let path = format!("People('{}')", key.replace('\'', "''"));
        let descriptor = parse_path(&path, &model);
        prop_assert!(descriptor.is_ok(), "failed for path: {}", path);
        let descriptor = descriptor.unwrap();
        prop_assert_eq!(descriptor.entity_key(), &EntityKey::Single(key));
    }

    #[test]
    fn test_numeric_keys_parse(id in any::<u32>()) {
        let model = EntityModel::sample();
        let descriptor = parse_path(&format!("Orders({id})"), &model).unwrap();
        prop_assert_eq!(descriptor.entity_key(), &EntityKey::Single(id.to_string()));
    }

    #[test]
    fn test_parser_never_panics(input in ".{0,48}") {
        let model = EntityModel::sample();
        if let Ok(descriptor) = parse_path(&input, &model) {
            // Anything the parser accepts can be classified or rejected cleanly.
            let _ = classify(&descriptor, &model, &RouteContext::batch());
        }
    }

    #[test]
    fn test_unknown_sets_are_not_found(name in "[A-Z][a-z]{3,12}") {
        let model = EntityModel::sample();
        prop_assume!(model.entity_set(&name).is_none());
        let err = parse_path(&name, &model).unwrap_err();
        let not_found = matches!(err, crate::DomainError::EntitySetNotFound { .. });
        prop_assert!(not_found, "unexpected error {:?}", err);
    }

    #[test]
    fn test_display_reproduces_simple_paths(
        id in 1u32..100_000,
        suffix in prop::sample::select(vec!["", "/Orders", "/Orders/$count", "/$ref", "/Name/$value"])
    ) {
        let model = EntityModel::sample();
        let path = format!("People({id}){suffix}");
        let descriptor = parse_path(&path, &model).unwrap();
        prop_assert_eq!(descriptor.to_string(), path);
    }
}
