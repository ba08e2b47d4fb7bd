//! Property-based tests for path template matching

use proptest::prelude::*;
use serde_json::{json, Value};

#[cfg(feature = "ssr")]
use docsync::backend::access::DomainClassifier;
#[cfg(feature = "ssr")]
use docsync::shared::config::DomainConfig;
use docsync::shared::path_template::{match_template, PathKey, PathTemplate};

fn key() -> impl Strategy<Value = PathKey> {
    prop_oneof![
        "[a-z]{1,6}".prop_map(PathKey::Key),
        (0usize..20).prop_map(PathKey::Index),
    ]
}

fn path() -> impl Strategy<Value = Vec<PathKey>> {
    prop::collection::vec(key(), 0..6)
}

/// Literal template spelling out `path`
fn literal(path: &[PathKey]) -> Value {
    Value::Array(
        path.iter()
            .map(|key| match key {
                PathKey::Key(k) => json!(k),
                PathKey::Index(i) => json!(i),
            })
            .collect(),
    )
}

proptest! {
    #[test]
    fn test_literal_template_matches_its_own_path(path in path()) {
        let exact = PathTemplate::from_json(literal(&path), false).unwrap();
        prop_assert!(exact.matches(&path));
    }

    #[test]
    fn test_inheriting_template_matches_descendants(path in path(), suffix in path()) {
        let inherit = PathTemplate::from_json(literal(&path), true).unwrap();
        let exact = PathTemplate::from_json(literal(&path), false).unwrap();
        let mut deeper = path.clone();
        deeper.extend(suffix.iter().cloned());

        prop_assert!(inherit.matches(&deeper));
        prop_assert_eq!(exact.matches(&deeper), suffix.is_empty());
    }

    #[test]
    fn test_wildcards_match_any_path_of_their_length(path in path()) {
        let stars = Value::Array(path.iter().map(|_| json!("*")).collect());
        let template = PathTemplate::from_json(stars, false).unwrap();
        prop_assert!(template.matches(&path));
    }

    #[test]
    fn test_first_compatible_template_wins(path in path()) {
        let templates = vec![
            PathTemplate::from_json(json!(["no-such-key-anywhere"]), true).unwrap(),
            PathTemplate::from_json(literal(&path), false).unwrap(),
            PathTemplate::from_json(json!([]), true).unwrap(),
        ];
        prop_assert_eq!(match_template(&templates, &path), Some(1));
    }

    #[test]
    fn test_inheriting_prefix_listed_first_still_matches_first(path in path(), extra in key()) {
        let mut full = path.clone();
        full.push(extra);
        let templates = vec![
            PathTemplate::from_json(literal(&path), true).unwrap(),
            PathTemplate::from_json(literal(&full), false).unwrap(),
        ];
        prop_assert_eq!(match_template(&templates, &full), Some(0));
    }
}

#[cfg(feature = "ssr")]
proptest! {
    #[test]
    fn test_classifier_prefers_exact_template_of_equal_length(path in path(), extra in key()) {
        let mut full = path.clone();
        full.push(extra);
        let classifier = DomainClassifier::new(&[
            DomainConfig::new(100, PathTemplate::from_json(literal(&path), true).unwrap()),
            DomainConfig::new(200, PathTemplate::from_json(literal(&full), false).unwrap()),
        ]);

        prop_assert_eq!(classifier.classify(&full).map(|d| d.domain), Some(200));
        prop_assert_eq!(classifier.classify(&path).map(|d| d.domain), Some(100));
    }
}
