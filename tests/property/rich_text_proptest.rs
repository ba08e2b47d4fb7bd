//! Property-based tests for rich-text deltas

use proptest::prelude::*;

use docsync::shared::ot::rich_text::{transform, Delta};
use docsync::shared::ot::Side;

type Step = (u8, usize, String);

fn steps() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec((0u8..3, 0usize..8, "[A-Z]{1,3}"), 0..6)
}

/// Build an edit that fits a document of `len` characters
fn edit(len: usize, steps: &[Step]) -> Delta {
    let mut delta = Delta::new();
    let mut remaining = len;
    for (kind, amount, text) in steps {
        match kind {
            0 => {
                let n = amount % (remaining + 1);
                delta = delta.retain(n);
                remaining -= n;
            }
            1 => delta = delta.insert(text.clone()),
            _ => {
                let n = amount % (remaining + 1);
                delta = delta.delete(n);
                remaining -= n;
            }
        }
    }
    delta
}

proptest! {
    #[test]
    fn test_concurrent_edits_converge(doc in "[a-z]{0,12}", a in steps(), b in steps()) {
        let doc = Delta::new().insert(doc.clone());
        let a = edit(doc.len(), &a);
        let b = edit(doc.len(), &b);

        let left = doc.apply(&a).unwrap().apply(&transform(&b, &a, Side::Right)).unwrap();
        let right = doc.apply(&b).unwrap().apply(&transform(&a, &b, Side::Left)).unwrap();
        prop_assert_eq!(left.text(), right.text());
    }

    #[test]
    fn test_compose_matches_sequential_apply(doc in "[a-z]{0,12}", a in steps(), b in steps()) {
        let doc = Delta::new().insert(doc.clone());
        let a = edit(doc.len(), &a);
        let after_a = doc.apply(&a).unwrap();
        let b = edit(after_a.len(), &b);

        let sequential = after_a.apply(&b).unwrap();
        let composed = doc.apply(&a.compose(&b)).unwrap();
        prop_assert_eq!(sequential.text(), composed.text());
    }

    #[test]
    fn test_transform_against_noop_is_identity(doc in "[a-z]{0,12}", a in steps()) {
        let doc = Delta::new().insert(doc.clone());
        let a = edit(doc.len(), &a);
        let transformed = transform(&a, &Delta::new(), Side::Left);
        prop_assert_eq!(doc.apply(&transformed).unwrap().text(), doc.apply(&a).unwrap().text());
    }
}
