//! Property-based tests for JSON0 list and number operations

use proptest::prelude::*;
use serde_json::{json, Value};

use docsync::shared::ot::json0::{apply, parse, transform, Component};
use docsync::shared::ot::Side;

fn document() -> impl Strategy<Value = Value> {
    prop::collection::vec(0i64..100, 0..6).prop_map(|items| json!({"items": items, "count": 0}))
}

fn component() -> impl Strategy<Value = (u8, usize, i64)> {
    (0u8..3, 0usize..8, -50i64..50)
}

/// Build a single-component op that applies to `doc`
fn op(doc: &Value, (kind, index, value): (u8, usize, i64)) -> Vec<Component> {
    let items = doc["items"].as_array().cloned().unwrap_or_default();
    let raw = match kind {
        1 if !items.is_empty() => {
            let at = index % items.len();
            json!([{"p": ["items", at], "ld": items[at]}])
        }
        2 => json!([{"p": ["count"], "na": value}]),
        _ => json!([{"p": ["items", index % (items.len() + 1)], "li": value}]),
    };
    parse(raw).unwrap()
}

proptest! {
    #[test]
    fn test_concurrent_list_ops_converge(doc in document(), a in component(), b in component()) {
        let a = op(&doc, a);
        let b = op(&doc, b);

        let left = apply(&apply(&doc, &a).unwrap(), &transform(&b, &a, Side::Right).unwrap()).unwrap();
        let right = apply(&apply(&doc, &b).unwrap(), &transform(&a, &b, Side::Left).unwrap()).unwrap();
        prop_assert_eq!(left, right);
    }

    #[test]
    fn test_apply_leaves_input_untouched(doc in document(), a in component()) {
        let before = doc.clone();
        let a = op(&doc, a);
        let _ = apply(&doc, &a).unwrap();
        prop_assert_eq!(doc, before);
    }

    #[test]
    fn test_number_adds_commute(x in -1000i64..1000, y in -1000i64..1000) {
        let doc = json!({"count": 0});
        let a = parse(json!([{"p": ["count"], "na": x}])).unwrap();
        let b = parse(json!([{"p": ["count"], "na": y}])).unwrap();
        let result = apply(&apply(&doc, &a).unwrap(), &transform(&b, &a, Side::Right).unwrap()).unwrap();
        prop_assert_eq!(result["count"].as_i64(), Some(x + y));
    }
}
