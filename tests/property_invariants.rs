use proptest::prelude::*;
use serde_json::Value;

use twinlens::{
    config::{deep_merge, ConfigPatch},
    types::TransformKind,
};

fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        any::<bool>().prop_map(Value::from),
        (-1000i64..1000).prop_map(Value::from),
        "[a-z]{0,6}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
            prop::collection::btree_map("[a-z]{1,3}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn object_strategy() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-z]{1,3}", value_strategy(), 0..5)
        .prop_map(|m| Value::Object(m.into_iter().collect()))
}

proptest! {
    #[test]
    fn merge_is_idempotent(patch in object_strategy(), base in object_strategy()) {
        let once = deep_merge(&patch, &base);
        let twice = deep_merge(&patch, &once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn merged_keys_are_the_union(patch in object_strategy(), base in object_strategy()) {
        let merged = deep_merge(&patch, &base);
        let (Value::Object(p), Value::Object(b), Value::Object(m)) = (&patch, &base, &merged)
        else {
            return Err(TestCaseError::fail("object strategies must yield objects"));
        };
        for key in p.keys().chain(b.keys()) {
            prop_assert!(m.contains_key(key), "missing key {key}");
        }
        for key in m.keys() {
            prop_assert!(p.contains_key(key) || b.contains_key(key), "invented key {key}");
        }
    }

    #[test]
    fn later_scalar_leaves_win(patch in object_strategy(), base in object_strategy()) {
        let merged = deep_merge(&patch, &base);
        let (Value::Object(p), Value::Object(m)) = (&patch, &merged) else {
            return Err(TestCaseError::fail("object strategies must yield objects"));
        };
        // The strategy never produces nulls, so every non-object patch leaf
        // must overwrite whatever the base held.
        for (key, patch_val) in p {
            if !patch_val.is_object() {
                prop_assert_eq!(&m[key], patch_val);
            }
        }
    }

    #[test]
    fn patch_fold_order_respects_last_writer(a in "[a-z#0-9]{1,8}", b in "[a-z#0-9]{1,8}") {
        let first = ConfigPatch::field(TransformKind::Recolor, "to", a);
        let second = ConfigPatch::field(TransformKind::Recolor, "to", b.clone());
        let folded = first.merge(&second);
        prop_assert_eq!(folded.param_str(TransformKind::Recolor, "to"), Some(b.as_str()));
    }
}
