//! Property tests for the clone algorithm over generated value trees.

use proptest::prelude::*;
use statehub::{deep_clone, Pattern, Timestamp, Value};

/// Plain value trees: primitives, numeric sentinels, dates, patterns, and
/// nested objects/arrays. No opaque values, so both the serialize fast
/// path and the repair pass are exercised.
fn arb_plain_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        prop_oneof![
            (-1.0e9..1.0e9f64).prop_map(Value::from),
            Just(Value::Number(f64::NAN)),
            Just(Value::Number(f64::INFINITY)),
            Just(Value::Number(f64::NEG_INFINITY)),
        ],
        "[a-z]{0,8}".prop_map(Value::from),
        (0i64..4_000_000_000_000i64).prop_map(|ms| Value::Date(Timestamp(ms))),
        ("[a-z]{1,4}", "[gims]{0,2}")
            .prop_map(|(source, flags)| Value::Pattern(Pattern::new(source, flags))),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            proptest::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(Value::Object),
        ]
    })
}

proptest! {
    /// Cloning is total and preserves structural equality, including the
    /// numeric sentinels that do not survive a plain serialize round trip.
    #[test]
    fn clone_equals_original(value in arb_plain_value()) {
        let clone = deep_clone(&value);
        prop_assert_eq!(clone, value);
    }

    /// Mutating a clone never reaches back into the original tree.
    #[test]
    fn clone_is_isolated(map in proptest::collection::btree_map("[a-z]{1,6}", arb_plain_value(), 1..4)) {
        let original = Value::Object(map);
        let original_snapshot = original.clone();

        let mut clone = deep_clone(&original);
        if let Value::Object(m) = &mut clone {
            m.clear();
            m.insert("poisoned".to_string(), Value::from("poison"));
        }

        prop_assert_eq!(original, original_snapshot);
    }

    /// Cloning a clone is stable: a second clone equals the first.
    #[test]
    fn clone_is_idempotent(value in arb_plain_value()) {
        let once = deep_clone(&value);
        let twice = deep_clone(&once);
        prop_assert_eq!(twice, once);
    }
}

#[test]
fn clone_handles_mixed_collections() {
    let value = Value::map([
        (
            Value::from("dates"),
            Value::Array(vec![Value::Date(Timestamp(0)), Value::Date(Timestamp(1))]),
        ),
        (
            Value::from("tags"),
            Value::set([Value::from("a"), Value::from("b")]),
        ),
    ]);
    assert_eq!(deep_clone(&value), value);
}
