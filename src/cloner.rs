//! Deep cloning of store values.
//!
//! `deep_clone` is total: every input produces a usable result, and no
//! failure along the way reaches the caller. Plain containers take a fast
//! serialize round trip followed by a type-repair pass; containers that
//! reach an opaque value through plain objects or arrays are walked
//! element by element; opaque values go through an ordered capability
//! chain that ends in reference passthrough.

use crate::value::{OpaqueValue, Pattern, StateMap, Timestamp, Value};
use std::sync::Arc;

/// Clone a value such that the result shares no mutable substructure with
/// the original, except when the opaque fallback chain is exhausted and the
/// original reference is returned instead.
pub fn deep_clone(value: &Value) -> Value {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => value.clone(),
        Value::Date(ts) => Value::Date(Timestamp(ts.0)),
        Value::Pattern(p) => Value::Pattern(Pattern::new(p.source(), p.flags())),
        // Keys are assumed immutable; only values are deep-cloned.
        Value::Map(entries) => Value::Map(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), deep_clone(v)))
                .collect(),
        ),
        Value::Set(items) => Value::Set(items.iter().map(deep_clone).collect()),
        Value::Opaque(original) => clone_opaque(original),
        Value::Object(_) | Value::Array(_) => {
            if contains_opaque(value) {
                clone_structural(value)
            } else {
                round_trip(value)
            }
        }
    }
}

/// Clone every top-level slot of a state map.
pub fn deep_clone_map(map: &StateMap) -> StateMap {
    map.iter()
        .map(|(k, v)| (k.clone(), deep_clone(v)))
        .collect()
}

/// Ordered capability chain for opaque values; the final strategy always
/// succeeds, so cloning never fails.
fn clone_opaque(original: &Arc<dyn OpaqueValue>) -> Value {
    if let Some(copy) = original.copy() {
        return Value::Opaque(copy);
    }
    if let Some(copy) = original.construct_from() {
        return Value::Opaque(copy);
    }
    if let Some(fields) = original.fields() {
        let cloned = deep_clone_map(&fields);
        if let Some(copy) = original.from_fields(cloned) {
            return Value::Opaque(copy);
        }
    }
    // A shared reference beats an unrecoverable failure.
    Value::Opaque(Arc::clone(original))
}

/// Whether an opaque value is reachable through plain objects and arrays.
/// Maps, sets, dates and patterns have their own clone rules and are not
/// descended into.
fn contains_opaque(value: &Value) -> bool {
    match value {
        Value::Opaque(_) => true,
        Value::Object(map) => map.values().any(contains_opaque),
        Value::Array(items) => items.iter().any(contains_opaque),
        _ => false,
    }
}

/// Element-wise clone for containers that hold opaque values.
fn clone_structural(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(deep_clone_map(map)),
        Value::Array(items) => Value::Array(items.iter().map(deep_clone).collect()),
        _ => deep_clone(value),
    }
}

/// Fast path for opaque-free containers: serialize to text, parse back,
/// then repair the types the round trip cannot represent.
fn round_trip(value: &Value) -> Value {
    let text = match serde_json::to_string(&value.to_json()) {
        Ok(text) => text,
        Err(_) => return clone_structural(value),
    };
    let parsed: serde_json::Value = match serde_json::from_str(&text) {
        Ok(parsed) => parsed,
        Err(_) => return clone_structural(value),
    };
    let mut copy = Value::from_json(parsed);
    repair_types(value, &mut copy);
    copy
}

/// Walk original and reconstructed copy in lock step, restoring dates,
/// patterns, maps, sets, and the non-finite numeric sentinels.
fn repair_types(original: &Value, copy: &mut Value) {
    match (original, copy) {
        (Value::Object(original), Value::Object(copy)) => {
            for (key, original_child) in original {
                if let Some(copy_child) = copy.get_mut(key) {
                    repair_child(original_child, copy_child);
                }
            }
        }
        (Value::Array(original), Value::Array(copy)) => {
            for (original_child, copy_child) in original.iter().zip(copy.iter_mut()) {
                repair_child(original_child, copy_child);
            }
        }
        _ => {}
    }
}

fn repair_child(original: &Value, copy: &mut Value) {
    match original {
        Value::Date(_) | Value::Pattern(_) | Value::Map(_) | Value::Set(_) => {
            *copy = deep_clone(original);
        }
        Value::Number(n) if !n.is_finite() => {
            *copy = Value::Number(*n);
        }
        Value::Object(_) | Value::Array(_) => {
            if matches!(copy, Value::Object(_) | Value::Array(_)) {
                repair_types(original, copy);
            } else {
                // The round trip collapsed this child; re-clone it properly
                // instead of recursing into a non-container.
                *copy = deep_clone(original);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn obj(entries: &[(&str, Value)]) -> Value {
        Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    /// Opaque with a self-copy capability and an interior buffer, so tests
    /// can observe whether a clone shares storage with the original.
    #[derive(Debug)]
    struct Buffer {
        bytes: Mutex<Vec<u8>>,
    }

    impl Buffer {
        fn new(bytes: Vec<u8>) -> Self {
            Self {
                bytes: Mutex::new(bytes),
            }
        }
    }

    impl OpaqueValue for Buffer {
        fn kind(&self) -> &'static str {
            "buffer"
        }

        fn copy(&self) -> Option<Arc<dyn OpaqueValue>> {
            Some(Arc::new(Buffer::new(self.bytes.lock().clone())))
        }

        fn to_json(&self) -> serde_json::Value {
            serde_json::Value::Array(
                self.bytes.lock().iter().map(|b| (*b).into()).collect(),
            )
        }
    }

    /// Opaque exposing only the copy-constructor strategy.
    #[derive(Debug)]
    struct Token {
        id: u64,
        constructed: Arc<AtomicUsize>,
    }

    impl OpaqueValue for Token {
        fn kind(&self) -> &'static str {
            "token"
        }

        fn construct_from(&self) -> Option<Arc<dyn OpaqueValue>> {
            self.constructed.fetch_add(1, Ordering::SeqCst);
            Some(Arc::new(Token {
                id: self.id,
                constructed: Arc::clone(&self.constructed),
            }))
        }

        fn to_json(&self) -> serde_json::Value {
            self.id.into()
        }
    }

    /// Opaque exposing only the field walk.
    #[derive(Debug)]
    struct Record {
        fields: StateMap,
    }

    impl OpaqueValue for Record {
        fn kind(&self) -> &'static str {
            "record"
        }

        fn fields(&self) -> Option<StateMap> {
            Some(self.fields.clone())
        }

        fn from_fields(&self, fields: StateMap) -> Option<Arc<dyn OpaqueValue>> {
            Some(Arc::new(Record { fields }))
        }

        fn to_json(&self) -> serde_json::Value {
            Value::Object(self.fields.clone()).to_json()
        }
    }

    /// Opaque with no usable strategy; serializes to a bare primitive,
    /// the shape that historically crashed serialize-then-reconstruct.
    #[derive(Debug)]
    struct Sealed(u32);

    impl OpaqueValue for Sealed {
        fn kind(&self) -> &'static str {
            "sealed"
        }

        fn to_json(&self) -> serde_json::Value {
            self.0.into()
        }
    }

    #[test]
    fn test_primitives_pass_through() {
        assert_eq!(deep_clone(&Value::Null), Value::Null);
        assert_eq!(deep_clone(&Value::from(true)), Value::from(true));
        assert_eq!(deep_clone(&Value::from("abc")), Value::from("abc"));
        assert_eq!(deep_clone(&Value::from(2.5)), Value::from(2.5));
    }

    #[test]
    fn test_sentinel_numbers_survive() {
        assert_eq!(deep_clone(&Value::Number(f64::NAN)), Value::Number(f64::NAN));
        assert_eq!(
            deep_clone(&Value::Number(f64::INFINITY)),
            Value::Number(f64::INFINITY)
        );
        assert_eq!(
            deep_clone(&Value::Number(f64::NEG_INFINITY)),
            Value::Number(f64::NEG_INFINITY)
        );
    }

    #[test]
    fn test_sentinels_repaired_inside_containers() {
        let original = obj(&[
            ("nan", Value::Number(f64::NAN)),
            ("inf", Value::Number(f64::INFINITY)),
            ("nested", Value::Array(vec![Value::Number(f64::NEG_INFINITY)])),
        ]);
        let clone = deep_clone(&original);
        assert_eq!(clone, original);
    }

    #[test]
    fn test_date_preserves_timestamp() {
        let original = Value::Date(Timestamp(1700000000123));
        assert_eq!(deep_clone(&original), original);
    }

    #[test]
    fn test_pattern_preserves_source_and_flags() {
        let original = Value::Pattern(Pattern::new("[a-z]+", "gi"));
        let clone = deep_clone(&original);
        match clone {
            Value::Pattern(p) => {
                assert_eq!(p.source(), "[a-z]+");
                assert_eq!(p.flags(), "gi");
            }
            other => panic!("expected pattern, got {:?}", other),
        }
    }

    #[test]
    fn test_dates_and_patterns_repaired_inside_containers() {
        let original = obj(&[
            ("when", Value::Date(Timestamp(42))),
            ("expr", Value::Pattern(Pattern::new("x?", ""))),
        ]);
        let clone = deep_clone(&original);
        assert_eq!(clone.get("when"), Some(&Value::Date(Timestamp(42))));
        assert_eq!(
            clone.get("expr"),
            Some(&Value::Pattern(Pattern::new("x?", "")))
        );
    }

    #[test]
    fn test_map_clone_has_equal_entries() {
        let original = Value::map([
            (Value::from("k1"), Value::from(22)),
            (Value::from("k2"), obj(&[("nested", Value::from(1))])),
        ]);
        let clone = deep_clone(&original);
        assert_eq!(clone, original);
    }

    #[test]
    fn test_map_inside_object_is_repaired() {
        let original = obj(&[(
            "lookup",
            Value::map([(Value::from("k"), Value::from(1))]),
        )]);
        let clone = deep_clone(&original);
        match clone.get("lookup") {
            Some(Value::Map(entries)) => assert_eq!(entries.len(), 1),
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[test]
    fn test_set_inside_object_is_repaired() {
        let original = obj(&[("tags", Value::set([Value::from("a"), Value::from("b")]))]);
        let clone = deep_clone(&original);
        match clone.get("tags") {
            Some(Value::Set(items)) => assert_eq!(items.len(), 2),
            other => panic!("expected set, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_containers_clone_to_new_instances() {
        assert_eq!(deep_clone(&Value::Object(StateMap::new())), Value::Object(StateMap::new()));
        assert_eq!(deep_clone(&Value::Array(vec![])), Value::Array(vec![]));
        assert_eq!(deep_clone(&Value::Map(vec![])), Value::Map(vec![]));
        assert_eq!(deep_clone(&Value::Set(vec![])), Value::Set(vec![]));
    }

    #[test]
    fn test_clone_isolation_for_plain_trees() {
        let original = obj(&[(
            "user",
            obj(&[("address", obj(&[("city", Value::from("Phoenix"))]))]),
        )]);
        let mut clone = deep_clone(&original);
        if let Value::Object(map) = &mut clone {
            map.insert("user".to_string(), Value::from("overwritten"));
        }
        assert_eq!(
            original.get("user").and_then(|u| u.get("address")).is_some(),
            true
        );
    }

    #[test]
    fn test_opaque_copy_strategy_yields_independent_value() {
        let original = Value::opaque(Buffer::new(vec![1, 2, 3]));
        let clone = deep_clone(&original);

        let (a, b) = match (&original, &clone) {
            (Value::Opaque(a), Value::Opaque(b)) => (a, b),
            _ => panic!("expected opaque values"),
        };
        assert!(!Arc::ptr_eq(a, b));
        assert_eq!(clone, original);
    }

    #[test]
    fn test_opaque_construct_from_strategy() {
        let constructed = Arc::new(AtomicUsize::new(0));
        let original = Value::opaque(Token {
            id: 7,
            constructed: Arc::clone(&constructed),
        });

        let clone = deep_clone(&original);
        assert_eq!(constructed.load(Ordering::SeqCst), 1);
        assert_eq!(clone, original);
    }

    #[test]
    fn test_opaque_field_walk_strategy() {
        let mut fields = StateMap::new();
        fields.insert("inner".to_string(), obj(&[("n", Value::from(5))]));
        let original = Value::opaque(Record { fields });

        let clone = deep_clone(&original);
        let (a, b) = match (&original, &clone) {
            (Value::Opaque(a), Value::Opaque(b)) => (a, b),
            _ => panic!("expected opaque values"),
        };
        assert!(!Arc::ptr_eq(a, b));
        assert_eq!(b.to_json(), a.to_json());
    }

    #[test]
    fn test_opaque_fallback_returns_shared_reference() {
        let original = Value::opaque(Sealed(9));
        let clone = deep_clone(&original);
        match (&original, &clone) {
            (Value::Opaque(a), Value::Opaque(b)) => assert!(Arc::ptr_eq(a, b)),
            _ => panic!("expected opaque values"),
        }
    }

    #[test]
    fn test_container_holding_opaque_takes_structural_path() {
        // The buffer serializes to a JSON array; if the round trip ran, the
        // clone would come back as a plain array instead of an opaque value.
        let original = obj(&[
            ("buf", Value::opaque(Buffer::new(vec![9, 8]))),
            ("label", Value::from("x")),
        ]);
        let clone = deep_clone(&original);
        match clone.get("buf") {
            Some(Value::Opaque(o)) => assert_eq!(o.kind(), "buffer"),
            other => panic!("expected opaque, got {:?}", other),
        }
        assert_eq!(clone.get("label"), Some(&Value::from("x")));
    }

    #[test]
    fn test_opaque_inside_nested_array_detected() {
        let original = obj(&[(
            "outer",
            Value::Array(vec![obj(&[("buf", Value::opaque(Sealed(1)))])]),
        )]);
        let clone = deep_clone(&original);
        let nested = clone
            .get("outer")
            .and_then(Value::as_array)
            .and_then(|a| a.first())
            .and_then(|o| o.get("buf"));
        assert!(matches!(nested, Some(Value::Opaque(_))));
    }

    #[test]
    fn test_shared_buffer_mutation_visible_only_through_fallback() {
        // copy() succeeds for Buffer, so the clone owns its own bytes.
        let buffer = Arc::new(Buffer::new(vec![1]));
        let original = Value::Opaque(buffer.clone() as Arc<dyn OpaqueValue>);
        let clone = deep_clone(&original);

        buffer.bytes.lock().push(2);
        match clone {
            Value::Opaque(o) => assert_eq!(o.to_json(), serde_json::json!([1])),
            other => panic!("expected opaque, got {:?}", other),
        }
    }
}
