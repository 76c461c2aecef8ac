//! Core value model for store state.

use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Top level of the canonical state: named slots holding arbitrary values.
pub type StateMap = BTreeMap<String, Value>;

/// Milliseconds since the Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards");
        Timestamp(duration.as_millis() as i64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// A regular-expression-like value: pattern source plus flags, both kept
/// verbatim so a copy reports the identical source and flags.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pattern {
    source: String,
    flags: String,
}

impl Pattern {
    pub fn new(source: impl Into<String>, flags: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            flags: flags.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn flags(&self) -> &str {
        &self.flags
    }
}

/// Capability interface for values with custom behavior or private
/// invariants that cannot be rebuilt from a plain serialized form.
///
/// The clone algorithm tries each capability in order: [`copy`],
/// [`construct_from`], then a structural walk over [`fields`] rebuilt with
/// [`from_fields`]. A type may implement any subset; when every attempt
/// returns `None` the cloner falls back to sharing the reference.
///
/// [`copy`]: OpaqueValue::copy
/// [`construct_from`]: OpaqueValue::construct_from
/// [`fields`]: OpaqueValue::fields
/// [`from_fields`]: OpaqueValue::from_fields
pub trait OpaqueValue: fmt::Debug + Send + Sync {
    /// Stable type name, used for diagnostics and value equality.
    fn kind(&self) -> &'static str;

    /// Self-copy capability. First clone strategy.
    fn copy(&self) -> Option<Arc<dyn OpaqueValue>> {
        None
    }

    /// Build a new instance of the same type from the original.
    /// Second clone strategy.
    fn construct_from(&self) -> Option<Arc<dyn OpaqueValue>> {
        None
    }

    /// Own fields by their current (possibly computed) value, for the
    /// structural field walk. Third clone strategy, paired with
    /// [`OpaqueValue::from_fields`].
    fn fields(&self) -> Option<StateMap> {
        None
    }

    /// Rebuild an instance from deep-cloned fields.
    fn from_fields(&self, _fields: StateMap) -> Option<Arc<dyn OpaqueValue>> {
        None
    }

    /// Lossy serialization projection. May be a non-container primitive;
    /// such values never take the serialize round-trip clone path.
    fn to_json(&self) -> serde_json::Value;
}

/// A self-describing store value.
///
/// Covers every shape the clone algorithm branches on: immutable
/// primitives, date-like and pattern values with dedicated copy
/// constructors, keyed and unique collections, plain containers, and
/// opaque values behind the [`OpaqueValue`] capability.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    /// NaN and the infinities are representable and survive cloning.
    Number(f64),
    String(String),
    Date(Timestamp),
    Pattern(Pattern),
    /// Keyed collection, insertion-ordered. Keys are assumed immutable.
    Map(Vec<(Value, Value)>),
    /// Unique collection, insertion-ordered.
    Set(Vec<Value>),
    /// Plain keyed structure.
    Object(StateMap),
    /// Ordered sequence.
    Array(Vec<Value>),
    Opaque(Arc<dyn OpaqueValue>),
}

impl Value {
    /// Build a map value from entries, keeping the first occurrence of a
    /// duplicate key.
    pub fn map(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        let mut out: Vec<(Value, Value)> = Vec::new();
        for (key, value) in entries {
            if !out.iter().any(|(existing, _)| *existing == key) {
                out.push((key, value));
            }
        }
        Value::Map(out)
    }

    /// Build a set value, dropping duplicates by value equality.
    pub fn set(values: impl IntoIterator<Item = Value>) -> Self {
        let mut out: Vec<Value> = Vec::new();
        for value in values {
            if !out.contains(&value) {
                out.push(value);
            }
        }
        Value::Set(out)
    }

    pub fn opaque(value: impl OpaqueValue + 'static) -> Self {
        Value::Opaque(Arc::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&StateMap> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a key on an object value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Lossy JSON projection: the self-describing textual form used by the
    /// serialize fast path and by callers exporting state. Dates project to
    /// their timestamp, patterns to `/source/flags`, maps to entry pairs,
    /// non-finite numbers to null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => (*b).into(),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => s.clone().into(),
            Value::Date(ts) => ts.0.into(),
            Value::Pattern(p) => format!("/{}/{}", p.source(), p.flags()).into(),
            Value::Map(entries) => serde_json::Value::Array(
                entries
                    .iter()
                    .map(|(k, v)| serde_json::Value::Array(vec![k.to_json(), v.to_json()]))
                    .collect(),
            ),
            Value::Set(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Opaque(o) => o.to_json(),
        }
    }

    /// Rebuild a value from parsed JSON. Only plain shapes come back;
    /// richer types are restored afterwards by the cloner's repair pass.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            // NaN compares equal to itself so cloned sentinels stay comparable.
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Pattern(a), Value::Pattern(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Opaque(a), Value::Opaque(b)) => {
                Arc::ptr_eq(a, b) || (a.kind() == b.kind() && a.to_json() == b.to_json())
            }
            _ => false,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<StateMap> for Value {
    fn from(v: StateMap) -> Self {
        Value::Object(v)
    }
}
