//! Core value type for mapping evaluation

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Number, Value as JsonValue};
use std::fmt;

/// Floats in `I64_LOWER..I64_UPPER` narrow to `i64` without saturating
const I64_LOWER: f64 = i64::MIN as f64;
const I64_UPPER: f64 = -(i64::MIN as f64);

/// Ordered object representation used by [`Value::Object`]
pub type Object = IndexMap<String, Value>;

/// A value produced or consumed by a mapping.
///
/// Structured values mirror JSON, with two additions: `Bytes` for raw
/// message payloads that are not valid JSON, and the two sentinels
/// `Delete` and `Nothing` that assignments interpret specially.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// JSON null
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Ordered array
    Array(Vec<Value>),
    /// Object with insertion-ordered keys
    Object(Object),
    /// Marks the assignment target for deletion
    Delete,
    /// Marks the assignment as a no-op
    Nothing,
}

impl Value {
    /// Name of the value's type as shown in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::Float(_) => "number",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Delete => "delete",
            Value::Nothing => "nothing",
        }
    }

    /// Check for JSON null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow string contents
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of the value; integers widen to floats
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer view of the value; floats with no fractional part narrow
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 && (I64_LOWER..I64_UPPER).contains(f) => {
                Some(*f as i64)
            }
            _ => None,
        }
    }

    /// Borrow object contents
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Borrow array contents
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Build a value from message bytes: JSON when it parses, raw bytes otherwise
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match serde_json::from_slice::<JsonValue>(bytes) {
            Ok(json) => Value::from(json),
            Err(_) => Value::Bytes(bytes.to_vec()),
        }
    }

    /// Navigate a dot path. Missing keys, out of range indexes and
    /// non-container intermediates all resolve to `None`.
    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let mut current = self;
        for segment in path {
            let segment = segment.as_ref();
            current = match current {
                Value::Object(o) => o.get(segment)?,
                Value::Array(a) => a.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Set a value at a dot path, creating intermediate objects as needed.
    /// Non-object intermediates are replaced.
    pub fn set_path<S: AsRef<str>>(&mut self, path: &[S], value: Value) {
        let Some((last, parents)) = path.split_last() else {
            *self = value;
            return;
        };
        let mut current = self;
        for segment in parents {
            if !matches!(current, Value::Object(_)) {
                *current = Value::Object(Object::new());
            }
            current = match current {
                Value::Object(o) => o
                    .entry(segment.as_ref().to_string())
                    .or_insert_with(|| Value::Object(Object::new())),
                _ => return,
            };
        }
        if !matches!(current, Value::Object(_)) {
            *current = Value::Object(Object::new());
        }
        if let Value::Object(o) = current {
            o.insert(last.as_ref().to_string(), value);
        }
    }

    /// Remove the value at a dot path if present
    pub fn delete_path<S: AsRef<str>>(&mut self, path: &[S]) {
        let Some((last, parents)) = path.split_last() else {
            *self = Value::Nothing;
            return;
        };
        let mut current = self;
        for segment in parents {
            current = match current {
                Value::Object(o) => match o.get_mut(segment.as_ref()) {
                    Some(next) => next,
                    None => return,
                },
                _ => return,
            };
        }
        if let Value::Object(o) = current {
            o.shift_remove(last.as_ref());
        }
    }

    /// Convert into a `serde_json::Value`. The sentinels become null and
    /// bytes become a (lossy) UTF-8 string.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null | Value::Delete | Value::Nothing => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::Number((*i).into()),
            Value::Float(f) => Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Bytes(b) => JsonValue::String(String::from_utf8_lossy(b).into_owned()),
            Value::Array(a) => JsonValue::Array(a.iter().map(Value::to_json).collect()),
            Value::Object(o) => {
                let mut map = JsonMap::with_capacity(o.len());
                for (k, v) in o {
                    map.insert(k.clone(), v.to_json());
                }
                JsonValue::Object(map)
            }
        }
    }

    /// Serialise into message content: strings and bytes verbatim,
    /// everything else as compact JSON
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Value::String(s) => s.as_bytes().to_vec(),
            Value::Bytes(b) => b.clone(),
            other => other.to_json().to_string().into_bytes(),
        }
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(a) => Value::Array(a.into_iter().map(Value::from).collect()),
            JsonValue::Object(o) => {
                Value::Object(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(a)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            Value::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_conversion() {
        let value = Value::from(json!({"a": [1, 2.5, "x"], "b": null}));
        assert_eq!(
            value.get_path(&["a", "0"]),
            Some(&Value::Int(1))
        );
        assert_eq!(value.get_path(&["a", "1"]), Some(&Value::Float(2.5)));
        assert_eq!(value.to_json(), json!({"a": [1, 2.5, "x"], "b": null}));
    }

    #[test]
    fn test_set_path_creates_objects() {
        let mut value = Value::Nothing;
        value.set_path(&["a", "b"], Value::from("c"));
        assert_eq!(value.to_json(), json!({"a": {"b": "c"}}));

        value.set_path(&["a", "b", "d"], Value::Int(1));
        assert_eq!(value.to_json(), json!({"a": {"b": {"d": 1}}}));
    }

    #[test]
    fn test_delete_path() {
        let mut value = Value::from(json!({"a": {"b": 1, "c": 2}}));
        value.delete_path(&["a", "b"]);
        assert_eq!(value.to_json(), json!({"a": {"c": 2}}));

        // Missing intermediates are ignored
        value.delete_path(&["x", "y"]);
        assert_eq!(value.to_json(), json!({"a": {"c": 2}}));
    }

    #[test]
    fn test_from_bytes() {
        assert_eq!(Value::from_bytes(br#""hi""#), Value::from("hi"));
        assert_eq!(
            Value::from_bytes(b"not json"),
            Value::Bytes(b"not json".to_vec())
        );
    }

    #[test]
    fn test_float_narrowing_stays_in_range() {
        assert_eq!(Value::Float(42.0).as_i64(), Some(42));
        assert_eq!(Value::Float(-9.223372036854775808e18).as_i64(), Some(i64::MIN));
        assert_eq!(Value::Float(9.223372036854775808e18).as_i64(), None);
        assert_eq!(Value::Float(1e300).as_i64(), None);
        assert_eq!(Value::Float(-1e300).as_i64(), None);
        assert_eq!(Value::Float(f64::INFINITY).as_i64(), None);
        assert_eq!(Value::Float(f64::NAN).as_i64(), None);
        assert_eq!(Value::Float(1.5).as_i64(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from("raw").to_string(), "raw");
        assert_eq!(Value::from(json!({"a": 1})).to_string(), r#"{"a":1}"#);
    }
}
