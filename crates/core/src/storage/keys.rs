use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Records stored in a table are plain JSON values.
pub type Record = Value;

/// A primary key.
///
/// Keys sort numbers first, then strings, then arrays. Arrays compare
/// element by element, the shorter array first when one is a prefix.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Number(f64),
    String(String),
    Array(Vec<Key>),
}

impl Key {
    /// Converts a JSON value into a key.
    ///
    /// Returns `None` for values that cannot act as keys (`null`, booleans,
    /// objects, or arrays containing any of those).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(Key::Number),
            Value::String(s) => Some(Key::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Key::from_value)
                .collect::<Option<Vec<_>>>()
                .map(Key::Array),
            _ => None,
        }
    }

    /// Converts the key back into JSON. Integral numbers become JSON integers.
    pub fn to_value(&self) -> Value {
        match self {
            Key::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
                Value::from(*n as i64)
            }
            Key::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Key::String(s) => Value::String(s.clone()),
            Key::Array(items) => Value::Array(items.iter().map(Key::to_value).collect()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Key::Number(_) => 0,
            Key::String(_) => 1,
            Key::Array(_) => 2,
        }
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Number(a), Key::Number(b)) => a.total_cmp(b),
            (Key::String(a), Key::String(b)) => a.cmp(b),
            (Key::Array(a), Key::Array(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Number(value as f64)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key::Number(f64::from(value))
    }
}

impl From<u64> for Key {
    fn from(value: u64) -> Self {
        Key::Number(value as f64)
    }
}

impl From<f64> for Key {
    fn from(value: f64) -> Self {
        Key::Number(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::String(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::String(value)
    }
}

impl From<Vec<Key>> for Key {
    fn from(value: Vec<Key>) -> Self {
        Key::Array(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_ordering() {
        let mut keys = vec![
            Key::from(vec![Key::from(1)]),
            Key::from("a"),
            Key::from(10),
            Key::from(-3),
        ];
        keys.sort();

        assert_eq!(
            keys,
            vec![
                Key::from(-3),
                Key::from(10),
                Key::from("a"),
                Key::from(vec![Key::from(1)]),
            ]
        );
    }

    #[test]
    fn test_array_prefix_sorts_first() {
        let short = Key::from(vec![Key::from("a")]);
        let long = Key::from(vec![Key::from("a"), Key::from(1)]);
        assert!(short < long);
    }

    #[test]
    fn test_from_value_rejects_invalid_keys() {
        assert_eq!(Key::from_value(&json!(null)), None);
        assert_eq!(Key::from_value(&json!(true)), None);
        assert_eq!(Key::from_value(&json!({"id": 1})), None);
        assert_eq!(Key::from_value(&json!([1, null])), None);
    }

    #[test]
    fn test_integral_numbers_render_as_integers() {
        assert_eq!(Key::from(7).to_value(), json!(7));
        assert_eq!(Key::from(1.5).to_value(), json!(1.5));
        assert_eq!(Key::from(7).to_string(), "7");
        assert_eq!(Key::from("k").to_string(), "\"k\"");
    }

    #[test]
    fn test_integer_and_float_keys_are_equal() {
        let from_json = Key::from_value(&json!(3)).unwrap();
        assert_eq!(from_json, Key::from(3.0));
    }
}
