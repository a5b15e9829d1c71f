//! Dynamically typed metadata values shared by the store, the indexers and
//! the query engine.
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Nested key/value document attached to nodes and edges.
pub type Metadata = BTreeMap<String, Value>;

/// Tagged metadata value. The JSON form is the natural one (untagged) so
/// documents round-trip with the collector payloads unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null literal.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Signed 64-bit integer literal.
    Int(i64),
    /// 64-bit floating point literal.
    Float(f64),
    /// UTF-8 string literal.
    String(String),
    /// Ordered sequence of values.
    List(Vec<Value>),
    /// Nested document.
    Map(Metadata),
}

impl Value {
    /// Returns true for values that can be compared by equality and used as
    /// index keys.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::List(_) | Value::Map(_))
    }

    /// String payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer payload, if the value is an integer or an integral float.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    /// Nested document, if any.
    pub fn as_map(&self) -> Option<&Metadata> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Type-aware equality used by filters.
    ///
    /// Integers and floats compare numerically; every other cross-type
    /// comparison is simply unequal. A sequence matches when any element
    /// does.
    pub fn loosely_equals(&self, literal: &Value) -> bool {
        match (self, literal) {
            (Value::List(items), _) => items.iter().any(|item| item.loosely_equals(literal)),
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v:?}"),
            Value::List(items) => {
                f.write_str("[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (idx, (key, item)) in map.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {item}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<Metadata> for Value {
    fn from(value: Metadata) -> Self {
        Value::Map(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::List(value.into_iter().map(Into::into).collect())
    }
}

/// Builds a [`Metadata`] document from `key => value` pairs.
///
/// ```
/// use topograph::metadata;
/// let m = metadata! { "Type" => "veth", "MTU" => 1500 };
/// assert_eq!(m.len(), 2);
/// ```
#[macro_export]
macro_rules! metadata {
    () => { $crate::metadata::Metadata::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut m = $crate::metadata::Metadata::new();
        $( m.insert(::std::string::String::from($key), $crate::metadata::Value::from($value)); )+
        m
    }};
}
