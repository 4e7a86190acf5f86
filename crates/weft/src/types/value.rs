use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;

use super::Map;
use crate::runtime::MacroValue;

/// A runtime value flowing through template evaluation.
///
/// Caller data, literals, loop variables and macro results are all
/// represented as `Value`. Compound values are reference counted so that
/// lookups and loop bindings clone cheaply.
///
/// # Example
///
/// ```
/// use weft::Value;
///
/// let count: Value = 3.into();
/// let name: Value = "Alice".into();
/// let items: Value = vec![1, 2, 3].into();
///
/// assert!(count.is_true());
/// assert_eq!(name.as_str(), Some("Alice"));
/// assert_eq!(items.len(), Some(3));
/// ```
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// A name that resolved to nothing. Renders as the empty string.
    #[default]
    Undefined,

    /// An explicit `none` literal or JSON `null`.
    None,

    Bool(bool),

    Int(i64),

    Float(f64),

    /// A plain string, escaped on output when autoescaping is enabled.
    String(Arc<str>),

    /// A string exempt from autoescaping.
    Safe(Arc<str>),

    Array(Arc<Vec<Value>>),

    /// An ordered mapping; iteration follows insertion order.
    Map(Arc<Map>),

    /// A macro (or `caller`) that can be invoked from an expression.
    Macro(Arc<MacroValue>),
}

impl Value {
    /// Wrap a string as safe content that bypasses autoescaping.
    pub fn safe(s: impl Into<Arc<str>>) -> Value {
        Value::Safe(s.into())
    }

    /// Build a value from any serializable type.
    ///
    /// This is the usual way to pass application structs as render data.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Value, serde_json::Error> {
        serde_json::to_value(value).map(Value::from)
    }

    /// Boolean coercion used by `if`, `and`, `or` and `not`.
    pub fn is_true(&self) -> bool {
        match self {
            Value::Undefined | Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::String(s) | Value::Safe(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Macro(_) => true,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// True for `Undefined` and `None`.
    pub fn is_none(&self) -> bool {
        matches!(self, Value::Undefined | Value::None)
    }

    /// Whether this value is exempt from autoescaping.
    pub fn is_safe(&self) -> bool {
        matches!(self, Value::Safe(_))
    }

    /// Name of the value's type, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) | Value::Safe(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Macro(_) => "macro",
        }
    }

    /// Get this value as a string slice, if it is a (safe or plain) string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Safe(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a float; integers widen.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_macro(&self) -> Option<&Arc<MacroValue>> {
        match self {
            Value::Macro(m) => Some(m),
            _ => None,
        }
    }

    /// Length of strings (in characters), arrays and maps.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) | Value::Safe(s) => Some(s.chars().count()),
            Value::Array(items) => Some(items.len()),
            Value::Map(map) => Some(map.len()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Convert to a safe string, keeping already-safe content as is.
    pub fn into_safe(self) -> Value {
        match self {
            Value::Safe(_) => self,
            other => Value::Safe(other.to_string().into()),
        }
    }

    /// Attribute access (`value.name`).
    ///
    /// Maps resolve keys; strings and arrays expose `length`. Anything else,
    /// including undefined targets, yields `Undefined`.
    pub fn get_attr(&self, name: &str) -> Value {
        match self {
            Value::Map(map) => map.get(name).cloned().unwrap_or_default(),
            Value::Array(_) | Value::String(_) | Value::Safe(_) if name == "length" => {
                self.len().map(Value::from).unwrap_or_default()
            }
            _ => Value::Undefined,
        }
    }

    /// Subscript access (`value[key]`).
    ///
    /// Arrays and strings accept integer indexes (negative indexes count from
    /// the end); maps accept string keys.
    pub fn get_item(&self, key: &Value) -> Value {
        match (self, key) {
            (Value::Array(items), Value::Int(index)) => resolve_index(*index, items.len())
                .and_then(|i| items.get(i).cloned())
                .unwrap_or_default(),
            (Value::String(s) | Value::Safe(s), Value::Int(index)) => {
                let count = s.chars().count();
                resolve_index(*index, count)
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| Value::from(c.to_string()))
                    .unwrap_or_default()
            }
            (Value::Map(map), _) => match key.as_str() {
                Some(name) => map.get(name).cloned().unwrap_or_default(),
                None => map.get(&key.to_string()).cloned().unwrap_or_default(),
            },
            _ => self.get_attr(&key.to_string()),
        }
    }
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    if index < 0 {
        let back = usize::try_from(index.unsigned_abs()).ok()?;
        len.checked_sub(back)
    } else {
        usize::try_from(index).ok()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined | Value::None, Value::Undefined | Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_float() == other.as_float()
            }
            (Value::String(a) | Value::Safe(a), Value::String(b) | Value::Safe(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Macro(a), Value::Macro(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Value::Undefined | Value::None => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::String(s) | Value::Safe(s) => f.write_str(s),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
            Value::Macro(m) => write!(f, "[macro {}]", m.name()),
        }
    }
}

// From implementations for common types

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        i64::try_from(n).map_or(Value::Float(n as f64), Value::Int)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        i64::try_from(n).map_or(Value::Float(n as f64), Value::Int)
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Float(f64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::String(s)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Map(Arc::new(map))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(Arc::new(items.into_iter().map(Into::into).collect()))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::None, Into::into)
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::None,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Value::from(s),
            JsonValue::Array(items) => Value::from(items),
            JsonValue::Object(object) => object
                .into_iter()
                .map(|(key, value)| (key, Value::from(value)))
                .collect::<Map>()
                .into(),
        }
    }
}

impl FromIterator<(String, Value)> for Value {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Value::Map(Arc::new(iter.into_iter().collect()))
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Value::Array(Arc::new(iter.into_iter().collect()))
    }
}
