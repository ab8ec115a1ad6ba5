//! The runtime value type shared by extracted record data, collection
//! parameters, and expression evaluation results.
//!
//! [`Value`] mirrors the shape of one input record's JSON (so extractors can
//! walk it directly) while also serving as the result type for every
//! built-in function and AST node. `Null`/`List`/`Map` are preserved instead
//! of flattened to strings so that `HAS VALUE` and `FOR EACH` can inspect
//! structure rather than string-match it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// A value flowing through extraction and evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// The absence of a value. Renders as an empty string in text contexts.
    Null,
    /// A boolean, as produced by comparisons and `IS_TRUE`/`IS_FALSE`.
    Bool(bool),
    /// A number. MARCout does not distinguish integers from floats; track
    /// durations in particular arrive as floating-point seconds.
    Number(f64),
    /// A string, the common case for extracted record fields.
    String(String),
    /// A list, typically the source of a `FOR EACH` block.
    List(Vec<Value>),
    /// A mapping, typically one item of a `FOR EACH` list (e.g. one track).
    Map(IndexMap<String, Value>),
}

impl Value {
    /// Render this value for inclusion in MARC field text.
    ///
    /// `Null` becomes the empty string (the "text context" rule for
    /// `nothing_value` in §4.3); lists and maps render as their JSON form
    /// since they have no defined textual representation in the DSL.
    #[must_use]
    pub fn display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::List(_) | Value::Map(_) => {
                serde_json::to_string(&self.to_json()).unwrap_or_default()
            },
        }
    }

    /// True unless this value is null, an empty/whitespace-only string, or
    /// an empty list/map — the definition of `has_value` in §4.3.
    #[must_use]
    pub fn has_value(&self) -> bool {
        match self {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::Bool(_) | Value::Number(_) => true,
        }
    }

    /// Look up an attribute of this value as if it were a record/item map.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(m) => m.get(key),
            _ => None,
        }
    }

    /// Convert to an `f64`, for numeric built-ins. Strings are parsed;
    /// anything else that cannot be read as a number is `None`.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(m) => {
                Json::Object(m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            },
        }
    }
}

/// Convert a parsed JSON record (or any sub-value of one) into a [`Value`].
impl From<&Json> for Value {
    fn from(json: &Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::List(items.iter().map(Value::from).collect()),
            Json::Object(map) => {
                Value::Map(map.iter().map(|(k, v)| (k.clone(), Value::from(v))).collect())
            },
        }
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        Value::from(&json)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Format a number the way the DSL's literals expect: integral values
/// render without a trailing `.0`.
#[must_use]
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}
