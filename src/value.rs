use std::collections::HashMap;

use chrono::NaiveDateTime;
use rust_decimal::{Decimal, prelude::FromPrimitive};

/// A runtime value flowing through the evaluator.
///
/// Values come from three places: literals in a formula, fields of a fetched
/// data record, and the results of binary operations. Records and lists mirror
/// the JSON shape of query results, with one extra scalar for datetime
/// literals which JSON cannot represent natively.
///
/// # Examples
///
/// ```
/// use visform::Value;
///
/// let n = Value::Num(42.0);
/// assert_eq!(n.display_string(), "42");
///
/// let s = Value::Str("hello".to_string());
/// assert_eq!(s.display_string(), "hello");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value (JSON null, missing field)
    Null,

    /// Boolean from a data record
    Bool(bool),

    /// Number (the formula language has a single numeric type)
    Num(f64),

    /// UTF-8 string
    Str(String),

    /// Datetime literal (`#...#`)
    Datetime(NaiveDateTime),

    /// Array of values (query result rows, aggregated sub-rows)
    List(Vec<Value>),

    /// A data record keyed by field name
    Record(HashMap<String, Value>),
}

impl Value {
    /// Get as a number, if numeric.
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// Render the value the way it appears inside a concatenated string.
    ///
    /// Whole numbers print without a trailing `.0`: `"Room " + 12` must
    /// yield `"Room 12"`, not `"Room 12.0"`. Decimal normalization handles
    /// the float-to-text edge cases.
    pub fn display_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Num(n) => match Decimal::from_f64(*n) {
                Some(d) => d.normalize().to_string(),
                None => n.to_string(),
            },
            Value::Str(s) => s.clone(),
            Value::Datetime(dt) => dt.format("%-d-%-m-%Y %H:%M:%S").to_string(),
            Value::List(_) | Value::Record(_) => crate::output::to_json(self),
        }
    }

    /// Convert a JSON value (a query result row or a field of one) into a
    /// runtime value.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Num(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Record(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}
