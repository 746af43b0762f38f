//! Runtime values for matcher evaluation and conversion from serde_json

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::MatcherError;

/// A value flowing through matcher evaluation.
///
/// Request values are usually plain strings. Structured values (`Map`) let a
/// matcher reach into request attributes, e.g. `r.sub.age > 18`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Borrow as a string, or fail with a type error naming `what`
    pub fn as_str(&self, what: &str) -> Result<&str, MatcherError> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(MatcherError::Type(format!(
                "{} must be a string, got {}",
                what,
                other.type_name()
            ))),
        }
    }

    pub fn as_bool(&self) -> Result<bool, MatcherError> {
        match self {
            Value::Bool(b) => Ok(*b),
            _ => Err(MatcherError::NonBoolean),
        }
    }

    /// Numeric view used by arithmetic and ordering
    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Attribute lookup for `value.field`
    pub fn get_attr(&self, field: &str) -> Result<&Value, MatcherError> {
        match self {
            Value::Map(map) => map
                .get(field)
                .ok_or_else(|| MatcherError::UnboundIdentifier(format!(".{}", field))),
            other => Err(MatcherError::Type(format!(
                "cannot read attribute '{}' of {}",
                field,
                other.type_name()
            ))),
        }
    }

    /// Equality with numeric widening between int and float
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => {
                self.as_f64() == other.as_f64()
            }
            _ => self == other,
        }
    }

    /// Ordering for `<`, `<=`, `>`, `>=`; numbers and strings only
    pub fn compare(&self, other: &Value) -> Result<std::cmp::Ordering, MatcherError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a
                    .partial_cmp(&b)
                    .ok_or_else(|| MatcherError::Type("NaN is not comparable".to_string())),
                _ => Err(MatcherError::Type(format!(
                    "cannot order {} and {}",
                    self.type_name(),
                    other.type_name()
                ))),
            },
        }
    }

    pub fn add(&self, other: &Value) -> Result<Value, MatcherError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_add(*b)
                .map(Value::Int)
                .ok_or_else(|| MatcherError::Type("integer overflow".to_string())),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
            _ => self.float_op(other, "+", |a, b| a + b),
        }
    }

    pub fn arith(&self, other: &Value, op: &str) -> Result<Value, MatcherError> {
        if let (Value::Int(a), Value::Int(b)) = (self, other) {
            let out = match op {
                "-" => a.checked_sub(*b),
                "*" => a.checked_mul(*b),
                "/" => a.checked_div(*b),
                "%" => a.checked_rem(*b),
                _ => None,
            };
            return out
                .map(Value::Int)
                .ok_or_else(|| MatcherError::Type(format!("invalid integer operation '{}'", op)));
        }
        match op {
            "-" => self.float_op(other, op, |a, b| a - b),
            "*" => self.float_op(other, op, |a, b| a * b),
            "/" => self.float_op(other, op, |a, b| a / b),
            "%" => self.float_op(other, op, |a, b| a % b),
            _ => Err(MatcherError::Type(format!("unknown operator '{}'", op))),
        }
    }

    fn float_op(
        &self,
        other: &Value,
        op: &str,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Value, MatcherError> {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::Float(f(a, b))),
            _ => Err(MatcherError::Type(format!(
                "operator '{}' not defined for {} and {}",
                op,
                self.type_name(),
                other.type_name()
            ))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(_) | Value::Map(_) => {
                let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                write!(f, "{}", json)
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Str(s.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

/// Convert serde_json::Value to a matcher value.
///
/// JSON `null` becomes an empty string so that absent attributes compare
/// unequal to any real value instead of failing the row.
impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Value::Str(String::new()),
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            JsonValue::String(s) => Value::Str(s),
            JsonValue::Array(arr) => Value::List(arr.into_iter().map(Value::from).collect()),
            JsonValue::Object(obj) => {
                Value::Map(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}
