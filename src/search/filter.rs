//! Metadata filters in the Pinecone-style JSON dialect.
//!
//! `{"source": "guidelines.pdf", "page": {"$gte": 3}}`: every clause must
//! hold. A bare scalar means equality.

use crate::types::Metadata;
use crate::{Error, Result};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Eq(Value),
    Ne(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Gt(f64),
    Gte(f64),
    Lt(f64),
    Lte(f64),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetadataFilter {
    clauses: Vec<(String, Condition)>,
}

impl MetadataFilter {
    /// Equality filter on a single key
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            clauses: vec![(key.into(), Condition::Eq(value.into()))],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Parse a filter object. Anything outside the supported dialect is an
    /// error rather than being ignored.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::InvalidFilter(format!("filter must be an object, got {value}")))?;

        let mut clauses = Vec::new();
        for (key, condition) in object {
            if key.starts_with('$') {
                return Err(Error::InvalidFilter(format!("unsupported top-level operator '{key}'")));
            }
            match condition {
                Value::Object(ops) => {
                    if ops.is_empty() {
                        return Err(Error::InvalidFilter(format!("empty condition for '{key}'")));
                    }
                    for (op, operand) in ops {
                        clauses.push((key.clone(), parse_condition(key, op, operand)?));
                    }
                }
                Value::Array(_) => {
                    return Err(Error::InvalidFilter(format!(
                        "bare array for '{key}'; use {{\"$in\": [...]}}"
                    )));
                }
                scalar => clauses.push((key.clone(), Condition::Eq(scalar.clone()))),
            }
        }

        Ok(Self { clauses })
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.clauses.iter().all(|(key, condition)| {
            let value = metadata.get(key);
            match condition {
                Condition::Eq(expected) => value.is_some_and(|v| values_equal(v, expected)),
                Condition::Ne(expected) => !value.is_some_and(|v| values_equal(v, expected)),
                Condition::In(options) => {
                    value.is_some_and(|v| options.iter().any(|o| values_equal(v, o)))
                }
                Condition::Nin(options) => {
                    !value.is_some_and(|v| options.iter().any(|o| values_equal(v, o)))
                }
                Condition::Gt(bound) => number(value).is_some_and(|n| n > *bound),
                Condition::Gte(bound) => number(value).is_some_and(|n| n >= *bound),
                Condition::Lt(bound) => number(value).is_some_and(|n| n < *bound),
                Condition::Lte(bound) => number(value).is_some_and(|n| n <= *bound),
            }
        })
    }
}

fn parse_condition(key: &str, op: &str, operand: &Value) -> Result<Condition> {
    let numeric = || {
        operand.as_f64().ok_or_else(|| {
            Error::InvalidFilter(format!("'{op}' on '{key}' needs a number, got {operand}"))
        })
    };
    let list = || match operand {
        Value::Array(items) if items.iter().all(is_scalar) => Ok(items.clone()),
        _ => Err(Error::InvalidFilter(format!(
            "'{op}' on '{key}' needs an array of scalars, got {operand}"
        ))),
    };
    let scalar = || {
        if is_scalar(operand) {
            Ok(operand.clone())
        } else {
            Err(Error::InvalidFilter(format!(
                "'{op}' on '{key}' needs a scalar, got {operand}"
            )))
        }
    };

    match op {
        "$eq" => Ok(Condition::Eq(scalar()?)),
        "$ne" => Ok(Condition::Ne(scalar()?)),
        "$in" => Ok(Condition::In(list()?)),
        "$nin" => Ok(Condition::Nin(list()?)),
        "$gt" => Ok(Condition::Gt(numeric()?)),
        "$gte" => Ok(Condition::Gte(numeric()?)),
        "$lt" => Ok(Condition::Lt(numeric()?)),
        "$lte" => Ok(Condition::Lte(numeric()?)),
        other => Err(Error::InvalidFilter(format!("unknown operator '{other}' on '{key}'"))),
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

fn number(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64)
}

// 3 and 3.0 are the same page number
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}
