// src/core/protocol/value.rs

//! Defines the scalar value a cloud variable can hold.

use crate::core::CloudVarError;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;

/// A variable's value. Only scalars are stored; nested JSON structures and
/// `null` are rejected at the protocol boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Bool(bool),
    Number(Number),
    Text(String),
}

impl VariableValue {
    /// Returns a short name of the JSON type, used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            VariableValue::Bool(_) => "boolean",
            VariableValue::Number(_) => "number",
            VariableValue::Text(_) => "string",
        }
    }
}

impl TryFrom<Value> for VariableValue {
    type Error = CloudVarError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bool(b) => Ok(VariableValue::Bool(b)),
            Value::Number(n) => Ok(VariableValue::Number(n)),
            Value::String(s) => Ok(VariableValue::Text(s)),
            Value::Null => Err(CloudVarError::Decode("value must not be null".into())),
            Value::Array(_) | Value::Object(_) => Err(CloudVarError::Decode(
                "value must be a number, string or boolean".into(),
            )),
        }
    }
}

impl From<VariableValue> for Value {
    fn from(val: VariableValue) -> Self {
        match val {
            VariableValue::Bool(b) => Value::Bool(b),
            VariableValue::Number(n) => Value::Number(n),
            VariableValue::Text(s) => Value::String(s),
        }
    }
}

impl From<bool> for VariableValue {
    fn from(b: bool) -> Self {
        VariableValue::Bool(b)
    }
}

impl From<i64> for VariableValue {
    fn from(n: i64) -> Self {
        VariableValue::Number(n.into())
    }
}

impl From<&str> for VariableValue {
    fn from(s: &str) -> Self {
        VariableValue::Text(s.to_string())
    }
}

impl From<String> for VariableValue {
    fn from(s: String) -> Self {
        VariableValue::Text(s)
    }
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableValue::Bool(b) => write!(f, "{b}"),
            VariableValue::Number(n) => write!(f, "{n}"),
            VariableValue::Text(s) => write!(f, "{s:?}"),
        }
    }
}
