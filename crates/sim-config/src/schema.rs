use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

pub const DEFAULT_PER_MINUTE: i64 = 1_000_000;
pub const DEFAULT_PROCESSING_TIME_SECS: i64 = 5;
pub const DEFAULT_SUCCESS_RATE: f64 = 0.95;

/// One entry of the exposed variable schema. The type is the JSON-Schema
/// type string declared for the variable; the default is a raw JSON value
/// that goes through the same coercion as an external set.
#[derive(Debug, Clone)]
pub struct VariableDefinition {
    pub key: &'static str,
    pub ty: &'static str,
    pub default: Option<serde_json::Value>,
}

impl VariableDefinition {
    pub fn new(key: &'static str, ty: &'static str, default: serde_json::Value) -> Self {
        Self {
            key,
            ty,
            default: Some(default),
        }
    }
}

/// The fixed set of variables a sidecar may query and set at runtime.
pub fn defined_variables() -> Vec<VariableDefinition> {
    vec![
        VariableDefinition::new("PAYMENTS_PER_MINUTE", "integer", json!(DEFAULT_PER_MINUTE)),
        VariableDefinition::new("SHIPMENTS_PER_MINUTE", "integer", json!(DEFAULT_PER_MINUTE)),
        VariableDefinition::new(
            "PAYMENT_PROCESSING_TIME",
            "integer",
            json!(DEFAULT_PROCESSING_TIME_SECS),
        ),
        VariableDefinition::new(
            "SHIPMENT_PROCESSING_TIME",
            "integer",
            json!(DEFAULT_PROCESSING_TIME_SECS),
        ),
        VariableDefinition::new("PAYMENT_SUCCESS_RATE", "number", json!(DEFAULT_SUCCESS_RATE)),
        VariableDefinition::new(
            "SHIPMENT_SUCCESS_RATE",
            "number",
            json!(DEFAULT_SUCCESS_RATE),
        ),
    ]
}

/// A stored configuration value, tagged by its declared schema type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Integer(i64),
    Number(f64),
    Boolean(bool),
    String(String),
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableValue::Integer(value) => write!(f, "{value}"),
            VariableValue::Number(value) => write!(f, "{value}"),
            VariableValue::Boolean(value) => write!(f, "{value}"),
            VariableValue::String(value) => write!(f, "{value}"),
        }
    }
}
