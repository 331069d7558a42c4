use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{error, info};

use crate::error::ConfigError;
use crate::schema::{defined_variables, VariableDefinition, VariableValue};

/// Read-only view of one schema entry, as exposed to the configuration
/// endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableSnapshot {
    #[serde(rename = "type")]
    pub ty: String,
    pub default_value: serde_json::Value,
    pub current_value: serde_json::Value,
}

/// Conversion from a stored [`VariableValue`] or a raw environment string
/// into a typed read result.
pub trait FromVariable: Sized {
    fn from_variable(value: &VariableValue) -> Option<Self>;
    fn from_raw(raw: &str) -> Option<Self>;
}

impl FromVariable for i64 {
    fn from_variable(value: &VariableValue) -> Option<Self> {
        match value {
            VariableValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    fn from_raw(raw: &str) -> Option<Self> {
        raw.trim().parse().ok()
    }
}

impl FromVariable for f64 {
    fn from_variable(value: &VariableValue) -> Option<Self> {
        match value {
            VariableValue::Number(v) => Some(*v),
            VariableValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    fn from_raw(raw: &str) -> Option<Self> {
        raw.trim().parse().ok()
    }
}

impl FromVariable for bool {
    fn from_variable(value: &VariableValue) -> Option<Self> {
        match value {
            VariableValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    fn from_raw(raw: &str) -> Option<Self> {
        Some(raw == "true")
    }
}

impl FromVariable for String {
    fn from_variable(value: &VariableValue) -> Option<Self> {
        match value {
            VariableValue::String(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn from_raw(raw: &str) -> Option<Self> {
        Some(raw.to_owned())
    }
}

/// Holds the current values of the exposed variable schema, plus a snapshot
/// of the process environment for everything the schema does not cover.
///
/// Writes go through type coercion and are immediately visible to all
/// readers; reads never fail.
#[derive(Debug)]
pub struct ConfigStore {
    schema: Vec<VariableDefinition>,
    values: RwLock<HashMap<String, VariableValue>>,
    env: HashMap<String, String>,
}

impl ConfigStore {
    /// Builds the store against the real process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::with_env(std::env::vars().collect())
    }

    /// Builds the store against a supplied environment map.
    pub fn with_env(env: HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::with_schema(defined_variables(), env)
    }

    /// Builds the store against an explicit schema. Every schema entry must
    /// carry a default; the defaults are applied through the same coercion
    /// as an external set.
    pub fn with_schema(
        schema: Vec<VariableDefinition>,
        env: HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        for def in &schema {
            let default = def.default.as_ref().ok_or_else(|| ConfigError::MissingDefault {
                key: def.key.to_string(),
            })?;
            let value = coerce(def.key, def.ty, default)?;
            info!(key = def.key, value = %value, "Setting variable to default");
            values.insert(def.key.to_string(), value);
        }
        Ok(Self {
            schema,
            values: RwLock::new(values),
            env,
        })
    }

    /// Read-only snapshot of the schema with current values. Never fails.
    pub fn defined_variable_snapshot(&self) -> BTreeMap<String, VariableSnapshot> {
        let values = self.values.read();
        self.schema
            .iter()
            .map(|def| {
                let current = values
                    .get(def.key)
                    .and_then(|value| serde_json::to_value(value).ok())
                    .unwrap_or(serde_json::Value::Null);
                (
                    def.key.to_string(),
                    VariableSnapshot {
                        ty: def.ty.to_string(),
                        default_value: def.default.clone().unwrap_or(serde_json::Value::Null),
                        current_value: current,
                    },
                )
            })
            .collect()
    }

    /// Applies a batch of raw updates. Entries are processed one at a time;
    /// the first failing entry aborts the call, leaving earlier entries
    /// applied.
    pub fn set_variables(
        &self,
        updates: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), ConfigError> {
        for (key, raw) in updates {
            let def = self
                .schema
                .iter()
                .find(|def| def.key == key)
                .ok_or_else(|| ConfigError::UnknownVariable { key: key.clone() })?;
            let value = coerce(def.key, def.ty, raw)?;
            info!(key = %key, value = %value, "Setting variable");
            self.values.write().insert(key.clone(), value);
        }
        Ok(())
    }

    /// Current typed value of `key`: the stored value if present, else the
    /// environment, else `fallback` (with an error log). Never fails.
    pub fn current_value<T: FromVariable>(&self, key: &str, fallback: T) -> T {
        if let Some(value) = self.values.read().get(key) {
            if let Some(typed) = T::from_variable(value) {
                return typed;
            }
        }
        if let Some(raw) = self.env.get(key) {
            if let Some(typed) = T::from_raw(raw) {
                return typed;
            }
        }
        error!(key = %key, "Variable is not defined, using fallback");
        fallback
    }

    /// Store-then-environment string lookup for keys that have no schema
    /// default (service URLs, broker URL). Returns `None` when unset.
    pub fn string_value(&self, key: &str) -> Option<String> {
        if let Some(VariableValue::String(value)) = self.values.read().get(key) {
            return Some(value.clone());
        }
        self.env.get(key).cloned()
    }
}

/// Coerces a raw JSON value to the declared schema type.
fn coerce(key: &str, ty: &str, raw: &serde_json::Value) -> Result<VariableValue, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        key: key.to_string(),
        ty: ty.to_string(),
        raw: raw.to_string(),
    };
    match ty {
        "integer" => raw
            .as_i64()
            .or_else(|| raw.as_str().and_then(|s| s.trim().parse().ok()))
            .map(VariableValue::Integer)
            .ok_or_else(invalid),
        "number" => raw
            .as_f64()
            .or_else(|| raw.as_str().and_then(|s| s.trim().parse().ok()))
            .map(VariableValue::Number)
            .ok_or_else(invalid),
        // Only the literal string "true" reads as true; everything else,
        // including JSON booleans, is false.
        "boolean" => Ok(VariableValue::Boolean(raw.as_str() == Some("true"))),
        "string" => Ok(VariableValue::String(
            raw.as_str()
                .map(str::to_owned)
                .unwrap_or_else(|| raw.to_string()),
        )),
        other => Err(ConfigError::UnsupportedType {
            key: key.to_string(),
            ty: other.to_string(),
        }),
    }
}
