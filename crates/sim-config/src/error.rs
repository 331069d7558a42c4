use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Variable {key} is not defined")]
    UnknownVariable { key: String },

    #[error("Variable {key} has an unsupported type {ty}")]
    UnsupportedType { key: String, ty: String },

    #[error("Variable {key} does not have a default value")]
    MissingDefault { key: String },

    #[error("Value {raw} cannot be coerced to {ty} for variable {key}")]
    InvalidValue { key: String, ty: String, raw: String },
}
