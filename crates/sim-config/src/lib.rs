//! Runtime-settable configuration for the simulation.
//!
//! A fixed schema of named, typed variables with defaults. Values are
//! coerced to their declared type at the moment they are set; reads never
//! fail and fall back to the process environment and then to a
//! caller-provided default.

mod error;
mod schema;
mod store;

pub use error::ConfigError;
pub use schema::{
    defined_variables, VariableDefinition, VariableValue, DEFAULT_PER_MINUTE,
    DEFAULT_PROCESSING_TIME_SECS, DEFAULT_SUCCESS_RATE,
};
pub use store::{ConfigStore, FromVariable, VariableSnapshot};
