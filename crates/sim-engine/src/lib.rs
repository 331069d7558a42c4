//! The event processing engine.
//!
//! Consumes registration events per category, enforces a per-minute rate
//! window by deliberately leaving over-limit deliveries unacknowledged,
//! simulates a processing delay, draws a success/failure outcome, and
//! reports it downstream, unless a manual update blocked the entity first.

mod engine;
mod runtime;

pub use engine::{CategorySettings, Disposition, EventProcessingEngine, RateWindow};
pub use runtime::{EngineRuntime, RuntimeConfig};
