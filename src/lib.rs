//! Device telemetry simulation and control-state engine for a residential
//! energy dashboard.

pub mod analytics;
#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod control;
pub mod devices;
pub mod error;
pub mod history;
pub mod hub;
pub mod io;
/// Simulation model, engine, clock, and tick scheduler.
pub mod sim;

pub use error::{EngineError, ErrorKind, Result};
pub use sim::Engine;
