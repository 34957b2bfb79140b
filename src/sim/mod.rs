//! Simulated time, the per-device physical model, and the tick driver.

/// Battery ratings, dispatch limits, and charge integration.
pub mod battery;
/// Global simulation clock.
pub mod clock;
pub mod effects;
pub mod engine;
pub mod model;
pub mod power_balance;
/// Solar, household, and EV profiles keyed by time of day.
pub mod profile;
pub mod scheduler;
pub mod types;

pub use engine::{CommandHistory, Engine, TickReport};
pub use scheduler::{SchedulerHandle, TickScheduler};
pub use types::{SimConfig, SimTime, TelemetrySnapshot};
