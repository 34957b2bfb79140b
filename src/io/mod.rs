//! File output for telemetry history.

pub mod export;
