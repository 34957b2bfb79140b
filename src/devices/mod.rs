//! Simulated devices: identity, configuration, status, and the registry.

/// Device registry and per-device mutable state.
pub mod registry;
pub mod types;

// Re-export the main types for convenience
pub use registry::{DeviceHandle, DeviceState, Registry, TickPhase};
pub use types::{
    Configuration, Device, DeviceKind, DeviceStatus, OperationMode, validate_reserve,
};
