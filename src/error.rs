//! Error taxonomy shared by the registry, command processor, and scheduler.

use serde::Serialize;

/// Errors surfaced by the simulation engine's public operations.
///
/// Every command failure is synchronous and leaves device state untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// No device is registered under the given id.
    #[error("device {0} not found")]
    UnknownDevice(String),

    /// A device with the given id is already registered.
    #[error("device {0} already exists")]
    DeviceExists(String),

    /// The command name or its parameter combination is not recognised.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// The command cannot apply to the device in its current status.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A parameter is outside its permitted range.
    #[error("validation error: {field} {message}")]
    Validation {
        /// Name of the offending parameter.
        field: String,
        /// Constraint that was violated.
        message: String,
    },

    /// The simulation model produced a physically inconsistent state.
    #[error("simulation invariant violated for {device_id}: {message}")]
    SimulationInvariantViolation {
        /// Device whose tick failed.
        device_id: String,
        /// Description of the violated invariant.
        message: String,
    },
}

/// Machine-readable error tag used in JSON error payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownDevice,
    DeviceExists,
    InvalidCommand,
    InvalidState,
    ValidationError,
    SimulationInvariantViolation,
}

impl EngineError {
    /// Shorthand for a [`EngineError::Validation`] error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns the tag identifying this error's category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownDevice(_) => ErrorKind::UnknownDevice,
            Self::DeviceExists(_) => ErrorKind::DeviceExists,
            Self::InvalidCommand(_) => ErrorKind::InvalidCommand,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Validation { .. } => ErrorKind::ValidationError,
            Self::SimulationInvariantViolation { .. } => ErrorKind::SimulationInvariantViolation,
        }
    }
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(
            EngineError::UnknownDevice("x".into()).kind(),
            ErrorKind::UnknownDevice
        );
        assert_eq!(
            EngineError::validation("percent", "must be in [0, 100]").kind(),
            ErrorKind::ValidationError
        );
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::InvalidState).unwrap();
        assert_eq!(json, "\"invalid_state\"");
    }

    #[test]
    fn validation_message_names_field() {
        let e = EngineError::validation("percent", "must be in [0, 100], got 150");
        assert_eq!(
            e.to_string(),
            "validation error: percent must be in [0, 100], got 150"
        );
    }
}
