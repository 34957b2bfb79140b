//! Recognised control commands and their parameter parsing.

use std::fmt;

use serde_json::{Map, Value};

use crate::devices::{Configuration, OperationMode, validate_reserve};
use crate::error::{EngineError, Result};

/// A validated control command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Force charging at rated power for a fixed window.
    ChargeNow,
    /// Cancel a forced charge.
    StopCharging,
    /// Disconnect from grid exchange until rejoined.
    IsolateFromGrid,
    /// Reconnect to the grid.
    RejoinGrid,
    /// Take the device offline for a short restart window.
    Reboot,
    /// Install firmware; without a version the current one is reinstalled.
    FirmwareUpdate { version: Option<String> },
    /// Change the backup reserve percent.
    SetBackupReserve { percent: f32 },
    /// Change the operation mode.
    SetOperationMode { mode: OperationMode },
    /// Replace the whole configuration.
    UpdateConfiguration(Configuration),
}

impl Command {
    /// Command names accepted by [`Command::parse`].
    pub const NAMES: [&'static str; 8] = [
        "charge-now",
        "stop-charging",
        "isolate-from-grid",
        "rejoin-grid",
        "reboot",
        "firmware-update",
        "set-backup-reserve",
        "set-operation-mode",
    ];

    /// Parses a command name (kebab-case or snake_case) and its JSON
    /// parameters object.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidCommand`] for unknown names, a non-object
    ///   parameter payload, or a missing or mistyped required parameter
    /// - [`EngineError::Validation`] for a reserve outside `[0, 100]`
    pub fn parse(name: &str, parameters: &Value) -> Result<Self> {
        let empty = Map::new();
        let params = match parameters {
            Value::Null => &empty,
            Value::Object(map) => map,
            other => {
                return Err(EngineError::InvalidCommand(format!(
                    "parameters must be a JSON object, got {other}"
                )));
            }
        };

        let normalized = name.trim().to_ascii_lowercase().replace('_', "-");
        let command = match normalized.as_str() {
            "charge-now" => Command::ChargeNow,
            "stop-charging" => Command::StopCharging,
            "isolate-from-grid" => Command::IsolateFromGrid,
            "rejoin-grid" => Command::RejoinGrid,
            "reboot" => Command::Reboot,
            "firmware-update" => {
                let version = match params.get("version") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(v)) if !v.trim().is_empty() => Some(v.trim().to_string()),
                    Some(other) => {
                        return Err(EngineError::InvalidCommand(format!(
                            "firmware-update: version must be a non-empty string, got {other}"
                        )));
                    }
                };
                Command::FirmwareUpdate { version }
            }
            "set-backup-reserve" => {
                let percent = params
                    .get("percent")
                    .and_then(Value::as_f64)
                    .ok_or_else(|| {
                        EngineError::InvalidCommand(
                            "set-backup-reserve requires a numeric \"percent\"".to_string(),
                        )
                    })?;
                let percent = percent as f32;
                validate_reserve(percent).map_err(|_| {
                    EngineError::validation(
                        "percent",
                        format!("must be in [0, 100], got {percent}"),
                    )
                })?;
                Command::SetBackupReserve { percent }
            }
            "set-operation-mode" => {
                let mode = params
                    .get("mode")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        EngineError::InvalidCommand(
                            "set-operation-mode requires a string \"mode\"".to_string(),
                        )
                    })?
                    .parse()?;
                Command::SetOperationMode { mode }
            }
            _ => {
                return Err(EngineError::InvalidCommand(format!(
                    "unknown command \"{name}\", expected one of: {}",
                    Self::NAMES.join(", ")
                )));
            }
        };
        Ok(command)
    }

    /// Canonical kebab-case name.
    pub fn name(&self) -> &'static str {
        match self {
            Command::ChargeNow => "charge-now",
            Command::StopCharging => "stop-charging",
            Command::IsolateFromGrid => "isolate-from-grid",
            Command::RejoinGrid => "rejoin-grid",
            Command::Reboot => "reboot",
            Command::FirmwareUpdate { .. } => "firmware-update",
            Command::SetBackupReserve { .. } => "set-backup-reserve",
            Command::SetOperationMode { .. } => "set-operation-mode",
            Command::UpdateConfiguration(_) => "update-configuration",
        }
    }

    /// Parameters as recorded in the command log.
    pub fn parameters(&self) -> Value {
        match self {
            Command::FirmwareUpdate { version: Some(v) } => serde_json::json!({ "version": v }),
            Command::SetBackupReserve { percent } => serde_json::json!({ "percent": percent }),
            Command::SetOperationMode { mode } => serde_json::json!({ "mode": mode }),
            Command::UpdateConfiguration(cfg) => serde_json::to_value(cfg).unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_both_spellings() {
        assert_eq!(
            Command::parse("charge_now", &Value::Null).unwrap(),
            Command::ChargeNow
        );
        assert_eq!(
            Command::parse("isolate-from-grid", &json!({})).unwrap(),
            Command::IsolateFromGrid
        );
    }

    #[test]
    fn unknown_command_rejected() {
        let err = Command::parse("self-destruct", &Value::Null).unwrap_err();
        assert!(matches!(err, EngineError::InvalidCommand(_)));
    }

    #[test]
    fn reserve_out_of_range_is_validation_error() {
        let err = Command::parse("set-backup-reserve", &json!({ "percent": 150 })).unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[test]
    fn reserve_missing_is_invalid_command() {
        let err = Command::parse("set-backup-reserve", &json!({})).unwrap_err();
        assert!(matches!(err, EngineError::InvalidCommand(_)));
        let err = Command::parse("set-backup-reserve", &json!({ "percent": "lots" })).unwrap_err();
        assert!(matches!(err, EngineError::InvalidCommand(_)));
    }

    #[test]
    fn reserve_parses() {
        assert_eq!(
            Command::parse("set-backup-reserve", &json!({ "percent": 55 })).unwrap(),
            Command::SetBackupReserve { percent: 55.0 }
        );
    }

    #[test]
    fn mode_parses_and_rejects() {
        assert_eq!(
            Command::parse("set_operation_mode", &json!({ "mode": "time_based_control" })).unwrap(),
            Command::SetOperationMode {
                mode: OperationMode::TimeBased
            }
        );
        let err = Command::parse("set-operation-mode", &json!({ "mode": "turbo" })).unwrap_err();
        assert!(matches!(err, EngineError::InvalidCommand(_)));
    }

    #[test]
    fn firmware_version_optional() {
        assert_eq!(
            Command::parse("firmware-update", &Value::Null).unwrap(),
            Command::FirmwareUpdate { version: None }
        );
        assert!(Command::parse("firmware-update", &json!({ "version": 7 })).is_err());
    }

    #[test]
    fn non_object_parameters_rejected() {
        assert!(Command::parse("reboot", &json!([1, 2])).is_err());
    }

    #[test]
    fn recorded_parameters() {
        let cmd = Command::SetBackupReserve { percent: 55.0 };
        assert_eq!(cmd.parameters(), json!({ "percent": 55.0 }));
        assert_eq!(Command::Reboot.parameters(), Value::Null);
    }
}
