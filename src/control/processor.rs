//! Validates control commands against device state and applies them.

use serde::Serialize;

use crate::devices::{Device, DeviceState, DeviceStatus};
use crate::error::{EngineError, Result};
use crate::sim::effects::{EffectKind, PendingEffect};
use crate::sim::model;
use crate::sim::types::{SimConfig, SimTime};

use super::command::Command;
use super::log::{CommandRecord, CommandStatus};

/// Result of an accepted command: the logged record and the device after it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutcome {
    /// Log entry appended for the command.
    #[serde(flatten)]
    pub record: CommandRecord,
    /// Device state after the command.
    pub device: Device,
}

/// Applies commands to a device's state.
///
/// Every precondition is checked before anything is mutated, so a rejected
/// command leaves the state exactly as it was.
#[derive(Debug, Clone, Copy)]
pub struct CommandProcessor {
    force_charge_s: u64,
    reboot_delay_s: u64,
    firmware_update_s: u64,
    dt_hours: f32,
}

fn require_not_offline(device: &Device, command: &Command) -> Result<()> {
    if device.status == DeviceStatus::Offline {
        return Err(EngineError::InvalidState(format!(
            "{command} requires device {} to be reachable, but it is offline",
            device.id
        )));
    }
    Ok(())
}

fn require_not_updating(device: &Device, command: &Command) -> Result<()> {
    if device.status == DeviceStatus::Updating {
        return Err(EngineError::InvalidState(format!(
            "{command} is not allowed while device {} is updating firmware",
            device.id
        )));
    }
    Ok(())
}

impl CommandProcessor {
    /// Processor using the command timings of `config`.
    pub fn new(config: &SimConfig) -> Self {
        Self {
            force_charge_s: config.force_charge_s,
            reboot_delay_s: config.reboot_delay_s,
            firmware_update_s: config.firmware_update_s,
            dt_hours: config.dt_hours,
        }
    }

    /// Applies `command` to `state` at simulated time `now`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidState`] when the device's status or pending
    ///   effects do not allow the command
    /// - [`EngineError::Validation`] when a configuration update is out of range
    pub fn apply(
        &self,
        state: &mut DeviceState,
        command: Command,
        now: SimTime,
    ) -> Result<CommandOutcome> {
        let (status, message) = self.execute(state, &command, now)?;
        let record = CommandRecord {
            command_id: format!(
                "CMD-{}-{}",
                state.device.id,
                state.commands.next_sequence()
            ),
            device_id: state.device.id.clone(),
            command: command.name().to_string(),
            parameters: command.parameters(),
            issued_at: now,
            status,
            message,
        };
        state.commands.push(record.clone());
        Ok(CommandOutcome {
            record,
            device: state.device.clone(),
        })
    }

    fn execute(
        &self,
        state: &mut DeviceState,
        command: &Command,
        now: SimTime,
    ) -> Result<(CommandStatus, String)> {
        let device = &state.device;
        let id = device.id.clone();
        match command {
            Command::ChargeNow => {
                require_not_offline(device, command)?;
                require_not_updating(device, command)?;
                if device.status == DeviceStatus::Charging {
                    return Err(EngineError::InvalidState(format!(
                        "device {id} is already charging"
                    )));
                }
                if !device.has_battery() {
                    return Err(EngineError::InvalidState(format!(
                        "device {id} has no battery to charge"
                    )));
                }
                if state.effects.is_active(EffectKind::Isolate) {
                    return Err(EngineError::InvalidState(format!(
                        "device {id} is isolated from the grid and cannot force charge"
                    )));
                }
                state.effects.install(PendingEffect::timed(
                    EffectKind::ForceCharge,
                    now,
                    self.force_charge_s,
                ));
                state.device.status = DeviceStatus::Charging;
                Ok((
                    CommandStatus::Completed,
                    format!(
                        "Battery charging initiated - will charge for {} minutes or until full",
                        self.force_charge_s / 60
                    ),
                ))
            }
            Command::StopCharging => {
                if device.status != DeviceStatus::Charging {
                    return Err(EngineError::InvalidState(format!(
                        "device {id} is not charging (status {})",
                        device.status
                    )));
                }
                state.effects.remove(EffectKind::ForceCharge);
                state.device.status = DeviceStatus::Online;
                Ok((
                    CommandStatus::Completed,
                    "Charging stopped - device returning to normal operation".to_string(),
                ))
            }
            Command::IsolateFromGrid => {
                require_not_offline(device, command)?;
                if state.effects.is_active(EffectKind::Isolate) {
                    return Err(EngineError::InvalidState(format!(
                        "device {id} is already isolated from the grid"
                    )));
                }
                state
                    .effects
                    .install(PendingEffect::indefinite(EffectKind::Isolate, now));
                state.effects.remove(EffectKind::ForceCharge);
                // The latest reading reflects the disconnect at once; it is
                // not re-recorded, the next tick supersedes it.
                let islanded = model::islanded_reading(&state.device, &state.latest, self.dt_hours);
                state.latest = islanded.snapshot;
                state.device.status = islanded.status;
                Ok((
                    CommandStatus::Completed,
                    "Device isolated from grid".to_string(),
                ))
            }
            Command::RejoinGrid => {
                if state.effects.remove(EffectKind::Isolate).is_none() {
                    return Err(EngineError::InvalidState(format!(
                        "device {id} is not isolated from the grid"
                    )));
                }
                Ok((
                    CommandStatus::Completed,
                    "Device reconnected to grid".to_string(),
                ))
            }
            Command::Reboot => {
                require_not_offline(device, command)?;
                require_not_updating(device, command)?;
                state.effects.remove(EffectKind::ForceCharge);
                state.effects.install(PendingEffect::timed(
                    EffectKind::Reboot,
                    now,
                    self.reboot_delay_s,
                ));
                state.device.status = DeviceStatus::Offline;
                Ok((
                    CommandStatus::InProgress,
                    format!(
                        "Device rebooting - will be back online in {} simulated seconds",
                        self.reboot_delay_s
                    ),
                ))
            }
            Command::FirmwareUpdate { version } => {
                require_not_offline(device, command)?;
                if device.status == DeviceStatus::Updating {
                    return Err(EngineError::InvalidState(format!(
                        "device {id} is already updating"
                    )));
                }
                let target = version
                    .clone()
                    .unwrap_or_else(|| device.configuration.firmware_version.clone());
                let mut effect =
                    PendingEffect::timed(EffectKind::FirmwareUpdate, now, self.firmware_update_s);
                effect.firmware_version = Some(target.clone());
                state.effects.remove(EffectKind::ForceCharge);
                state.effects.install(effect);
                state.device.status = DeviceStatus::Updating;
                Ok((
                    CommandStatus::InProgress,
                    format!("Firmware update to {target} in progress"),
                ))
            }
            Command::SetBackupReserve { percent } => {
                crate::devices::validate_reserve(*percent)?;
                state.device.configuration.backup_reserve_percent = *percent;
                Ok((
                    CommandStatus::Completed,
                    format!("Backup reserve set to {percent}%"),
                ))
            }
            Command::SetOperationMode { mode } => {
                state.device.configuration.operation_mode = *mode;
                Ok((
                    CommandStatus::Completed,
                    format!("Operation mode set to {mode}"),
                ))
            }
            Command::UpdateConfiguration(configuration) => {
                configuration.validate()?;
                state.device.configuration = configuration.clone();
                Ok((
                    CommandStatus::Completed,
                    "Configuration updated".to_string(),
                ))
            }
        }
    }
}
