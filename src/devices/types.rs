//! Device identity, configuration, and status types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Hardware category of a simulated device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceKind {
    /// Stationary home battery.
    BatteryStorage,
    /// Grid-tied solar inverter without storage.
    SolarInverter,
    /// EV wall connector.
    EvConnector,
}

/// Battery dispatch strategy selected by the homeowner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationMode {
    /// Preserve charge for outages; never discharge while on grid.
    Backup,
    /// Maximise self-consumption of solar.
    SelfPowered,
    /// Shift energy from off-peak to the evening peak.
    TimeBased,
    /// Self-powered with off-peak grid top-up.
    Advanced,
}

impl OperationMode {
    /// All recognised modes.
    pub const ALL: [OperationMode; 4] = [
        OperationMode::Backup,
        OperationMode::SelfPowered,
        OperationMode::TimeBased,
        OperationMode::Advanced,
    ];

    /// Stable tag, as carried on telemetry snapshots.
    pub fn as_str(self) -> &'static str {
        match self {
            OperationMode::Backup => "backup",
            OperationMode::SelfPowered => "self-powered",
            OperationMode::TimeBased => "time-based",
            OperationMode::Advanced => "advanced",
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationMode {
    type Err = EngineError;

    /// Accepts both kebab-case and snake_case spellings.
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "backup" => Ok(OperationMode::Backup),
            "self-powered" => Ok(OperationMode::SelfPowered),
            "time-based" | "time-based-control" => Ok(OperationMode::TimeBased),
            "advanced" => Ok(OperationMode::Advanced),
            _ => Err(EngineError::InvalidCommand(format!(
                "unknown operation mode \"{s}\", expected one of: {}",
                OperationMode::ALL
                    .iter()
                    .map(|m| m.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}

/// Lifecycle status of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceStatus {
    Online,
    Offline,
    Standby,
    Charging,
    Discharging,
    Fault,
    Updating,
}

impl DeviceStatus {
    /// Whether the device is reachable and reporting telemetry.
    pub fn is_online(self) -> bool {
        matches!(
            self,
            DeviceStatus::Online | DeviceStatus::Charging | DeviceStatus::Discharging
        )
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceStatus::Online => "online",
            DeviceStatus::Offline => "offline",
            DeviceStatus::Standby => "standby",
            DeviceStatus::Charging => "charging",
            DeviceStatus::Discharging => "discharging",
            DeviceStatus::Fault => "fault",
            DeviceStatus::Updating => "updating",
        };
        f.write_str(s)
    }
}

/// User-adjustable settings of a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Configuration {
    /// Minimum charge percent that normal dispatch will not go below.
    pub backup_reserve_percent: f32,
    /// Active dispatch strategy.
    pub operation_mode: OperationMode,
    /// Whether the battery may charge from the grid outside forced charging.
    pub grid_charging_enabled: bool,
    /// Installed firmware version.
    pub firmware_version: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            backup_reserve_percent: 20.0,
            operation_mode: OperationMode::SelfPowered,
            grid_charging_enabled: false,
            firmware_version: "23.44.1".to_string(),
        }
    }
}

impl Configuration {
    /// Checks that every field is within its permitted range.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        validate_reserve(self.backup_reserve_percent)?;
        if self.firmware_version.trim().is_empty() {
            return Err(EngineError::validation(
                "firmware_version",
                "must not be empty",
            ));
        }
        Ok(())
    }
}

/// Checks a backup reserve percentage lies in `[0, 100]`.
pub fn validate_reserve(percent: f32) -> Result<()> {
    if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
        return Err(EngineError::validation(
            "backup_reserve_percent",
            format!("must be in [0, 100], got {percent}"),
        ));
    }
    Ok(())
}

/// A simulated device: static identity and ratings plus mutable
/// configuration and status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    /// Unique device id.
    pub id: String,
    /// Manufacturer serial number.
    pub serial: String,
    /// Hardware category.
    pub kind: DeviceKind,
    /// Marketing model name.
    pub model: String,
    /// Free-form installation location.
    pub location: Option<String>,
    /// Usable battery capacity (kWh); zero when the device has no battery.
    pub battery_capacity_kwh: f32,
    /// Nameplate solar array capacity (kW); zero when none is attached.
    pub solar_capacity_kw: f32,
    /// Rated battery charging power (kW).
    pub max_charge_kw: f32,
    /// Rated battery discharging power (kW).
    pub max_discharge_kw: f32,
    /// Rated EV charging power (kW); zero unless the device is a connector.
    pub ev_max_charge_kw: f32,
    /// Average household consumption (kW) around which the load profile moves.
    pub base_load_kw: f32,
    /// Battery charge percent at registration.
    pub initial_charge_percent: f32,
    /// Charge cycles already accumulated when the device was registered.
    pub initial_cycles: u32,
    /// User-adjustable settings.
    pub configuration: Configuration,
    /// Current lifecycle status.
    pub status: DeviceStatus,
}

impl Device {
    /// Creates a device of `kind` with the typical ratings of that hardware.
    pub fn new(id: impl Into<String>, kind: DeviceKind) -> Self {
        let id = id.into();
        let (model, battery_capacity_kwh, solar_capacity_kw, ev_max_charge_kw, base_load_kw) =
            match kind {
                DeviceKind::BatteryStorage => ("Powerwall 2", 13.5, 0.0, 0.0, 1.2),
                DeviceKind::SolarInverter => ("Solar Inverter 7.6kW", 0.0, 7.6, 0.0, 1.0),
                DeviceKind::EvConnector => ("Wall Connector", 0.0, 0.0, 7.2, 0.8),
            };
        let rated_kw = if battery_capacity_kwh > 0.0 { 5.0 } else { 0.0 };
        Self {
            serial: format!("SN-{id}"),
            id,
            kind,
            model: model.to_string(),
            location: None,
            battery_capacity_kwh,
            solar_capacity_kw,
            max_charge_kw: rated_kw,
            max_discharge_kw: rated_kw,
            ev_max_charge_kw,
            base_load_kw,
            initial_charge_percent: 50.0,
            initial_cycles: 0,
            configuration: Configuration::default(),
            status: DeviceStatus::Online,
        }
    }

    /// Whether the device has usable battery storage.
    pub fn has_battery(&self) -> bool {
        self.battery_capacity_kwh > 0.0
    }

    /// Checks static ratings and configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for empty ids or negative ratings.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::validation("id", "must not be empty"));
        }
        let ratings = [
            ("battery_capacity_kwh", self.battery_capacity_kwh),
            ("solar_capacity_kw", self.solar_capacity_kw),
            ("max_charge_kw", self.max_charge_kw),
            ("max_discharge_kw", self.max_discharge_kw),
            ("ev_max_charge_kw", self.ev_max_charge_kw),
            ("base_load_kw", self.base_load_kw),
        ];
        for (field, value) in ratings {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::validation(
                    field,
                    format!("must be a non-negative number, got {value}"),
                ));
            }
        }
        if !(0.0..=100.0).contains(&self.initial_charge_percent) {
            return Err(EngineError::validation(
                "initial_charge_percent",
                format!("must be in [0, 100], got {}", self.initial_charge_percent),
            ));
        }
        self.configuration.validate()
    }
}
