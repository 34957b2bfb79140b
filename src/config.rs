//! TOML-based scenario configuration and preset definitions.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::devices::{Configuration, Device, DeviceKind, DeviceStatus};
use crate::error::EngineError;
use crate::sim::types::SimConfig;

/// Top-level scenario configuration parsed from TOML.
///
/// Every field has a default matching the `demo` preset. Load from TOML
/// with [`ScenarioConfig::from_toml_file`] or use [`ScenarioConfig::demo`]
/// for the built-in default.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Simulation timing and retention parameters.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Devices registered at startup.
    #[serde(default = "demo_devices")]
    pub devices: Vec<DeviceConfig>,
}

/// Simulation timing and retention parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Master random seed.
    pub seed: u64,
    /// Wall-clock interval between ticks (ms, must be > 0).
    pub tick_interval_ms: u64,
    /// Simulated seconds per wall-clock second (must be > 0).
    pub time_scale: u64,
    /// Simulated hour of day at startup (0.0 to 24.0).
    pub start_hour: f32,
    /// Snapshots retained per device.
    pub history_capacity: usize,
    /// Command records retained per device.
    pub command_log_capacity: usize,
    /// Buffered snapshots per live subscriber.
    pub broadcast_capacity: usize,
    /// Offline window after a reboot (simulated seconds).
    pub reboot_delay_s: u64,
    /// Duration of a firmware update (simulated seconds).
    pub firmware_update_s: u64,
    /// Length of a forced charge (simulated seconds).
    pub force_charge_s: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            tick_interval_ms: 1000,
            time_scale: 60,
            start_hour: 6.0,
            history_capacity: 1000,
            command_log_capacity: 50,
            broadcast_capacity: 64,
            reboot_delay_s: 3 * 60,
            firmware_update_s: 10 * 60,
            force_charge_s: 30 * 60,
        }
    }
}

/// One device entry. Ratings left unset take the typical values for the
/// device kind.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// Unique device id.
    pub id: String,
    /// Hardware category.
    pub kind: DeviceKind,
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub battery_capacity_kwh: Option<f32>,
    #[serde(default)]
    pub solar_capacity_kw: Option<f32>,
    #[serde(default)]
    pub max_charge_kw: Option<f32>,
    #[serde(default)]
    pub max_discharge_kw: Option<f32>,
    #[serde(default)]
    pub ev_max_charge_kw: Option<f32>,
    #[serde(default)]
    pub base_load_kw: Option<f32>,
    #[serde(default)]
    pub initial_charge_percent: Option<f32>,
    #[serde(default)]
    pub initial_cycles: Option<u32>,
    #[serde(default)]
    pub status: Option<DeviceStatus>,
    #[serde(default)]
    pub configuration: Option<Configuration>,
}

impl DeviceConfig {
    /// Entry of `kind` with every rating left at its typical value.
    pub fn new(id: &str, kind: DeviceKind) -> Self {
        Self {
            id: id.to_string(),
            kind,
            serial: None,
            model: None,
            location: None,
            battery_capacity_kwh: None,
            solar_capacity_kw: None,
            max_charge_kw: None,
            max_discharge_kw: None,
            ev_max_charge_kw: None,
            base_load_kw: None,
            initial_charge_percent: None,
            initial_cycles: None,
            status: None,
            configuration: None,
        }
    }

    /// Builds the device, filling unset fields from [`Device::new`].
    pub fn to_device(&self) -> Device {
        let mut d = Device::new(self.id.clone(), self.kind);
        if let Some(serial) = &self.serial {
            d.serial = serial.clone();
        }
        if let Some(model) = &self.model {
            d.model = model.clone();
        }
        d.location = self.location.clone();
        if let Some(capacity) = self.battery_capacity_kwh {
            d.battery_capacity_kwh = capacity;
            // A battery added to a kind without one gets the usual rating.
            if capacity > 0.0 && d.max_charge_kw == 0.0 {
                d.max_charge_kw = 5.0;
                d.max_discharge_kw = 5.0;
            }
        }
        d.solar_capacity_kw = self.solar_capacity_kw.unwrap_or(d.solar_capacity_kw);
        d.max_charge_kw = self.max_charge_kw.unwrap_or(d.max_charge_kw);
        d.max_discharge_kw = self.max_discharge_kw.unwrap_or(d.max_discharge_kw);
        d.ev_max_charge_kw = self.ev_max_charge_kw.unwrap_or(d.ev_max_charge_kw);
        d.base_load_kw = self.base_load_kw.unwrap_or(d.base_load_kw);
        d.initial_charge_percent = self
            .initial_charge_percent
            .unwrap_or(d.initial_charge_percent);
        d.initial_cycles = self.initial_cycles.unwrap_or(d.initial_cycles);
        d.status = self.status.unwrap_or(d.status);
        if let Some(cfg) = &self.configuration {
            d.configuration = cfg.clone();
        }
        d
    }
}

fn demo_devices() -> Vec<DeviceConfig> {
    vec![
        DeviceConfig {
            serial: Some("SN123456789".to_string()),
            model: Some("Powerwall 1".to_string()),
            location: Some("Garage".to_string()),
            solar_capacity_kw: Some(8.5),
            initial_charge_percent: Some(75.0),
            initial_cycles: Some(150),
            ..DeviceConfig::new("PW-001-ABC123", DeviceKind::BatteryStorage)
        },
        DeviceConfig {
            serial: Some("SN987654321".to_string()),
            location: Some("Basement".to_string()),
            solar_capacity_kw: Some(12.0),
            initial_charge_percent: Some(60.0),
            initial_cycles: Some(320),
            ..DeviceConfig::new("PW-002-XYZ789", DeviceKind::BatteryStorage)
        },
        DeviceConfig {
            serial: Some("SN-SOLAR-001".to_string()),
            location: Some("Roof".to_string()),
            ..DeviceConfig::new("SI-001-SOLAR1", DeviceKind::SolarInverter)
        },
        DeviceConfig {
            serial: Some("SN-WC-001".to_string()),
            location: Some("Driveway".to_string()),
            ..DeviceConfig::new("WC-001-EVCHG1", DeviceKind::EvConnector)
        },
    ]
}

/// Configuration error with field path and constraint description.
#[derive(Debug, thiserror::Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"simulation.time_scale"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Prefixes the field of a validation error with `prefix`.
    fn from_engine(prefix: &str, err: EngineError) -> Self {
        match err {
            EngineError::Validation { field, message } => {
                Self::new(format!("{prefix}.{field}"), message)
            }
            other => Self::new(prefix, other.to_string()),
        }
    }
}

impl ScenarioConfig {
    /// Returns the demo fleet: two home batteries, a solar inverter, and an
    /// EV wall connector.
    pub fn demo() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            devices: demo_devices(),
        }
    }

    /// Returns a single home battery with an 8.5 kW array.
    pub fn single() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            devices: vec![DeviceConfig {
                solar_capacity_kw: Some(8.5),
                ..DeviceConfig::new("PW-001", DeviceKind::BatteryStorage)
            }],
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["demo", "single"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "demo" => Ok(Self::demo()),
            "single" => Ok(Self::single()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let s = &self.simulation;

        if s.tick_interval_ms == 0 {
            errors.push(ConfigError::new("simulation.tick_interval_ms", "must be > 0"));
        }
        if s.time_scale == 0 {
            errors.push(ConfigError::new("simulation.time_scale", "must be > 0"));
        }
        if s.tick_interval_ms > 0
            && s.time_scale > 0
            && s.tick_interval_ms.saturating_mul(s.time_scale) < 1000
        {
            errors.push(ConfigError::new(
                "simulation.time_scale",
                "a tick must advance at least one simulated second",
            ));
        }
        if !(0.0..24.0).contains(&s.start_hour) {
            errors.push(ConfigError::new("simulation.start_hour", "must be in [0, 24)"));
        }
        for (field, value) in [
            ("simulation.history_capacity", s.history_capacity),
            ("simulation.command_log_capacity", s.command_log_capacity),
            ("simulation.broadcast_capacity", s.broadcast_capacity),
        ] {
            if value == 0 {
                errors.push(ConfigError::new(field, "must be > 0"));
            }
        }

        if self.devices.is_empty() {
            errors.push(ConfigError::new("devices", "at least one device is required"));
        }
        let mut seen = HashSet::new();
        for (i, dc) in self.devices.iter().enumerate() {
            let prefix = format!("devices[{i}]");
            if !seen.insert(dc.id.as_str()) {
                errors.push(ConfigError::new(
                    format!("{prefix}.id"),
                    format!("duplicate device id \"{}\"", dc.id),
                ));
            }
            let device = dc.to_device();
            if let Err(e) = device.configuration.validate() {
                errors.push(ConfigError::from_engine(&format!("{prefix}.configuration"), e));
            } else if let Err(e) = device.validate() {
                errors.push(ConfigError::from_engine(&prefix, e));
            }
        }

        errors
    }

    /// Engine configuration for this scenario.
    ///
    /// # Panics
    ///
    /// Panics on timing values that [`validate`](Self::validate) rejects.
    pub fn to_sim_config(&self) -> SimConfig {
        let s = &self.simulation;
        let mut cfg = SimConfig::new(s.tick_interval_ms, s.time_scale, s.seed);
        cfg.start_hour = s.start_hour;
        cfg.history_capacity = s.history_capacity;
        cfg.command_log_capacity = s.command_log_capacity;
        cfg.broadcast_capacity = s.broadcast_capacity;
        cfg.reboot_delay_s = s.reboot_delay_s;
        cfg.firmware_update_s = s.firmware_update_s;
        cfg.force_charge_s = s.force_charge_s;
        cfg
    }

    /// Devices to register, in file order.
    pub fn to_devices(&self) -> Vec<Device> {
        self.devices.iter().map(DeviceConfig::to_device).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::OperationMode;

    #[test]
    fn presets_valid() {
        for name in ScenarioConfig::PRESETS {
            let cfg = ScenarioConfig::from_preset(name).unwrap();
            let errors = cfg.validate();
            assert!(errors.is_empty(), "{name} should be valid: {errors:?}");
        }
    }

    #[test]
    fn demo_fleet_shape() {
        let devices = ScenarioConfig::demo().to_devices();
        assert_eq!(devices.len(), 4);
        assert_eq!(devices[0].id, "PW-001-ABC123");
        assert_eq!(devices[0].solar_capacity_kw, 8.5);
        assert_eq!(devices[2].kind, DeviceKind::SolarInverter);
        assert!(!devices[2].has_battery());
        assert_eq!(devices[3].ev_max_charge_kw, 7.2);
    }

    #[test]
    fn from_preset_unknown() {
        let e = ScenarioConfig::from_preset("nonexistent").unwrap_err();
        assert!(e.message.contains("unknown preset"));
    }

    #[test]
    fn valid_toml_parses() {
        let toml = r#"
[simulation]
seed = 7
tick_interval_ms = 500
time_scale = 120

[[devices]]
id = "PW-9"
kind = "battery-storage"
solar_capacity_kw = 6.0
initial_charge_percent = 80.0

[devices.configuration]
backup_reserve_percent = 30.0
operation_mode = "time-based"

[[devices]]
id = "SI-9"
kind = "solar-inverter"
"#;
        let cfg = ScenarioConfig::from_toml_str(toml).unwrap();
        assert!(cfg.validate().is_empty());
        let sim = cfg.to_sim_config();
        assert_eq!(sim.seed, 7);
        assert_eq!(sim.sim_seconds_per_tick, 60);
        let devices = cfg.to_devices();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].battery_capacity_kwh, 13.5);
        assert_eq!(devices[0].configuration.operation_mode, OperationMode::TimeBased);
        assert_eq!(devices[0].configuration.firmware_version, "23.44.1");
    }

    #[test]
    fn missing_devices_default_to_demo() {
        let cfg = ScenarioConfig::from_toml_str("[simulation]\nseed = 1\n").unwrap();
        assert_eq!(cfg.devices.len(), 4);
    }

    #[test]
    fn invalid_toml_unknown_field() {
        let toml = r#"
[simulation]
seed = 1
bogus_field = true
"#;
        assert!(ScenarioConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn validation_reports_every_violation() {
        let mut cfg = ScenarioConfig::demo();
        cfg.simulation.time_scale = 0;
        cfg.simulation.history_capacity = 0;
        cfg.devices[1].id = cfg.devices[0].id.clone();
        cfg.devices[2].solar_capacity_kw = Some(-1.0);
        cfg.devices[3].configuration = Some(Configuration {
            backup_reserve_percent: 150.0,
            ..Configuration::default()
        });
        let fields: Vec<_> = cfg.validate().into_iter().map(|e| e.field).collect();
        assert!(fields.contains(&"simulation.time_scale".to_string()));
        assert!(fields.contains(&"simulation.history_capacity".to_string()));
        assert!(fields.contains(&"devices[1].id".to_string()));
        assert!(fields.contains(&"devices[2].solar_capacity_kw".to_string()));
        assert!(
            fields.contains(&"devices[3].configuration.backup_reserve_percent".to_string())
        );
    }

    #[test]
    fn sub_second_tick_rejected() {
        let mut cfg = ScenarioConfig::single();
        cfg.simulation.tick_interval_ms = 100;
        cfg.simulation.time_scale = 5;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "simulation.time_scale"));
    }
}
