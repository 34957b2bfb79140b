//! Core simulation types: timing configuration, simulated time, and
//! telemetry snapshots.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::devices::OperationMode;

/// Simulated time in whole seconds since the simulation epoch.
///
/// Distinct from wall-clock time; advanced only by the tick scheduler.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SimTime(pub u64);

impl SimTime {
    /// The simulation epoch.
    pub const ZERO: SimTime = SimTime(0);

    /// Seconds since the epoch.
    pub fn seconds(self) -> u64 {
        self.0
    }

    /// Returns this instant shifted forward by `seconds`, saturating at the
    /// end of representable time.
    pub fn plus_seconds(self, seconds: u64) -> SimTime {
        SimTime(self.0.saturating_add(seconds))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.0;
        let days = total / 86_400;
        let h = (total % 86_400) / 3_600;
        let m = (total % 3_600) / 60;
        let s = total % 60;
        write!(f, "d{days} {h:02}:{m:02}:{s:02}")
    }
}

/// Centralized simulation configuration.
///
/// The engine, scheduler, and model reference this struct for timing
/// parameters and retention limits.
///
/// # Examples
///
/// ```
/// use home_energy_sim::sim::types::SimConfig;
///
/// // One wall second per tick, 60x time scale: one simulated minute per tick.
/// let cfg = SimConfig::new(1000, 60, 42);
/// assert_eq!(cfg.sim_seconds_per_tick, 60);
/// assert!((cfg.dt_hours - 1.0 / 60.0).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct SimConfig {
    /// Master random seed for reproducibility.
    pub seed: u64,
    /// Wall-clock interval between ticks, in milliseconds.
    pub tick_interval_ms: u64,
    /// Simulated seconds per wall-clock second.
    pub time_scale: u64,
    /// Simulated seconds advanced by one tick, derived from the two above.
    pub sim_seconds_per_tick: u64,
    /// Duration of one tick in simulated hours.
    pub dt_hours: f32,
    /// Simulated hour of day at the epoch (0.0 to 24.0).
    pub start_hour: f32,
    /// Snapshots retained per device by the history store.
    pub history_capacity: usize,
    /// Command records retained per device.
    pub command_log_capacity: usize,
    /// Per-subscriber buffer before lagging snapshots are dropped.
    pub broadcast_capacity: usize,
    /// Length of a forced charge (simulated seconds).
    pub force_charge_s: u64,
    /// Offline window after a reboot (simulated seconds).
    pub reboot_delay_s: u64,
    /// Duration of a firmware update (simulated seconds).
    pub firmware_update_s: u64,
}

impl SimConfig {
    /// Creates a configuration with default retention and command timings.
    ///
    /// # Arguments
    ///
    /// * `tick_interval_ms` - Wall-clock tick cadence (must be > 0)
    /// * `time_scale` - Simulated seconds per wall second (must be > 0)
    /// * `seed` - Master random seed
    ///
    /// # Panics
    ///
    /// Panics if either timing argument is zero or a tick would advance
    /// less than one simulated second.
    pub fn new(tick_interval_ms: u64, time_scale: u64, seed: u64) -> Self {
        assert!(tick_interval_ms > 0, "tick_interval_ms must be > 0");
        assert!(time_scale > 0, "time_scale must be > 0");
        let sim_seconds_per_tick = tick_interval_ms.saturating_mul(time_scale) / 1000;
        assert!(
            sim_seconds_per_tick > 0,
            "a tick must advance at least one simulated second"
        );
        Self {
            seed,
            tick_interval_ms,
            time_scale,
            sim_seconds_per_tick,
            dt_hours: sim_seconds_per_tick as f32 / 3600.0,
            start_hour: 6.0,
            history_capacity: 1000,
            command_log_capacity: 50,
            broadcast_capacity: 64,
            force_charge_s: 30 * 60,
            reboot_delay_s: 3 * 60,
            firmware_update_s: 10 * 60,
        }
    }

    /// Wall-clock tick cadence.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Simulated time at the end of tick `tick`.
    pub fn time_at_tick(&self, tick: u64) -> SimTime {
        SimTime(tick.saturating_mul(self.sim_seconds_per_tick))
    }

    /// Simulated hour of day (0.0 to 24.0) at `time`.
    pub fn hour_of_day(&self, time: SimTime) -> f32 {
        let hours = f64::from(self.start_hour) + time.0 as f64 / 3600.0;
        hours.rem_euclid(24.0) as f32
    }
}

/// One immutable telemetry reading for a device at a simulated instant.
///
/// Power sign conventions: battery positive = charging, grid positive =
/// import. Sources equal sinks: `solar + grid = home + battery`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Device that produced this reading.
    pub device_id: String,
    /// Tick index that produced this reading (0 = registration).
    pub tick: u64,
    /// Simulated timestamp.
    pub timestamp: SimTime,
    /// Battery state of charge (0 to 100).
    pub battery_charge_percent: f32,
    /// Battery terminal power (kW; positive = charging).
    pub battery_power_kw: f32,
    /// Solar generation delivered (kW, >= 0).
    pub solar_power_kw: f32,
    /// Grid exchange (kW; positive = import).
    pub grid_power_kw: f32,
    /// Household consumption served (kW, >= 0).
    pub home_power_kw: f32,
    /// Battery cell temperature (°C).
    pub battery_temperature_c: f32,
    /// Battery state of health (0 to 100).
    pub state_of_health_percent: f32,
    /// Equivalent full charge cycles.
    pub cycle_count: u32,
    /// Lifetime battery energy throughput since registration (kWh).
    pub throughput_kwh: f32,
    /// Backup reserve in force when the reading was taken.
    pub backup_reserve_percent: f32,
    /// Operation mode in force when the reading was taken.
    pub operation_mode: OperationMode,
    /// Whether the device was isolated from the grid.
    pub isolated: bool,
    /// Whether household demand exceeded what could be supplied.
    pub under_supply: bool,
}

impl TelemetrySnapshot {
    /// Residual of the energy balance `solar + grid - home - battery` (kW).
    pub fn balance_residual_kw(&self) -> f32 {
        super::power_balance::balance_residual_kw(
            self.solar_power_kw,
            self.grid_power_kw,
            self.home_power_kw,
            self.battery_power_kw,
        )
    }
}

impl fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} t={:>4} ({}) | soc={:>5.1}% bat={:>6.2} kW  solar={:>5.2} kW  \
             grid={:>6.2} kW  home={:>5.2} kW | {:.1}°C soh={:.1}% | {}{}",
            self.device_id,
            self.tick,
            self.timestamp,
            self.battery_charge_percent,
            self.battery_power_kw,
            self.solar_power_kw,
            self.grid_power_kw,
            self.home_power_kw,
            self.battery_temperature_c,
            self.state_of_health_percent,
            self.operation_mode,
            if self.isolated { " [isolated]" } else { "" },
        )
    }
}
