//! Per-device physical model: advances one telemetry snapshot to the next.
//!
//! The model is a pure function of the device, its previous snapshot, its
//! pending effects, and the tick being produced. All randomness comes from
//! a generator seeded by the master seed, the device id, and the tick index.

use rand::rngs::StdRng;

use crate::devices::{Device, DeviceStatus, OperationMode};
use crate::error::{EngineError, Result};

use super::battery::BatteryPack;
use super::effects::{EffectKind, EffectSet};
use super::power_balance::grid_exchange_kw;
use super::profile;
use super::types::{SimConfig, SimTime, TelemetrySnapshot};

/// Tolerance for the energy balance check (kW).
pub const BALANCE_TOLERANCE_KW: f32 = 1e-3;
/// Battery power magnitude below which the battery counts as idle (kW).
const IDLE_KW: f32 = 0.05;
/// Charge percent at or above which the battery counts as full.
const FULL_PERCENT: f32 = 100.0 - 1e-3;

const PEAK_START_HOUR: f32 = 16.0;
const PEAK_END_HOUR: f32 = 21.0;
const OFF_PEAK_START_HOUR: f32 = 22.0;
const OFF_PEAK_END_HOUR: f32 = 6.0;

const AMBIENT_BASE_C: f32 = 22.0;
const AMBIENT_SWING_C: f32 = 3.0;
/// Steady-state heating per kW of battery power (°C/kW).
const HEAT_PER_KW_C: f32 = 0.5;
/// Thermal time constant (hours).
const THERMAL_TAU_H: f32 = 0.5;
const TEMP_MIN_C: f32 = -20.0;
const TEMP_MAX_C: f32 = 60.0;

/// State of health lost per equivalent full cycle (percent).
const SOH_LOSS_PER_CYCLE: f32 = 0.001;
/// Floor below which state of health does not degrade further.
const SOH_FLOOR: f32 = 80.0;

/// The tick a snapshot is being produced for.
#[derive(Debug, Clone, Copy)]
pub struct TickContext<'a> {
    /// Simulation parameters.
    pub config: &'a SimConfig,
    /// Global tick index.
    pub tick: u64,
    /// Simulated time at the end of the tick.
    pub now: SimTime,
    /// Simulated hours covered by the tick.
    pub elapsed_hours: f32,
}

impl<'a> TickContext<'a> {
    /// Context for tick `tick` spanning one configured tick interval.
    pub fn new(config: &'a SimConfig, tick: u64) -> Self {
        Self {
            config,
            tick,
            now: config.time_at_tick(tick),
            elapsed_hours: config.dt_hours,
        }
    }
}

/// Result of advancing one device by one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    /// The new reading.
    pub snapshot: TelemetrySnapshot,
    /// Status derived from the reading.
    pub status: DeviceStatus,
    /// Whether a forced charge has filled the battery and should be removed.
    pub force_charge_complete: bool,
}

/// Whether `hour` falls in the evening tariff peak.
pub fn is_peak(hour: f32) -> bool {
    (PEAK_START_HOUR..PEAK_END_HOUR).contains(&hour)
}

/// Whether `hour` falls in the overnight off-peak window.
pub fn is_off_peak(hour: f32) -> bool {
    hour >= OFF_PEAK_START_HOUR || hour < OFF_PEAK_END_HOUR
}

/// Ambient temperature (°C) at `hour`: coolest at dawn, warmest mid-afternoon.
pub fn ambient_c(hour: f32) -> f32 {
    AMBIENT_BASE_C + AMBIENT_SWING_C * ((hour - 6.0) * std::f32::consts::PI / 12.0).sin()
}

/// State of health (percent) after `cycles` equivalent full cycles.
pub fn state_of_health(cycles: u32) -> f32 {
    (100.0 - cycles as f32 * SOH_LOSS_PER_CYCLE)
        .max(SOH_FLOOR)
        .clamp(0.0, 100.0)
}

fn cycle_count(device: &Device, throughput_kwh: f32) -> u32 {
    if device.battery_capacity_kwh <= 0.0 {
        return device.initial_cycles;
    }
    let full_cycles = (throughput_kwh / (2.0 * device.battery_capacity_kwh)).floor() as u32;
    device.initial_cycles.saturating_add(full_cycles)
}

fn absolute_hour(config: &SimConfig, now: SimTime) -> f64 {
    f64::from(config.start_hour) + now.seconds() as f64 / 3600.0
}

/// Household demand (kW) at `now`, including any EV charging session.
fn demand_kw(device: &Device, ctx: &TickContext<'_>, hour: f32, rng: &mut StdRng) -> f32 {
    let mut home = profile::home_kw(device.base_load_kw, hour, rng);
    if device.ev_max_charge_kw > 0.0 {
        home += profile::ev_kw(
            ctx.config.seed,
            &device.id,
            absolute_hour(ctx.config, ctx.now),
            device.ev_max_charge_kw,
        );
    }
    home
}

/// Battery power chosen by the operation mode (kW; positive = charging).
fn mode_dispatch_kw(
    mode: OperationMode,
    surplus_kw: f32,
    hour: f32,
    grid_charging: bool,
    charge_limit_kw: f32,
    discharge_limit_kw: f32,
) -> f32 {
    let absorb = surplus_kw.max(0.0).min(charge_limit_kw);
    let cover = (-surplus_kw).max(0.0).min(discharge_limit_kw);
    let self_powered = if surplus_kw >= 0.0 { absorb } else { -cover };
    let top_up = grid_charging && is_off_peak(hour);

    match mode {
        OperationMode::SelfPowered => self_powered,
        OperationMode::Backup => {
            if grid_charging {
                charge_limit_kw
            } else {
                absorb
            }
        }
        OperationMode::TimeBased => {
            if is_peak(hour) {
                self_powered
            } else if top_up {
                charge_limit_kw
            } else {
                absorb
            }
        }
        OperationMode::Advanced => {
            if top_up {
                charge_limit_kw
            } else {
                self_powered
            }
        }
    }
}

fn derive_status(
    current: DeviceStatus,
    under_supply: bool,
    forced: bool,
    battery_kw: f32,
) -> DeviceStatus {
    match current {
        DeviceStatus::Offline | DeviceStatus::Updating | DeviceStatus::Standby => current,
        _ if under_supply => DeviceStatus::Fault,
        _ if forced => DeviceStatus::Charging,
        _ if battery_kw < -IDLE_KW => DeviceStatus::Discharging,
        _ => DeviceStatus::Online,
    }
}

/// Battery power of an islanded device: absorb surplus, cover shortfall.
/// Off grid the battery may use its whole charge, reserve included.
fn islanded_battery_kw(surplus_kw: f32, charge_limit_kw: f32, discharge_limit_kw: f32) -> f32 {
    if surplus_kw >= 0.0 {
        surplus_kw.min(charge_limit_kw)
    } else {
        -(-surplus_kw).min(discharge_limit_kw)
    }
}

/// Delivered solar after curtailment, and whether demand goes unmet, for an
/// islanded device.
fn islanded_supply(solar_available_kw: f32, home_kw: f32, battery_kw: f32) -> (f32, bool) {
    let solar = if solar_available_kw > home_kw {
        home_kw + battery_kw.max(0.0)
    } else {
        solar_available_kw
    };
    let supplied = solar + (-battery_kw).max(0.0);
    (solar, supplied + BALANCE_TOLERANCE_KW < home_kw)
}

fn violation(device_id: &str, message: String) -> EngineError {
    EngineError::SimulationInvariantViolation {
        device_id: device_id.to_string(),
        message,
    }
}

/// Checks physical bounds and, outside isolation, the energy balance.
///
/// # Errors
///
/// Returns [`EngineError::SimulationInvariantViolation`] describing the
/// first violated bound.
pub fn check_invariants(snapshot: &TelemetrySnapshot) -> Result<()> {
    let id = snapshot.device_id.as_str();
    let fields = [
        ("battery_charge_percent", snapshot.battery_charge_percent),
        ("battery_power_kw", snapshot.battery_power_kw),
        ("solar_power_kw", snapshot.solar_power_kw),
        ("grid_power_kw", snapshot.grid_power_kw),
        ("home_power_kw", snapshot.home_power_kw),
        ("battery_temperature_c", snapshot.battery_temperature_c),
        ("state_of_health_percent", snapshot.state_of_health_percent),
    ];
    if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
        return Err(violation(id, format!("{name} is not finite ({value})")));
    }
    if !(0.0..=100.0).contains(&snapshot.battery_charge_percent) {
        return Err(violation(
            id,
            format!("charge {} outside [0, 100]", snapshot.battery_charge_percent),
        ));
    }
    if !(0.0..=100.0).contains(&snapshot.state_of_health_percent) {
        return Err(violation(
            id,
            format!(
                "state of health {} outside [0, 100]",
                snapshot.state_of_health_percent
            ),
        ));
    }
    if snapshot.solar_power_kw < 0.0 || snapshot.home_power_kw < 0.0 {
        return Err(violation(id, "negative solar or home power".to_string()));
    }
    if snapshot.isolated {
        if snapshot.grid_power_kw != 0.0 {
            return Err(violation(id, "grid exchange while isolated".to_string()));
        }
    } else {
        let residual = snapshot.balance_residual_kw();
        if residual.abs() > BALANCE_TOLERANCE_KW {
            return Err(violation(id, format!("energy balance off by {residual} kW")));
        }
    }
    Ok(())
}

/// Builds the reading taken when a device is registered at tick `tick`.
///
/// The battery is idle; grid exchange balances household demand against
/// solar generation.
pub fn initial_snapshot(device: &Device, config: &SimConfig, tick: u64) -> TelemetrySnapshot {
    let ctx = TickContext::new(config, tick);
    let hour = config.hour_of_day(ctx.now);
    let mut rng = profile::tick_rng(config.seed, &device.id, tick);
    let solar = profile::solar_kw(device.solar_capacity_kw, hour, &mut rng);
    let home = demand_kw(device, &ctx, hour, &mut rng);

    TelemetrySnapshot {
        device_id: device.id.clone(),
        tick,
        timestamp: ctx.now,
        battery_charge_percent: device.initial_charge_percent.clamp(0.0, 100.0),
        battery_power_kw: 0.0,
        solar_power_kw: solar,
        grid_power_kw: grid_exchange_kw(home, solar, 0.0),
        home_power_kw: home,
        battery_temperature_c: ambient_c(hour),
        state_of_health_percent: state_of_health(device.initial_cycles),
        cycle_count: device.initial_cycles,
        throughput_kwh: 0.0,
        backup_reserve_percent: device.configuration.backup_reserve_percent,
        operation_mode: device.configuration.operation_mode,
        isolated: false,
        under_supply: false,
    }
}

/// Re-dispatches `latest` as if the device had just been cut off from the
/// grid.
///
/// Solar and demand are those already sampled for the reading; the grid
/// term moves into the battery, into solar curtailment, or into unmet
/// demand. No time passes, so charge, temperature and throughput are
/// unchanged.
pub fn islanded_reading(
    device: &Device,
    latest: &TelemetrySnapshot,
    dt_hours: f32,
) -> ModelOutput {
    let pack = BatteryPack::from_device(device);
    let soc = latest.battery_charge_percent.clamp(0.0, 100.0);
    let solar_available = latest.solar_power_kw;
    let home = latest.home_power_kw;

    let battery_kw = if !device.has_battery() || device.status == DeviceStatus::Standby {
        0.0
    } else {
        islanded_battery_kw(
            solar_available - home,
            pack.charge_limit_kw(soc, dt_hours),
            pack.discharge_limit_kw(soc, 0.0, dt_hours),
        )
    };
    let (solar, under_supply) = islanded_supply(solar_available, home, battery_kw);

    let snapshot = TelemetrySnapshot {
        battery_power_kw: battery_kw,
        solar_power_kw: solar,
        grid_power_kw: 0.0,
        isolated: true,
        under_supply,
        ..latest.clone()
    };
    let status = derive_status(device.status, under_supply, false, battery_kw);
    ModelOutput {
        snapshot,
        status,
        force_charge_complete: false,
    }
}

/// Advances `device` from `previous` by one tick under `effects`.
///
/// # Power Flow
///
/// 1. Sample solar availability and household demand for the tick
/// 2. Choose battery power: forced charge, isolation, or operation mode
/// 3. Under isolation, curtail unusable solar and flag unmet demand
/// 4. Grid exchange balances the rest (zero when isolated)
/// 5. Integrate charge, temperature, throughput, and health
///
/// # Errors
///
/// Returns [`EngineError::SimulationInvariantViolation`] when the new
/// reading breaks a physical bound; the caller decides how to degrade.
pub fn advance(
    device: &Device,
    previous: &TelemetrySnapshot,
    effects: &EffectSet,
    ctx: &TickContext<'_>,
) -> Result<ModelOutput> {
    let config = ctx.config;
    let dt = ctx.elapsed_hours;
    let hour = config.hour_of_day(ctx.now);
    let mut rng = profile::tick_rng(config.seed, &device.id, ctx.tick);

    let solar_available = profile::solar_kw(device.solar_capacity_kw, hour, &mut rng);
    let home = demand_kw(device, ctx, hour, &mut rng);

    let pack = BatteryPack::from_device(device);
    let soc = previous.battery_charge_percent.clamp(0.0, 100.0);
    let reserve = device.configuration.backup_reserve_percent;
    let isolated = effects.is_active(EffectKind::Isolate);
    // Isolation overrides a forced charge; the grid cannot feed it.
    let forced = !isolated && effects.is_active(EffectKind::ForceCharge) && soc < FULL_PERCENT;

    let charge_limit = pack.charge_limit_kw(soc, dt);
    let surplus = solar_available - home;

    let battery_kw = if !device.has_battery() || device.status == DeviceStatus::Standby {
        0.0
    } else if isolated {
        islanded_battery_kw(surplus, charge_limit, pack.discharge_limit_kw(soc, 0.0, dt))
    } else if forced {
        charge_limit
    } else {
        mode_dispatch_kw(
            device.configuration.operation_mode,
            surplus,
            hour,
            device.configuration.grid_charging_enabled,
            charge_limit,
            pack.discharge_limit_kw(soc, reserve, dt),
        )
    };

    let (solar, grid, under_supply) = if isolated {
        let (solar, under_supply) = islanded_supply(solar_available, home, battery_kw);
        (solar, 0.0, under_supply)
    } else {
        (
            solar_available,
            grid_exchange_kw(home, solar_available, battery_kw),
            false,
        )
    };

    let new_soc = pack.integrate(soc, battery_kw, dt);

    let target_c = ambient_c(hour) + HEAT_PER_KW_C * battery_kw.abs();
    let alpha = 1.0 - (-dt / THERMAL_TAU_H).exp();
    let temperature = (previous.battery_temperature_c
        + (target_c - previous.battery_temperature_c) * alpha)
        .clamp(TEMP_MIN_C, TEMP_MAX_C);

    let throughput = previous.throughput_kwh + battery_kw.abs() * dt;
    let cycles = cycle_count(device, throughput).max(previous.cycle_count);
    let soh = state_of_health(cycles).min(previous.state_of_health_percent);

    let snapshot = TelemetrySnapshot {
        device_id: device.id.clone(),
        tick: ctx.tick,
        timestamp: ctx.now,
        battery_charge_percent: new_soc,
        battery_power_kw: battery_kw,
        solar_power_kw: solar,
        grid_power_kw: grid,
        home_power_kw: home,
        battery_temperature_c: temperature,
        state_of_health_percent: soh,
        cycle_count: cycles,
        throughput_kwh: throughput,
        backup_reserve_percent: reserve,
        operation_mode: device.configuration.operation_mode,
        isolated,
        under_supply,
    };
    check_invariants(&snapshot)?;

    let force_charge_complete =
        effects.is_active(EffectKind::ForceCharge) && new_soc >= FULL_PERCENT;
    let status = derive_status(
        device.status,
        under_supply,
        forced && !force_charge_complete,
        battery_kw,
    );

    Ok(ModelOutput {
        snapshot,
        status,
        force_charge_complete,
    })
}
