//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use home_energy_sim::config::ScenarioConfig;
use home_energy_sim::devices::{Device, DeviceKind};
use home_energy_sim::sim::types::{SimConfig, TelemetrySnapshot};
use home_energy_sim::sim::{Engine, TickReport};

/// Id of the battery used by [`single_battery_engine`].
pub const BATTERY_ID: &str = "PW-001";

/// Default engine configuration (1 s ticks, 60x, one simulated minute per
/// tick).
pub fn default_config(seed: u64) -> SimConfig {
    SimConfig::new(1000, 60, seed)
}

/// Home battery with an 8.5 kW array.
pub fn home_battery(id: &str) -> Device {
    let mut device = Device::new(id, DeviceKind::BatteryStorage);
    device.solar_capacity_kw = 8.5;
    device
}

/// Engine holding a single home battery.
pub fn single_battery_engine(seed: u64) -> Engine {
    Engine::with_devices(default_config(seed), [home_battery(BATTERY_ID)])
        .expect("fixture device registers")
}

/// Engine holding the demo fleet.
pub fn demo_engine(seed: u64) -> Engine {
    let mut scenario = ScenarioConfig::demo();
    scenario.simulation.seed = seed;
    Engine::with_devices(scenario.to_sim_config(), scenario.to_devices())
        .expect("demo fleet registers")
}

/// Runs `n` ticks and returns the last report.
pub fn run(engine: &Engine, n: u64) -> TickReport {
    let mut last = TickReport::default();
    for _ in 0..n {
        last = engine.tick();
    }
    last
}

/// Asserts the physical bounds every snapshot must satisfy.
pub fn assert_physical(s: &TelemetrySnapshot) {
    assert!(
        (0.0..=100.0).contains(&s.battery_charge_percent),
        "charge out of range: {s}"
    );
    assert!(
        (0.0..=100.0).contains(&s.state_of_health_percent),
        "health out of range: {s}"
    );
    assert!(s.solar_power_kw >= 0.0, "negative solar: {s}");
    assert!(s.home_power_kw >= 0.0, "negative load: {s}");
    assert!(
        s.balance_residual_kw().abs() <= 1e-3,
        "energy balance residual {}: {s}",
        s.balance_residual_kw()
    );
}
