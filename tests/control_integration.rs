//! Integration tests for control commands observed through telemetry.

mod common;

use common::BATTERY_ID;
use home_energy_sim::EngineError;
use home_energy_sim::control::CommandStatus;
use home_energy_sim::devices::{Configuration, DeviceStatus, OperationMode};
use serde_json::{Value, json};

#[test]
fn isolation_zeroes_grid_immediately() {
    let engine = common::single_battery_engine(42);
    // Midday: the home exports surplus solar.
    common::run(&engine, 360);
    let before = engine.latest_snapshot(BATTERY_ID).unwrap();
    assert!(before.grid_power_kw < 0.0, "{before}");

    engine
        .apply(BATTERY_ID, "isolate-from-grid", &Value::Null)
        .unwrap();

    let s = engine.latest_snapshot(BATTERY_ID).unwrap();
    assert!(s.isolated);
    assert_eq!(s.grid_power_kw, 0.0);
    assert_eq!(s.timestamp, before.timestamp);
    // The re-dispatched reading replaces the latest one, not the history.
    let history = engine.query(BATTERY_ID, None, None, None).unwrap();
    assert_eq!(history.last(), Some(&before));

    for _ in 0..120 {
        engine.tick();
        let s = engine.latest_snapshot(BATTERY_ID).unwrap();
        assert!(s.isolated);
        assert_eq!(s.grid_power_kw, 0.0);
    }

    engine.apply(BATTERY_ID, "rejoin-grid", &Value::Null).unwrap();
    engine.tick();
    assert!(!engine.latest_snapshot(BATTERY_ID).unwrap().isolated);
}

#[test]
fn isolated_device_cannot_force_charge() {
    let engine = common::single_battery_engine(42);
    // 20:00, no solar.
    common::run(&engine, 840);
    engine
        .apply(BATTERY_ID, "isolate-from-grid", &Value::Null)
        .unwrap();
    let err = engine
        .apply(BATTERY_ID, "charge-now", &Value::Null)
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    engine.tick();
    let s = engine.latest_snapshot(BATTERY_ID).unwrap();
    assert_eq!(s.grid_power_kw, 0.0);
    assert_ne!(engine.get_device(BATTERY_ID).unwrap().status, DeviceStatus::Charging);
}

#[test]
fn isolation_ends_forced_charge() {
    let engine = common::single_battery_engine(42);
    engine.apply(BATTERY_ID, "charge-now", &Value::Null).unwrap();
    common::run(&engine, 3);
    let outcome = engine
        .apply(BATTERY_ID, "isolate-from-grid", &Value::Null)
        .unwrap();
    assert_ne!(outcome.device.status, DeviceStatus::Charging);

    common::run(&engine, 5);
    assert_ne!(engine.get_device(BATTERY_ID).unwrap().status, DeviceStatus::Charging);
    let s = engine.latest_snapshot(BATTERY_ID).unwrap();
    assert_eq!(s.grid_power_kw, 0.0);

    // Rejoining does not resume the cancelled charge.
    engine.apply(BATTERY_ID, "rejoin-grid", &Value::Null).unwrap();
    engine.tick();
    assert_ne!(engine.get_device(BATTERY_ID).unwrap().status, DeviceStatus::Charging);
}

#[test]
fn charge_now_charges_at_rated_power() {
    let engine = common::single_battery_engine(42);
    let outcome = engine.apply(BATTERY_ID, "charge-now", &Value::Null).unwrap();
    assert_eq!(outcome.device.status, DeviceStatus::Charging);
    assert_eq!(outcome.record.status, CommandStatus::Completed);

    let before = engine.latest_snapshot(BATTERY_ID).unwrap();
    engine.tick();
    let after = engine.latest_snapshot(BATTERY_ID).unwrap();
    assert!((after.battery_power_kw - 5.0).abs() < 1e-4, "{after}");
    assert!(after.battery_charge_percent > before.battery_charge_percent);
    common::assert_physical(&after);
    assert_eq!(engine.get_device(BATTERY_ID).unwrap().status, DeviceStatus::Charging);

    // Already charging.
    let err = engine.apply(BATTERY_ID, "charge-now", &Value::Null).unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
}

#[test]
fn stop_charging_returns_to_mode_dispatch() {
    let engine = common::single_battery_engine(42);
    let err = engine
        .apply(BATTERY_ID, "stop-charging", &Value::Null)
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    engine.apply(BATTERY_ID, "charge-now", &Value::Null).unwrap();
    common::run(&engine, 3);
    let outcome = engine
        .apply(BATTERY_ID, "stop-charging", &Value::Null)
        .unwrap();
    assert_eq!(outcome.device.status, DeviceStatus::Online);

    engine.tick();
    let device = engine.get_device(BATTERY_ID).unwrap();
    assert_ne!(device.status, DeviceStatus::Charging);
}

#[test]
fn forced_charge_ends_after_window() {
    let engine = common::single_battery_engine(42);
    engine.apply(BATTERY_ID, "charge-now", &Value::Null).unwrap();
    common::run(&engine, 29);
    assert_eq!(engine.get_device(BATTERY_ID).unwrap().status, DeviceStatus::Charging);
    common::run(&engine, 2);
    assert_ne!(engine.get_device(BATTERY_ID).unwrap().status, DeviceStatus::Charging);
}

#[test]
fn out_of_range_reserve_rejected_without_change() {
    let engine = common::single_battery_engine(42);
    let err = engine
        .apply(BATTERY_ID, "set-backup-reserve", &json!({ "percent": 150 }))
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation { .. }));
    let device = engine.get_device(BATTERY_ID).unwrap();
    assert_eq!(device.configuration.backup_reserve_percent, 20.0);
    assert_eq!(engine.command_history(BATTERY_ID, 10).unwrap().total, 0);
}

#[test]
fn unknown_device_everywhere() {
    let engine = common::single_battery_engine(42);
    let err = engine
        .apply("GHOST", "set-backup-reserve", &json!({ "percent": 150 }))
        .unwrap_err();
    assert_eq!(err, EngineError::UnknownDevice("GHOST".to_string()));
    assert!(engine.get_device("GHOST").is_err());
    assert!(engine.latest_snapshot("GHOST").is_err());
    assert!(engine.command_history("GHOST", 5).is_err());
    assert!(engine.query("GHOST", None, None, None).is_err());
    assert!(engine.subscribe("GHOST").is_err());
}

#[test]
fn unknown_command_rejected() {
    let engine = common::single_battery_engine(42);
    let err = engine
        .apply(BATTERY_ID, "launch", &Value::Null)
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidCommand(_)));
}

#[test]
fn mode_change_shows_on_next_snapshot() {
    let engine = common::single_battery_engine(42);
    engine
        .apply(BATTERY_ID, "set-operation-mode", &json!({ "mode": "backup" }))
        .unwrap();
    engine.tick();
    let s = engine.latest_snapshot(BATTERY_ID).unwrap();
    assert_eq!(s.operation_mode, OperationMode::Backup);
    assert!(s.battery_power_kw >= 0.0, "backup mode discharged: {s}");
}

#[test]
fn reboot_freezes_telemetry_then_recovers() {
    let engine = common::single_battery_engine(42);
    common::run(&engine, 5);
    let outcome = engine.apply(BATTERY_ID, "reboot", &Value::Null).unwrap();
    assert_eq!(outcome.record.status, CommandStatus::InProgress);
    assert_eq!(outcome.device.status, DeviceStatus::Offline);

    let frozen = engine.latest_snapshot(BATTERY_ID).unwrap();
    common::run(&engine, 2);
    assert_eq!(engine.latest_snapshot(BATTERY_ID).unwrap(), frozen);
    let err = engine
        .apply(BATTERY_ID, "charge-now", &Value::Null)
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    common::run(&engine, 1);
    assert!(engine.get_device(BATTERY_ID).unwrap().status.is_online());
    assert_eq!(engine.latest_snapshot(BATTERY_ID).unwrap().tick, 8);
}

#[test]
fn firmware_update_installs_version() {
    let engine = common::single_battery_engine(42);
    engine
        .apply(BATTERY_ID, "firmware-update", &json!({ "version": "24.4.0" }))
        .unwrap();
    assert_eq!(engine.get_device(BATTERY_ID).unwrap().status, DeviceStatus::Updating);
    common::run(&engine, 10);
    let device = engine.get_device(BATTERY_ID).unwrap();
    assert_eq!(device.configuration.firmware_version, "24.4.0");
    assert!(device.status.is_online());
}

#[test]
fn firmware_update_runs_to_completion() {
    let engine = common::single_battery_engine(42);
    engine
        .apply(BATTERY_ID, "firmware-update", &json!({ "version": "24.4.0" }))
        .unwrap();
    for command in ["reboot", "charge-now"] {
        let err = engine
            .apply(BATTERY_ID, command, &Value::Null)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)), "{command}");
    }

    // 600 s at one simulated minute per tick.
    common::run(&engine, 4);
    let device = engine.get_device(BATTERY_ID).unwrap();
    assert_eq!(device.status, DeviceStatus::Updating);
    assert_eq!(device.configuration.firmware_version, "23.44.1");

    common::run(&engine, 6);
    let device = engine.get_device(BATTERY_ID).unwrap();
    assert_eq!(device.configuration.firmware_version, "24.4.0");
    assert!(device.status.is_online());
    assert_eq!(engine.command_history(BATTERY_ID, 10).unwrap().total, 1);
}

#[test]
fn configuration_update_is_logged() {
    let engine = common::single_battery_engine(42);
    let cfg = Configuration {
        backup_reserve_percent: 35.0,
        operation_mode: OperationMode::Advanced,
        grid_charging_enabled: true,
        ..Configuration::default()
    };
    engine.update_configuration(BATTERY_ID, cfg.clone()).unwrap();
    assert_eq!(engine.get_device(BATTERY_ID).unwrap().configuration, cfg);

    let history = engine.command_history(BATTERY_ID, 10).unwrap();
    assert_eq!(history.total, 1);
    assert_eq!(history.commands[0].command, "update-configuration");

    let bad = Configuration {
        backup_reserve_percent: -1.0,
        ..Configuration::default()
    };
    assert!(matches!(
        engine.update_configuration(BATTERY_ID, bad),
        Err(EngineError::Validation { .. })
    ));
    assert_eq!(engine.get_device(BATTERY_ID).unwrap().configuration, cfg);
}

#[test]
fn command_history_keeps_most_recent() {
    let engine = common::single_battery_engine(42);
    for percent in 0..60 {
        engine
            .apply(BATTERY_ID, "set-backup-reserve", &json!({ "percent": percent }))
            .unwrap();
    }
    let history = engine.command_history(BATTERY_ID, 5).unwrap();
    assert_eq!(history.commands.len(), 5);
    assert_eq!(history.total, 50);
    assert_eq!(history.commands[4].parameters, json!({ "percent": 59.0 }));
    assert_eq!(history.commands[4].command_id, "CMD-PW-001-60");
}
