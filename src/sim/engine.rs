//! Simulation engine that owns the registry, history, and broadcast hub and
//! advances every device once per tick.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::control::{Command, CommandOutcome, CommandProcessor, CommandRecord};
use crate::devices::registry::lock;
use crate::devices::{
    Configuration, Device, DeviceHandle, DeviceState, DeviceStatus, Registry, TickPhase,
};
use crate::error::{EngineError, Result};
use crate::history::HistoryStore;
use crate::hub::{BroadcastHub, Subscription};

use super::clock::SimClock;
use super::effects::EffectKind;
use super::model::{self, TickContext};
use super::types::{SimConfig, SimTime, TelemetrySnapshot};

/// Summary of one tick across all devices.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    /// Tick index.
    pub tick: u64,
    /// Simulated time at the end of the tick.
    pub time: SimTime,
    /// Devices that produced a snapshot.
    pub produced: usize,
    /// Devices skipped because they were offline.
    pub frozen: usize,
    /// Devices whose model step failed this tick.
    pub faulted: Vec<String>,
}

/// Most recent command records of a device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandHistory {
    /// Device the records belong to.
    pub device_id: String,
    /// Records, oldest first.
    pub commands: Vec<CommandRecord>,
    /// Records retained in total.
    pub total: usize,
}

enum DeviceTick {
    Produced,
    Frozen,
    Faulted(String),
}

/// The device telemetry simulation and control-state engine.
///
/// Constructed once at start-up and shared behind an `Arc` by the tick
/// scheduler and every caller. All methods take `&self`; per-device state
/// is guarded by the device's own mutex.
#[derive(Debug)]
pub struct Engine {
    config: SimConfig,
    clock: SimClock,
    registry: Registry,
    processor: CommandProcessor,
    history: HistoryStore,
    hub: BroadcastHub,
}

impl Engine {
    /// Creates an engine with no devices.
    pub fn new(config: SimConfig) -> Self {
        Self {
            clock: SimClock::new(&config),
            registry: Registry::new(),
            processor: CommandProcessor::new(&config),
            history: HistoryStore::new(config.history_capacity),
            hub: BroadcastHub::new(config.broadcast_capacity),
            config,
        }
    }

    /// Creates an engine and registers `devices`.
    ///
    /// # Errors
    ///
    /// Fails on the first device that cannot be registered.
    pub fn with_devices(
        config: SimConfig,
        devices: impl IntoIterator<Item = Device>,
    ) -> Result<Self> {
        let engine = Self::new(config);
        for device in devices {
            engine.register_device(device)?;
        }
        Ok(engine)
    }

    /// Simulation parameters.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Index of the last completed tick.
    pub fn current_tick(&self) -> u64 {
        self.clock.tick()
    }

    /// Simulated time of the last completed tick.
    pub fn now(&self) -> SimTime {
        self.clock.now()
    }

    /// The history store backing range queries.
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Registers a device and records its first snapshot at the current time.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Validation`] for invalid ratings or configuration
    /// - [`EngineError::DeviceExists`] if the id is taken
    pub fn register_device(&self, device: Device) -> Result<Device> {
        device.validate()?;
        let tick = self.clock.tick();
        let initial = model::initial_snapshot(&device, &self.config, tick);
        self.registry.insert_with(&device.id, || {
            // Recorded before the device becomes visible to the scheduler.
            self.history.append(initial.clone())?;
            Ok(DeviceState::new(
                device.clone(),
                initial.clone(),
                self.config.command_log_capacity,
            ))
        })?;
        self.hub.publish(Arc::new(initial));
        info!(device_id = %device.id, kind = ?device.kind, tick, "device registered");
        Ok(device)
    }

    /// Every device, ordered by id.
    pub fn list_devices(&self) -> Vec<Device> {
        self.registry.list()
    }

    /// Device `id`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownDevice`] if no such device exists.
    pub fn get_device(&self, id: &str) -> Result<Device> {
        self.registry.device(id)
    }

    /// Parses and applies a named command with JSON parameters.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownDevice`], [`EngineError::InvalidCommand`],
    /// [`EngineError::InvalidState`], or [`EngineError::Validation`]; state is
    /// untouched on every error.
    pub fn apply(
        &self,
        device_id: &str,
        command: &str,
        parameters: &Value,
    ) -> Result<CommandOutcome> {
        let handle = self.registry.handle(device_id)?;
        let command = Command::parse(command, parameters).inspect_err(|e| {
            warn!(device_id, command, error = %e, "command rejected");
        })?;
        self.apply_on(&handle, device_id, command)
    }

    /// Applies an already-parsed command.
    ///
    /// # Errors
    ///
    /// As [`Engine::apply`], minus parse failures.
    pub fn apply_command(&self, device_id: &str, command: Command) -> Result<CommandOutcome> {
        let handle = self.registry.handle(device_id)?;
        self.apply_on(&handle, device_id, command)
    }

    /// Replaces a device's configuration; logged as `update-configuration`.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownDevice`] or [`EngineError::Validation`].
    pub fn update_configuration(
        &self,
        device_id: &str,
        configuration: Configuration,
    ) -> Result<CommandOutcome> {
        self.apply_command(device_id, Command::UpdateConfiguration(configuration))
    }

    fn apply_on(
        &self,
        handle: &DeviceHandle,
        device_id: &str,
        command: Command,
    ) -> Result<CommandOutcome> {
        let name = command.name();
        let mut state = lock(handle);
        let now = self.clock.now();
        match self.processor.apply(&mut state, command, now) {
            Ok(outcome) => {
                info!(
                    device_id,
                    command = name,
                    command_id = %outcome.record.command_id,
                    status = %outcome.device.status,
                    "command applied"
                );
                Ok(outcome)
            }
            Err(e) => {
                warn!(device_id, command = name, error = %e, "command rejected");
                Err(e)
            }
        }
    }

    /// Most recent snapshot of a device.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownDevice`] if no such device exists.
    pub fn latest_snapshot(&self, device_id: &str) -> Result<TelemetrySnapshot> {
        let handle = self.registry.handle(device_id)?;
        let state = lock(&handle);
        Ok(state.latest.clone())
    }

    /// The most recent `limit` command records of a device.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownDevice`] if no such device exists.
    pub fn command_history(&self, device_id: &str, limit: usize) -> Result<CommandHistory> {
        let handle = self.registry.handle(device_id)?;
        let state = lock(&handle);
        Ok(CommandHistory {
            device_id: device_id.to_string(),
            commands: state.commands.recent(limit),
            total: state.commands.len(),
        })
    }

    /// Stored snapshots of a device in `[start, end]`, ascending, at most
    /// `limit` (the most recent are kept).
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownDevice`] or [`EngineError::Validation`] when
    /// `start > end`.
    pub fn query(
        &self,
        device_id: &str,
        start: Option<SimTime>,
        end: Option<SimTime>,
        limit: Option<usize>,
    ) -> Result<Vec<TelemetrySnapshot>> {
        if !self.registry.contains(device_id) {
            return Err(EngineError::UnknownDevice(device_id.to_string()));
        }
        self.history.query(device_id, start, end, limit)
    }

    /// Subscribes to a device's future snapshots.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownDevice`] if no such device exists.
    pub fn subscribe(&self, device_id: &str) -> Result<Subscription> {
        if !self.registry.contains(device_id) {
            return Err(EngineError::UnknownDevice(device_id.to_string()));
        }
        Ok(self.hub.subscribe(device_id))
    }

    /// Advances simulated time by one tick and steps every device.
    ///
    /// A failing device is logged and marked `fault`; the others proceed.
    pub fn tick(&self) -> TickReport {
        let (tick, now) = self.clock.advance();
        let mut report = TickReport {
            tick,
            time: now,
            ..TickReport::default()
        };
        for handle in self.registry.handles() {
            match self.tick_device(&handle, tick, now) {
                DeviceTick::Produced => report.produced += 1,
                DeviceTick::Frozen => report.frozen += 1,
                DeviceTick::Faulted(id) => report.faulted.push(id),
            }
        }
        debug!(
            tick,
            time = %now,
            produced = report.produced,
            frozen = report.frozen,
            faulted = report.faulted.len(),
            "tick complete"
        );
        report
    }

    fn tick_device(&self, handle: &DeviceHandle, tick: u64, now: SimTime) -> DeviceTick {
        let mut state = lock(handle);

        state.phase = TickPhase::ExpiringEffects;
        expire_effects(&mut state, now);

        // Offline devices keep their last snapshot; a device registered
        // during this tick already has a reading for `now`.
        if state.device.status == DeviceStatus::Offline || state.latest.timestamp >= now {
            state.phase = TickPhase::Idle;
            return DeviceTick::Frozen;
        }

        state.phase = TickPhase::Ticking;
        let ctx = TickContext::new(&self.config, tick);
        let result = model::advance(&state.device, &state.latest, &state.effects, &ctx)
            .and_then(|output| {
                self.history.append(output.snapshot.clone())?;
                Ok(output)
            });

        let outcome = match result {
            Ok(output) => {
                if output.force_charge_complete {
                    state.effects.remove(EffectKind::ForceCharge);
                    debug!(device_id = %state.device.id, tick, "forced charge complete");
                }
                if output.status != state.device.status {
                    info!(
                        device_id = %state.device.id,
                        tick,
                        from = %state.device.status,
                        to = %output.status,
                        "status changed"
                    );
                }
                state.device.status = output.status;
                trace!(device_id = %state.device.id, tick, snapshot = %output.snapshot, "snapshot");
                let shared = Arc::new(output.snapshot);
                state.latest = (*shared).clone();
                self.hub.publish(shared);
                DeviceTick::Produced
            }
            Err(e) => {
                warn!(
                    device_id = %state.device.id,
                    tick,
                    error = %e,
                    "device tick failed; marking fault"
                );
                state.device.status = DeviceStatus::Fault;
                DeviceTick::Faulted(state.device.id.clone())
            }
        };
        state.phase = TickPhase::Idle;
        outcome
    }
}

/// Removes lapsed effects and applies the status transition each implies.
fn expire_effects(state: &mut DeviceState, now: SimTime) {
    for effect in state.effects.drain_expired(now) {
        let device = &mut state.device;
        match effect.kind {
            EffectKind::Reboot => {
                if device.status == DeviceStatus::Offline {
                    device.status = DeviceStatus::Online;
                }
            }
            EffectKind::FirmwareUpdate => {
                if let Some(version) = effect.firmware_version {
                    device.configuration.firmware_version = version;
                }
                if device.status == DeviceStatus::Updating {
                    device.status = DeviceStatus::Online;
                }
            }
            EffectKind::ForceCharge => {
                if device.status == DeviceStatus::Charging {
                    device.status = DeviceStatus::Online;
                }
            }
            EffectKind::Isolate => {}
        }
        info!(device_id = %device.id, effect = ?effect.kind, time = %now, "effect expired");
    }
}
