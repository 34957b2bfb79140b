//! Registry of simulated devices and their per-device mutable state.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::Serialize;

use crate::control::CommandLog;
use crate::error::{EngineError, Result};
use crate::sim::effects::EffectSet;
use crate::sim::types::TelemetrySnapshot;

use super::Device;

/// Where a device is in the tick cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TickPhase {
    /// Between ticks; commands may apply.
    Idle,
    /// Lapsed pending effects are being removed.
    ExpiringEffects,
    /// The model is producing the next snapshot.
    Ticking,
}

/// Everything the engine tracks for one device.
///
/// Guarded by a single per-device mutex so a command and a tick for the
/// same device never interleave.
#[derive(Debug)]
pub struct DeviceState {
    /// Identity, ratings, configuration, and status.
    pub device: Device,
    /// Overrides installed by commands.
    pub effects: EffectSet,
    /// Most recent snapshot; frozen while the device is offline.
    pub latest: TelemetrySnapshot,
    /// Accepted commands, most recent last.
    pub commands: CommandLog,
    /// Current tick phase.
    pub phase: TickPhase,
}

impl DeviceState {
    /// Wraps a freshly registered device and its first snapshot.
    pub fn new(device: Device, initial: TelemetrySnapshot, log_capacity: usize) -> Self {
        Self {
            device,
            effects: EffectSet::new(),
            latest: initial,
            commands: CommandLog::new(log_capacity),
            phase: TickPhase::Idle,
        }
    }
}

/// Shared handle to one device's state.
pub type DeviceHandle = Arc<Mutex<DeviceState>>;

/// Locks a device, recovering the state if a previous holder panicked.
pub fn lock(handle: &DeviceHandle) -> MutexGuard<'_, DeviceState> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The set of registered devices, ordered by id.
///
/// The map lock is only held to look up or insert handles; per-device work
/// happens under the device's own mutex, so no cross-device locking occurs.
#[derive(Debug, Default)]
pub struct Registry {
    devices: RwLock<BTreeMap<String, DeviceHandle>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a device.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DeviceExists`] if the id is taken.
    pub fn insert(&self, state: DeviceState) -> Result<DeviceHandle> {
        let id = state.device.id.clone();
        self.insert_with(&id, || Ok(state))
    }

    /// Adds device `id`, building its state only once the id is known to be
    /// free. The map stays write-locked while `build` runs, so concurrent
    /// registrations of one id cannot both reach it.
    ///
    /// # Errors
    ///
    /// [`EngineError::DeviceExists`] if the id is taken, or whatever `build`
    /// returns.
    pub fn insert_with(
        &self,
        id: &str,
        build: impl FnOnce() -> Result<DeviceState>,
    ) -> Result<DeviceHandle> {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        if devices.contains_key(id) {
            return Err(EngineError::DeviceExists(id.to_string()));
        }
        let handle = Arc::new(Mutex::new(build()?));
        devices.insert(id.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Handle of device `id`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownDevice`] if no such device exists.
    pub fn handle(&self, id: &str) -> Result<DeviceHandle> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownDevice(id.to_string()))
    }

    /// Whether a device with `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Handles of every device, ordered by id.
    pub fn handles(&self) -> Vec<DeviceHandle> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// A copy of device `id`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownDevice`] if no such device exists.
    pub fn device(&self, id: &str) -> Result<Device> {
        let handle = self.handle(id)?;
        let state = lock(&handle);
        Ok(state.device.clone())
    }

    /// Copies of every device, ordered by id.
    pub fn list(&self) -> Vec<Device> {
        self.handles()
            .iter()
            .map(|h| lock(h).device.clone())
            .collect()
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no device is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
