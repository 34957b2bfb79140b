//! Rolling per-device telemetry history.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::error::{EngineError, Result};
use crate::sim::types::{SimTime, TelemetrySnapshot};

type Buffer = Arc<Mutex<VecDeque<TelemetrySnapshot>>>;

/// Bounded ring buffer of snapshots per device, oldest evicted first.
///
/// The outer map is only write-locked when a device's buffer is created;
/// appends and queries lock the single device's buffer.
#[derive(Debug)]
pub struct HistoryStore {
    capacity: usize,
    buffers: RwLock<HashMap<String, Buffer>>,
}

impl HistoryStore {
    /// Creates a store retaining at most `capacity` snapshots per device.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            buffers: RwLock::new(HashMap::new()),
        }
    }

    /// Snapshots retained per device.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn buffer(&self, device_id: &str) -> Option<Buffer> {
        self.buffers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device_id)
            .cloned()
    }

    fn buffer_or_create(&self, device_id: &str) -> Buffer {
        if let Some(buffer) = self.buffer(device_id) {
            return buffer;
        }
        let mut buffers = self.buffers.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            buffers
                .entry(device_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(VecDeque::with_capacity(self.capacity)))),
        )
    }

    /// Appends a snapshot, evicting the oldest when the buffer is full.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SimulationInvariantViolation`] if the snapshot
    /// is not strictly newer than the last one stored for its device.
    pub fn append(&self, snapshot: TelemetrySnapshot) -> Result<()> {
        let buffer = self.buffer_or_create(&snapshot.device_id);
        let mut buffer = buffer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(last) = buffer.back()
            && snapshot.timestamp <= last.timestamp
        {
            return Err(EngineError::SimulationInvariantViolation {
                device_id: snapshot.device_id,
                message: format!(
                    "snapshot at {} is not newer than stored {}",
                    snapshot.timestamp, last.timestamp
                ),
            });
        }
        if buffer.len() == self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(snapshot);
        Ok(())
    }

    /// Snapshots of `device_id` with `start <= timestamp <= end`, ascending,
    /// keeping the most recent `limit` when more match.
    ///
    /// Missing bounds are open. A device with no stored history yields an
    /// empty sequence.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] when `start` is after `end`.
    pub fn query(
        &self,
        device_id: &str,
        start: Option<SimTime>,
        end: Option<SimTime>,
        limit: Option<usize>,
    ) -> Result<Vec<TelemetrySnapshot>> {
        if let (Some(s), Some(e)) = (start, end)
            && s > e
        {
            return Err(EngineError::validation(
                "start",
                format!("must not be after end ({s} > {e})"),
            ));
        }
        let Some(buffer) = self.buffer(device_id) else {
            return Ok(Vec::new());
        };
        let buffer = buffer.lock().unwrap_or_else(PoisonError::into_inner);
        let in_range = |snap: &&TelemetrySnapshot| {
            start.is_none_or(|s| snap.timestamp >= s) && end.is_none_or(|e| snap.timestamp <= e)
        };
        let limit = limit.unwrap_or(usize::MAX);
        let mut out: Vec<TelemetrySnapshot> = buffer
            .iter()
            .rev()
            .filter(in_range)
            .take(limit)
            .cloned()
            .collect();
        out.reverse();
        Ok(out)
    }

    /// Most recent snapshot of `device_id`.
    pub fn latest(&self, device_id: &str) -> Option<TelemetrySnapshot> {
        let buffer = self.buffer(device_id)?;
        let buffer = buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.back().cloned()
    }

    /// Number of snapshots retained for `device_id`.
    pub fn len(&self, device_id: &str) -> usize {
        self.buffer(device_id).map_or(0, |b| {
            b.lock().unwrap_or_else(PoisonError::into_inner).len()
        })
    }
}
