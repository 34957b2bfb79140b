use std::collections::VecDeque;

use serde::Serialize;
use serde_json::Value;

use crate::sim::types::SimTime;

/// Outcome reported for an accepted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    /// The command took full effect.
    Completed,
    /// The command started a timed transition (reboot, firmware update).
    InProgress,
}

/// Immutable log entry for an accepted command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandRecord {
    /// Identifier unique within the device, e.g. `CMD-PW-001-3`.
    pub command_id: String,
    /// Device the command was applied to.
    pub device_id: String,
    /// Canonical command name.
    pub command: String,
    /// Parameters as applied.
    pub parameters: Value,
    /// Simulated time at which the command was applied.
    pub issued_at: SimTime,
    /// Reported outcome.
    pub status: CommandStatus,
    /// Human-readable result message.
    pub message: String,
}

/// Bounded per-device command log retaining the most recent records.
#[derive(Debug, Clone)]
pub struct CommandLog {
    capacity: usize,
    records: VecDeque<CommandRecord>,
    issued: u64,
}

impl CommandLog {
    /// Creates a log retaining at most `capacity` records (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
            issued: 0,
        }
    }

    /// Sequence number the next record will carry.
    pub fn next_sequence(&self) -> u64 {
        self.issued + 1
    }

    /// Appends `record`, dropping the oldest when full.
    pub fn push(&mut self, record: CommandRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
        self.issued += 1;
    }

    /// The most recent `limit` records, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<CommandRecord> {
        let skip = self.records.len().saturating_sub(limit);
        self.records.iter().skip(skip).cloned().collect()
    }

    /// Records currently retained.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no record is retained.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Commands accepted over the device's lifetime.
    pub fn total_issued(&self) -> u64 {
        self.issued
    }
}
