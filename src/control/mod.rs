//! Control commands: parsing, application, and the per-device command log.

pub mod command;
mod log;
pub mod processor;

pub use command::Command;
pub use log::{CommandLog, CommandRecord, CommandStatus};
pub use processor::{CommandOutcome, CommandProcessor};
