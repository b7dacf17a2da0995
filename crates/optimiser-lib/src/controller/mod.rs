//! Control loop orchestration
//!
//! Wires the state source, policy, resolver and executor into the periodic
//! decision cycle, and publishes what it does through the status handle,
//! suggestion log, health registry and telemetry sink.

mod r#loop;
mod status;
mod suggestion_log;


pub use r#loop::{ControlLoop, ControlLoopBuilder, ControllerConfig, CycleReport};
pub use status::{ControllerStatus, StatusHandle};
pub use suggestion_log::{SuggestionLog, SuggestionRecord};
