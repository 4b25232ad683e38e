//! Per-device routing of tasks through their DAG.

pub mod coordinator;
pub mod file_ops;
#[allow(clippy::module_inception)]
pub mod controller;

pub use controller::Controller;
pub use coordinator::TaskCoordinator;
pub use file_ops::FileOps;

use std::fmt;

use serde::{Deserialize, Serialize};

/// What happened to one branch of a task on this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Handed to a processor on this device; the blob is still needed.
    Execute,
    /// Sent to another controller or the distributor.
    Transmit,
    /// Parked at a join until its siblings arrive; the blob is still needed.
    Wait,
    /// The blob was missing, so the hop was skipped and the task lost.
    Dropped,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Execute => "execute",
            Action::Transmit => "transmit",
            Action::Wait => "wait",
            Action::Dropped => "dropped",
        }
    }

    /// Whether the local blob must outlive this request.
    pub fn keeps_file(&self) -> bool {
        matches!(self, Action::Execute | Action::Wait)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
