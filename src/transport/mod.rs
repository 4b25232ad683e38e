//! Outbound hops of a task: local processor, peer controller, distributor.

pub mod http;

pub use http::HttpTransport;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::content::task::Task;

pub const CONTROLLER_SUBMIT_TASK: &str = "/submit_task";
pub const CONTROLLER_PROCESS_RETURN: &str = "/process_return";
pub const PROCESSOR_PROCESS: &str = "/predict";
pub const DISTRIBUTOR_DISTRIBUTE: &str = "/distribute";

/// Every hop sends the serialized task and, where the receiver needs it, the
/// blob named by the task's `file_path`.
#[async_trait]
pub trait TaskTransport: Send + Sync {
    /// Hand the task to the processor running `service` on this device.
    async fn execute_locally(&self, service: &str, task: &Task, file: &Path) -> Result<()>;

    /// Ship the task to the controller of `device`.
    async fn forward_to_device(&self, device: &str, task: &Task, file: &Path) -> Result<()>;

    /// Deliver a finished task to the distributor. `file` is `None` when the
    /// blob is not wanted there.
    async fn deliver_to_sink(&self, task: &Task, file: Option<&Path>) -> Result<()>;
}
