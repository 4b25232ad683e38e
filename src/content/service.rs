use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TaskError;

/// Timings recorded for one visit of a service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteData {
    #[serde(default)]
    pub transmit_time: f64,
    /// Controller-to-controller duration, queueing included.
    #[serde(default)]
    pub execute_time: f64,
    /// Time spent inside the processor only.
    #[serde(default)]
    pub real_execute_time: f64,
}

/// Execution record of one DAG node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    service_name: String,
    #[serde(default)]
    execute_device: String,
    #[serde(default)]
    execute_data: ExecuteData,
    #[serde(default)]
    content: Option<Value>,
}

impl Service {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            execute_device: String::new(),
            execute_data: ExecuteData::default(),
            content: None,
        }
    }

    pub fn with_device(service_name: impl Into<String>, device: impl Into<String>) -> Self {
        let mut service = Self::new(service_name);
        service.execute_device = device.into();
        service
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn execute_device(&self) -> &str {
        &self.execute_device
    }

    pub fn set_execute_device(&mut self, device: impl Into<String>) {
        self.execute_device = device.into();
    }

    pub fn execute_data(&self) -> &ExecuteData {
        &self.execute_data
    }

    pub fn transmit_time(&self) -> f64 {
        self.execute_data.transmit_time
    }

    pub fn execute_time(&self) -> f64 {
        self.execute_data.execute_time
    }

    pub fn real_execute_time(&self) -> f64 {
        self.execute_data.real_execute_time
    }

    pub fn set_transmit_time(&mut self, value: f64) -> Result<(), TaskError> {
        self.execute_data.transmit_time = self.checked("transmit", value)?;
        Ok(())
    }

    pub fn set_execute_time(&mut self, value: f64) -> Result<(), TaskError> {
        self.execute_data.execute_time = self.checked("execute", value)?;
        Ok(())
    }

    pub fn set_real_execute_time(&mut self, value: f64) -> Result<(), TaskError> {
        self.execute_data.real_execute_time = self.checked("real execute", value)?;
        Ok(())
    }

    /// transmit + execute, the latency this stage adds to a task.
    pub fn total_time(&self) -> f64 {
        self.execute_data.transmit_time + self.execute_data.execute_time
    }

    pub fn content(&self) -> Option<&Value> {
        self.content.as_ref()
    }

    pub fn set_content(&mut self, content: Option<Value>) {
        self.content = content;
    }

    fn checked(&self, kind: &'static str, value: f64) -> Result<f64, TaskError> {
        if value < 0.0 || value.is_nan() {
            return Err(TaskError::NegativeTime {
                kind,
                service: self.service_name.clone(),
                value,
            });
        }
        Ok(value)
    }
}
