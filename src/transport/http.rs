use std::path::Path;

use anyhow::{Context as AnyhowContext, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};

use crate::config::NetworkConfig;
use crate::content::task::Task;
use crate::transport::{CONTROLLER_SUBMIT_TASK, DISTRIBUTOR_DISTRIBUTE, PROCESSOR_PROCESS, TaskTransport};

/// Multipart POSTs: a `data` field with the task JSON and a `file` part.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    network: NetworkConfig,
    local_device: String,
}

impl HttpTransport {
    pub fn new(network: NetworkConfig, local_device: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            network,
            local_device: local_device.into(),
        }
    }

    async fn post(&self, url: &str, task: &Task, file: Option<&Path>) -> Result<()> {
        let file_name = task.file_path().unwrap_or_default().to_string();
        let bytes = match file {
            Some(path) => tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read task file {}", path.display()))?,
            None => Vec::new(),
        };

        let form = Form::new()
            .text("data", task.serialize()?)
            .part("file", Part::bytes(bytes).file_name(file_name));

        let response = self.client.post(url).multipart(form).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("POST {} returned {}", url, response.status()));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskTransport for HttpTransport {
    async fn execute_locally(&self, service: &str, task: &Task, file: &Path) -> Result<()> {
        let port = self.network.service_port(service).ok_or_else(|| {
            anyhow!(
                "service {} does not exist on {} (known: {:?})",
                service,
                self.local_device,
                self.network.service_ports.keys().collect::<Vec<_>>()
            )
        })?;
        let url = self.network.address(&self.local_device, port, PROCESSOR_PROCESS);
        self.post(&url, task, Some(file)).await
    }

    async fn forward_to_device(&self, device: &str, task: &Task, file: &Path) -> Result<()> {
        let url = self
            .network
            .address(device, self.network.controller_port, CONTROLLER_SUBMIT_TASK);
        self.post(&url, task, Some(file)).await
    }

    async fn deliver_to_sink(&self, task: &Task, file: Option<&Path>) -> Result<()> {
        let url = self.network.address(
            &self.network.cloud_node,
            self.network.distributor_port,
            DISTRIBUTOR_DISTRIBUTE,
        );
        self.post(&url, task, file).await
    }
}
