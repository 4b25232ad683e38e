//! Process configuration: a YAML file overridden by environment variables.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as AnyhowContext, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::content::dag::Dag;

/// Where every component of the deployment can be reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// hostname -> ip. Hostnames missing here are used as addresses directly.
    pub nodes: BTreeMap<String, String>,
    /// Host running the distributor that collects finished tasks.
    pub cloud_node: String,
    pub controller_port: u16,
    pub distributor_port: u16,
    /// service name -> port of the processor on this device.
    pub service_ports: BTreeMap<String, u16>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            nodes: BTreeMap::new(),
            cloud_node: "localhost".to_string(),
            controller_port: 9002,
            distributor_port: 9500,
            service_ports: BTreeMap::new(),
        }
    }
}

impl NetworkConfig {
    pub fn hostname_to_ip<'a>(&'a self, hostname: &'a str) -> &'a str {
        self.nodes.get(hostname).map(String::as_str).unwrap_or(hostname)
    }

    pub fn address(&self, hostname: &str, port: u16, path: &str) -> String {
        format!("http://{}:{}{}", self.hostname_to_ip(hostname), port, path)
    }

    pub fn service_port(&self, service: &str) -> Option<u16> {
        self.service_ports.get(service).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Hostname of the device this controller runs on.
    pub local_device: String,
    pub listen: String,
    /// Directory holding task blobs.
    pub temp_dir: PathBuf,
    pub delete_temp_files: bool,
    /// Whether the distributor receives the blob along with finished tasks.
    pub display: bool,

    pub redis_url: String,
    pub storage_timeout_secs: u64,
    pub lock_timeout_secs: u64,
    pub lock_wait_secs: u64,

    pub network: NetworkConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            local_device: "localhost".to_string(),
            listen: "0.0.0.0:9002".to_string(),
            temp_dir: PathBuf::from("temp_files"),
            delete_temp_files: true,
            display: false,
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
            storage_timeout_secs: 3600,
            lock_timeout_secs: 10,
            lock_wait_secs: 10,
            network: NetworkConfig::default(),
        }
    }
}

impl RelayConfig {
    /// File (or defaults) first, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => load_config(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(device) = lookup("NODE_NAME") {
            self.local_device = device;
        }
        if let Some(url) = lookup("REDIS_URL") {
            self.redis_url = url;
        }
        if let Some(timeout) = lookup("REDIS_STORAGE_TIMEOUT") {
            self.storage_timeout_secs = timeout
                .trim()
                .parse()
                .with_context(|| format!("REDIS_STORAGE_TIMEOUT is not a number of seconds: {timeout}"))?;
        }
        if let Some(flag) = lookup("DELETE_TEMP_FILES") {
            self.delete_temp_files = parse_flag("DELETE_TEMP_FILES", &flag)?;
        }
        if let Some(flag) = lookup("DISPLAY") {
            self.display = parse_flag("DISPLAY", &flag)?;
        }
        Ok(())
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_secs(self.lock_wait_secs)
    }
}

pub fn load_config(path: &Path) -> Result<RelayConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file from {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to deserialize config from {}", path.display()))
}

/// Deployment DAG in the task wire layout (`name -> {service, prev_nodes,
/// next_nodes}`). Sentinels are added when the file has none.
pub fn load_dag(path: &Path) -> Result<Dag> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read DAG file from {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to deserialize DAG from {}", path.display()))
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(anyhow!("{name} is not a boolean: {other}")),
    }
}
