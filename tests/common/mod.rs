#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use dagrelay::content::{Dag, DagBuilder, Task};
use dagrelay::controller::{Controller, FileOps, TaskCoordinator};
use dagrelay::server::AppState;
use dagrelay::storage::InMemoryJoinStore;
use dagrelay::transport::TaskTransport;

pub const LOCAL: &str = "edge1";
pub const REMOTE: &str = "edge2";
pub const BLOB: &str = "frame.bin";

/// start -> A -> {B, C} -> D -> end, every service on `device`.
pub fn diamond_dag(device: &str) -> Dag {
    DagBuilder::new()
        .device(device)
        .service("A")
        .service("B")
        .service("C")
        .service("D")
        .fan_out("A", &["B", "C"])
        .connect("B", "D")
        .connect("C", "D")
        .build()
        .unwrap()
}

/// start -> A -> B -> end.
pub fn linear_dag(device: &str) -> Dag {
    DagBuilder::new()
        .device(device)
        .service("A")
        .service("B")
        .connect("A", "B")
        .build()
        .unwrap()
}

/// start -> A -> {B, D}, B -> D -> end: D joins A with its own child.
pub fn shortcut_dag(device: &str) -> Dag {
    DagBuilder::new()
        .device(device)
        .service("A")
        .service("B")
        .service("D")
        .fan_out("A", &["B", "D"])
        .connect("B", "D")
        .build()
        .unwrap()
}

/// A branch of `root` parked at D with no predecessor, so it can never be
/// merged.
pub fn park_unmergeable_branch(root: &Task) -> Task {
    let mut parked = root.clone();
    parked.set_flow_index("D");
    parked
}

#[derive(Debug, Clone)]
pub enum Hop {
    Local { service: String, task: Task },
    Forward { device: String, task: Task },
    Sink { task: Task, with_file: bool },
}

#[derive(Default)]
pub struct RecordingTransport {
    hops: Mutex<Vec<Hop>>,
}

impl RecordingTransport {
    pub fn hops(&self) -> Vec<Hop> {
        self.hops.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskTransport for RecordingTransport {
    async fn execute_locally(&self, service: &str, task: &Task, _file: &Path) -> Result<()> {
        self.hops.lock().unwrap().push(Hop::Local {
            service: service.to_string(),
            task: task.clone(),
        });
        Ok(())
    }

    async fn forward_to_device(&self, device: &str, task: &Task, _file: &Path) -> Result<()> {
        self.hops.lock().unwrap().push(Hop::Forward {
            device: device.to_string(),
            task: task.clone(),
        });
        Ok(())
    }

    async fn deliver_to_sink(&self, task: &Task, file: Option<&Path>) -> Result<()> {
        self.hops.lock().unwrap().push(Hop::Sink {
            task: task.clone(),
            with_file: file.is_some(),
        });
        Ok(())
    }
}

pub struct Fixture {
    pub controller: Arc<Controller>,
    pub transport: Arc<RecordingTransport>,
    pub store: Arc<InMemoryJoinStore>,
    pub dir: TempDir,
}

impl Fixture {
    pub fn new(local_device: &str) -> Self {
        Self::build(local_device, false)
    }

    /// Controller that sends blobs to the distributor as well.
    pub fn displaying(local_device: &str) -> Self {
        Self::build(local_device, true)
    }

    fn build(local_device: &str, display: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let store = Arc::new(InMemoryJoinStore::new());
        let controller = Controller::new(
            local_device,
            transport.clone(),
            TaskCoordinator::new(store.clone()),
            FileOps::new(dir.path()),
        )
        .with_display(display);
        Self {
            controller: Arc::new(controller),
            transport,
            store,
            dir,
        }
    }

    /// Root task whose blob already sits in the controller's blob directory.
    pub fn root_task(&self, dag: Dag) -> Task {
        std::fs::write(self.dir.path().join(BLOB), b"frame").unwrap();
        let mut task = Task::new(0, 7, LOCAL, dag);
        task.set_file_path(Some(BLOB.to_string()));
        task
    }

    pub fn app_state(&self, delete_temp_files: bool) -> AppState {
        AppState::new(self.controller.clone(), delete_temp_files)
    }

    pub fn blob_exists(&self) -> bool {
        self.dir.path().join(BLOB).exists()
    }
}
