use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::content::dag::{END, START};
use crate::content::task::{ParallelJoint, Task};
use crate::controller::{Action, FileOps, TaskCoordinator};
use crate::error::TaskError;
use crate::estimation::{Phase, TimeEstimator};
use crate::transport::TaskTransport;

/// Moves tasks along their DAG on one device.
///
/// Holds no per-task state: everything needed to route a task travels inside
/// it, and partial joins live in the coordinator's store.
pub struct Controller {
    local_device: String,
    transport: Arc<dyn TaskTransport>,
    coordinator: TaskCoordinator,
    files: FileOps,
    display: bool,
}

impl Controller {
    pub fn new(
        local_device: impl Into<String>,
        transport: Arc<dyn TaskTransport>,
        coordinator: TaskCoordinator,
        files: FileOps,
    ) -> Self {
        Self {
            local_device: local_device.into(),
            transport,
            coordinator,
            files,
            display: false,
        }
    }

    /// Send the blob along with finished tasks to the distributor.
    pub fn with_display(mut self, display: bool) -> Self {
        self.display = display;
        self
    }

    pub fn local_device(&self) -> &str {
        &self.local_device
    }

    pub fn files(&self) -> &FileOps {
        &self.files
    }

    pub fn coordinator(&self) -> &TaskCoordinator {
        &self.coordinator
    }

    /// Route a task positioned at its current stage.
    ///
    /// `start` fans out to its successors and reports `Execute` if any of
    /// them runs here. `end` goes to the distributor, a stage placed on
    /// another device goes to that device's controller and anything else
    /// runs on the local processor.
    pub async fn submit_task(&self, task: Task) -> Result<Action, TaskError> {
        let service = task.get_current_service_info()?.0.to_string();
        info!(
            source_id = task.source_id(),
            task_id = task.task_id(),
            service = %service,
            "Submit task"
        );

        if service != START {
            return self.dispatch(task).await;
        }

        let mut executed = false;
        for child in task.step_to_next_stage()? {
            executed |= self.dispatch(child).await? == Action::Execute;
        }
        Ok(if executed { Action::Execute } else { Action::Transmit })
    }

    /// Advance a task whose current stage just finished on this device.
    /// Returns one action per outgoing edge.
    pub async fn process_return(&self, task: Task) -> Result<Vec<Action>, TaskError> {
        info!(
            source_id = task.source_id(),
            task_id = task.task_id(),
            service = task.flow_index(),
            "Process return"
        );

        let mut actions = Vec::new();
        for joint in task.get_parallel_info_for_merge()? {
            let action = match self.advance_to(&task, &joint).await {
                Ok(action) => action,
                Err(e) => {
                    warn!(joint = %joint.joint_service, error = %e, "Abandoning branch");
                    Action::Dropped
                }
            };
            actions.push(action);
        }
        Ok(actions)
    }

    /// Fork `task` onto one successor. A join is only routed once every
    /// sibling branch has arrived and been merged.
    async fn advance_to(&self, task: &Task, joint: &ParallelJoint) -> Result<Action, TaskError> {
        let required = joint.parallel_services.len();
        let mut new_task = task.fork_task(&joint.joint_service);

        if required > 1 {
            let Some(count) = self.coordinator.store_task_data(&new_task, &joint.joint_service).await else {
                return Ok(Action::Wait);
            };
            if count != required {
                debug!(joint = %joint.joint_service, count, required, "Waiting for sibling branches");
                return Ok(Action::Wait);
            }
            let Some(siblings) = self
                .coordinator
                .retrieve_task_data(new_task.root_uuid(), &joint.joint_service, required)
                .await
            else {
                return Ok(Action::Wait);
            };

            for sibling in &siblings {
                new_task.merge_task(sibling)?;
            }
            debug!(
                joint = %joint.joint_service,
                branches = ?siblings.iter().map(Task::past_flow_index).collect::<Vec<_>>(),
                "Merged branches"
            );
        }

        self.submit_task(new_task).await
    }

    /// Opens a transmit ticket, or closes it and stores the duration on the
    /// current stage. Ticket failures are logged and count as zero.
    pub fn record_transmit_ts(task: &mut Task, is_end: bool) {
        Self::record_phase(task, is_end, Phase::Transmit);
    }

    pub fn record_execute_ts(task: &mut Task, is_end: bool) {
        Self::record_phase(task, is_end, Phase::Execute);
    }

    fn record_phase(task: &mut Task, is_end: bool, phase: Phase) {
        let duration = TimeEstimator::record_dag_ts(task, is_end, phase).unwrap_or_else(|e| {
            warn!(error = %e, "Time record failed");
            0.0
        });
        if !is_end {
            return;
        }

        let saved = match phase {
            Phase::Transmit => task.save_transmit_time(duration),
            Phase::Execute => task.save_execute_time(duration),
            Phase::RealExecute => task.save_real_execute_time(duration),
        };
        match saved {
            Ok(()) => info!(
                source_id = task.source_id(),
                task_id = task.task_id(),
                stage = task.flow_index(),
                "record {} time: {:.3}s",
                phase,
                duration
            ),
            Err(e) => warn!(error = %e, "Failed to save {} time", phase),
        }
    }

    async fn dispatch(&self, task: Task) -> Result<Action, TaskError> {
        let (service, device) = {
            let (service, device) = task.get_current_service_info()?;
            (service.to_string(), device.to_string())
        };

        if service == END {
            Ok(self.send_task_to_distributor(task).await)
        } else if device != self.local_device {
            Ok(self.send_task_to_other_device(task, &device).await)
        } else {
            Ok(self.send_task_to_service(task, &service).await)
        }
    }

    async fn send_task_to_other_device(&self, mut task: Task, device: &str) -> Action {
        Self::record_transmit_ts(&mut task, false);
        let Some(path) = self.task_file(&task).await else {
            return Action::Dropped;
        };

        if let Err(e) = self.transport.forward_to_device(device, &task, &path).await {
            warn!(device, task_id = task.task_id(), error = %e, "Forward to device failed");
        }
        info!(
            device,
            source_id = task.source_id(),
            task_id = task.task_id(),
            service = task.flow_index(),
            "To device"
        );
        Action::Transmit
    }

    async fn send_task_to_service(&self, mut task: Task, service: &str) -> Action {
        Self::record_execute_ts(&mut task, false);
        let Some(path) = self.task_file(&task).await else {
            return Action::Dropped;
        };

        if let Err(e) = self.transport.execute_locally(service, &task, &path).await {
            warn!(service, task_id = task.task_id(), error = %e, "Hand-off to local service failed");
        }
        info!(
            service,
            source_id = task.source_id(),
            task_id = task.task_id(),
            "To service"
        );
        Action::Execute
    }

    async fn send_task_to_distributor(&self, mut task: Task) -> Action {
        Self::record_transmit_ts(&mut task, false);
        let Some(path) = self.task_file(&task).await else {
            return Action::Dropped;
        };

        let file = self.display.then_some(path.as_path());
        if let Err(e) = self.transport.deliver_to_sink(&task, file).await {
            warn!(task_id = task.task_id(), error = %e, "Delivery to distributor failed");
        }
        info!(
            source_id = task.source_id(),
            task_id = task.task_id(),
            "To distributor"
        );
        Action::Transmit
    }

    async fn task_file(&self, task: &Task) -> Option<PathBuf> {
        let path = task.file_path().and_then(|file| self.files.resolve(file));
        match path {
            Some(path) if tokio::fs::try_exists(&path).await.unwrap_or(false) => Some(path),
            _ => {
                warn!(
                    source_id = task.source_id(),
                    task_id = task.task_id(),
                    file = ?task.file_path(),
                    "Task file lost, task dropped"
                );
                None
            }
        }
    }
}
