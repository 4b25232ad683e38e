use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::content::dag::{Dag, END, START};
use crate::error::TaskError;
use crate::solver::{IntermediateNodeSolver, LcaSolver, PathSolver};

/// A fan-in point reachable from the current stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelJoint {
    pub joint_service: String,
    /// Every predecessor of the joint; the join needs one arrival per entry.
    pub parallel_services: Vec<String>,
}

/// One unit of work travelling through a DAG.
///
/// `task_uuid` changes on every fork, `parent_uuid` points at the task it
/// was forked from and `root_uuid` stays fixed across the whole lineage.
/// `cur_flow_index` is the DAG node currently owning the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    source_id: i64,
    task_id: i64,
    #[serde(default)]
    source_device: String,
    #[serde(default)]
    all_edge_devices: Vec<String>,

    #[serde(default)]
    dag: Option<Dag>,
    #[serde(default)]
    cur_flow_index: String,
    #[serde(default)]
    past_flow_index: Option<String>,

    #[serde(default, rename = "meta_data")]
    metadata: Option<Value>,
    #[serde(default, rename = "raw_meta_data")]
    raw_metadata: Option<Value>,
    #[serde(default)]
    scenario_data: Map<String, Value>,
    #[serde(default)]
    tmp_data: Map<String, Value>,
    #[serde(default)]
    hash_data: Vec<Value>,
    #[serde(default)]
    file_path: Option<String>,

    #[serde(default)]
    task_uuid: String,
    #[serde(default)]
    parent_uuid: String,
    #[serde(default)]
    root_uuid: String,
}

impl Task {
    /// Root of a new lineage, positioned at `start`.
    pub fn new(source_id: i64, task_id: i64, source_device: impl Into<String>, dag: Dag) -> Self {
        let uuid = Uuid::new_v4().to_string();
        Self {
            source_id,
            task_id,
            source_device: source_device.into(),
            all_edge_devices: Vec::new(),
            dag: Some(dag),
            cur_flow_index: START.to_string(),
            past_flow_index: None,
            metadata: None,
            raw_metadata: None,
            scenario_data: Map::new(),
            tmp_data: Map::new(),
            hash_data: Vec::new(),
            file_path: None,
            task_uuid: uuid.clone(),
            parent_uuid: String::new(),
            root_uuid: uuid,
        }
    }

    pub fn source_id(&self) -> i64 {
        self.source_id
    }

    pub fn task_id(&self) -> i64 {
        self.task_id
    }

    pub fn source_device(&self) -> &str {
        &self.source_device
    }

    pub fn all_edge_devices(&self) -> &[String] {
        &self.all_edge_devices
    }

    pub fn set_all_edge_devices(&mut self, devices: Vec<String>) {
        self.all_edge_devices = devices;
    }

    pub fn dag(&self) -> Option<&Dag> {
        self.dag.as_ref()
    }

    pub fn set_dag(&mut self, dag: Dag) {
        self.dag = Some(dag);
    }

    pub fn require_dag(&self) -> Result<&Dag, TaskError> {
        self.dag.as_ref().ok_or(TaskError::MissingDag)
    }

    pub fn require_dag_mut(&mut self) -> Result<&mut Dag, TaskError> {
        self.dag.as_mut().ok_or(TaskError::MissingDag)
    }

    pub fn flow_index(&self) -> &str {
        &self.cur_flow_index
    }

    pub fn set_flow_index(&mut self, flow_index: impl Into<String>) {
        self.cur_flow_index = flow_index.into();
    }

    pub fn past_flow_index(&self) -> Option<&str> {
        self.past_flow_index.as_deref()
    }

    pub fn metadata(&self) -> Option<&Value> {
        self.metadata.as_ref()
    }

    pub fn set_metadata(&mut self, metadata: Option<Value>) {
        self.metadata = metadata;
    }

    pub fn raw_metadata(&self) -> Option<&Value> {
        self.raw_metadata.as_ref()
    }

    pub fn set_raw_metadata(&mut self, raw_metadata: Option<Value>) {
        self.raw_metadata = raw_metadata;
    }

    pub fn scenario_data(&self) -> &Map<String, Value> {
        &self.scenario_data
    }

    pub fn add_scenario(&mut self, data: Map<String, Value>) {
        self.scenario_data.extend(data);
    }

    pub fn tmp_data(&self) -> &Map<String, Value> {
        &self.tmp_data
    }

    pub fn tmp_data_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.tmp_data
    }

    pub fn hash_data(&self) -> &[Value] {
        &self.hash_data
    }

    pub fn add_hash_data(&mut self, hash: Value) {
        self.hash_data.push(hash);
    }

    pub fn file_path(&self) -> Option<&str> {
        self.file_path.as_deref()
    }

    pub fn set_file_path(&mut self, path: Option<String>) {
        self.file_path = path;
    }

    pub fn task_uuid(&self) -> &str {
        &self.task_uuid
    }

    pub fn parent_uuid(&self) -> &str {
        &self.parent_uuid
    }

    pub fn root_uuid(&self) -> &str {
        &self.root_uuid
    }

    /// Prefix shared by every time ticket of this task lineage.
    pub fn time_ticket_tag_prefix(&self) -> String {
        format!(
            "dagrelay:source-{}-task-{}:{}",
            self.source_id, self.task_id, self.root_uuid
        )
    }

    /// `(service_name, execute_device)` of the current stage.
    pub fn get_current_service_info(&self) -> Result<(&str, &str), TaskError> {
        let service = self.require_dag()?.service(&self.cur_flow_index)?;
        Ok((service.service_name(), service.execute_device()))
    }

    pub fn get_current_stage_device(&self) -> Result<&str, TaskError> {
        Ok(self.get_current_service_info()?.1)
    }

    /// Result payload of the current stage.
    pub fn content(&self) -> Result<Option<&Value>, TaskError> {
        Ok(self.require_dag()?.service(&self.cur_flow_index)?.content())
    }

    pub fn set_content(&mut self, content: Option<Value>) -> Result<(), TaskError> {
        let stage = self.cur_flow_index.clone();
        self.require_dag_mut()?.service_mut(&stage)?.set_content(content);
        Ok(())
    }

    pub fn save_transmit_time(&mut self, value: f64) -> Result<(), TaskError> {
        let stage = self.cur_flow_index.clone();
        self.require_dag_mut()?.service_mut(&stage)?.set_transmit_time(value)
    }

    pub fn save_execute_time(&mut self, value: f64) -> Result<(), TaskError> {
        let stage = self.cur_flow_index.clone();
        self.require_dag_mut()?.service_mut(&stage)?.set_execute_time(value)
    }

    pub fn save_real_execute_time(&mut self, value: f64) -> Result<(), TaskError> {
        let stage = self.cur_flow_index.clone();
        self.require_dag_mut()?.service_mut(&stage)?.set_real_execute_time(value)
    }

    pub fn set_initial_execute_device(&mut self, device: &str) -> Result<(), TaskError> {
        self.require_dag_mut()?.set_execute_device(device);
        Ok(())
    }

    pub fn dag_deployment_info(&self) -> Result<Dag, TaskError> {
        Ok(self.require_dag()?.deployment_info())
    }

    /// End-to-end latency: transmit + execute summed along the critical
    /// `start` -> `end` path. Parallel branches are not added together; a
    /// fan-out contributes only its slowest branch, so on a non-linear DAG
    /// this is less than the sum over every stage.
    pub fn calculate_total_time(&self) -> Result<f64, TaskError> {
        let dag = self.require_completed_dag()?;
        let (total, _) = PathSolver::new(dag).get_weighted_longest_path(START, END, |s| s.total_time())?;
        Ok(total)
    }

    /// Largest single transmit time of any stage.
    pub fn calculate_cloud_edge_transmit_time(&self) -> Result<f64, TaskError> {
        let dag = self.require_completed_dag()?;
        Ok(dag.services().map(|s| s.transmit_time()).fold(0.0, f64::max))
    }

    pub fn get_delay_info(&self) -> Result<String, TaskError> {
        let dag = self.require_completed_dag()?;
        let total = self.calculate_total_time()?;

        let mut info = format!("[Delay Info] Source:{}  Task:{}\n", self.source_id, self.task_id);
        for service in dag.services() {
            let _ = writeln!(
                info,
                "stage[{}] -> (device:{})    execute delay:{:.4}s    transmit delay:{:.4}s",
                service.service_name(),
                service.execute_device(),
                service.execute_time(),
                service.transmit_time()
            );
        }
        let _ = write!(info, "total delay:{total:.4}s");
        let buffer_size = self
            .metadata
            .as_ref()
            .and_then(|m| m.get("buffer_size"))
            .and_then(Value::as_f64)
            .filter(|size| *size > 0.0);
        if let Some(size) = buffer_size {
            let _ = write!(info, " average delay: {:.4}s", total / size);
        }
        Ok(info)
    }

    /// One fork per outgoing edge of the current stage.
    pub fn step_to_next_stage(&self) -> Result<Vec<Task>, TaskError> {
        let next = self.require_dag()?.get_next_nodes(&self.cur_flow_index)?;
        Ok(next.iter().map(|service| self.fork_task(service)).collect())
    }

    /// Every successor of the current stage with the predecessors it waits on.
    pub fn get_parallel_info_for_merge(&self) -> Result<Vec<ParallelJoint>, TaskError> {
        let dag = self.require_dag()?;
        dag.get_next_nodes(&self.cur_flow_index)?
            .iter()
            .map(|joint| {
                Ok(ParallelJoint {
                    joint_service: joint.clone(),
                    parallel_services: dag.get_prev_nodes(joint)?.to_vec(),
                })
            })
            .collect()
    }

    /// Copy of this task positioned at `new_flow_index`, with a fresh uuid.
    pub fn fork_task(&self, new_flow_index: &str) -> Task {
        let mut forked = self.clone();
        forked.task_uuid = Uuid::new_v4().to_string();
        forked.parent_uuid = self.task_uuid.clone();
        forked.past_flow_index = Some(self.cur_flow_index.clone());
        forked.cur_flow_index = new_flow_index.to_string();
        forked
    }

    /// Fold a sibling branch into this task at a join.
    ///
    /// Both tasks must share `root_uuid` and target node. Service records of
    /// every node between the lowest common ancestor of the two
    /// `past_flow_index` values and `other.past_flow_index` (inclusive of the
    /// latter) are taken from `other`.
    pub fn merge_task(&mut self, other: &Task) -> Result<(), TaskError> {
        if self.root_uuid != other.root_uuid {
            return Err(self.lineage_mismatch(other, "root uuids differ"));
        }
        if self.cur_flow_index != other.cur_flow_index {
            return Err(self.lineage_mismatch(other, "joint services differ"));
        }
        let own_past = self
            .past_flow_index
            .clone()
            .ok_or_else(|| TaskError::MissingPastFlowIndex(self.task_uuid.clone()))?;
        let other_past = other
            .past_flow_index
            .as_deref()
            .ok_or_else(|| TaskError::MissingPastFlowIndex(other.task_uuid.clone()))?;

        let branch = {
            let dag = self.require_dag()?;
            let ancestor = LcaSolver::new(dag)?.find_lca(&own_past, other_past)?;
            let mut branch = IntermediateNodeSolver::new(dag).get_intermediate_nodes(&ancestor, other_past)?;
            branch.insert(other_past.to_string());
            branch
        };

        let other_dag = other.require_dag()?;
        let dag = self.require_dag_mut()?;
        for name in branch {
            dag.replace_service(&name, other_dag.service(&name)?.clone())?;
        }
        Ok(())
    }

    pub fn to_value(&self) -> Result<Value, TaskError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: Value) -> Result<Self, TaskError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn serialize(&self) -> Result<String, TaskError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn deserialize(data: &str) -> Result<Self, TaskError> {
        Ok(serde_json::from_str(data)?)
    }

    fn require_completed_dag(&self) -> Result<&Dag, TaskError> {
        let dag = self.require_dag()?;
        if self.cur_flow_index != END {
            return Err(TaskError::Incomplete(self.cur_flow_index.clone()));
        }
        Ok(dag)
    }

    fn lineage_mismatch(&self, other: &Task, reason: &str) -> TaskError {
        TaskError::LineageMismatch {
            task: self.task_uuid.clone(),
            other: other.task_uuid.clone(),
            reason: reason.to_string(),
        }
    }
}
