use thiserror::Error;

/// Defects in a DAG handed to us by the scheduler. These never get retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StructuralError {
    #[error("node '{0}' does not exist in DAG")]
    NodeNotFound(String),

    #[error("node '{0}' already exists in DAG")]
    DuplicateNode(String),

    #[error("DAG key '{key}' wraps service '{service}'")]
    NameMismatch { key: String, service: String },

    #[error("'{0}' is a reserved sentinel name")]
    ReservedName(String),

    #[error("duplicate edge in DAG: {from} -> {to}")]
    DuplicateEdge { from: String, to: String },

    #[error("node '{from}' references missing node '{to}'")]
    DanglingReference { from: String, to: String },

    #[error("adjacency mismatch: '{from}' lists '{to}' as next node but '{to}' does not list '{from}' as previous node")]
    InconsistentEdge { from: String, to: String },

    #[error("cycle in DAG involving node '{0}'")]
    Cycle(String),

    #[error("DAG is not connected, unreachable nodes: {0:?}")]
    Disconnected(Vec<String>),

    #[error("invalid sentinel layout: {0}")]
    Sentinel(String),

    #[error("no common ancestor between '{0}' and '{1}'")]
    NoCommonAncestor(String, String),

    #[error("no path exists from '{0}' to '{1}'")]
    NoPath(String, String),
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error("task DAG is empty")]
    MissingDag,

    #[error("DAG is not completed, current service: {0}")]
    Incomplete(String),

    #[error("{kind} time of service '{service}' is negative: {value}")]
    NegativeTime {
        kind: &'static str,
        service: String,
        value: f64,
    },

    #[error("cannot merge task {other} into {task}: {reason}")]
    LineageMismatch {
        task: String,
        other: String,
        reason: String,
    },

    #[error("task {0} has no past flow index")]
    MissingPastFlowIndex(String),

    #[error("time ticket '{0}': {1}")]
    TimeTicket(String, &'static str),

    #[error("task (de)serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}
