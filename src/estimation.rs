//! Time tickets kept in a task's `tmp_data`.
//!
//! A ticket is opened on one device and closed on whichever device the task
//! reaches next, so timestamps are wall-clock epoch seconds.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};

use crate::content::task::Task;
use crate::error::TaskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Transmit,
    Execute,
    RealExecute,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Transmit => "transmit",
            Phase::Execute => "execute",
            Phase::RealExecute => "real_execute",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct TimeEstimator;

impl TimeEstimator {
    /// Ticket for one phase of the task's current DAG stage:
    /// `{prefix}:{phase}_time_{flow_index}`.
    pub fn record_dag_ts(task: &mut Task, is_end: bool, phase: Phase) -> Result<f64, TaskError> {
        let tag = format!(
            "{}:{}_time_{}",
            task.time_ticket_tag_prefix(),
            phase,
            task.flow_index()
        );
        Self::record_ts(task.tmp_data_mut(), &tag, is_end)
    }

    /// Free-form ticket scoped to the task: `{prefix}:{tag}`.
    pub fn record_task_ts(task: &mut Task, tag: &str, is_end: bool) -> Result<f64, TaskError> {
        let tag = format!("{}:{}", task.time_ticket_tag_prefix(), tag);
        Self::record_ts(task.tmp_data_mut(), &tag, is_end)
    }

    /// Opening stores the current time under `tag` and returns 0. Closing
    /// removes the ticket and returns the elapsed seconds.
    pub fn record_ts(data: &mut Map<String, Value>, tag: &str, is_end: bool) -> Result<f64, TaskError> {
        if is_end {
            let start = data
                .remove(tag)
                .and_then(|v| v.as_f64())
                .ok_or_else(|| TaskError::TimeTicket(tag.to_string(), "end recorded without a start"))?;
            // clocks on different devices may disagree slightly
            Ok((now_secs() - start).max(0.0))
        } else {
            if data.contains_key(tag) {
                return Err(TaskError::TimeTicket(tag.to_string(), "start recorded twice"));
            }
            data.insert(tag.to_string(), Value::from(now_secs()));
            Ok(0.0)
        }
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
