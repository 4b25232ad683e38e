mod common;

use std::collections::HashSet;

use serde_json::json;

use dagrelay::content::{END, START, Task};
use dagrelay::error::TaskError;
use dagrelay::estimation::{Phase, TimeEstimator};

use common::{LOCAL, diamond_dag, linear_dag};

fn completed_linear_task() -> Task {
    let root = Task::new(1, 2, LOCAL, linear_dag(LOCAL));
    let mut task = root.fork_task("A");
    task.save_transmit_time(0.1).unwrap();
    task.save_execute_time(0.2).unwrap();
    let mut task = task.fork_task("B");
    task.save_transmit_time(0.05).unwrap();
    task.save_execute_time(0.3).unwrap();
    task.fork_task(END)
}

#[test]
fn new_task_is_a_lineage_root() {
    let task = Task::new(1, 2, LOCAL, linear_dag(LOCAL));

    assert_eq!(task.flow_index(), START);
    assert_eq!(task.past_flow_index(), None);
    assert_eq!(task.parent_uuid(), "");
    assert_eq!(task.task_uuid(), task.root_uuid());
    assert_eq!(task.get_current_service_info().unwrap(), (START, ""));
}

#[test]
fn fork_keeps_root_and_links_parent() {
    let task = Task::new(1, 2, LOCAL, diamond_dag(LOCAL));
    let forked = task.fork_task("A");

    assert_eq!(forked.root_uuid(), task.root_uuid());
    assert_eq!(forked.parent_uuid(), task.task_uuid());
    assert_ne!(forked.task_uuid(), task.task_uuid());
    assert_eq!(forked.past_flow_index(), Some(START));
    assert_eq!(forked.flow_index(), "A");
    assert_eq!(forked.get_current_stage_device().unwrap(), LOCAL);

    let uuids: HashSet<String> = (0..1000).map(|_| task.fork_task("A").task_uuid().to_string()).collect();
    assert_eq!(uuids.len(), 1000);
}

#[test]
fn forks_do_not_share_dag_state() {
    let task = Task::new(1, 2, LOCAL, diamond_dag(LOCAL)).fork_task("A");
    let mut branches = task.step_to_next_stage().unwrap();
    assert_eq!(branches.len(), 2);

    branches[0].set_content(Some(json!("b"))).unwrap();
    assert_eq!(branches[0].flow_index(), "B");
    assert_eq!(branches[1].flow_index(), "C");
    assert!(branches[1].require_dag().unwrap().service("B").unwrap().content().is_none());
    assert!(task.require_dag().unwrap().service("B").unwrap().content().is_none());
}

#[test]
fn parallel_info_lists_predecessors_of_each_successor() {
    let task = Task::new(1, 2, LOCAL, diamond_dag(LOCAL)).fork_task("A").fork_task("B");
    let joints = task.get_parallel_info_for_merge().unwrap();

    assert_eq!(joints.len(), 1);
    assert_eq!(joints[0].joint_service, "D");
    assert_eq!(joints[0].parallel_services, vec!["B".to_string(), "C".to_string()]);
}

#[test]
fn merge_copies_the_sibling_branch() {
    let a = Task::new(1, 2, LOCAL, diamond_dag(LOCAL)).fork_task("A");
    let mut b = a.fork_task("B");
    b.set_content(Some(json!({"from": "b"}))).unwrap();
    b.save_execute_time(0.5).unwrap();
    let mut c = a.fork_task("C");
    c.set_content(Some(json!({"from": "c"}))).unwrap();

    let mut joined = c.fork_task("D");
    joined.merge_task(&b.fork_task("D")).unwrap();

    let dag = joined.require_dag().unwrap();
    assert_eq!(dag.service("B").unwrap().content(), Some(&json!({"from": "b"})));
    assert_eq!(dag.service("B").unwrap().execute_time(), 0.5);
    assert_eq!(dag.service("C").unwrap().content(), Some(&json!({"from": "c"})));
}

#[test]
fn merge_rejects_foreign_or_misaligned_tasks() {
    let a = Task::new(1, 2, LOCAL, diamond_dag(LOCAL)).fork_task("A");
    let mut joined = a.fork_task("B").fork_task("D");

    let stranger = Task::new(1, 3, LOCAL, diamond_dag(LOCAL)).fork_task("A").fork_task("C").fork_task("D");
    assert!(matches!(
        joined.merge_task(&stranger),
        Err(TaskError::LineageMismatch { .. })
    ));

    let elsewhere = a.fork_task("C");
    assert!(matches!(
        joined.merge_task(&elsewhere),
        Err(TaskError::LineageMismatch { .. })
    ));
}

#[test]
fn total_time_sums_the_critical_path() {
    let task = completed_linear_task();
    assert!((task.calculate_total_time().unwrap() - 0.65).abs() < 1e-9);
    assert!((task.calculate_cloud_edge_transmit_time().unwrap() - 0.1).abs() < 1e-9);

    let info = task.get_delay_info().unwrap();
    assert!(info.contains("stage[A]"));
    assert!(info.contains("total delay:0.6500s"));
}

#[test]
fn total_time_counts_only_the_slowest_branch_of_a_fan_out() {
    let mut task = Task::new(1, 2, LOCAL, diamond_dag(LOCAL)).fork_task(END);
    let dag = task.require_dag_mut().unwrap();
    for (name, execute) in [("A", 0.1), ("B", 0.5), ("C", 0.2), ("D", 0.1)] {
        dag.service_mut(name).unwrap().set_execute_time(execute).unwrap();
    }

    assert!((task.calculate_total_time().unwrap() - 0.7).abs() < 1e-9);
}

#[test]
fn timing_reports_require_a_finished_task() {
    let task = Task::new(1, 2, LOCAL, linear_dag(LOCAL)).fork_task("A");
    assert!(matches!(task.calculate_total_time(), Err(TaskError::Incomplete(stage)) if stage == "A"));
    assert!(task.get_delay_info().is_err());
}

#[test]
fn negative_durations_are_rejected() {
    let mut task = Task::new(1, 2, LOCAL, linear_dag(LOCAL)).fork_task("A");
    assert!(matches!(
        task.save_execute_time(-1.0),
        Err(TaskError::NegativeTime { kind: "execute", .. })
    ));
}

#[test]
fn time_tickets_travel_in_tmp_data() {
    let mut task = Task::new(1, 2, LOCAL, linear_dag(LOCAL)).fork_task("A");
    TimeEstimator::record_dag_ts(&mut task, false, Phase::Transmit).unwrap();

    let tag = format!("{}:transmit_time_A", task.time_ticket_tag_prefix());
    assert!(task.tmp_data().contains_key(&tag));
    assert!(tag.starts_with(&format!("dagrelay:source-1-task-2:{}", task.root_uuid())));

    // the ticket survives a hop to another device
    let mut arrived = Task::deserialize(&task.serialize().unwrap()).unwrap();
    let duration = TimeEstimator::record_dag_ts(&mut arrived, true, Phase::Transmit).unwrap();
    assert!(duration >= 0.0);
    assert!(arrived.tmp_data().is_empty());
    assert!(TimeEstimator::record_dag_ts(&mut arrived, true, Phase::Transmit).is_err());
}

#[test]
fn wire_format_uses_the_published_field_names() {
    let mut task = Task::new(3, 4, LOCAL, diamond_dag(LOCAL)).fork_task("A");
    task.set_metadata(Some(json!({"buffer_size": 4})));
    task.set_file_path(Some("frame.bin".to_string()));
    task.add_hash_data(json!("abc"));

    let value = task.to_value().unwrap();
    for key in [
        "source_id",
        "task_id",
        "source_device",
        "all_edge_devices",
        "dag",
        "cur_flow_index",
        "past_flow_index",
        "meta_data",
        "raw_meta_data",
        "scenario_data",
        "tmp_data",
        "hash_data",
        "file_path",
        "task_uuid",
        "parent_uuid",
        "root_uuid",
    ] {
        assert!(value.get(key).is_some(), "missing field {key}");
    }
    assert_eq!(value["cur_flow_index"], "A");
    assert_eq!(value["past_flow_index"], START);
    assert_eq!(value["meta_data"]["buffer_size"], 4);

    let back = Task::from_value(value).unwrap();
    assert_eq!(back, task);
    assert_eq!(back.require_dag().unwrap(), task.require_dag().unwrap());
}

#[test]
fn minimal_wire_task_is_accepted() {
    let task = Task::from_value(json!({
        "source_id": 0,
        "task_id": 1,
        "dag": null,
        "cur_flow_index": "start"
    }))
    .unwrap();

    assert!(task.dag().is_none());
    assert!(matches!(task.get_current_service_info(), Err(TaskError::MissingDag)));
    assert!(Task::deserialize("{not json").is_err());
}
