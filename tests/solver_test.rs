mod common;

use std::collections::BTreeSet;

use dagrelay::content::{Dag, DagBuilder, END, START};
use dagrelay::error::StructuralError;
use dagrelay::solver::{IntermediateNodeSolver, LcaSolver, PathSolver};

use common::{LOCAL, diamond_dag, linear_dag};

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Diamond with an extra hop on the C branch: A -> C -> E -> D.
fn uneven_diamond() -> Dag {
    let mut dag = DagBuilder::new()
        .device(LOCAL)
        .service("A")
        .service("B")
        .service("C")
        .service("E")
        .service("D")
        .fan_out("A", &["B", "C"])
        .connect("B", "D")
        .connect("C", "E")
        .connect("E", "D")
        .build()
        .unwrap();
    for (name, transmit, execute) in [("A", 0.1, 0.1), ("B", 0.0, 1.0), ("C", 0.1, 0.1), ("E", 0.1, 0.1)] {
        let service = dag.service_mut(name).unwrap();
        service.set_transmit_time(transmit).unwrap();
        service.set_execute_time(execute).unwrap();
    }
    dag
}

#[test]
fn shortest_path_counts_hops() {
    let dag = uneven_diamond();
    let solver = PathSolver::new(&dag);

    assert_eq!(solver.get_shortest_path(START, END).unwrap(), names(&[START, "A", "B", "D", END]));
    assert_eq!(solver.get_shortest_path("B", "B").unwrap(), names(&["B"]));
    assert_eq!(
        solver.get_shortest_path("B", "C"),
        Err(StructuralError::NoPath("B".to_string(), "C".to_string()))
    );
    assert_eq!(
        solver.get_shortest_path("A", "ghost"),
        Err(StructuralError::NodeNotFound("ghost".to_string()))
    );
}

#[test]
fn all_paths_enumerates_every_branch() {
    let dag = uneven_diamond();
    let mut paths = PathSolver::new(&dag).get_all_paths("A", "D").unwrap();
    paths.sort();

    assert_eq!(paths, vec![names(&["A", "B", "D"]), names(&["A", "C", "E", "D"])]);
}

#[test]
fn weighted_paths_pick_cheapest_and_critical_branch() {
    let dag = uneven_diamond();
    let solver = PathSolver::new(&dag);
    let weight = |s: &dagrelay::content::Service| s.transmit_time() + s.execute_time();

    let (cost, path) = solver.get_weighted_shortest_path(START, END, weight).unwrap();
    assert!((cost - 0.6).abs() < 1e-9);
    assert_eq!(path, names(&[START, "A", "C", "E", "D", END]));

    let (cost, path) = solver.get_weighted_longest_path(START, END, weight).unwrap();
    assert!((cost - 1.2).abs() < 1e-9);
    assert_eq!(path, names(&[START, "A", "B", "D", END]));
}

#[test]
fn lca_of_diamond_branches_is_the_fork() {
    let dag = diamond_dag(LOCAL);
    let mut solver = LcaSolver::new(&dag).unwrap();

    assert_eq!(solver.find_lca("B", "C").unwrap(), "A");
    assert_eq!(solver.find_lca("C", "B").unwrap(), "A");
    assert_eq!(solver.depth("A").unwrap(), 1);
    assert_eq!(solver.depth("D").unwrap(), 3);
}

#[test]
fn lca_of_ancestor_pair_is_the_ancestor() {
    let dag = uneven_diamond();
    let mut solver = LcaSolver::new(&dag).unwrap();

    assert_eq!(solver.find_lca("A", "E").unwrap(), "A");
    assert_eq!(solver.find_lca("D", "C").unwrap(), "C");
    assert_eq!(solver.find_lca("B", "B").unwrap(), "B");
    assert_eq!(solver.find_lca("B", "E").unwrap(), "A");
    assert!(solver.ancestors("E").unwrap().contains("start"));
    assert!(solver.find_lca("B", "ghost").is_err());
}

#[test]
fn lca_prefers_deepest_common_ancestor() {
    // start -> X -> Y -> {P, Q}; X -> Q as well. Y is deeper than X.
    let dag = DagBuilder::new()
        .device(LOCAL)
        .service("X")
        .service("Y")
        .service("P")
        .service("Q")
        .connect("X", "Y")
        .fan_out("Y", &["P", "Q"])
        .connect("X", "Q")
        .build()
        .unwrap();
    let mut solver = LcaSolver::new(&dag).unwrap();

    assert_eq!(solver.find_lca("P", "Q").unwrap(), "Y");
}

#[test]
fn intermediate_nodes_lie_between_the_ends() {
    let dag = uneven_diamond();
    let solver = IntermediateNodeSolver::new(&dag);

    assert_eq!(
        solver.get_intermediate_nodes("A", "D").unwrap(),
        BTreeSet::from(["B".to_string(), "C".to_string(), "E".to_string()])
    );
    assert_eq!(
        solver.get_intermediate_nodes("C", "D").unwrap(),
        BTreeSet::from(["E".to_string()])
    );
    assert!(solver.get_intermediate_nodes("B", "E").unwrap().is_empty());
    assert!(solver.get_intermediate_nodes("A", "B").unwrap().is_empty());

    let linear = linear_dag(LOCAL);
    assert_eq!(
        IntermediateNodeSolver::new(&linear).get_intermediate_nodes(START, END).unwrap(),
        BTreeSet::from(["A".to_string(), "B".to_string()])
    );
}
