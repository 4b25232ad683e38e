//! Graph algorithms over a [`Dag`](crate::content::dag::Dag).

pub mod intermediate;
pub mod lca;
pub mod path;

pub use intermediate::IntermediateNodeSolver;
pub use lca::LcaSolver;
pub use path::PathSolver;

use std::collections::{HashMap, VecDeque};

use crate::content::dag::Dag;
use crate::error::StructuralError;

/// Kahn's algorithm. Fails on a cycle, which a validated DAG never has.
pub(crate) fn topological_order(dag: &Dag) -> Result<Vec<&str>, StructuralError> {
    let mut in_degree: HashMap<&str, usize> = dag
        .iter()
        .map(|(name, node)| (name, node.prev_nodes.len()))
        .collect();

    let mut queue: VecDeque<&str> = dag.roots().collect();
    let mut order = Vec::with_capacity(dag.len());
    while let Some(current) = queue.pop_front() {
        order.push(current);
        for child in dag.get_next_nodes(current)? {
            if let Some(degree) = in_degree.get_mut(child.as_str()) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(child.as_str());
                }
            }
        }
    }

    if order.len() != dag.len() {
        let stuck = in_degree
            .into_iter()
            .find(|(_, degree)| *degree > 0)
            .map(|(name, _)| name.to_string())
            .unwrap_or_default();
        return Err(StructuralError::Cycle(stuck));
    }
    Ok(order)
}
