use std::collections::{BTreeSet, HashSet, VecDeque};

use crate::content::dag::Dag;
use crate::error::StructuralError;

/// Nodes lying on some path between two nodes.
pub struct IntermediateNodeSolver<'a> {
    dag: &'a Dag,
}

impl<'a> IntermediateNodeSolver<'a> {
    pub fn new(dag: &'a Dag) -> Self {
        Self { dag }
    }

    /// forward-reachable(`src`) ∩ reverse-reachable(`dst`), minus both ends.
    /// Empty when `dst` cannot be reached from `src`.
    pub fn get_intermediate_nodes(&self, src: &str, dst: &str) -> Result<BTreeSet<String>, StructuralError> {
        self.dag.get_node(src)?;
        self.dag.get_node(dst)?;

        let forward = self.reachable(src, true)?;
        if !forward.contains(dst) {
            return Ok(BTreeSet::new());
        }
        let reverse = self.reachable(dst, false)?;

        Ok(forward
            .intersection(&reverse)
            .filter(|node| **node != src && **node != dst)
            .map(|node| node.to_string())
            .collect())
    }

    fn reachable(&self, start: &str, downstream: bool) -> Result<HashSet<&'a str>, StructuralError> {
        let start = self.dag.get_node(start)?.service.service_name();
        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            let neighbours = if downstream {
                self.dag.get_next_nodes(current)?
            } else {
                self.dag.get_prev_nodes(current)?
            };
            for neighbour in neighbours {
                if visited.insert(neighbour.as_str()) {
                    queue.push_back(neighbour.as_str());
                }
            }
        }
        Ok(visited)
    }
}
