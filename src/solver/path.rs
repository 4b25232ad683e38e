use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use crate::content::dag::Dag;
use crate::content::service::Service;
use crate::error::StructuralError;
use crate::solver::topological_order;

/// Path finding over the `next_nodes` adjacency of a [`Dag`].
pub struct PathSolver<'a> {
    dag: &'a Dag,
}

impl<'a> PathSolver<'a> {
    pub fn new(dag: &'a Dag) -> Self {
        Self { dag }
    }

    /// Fewest-hops path from `src` to `dst` (BFS).
    pub fn get_shortest_path(&self, src: &str, dst: &str) -> Result<Vec<String>, StructuralError> {
        self.validate_nodes_exist(&[src, dst])?;

        let mut predecessors: HashMap<&str, &str> = HashMap::new();
        let mut visited: HashSet<&str> = HashSet::from([src]);
        let mut queue = VecDeque::from([src]);

        while let Some(current) = queue.pop_front() {
            if current == dst {
                break;
            }
            for child in self.dag.get_next_nodes(current)? {
                if visited.insert(child.as_str()) {
                    predecessors.insert(child.as_str(), current);
                    queue.push_back(child.as_str());
                }
            }
        }

        if src != dst && !predecessors.contains_key(dst) {
            return Err(StructuralError::NoPath(src.to_string(), dst.to_string()));
        }
        Ok(rebuild_path(&predecessors, src, dst))
    }

    /// Every simple path from `src` to `dst` (DFS). Exponential in the worst case.
    pub fn get_all_paths(&self, src: &str, dst: &str) -> Result<Vec<Vec<String>>, StructuralError> {
        self.validate_nodes_exist(&[src, dst])?;

        let mut paths = Vec::new();
        let mut stack = vec![(src, vec![src.to_string()])];

        while let Some((current, path)) = stack.pop() {
            if current == dst {
                paths.push(path);
                continue;
            }
            for child in self.dag.get_next_nodes(current)? {
                if !path.contains(child) {
                    let mut extended = path.clone();
                    extended.push(child.clone());
                    stack.push((child.as_str(), extended));
                }
            }
        }

        if paths.is_empty() {
            return Err(StructuralError::NoPath(src.to_string(), dst.to_string()));
        }
        Ok(paths)
    }

    /// Minimum-weight path (Dijkstra). The weight of a path is the sum of
    /// `weight` over every service on it, `src` included.
    pub fn get_weighted_shortest_path<F>(
        &self,
        src: &str,
        dst: &str,
        weight: F,
    ) -> Result<(f64, Vec<String>), StructuralError>
    where
        F: Fn(&Service) -> f64,
    {
        self.validate_nodes_exist(&[src, dst])?;

        let mut distances: HashMap<&str, f64> = HashMap::new();
        let mut predecessors: HashMap<&str, &str> = HashMap::new();
        let mut heap = BinaryHeap::new();

        let initial = weight(self.dag.service(src)?);
        distances.insert(src, initial);
        heap.push(HeapEntry { cost: initial, node: src });

        while let Some(HeapEntry { cost, node }) = heap.pop() {
            if node == dst {
                break;
            }
            if cost > distances.get(node).copied().unwrap_or(f64::INFINITY) {
                continue;
            }
            for child in self.dag.get_next_nodes(node)? {
                let next_cost = cost + weight(self.dag.service(child)?);
                if next_cost < distances.get(child.as_str()).copied().unwrap_or(f64::INFINITY) {
                    distances.insert(child.as_str(), next_cost);
                    predecessors.insert(child.as_str(), node);
                    heap.push(HeapEntry { cost: next_cost, node: child.as_str() });
                }
            }
        }

        let total = distances
            .get(dst)
            .copied()
            .ok_or_else(|| StructuralError::NoPath(src.to_string(), dst.to_string()))?;
        Ok((total, rebuild_path(&predecessors, src, dst)))
    }

    /// Maximum-weight path, i.e. the critical path of a fork/join DAG.
    /// Dynamic programming over a topological order, same weighting as
    /// [`PathSolver::get_weighted_shortest_path`].
    pub fn get_weighted_longest_path<F>(
        &self,
        src: &str,
        dst: &str,
        weight: F,
    ) -> Result<(f64, Vec<String>), StructuralError>
    where
        F: Fn(&Service) -> f64,
    {
        self.validate_nodes_exist(&[src, dst])?;

        let order = topological_order(self.dag)?;
        let mut best: HashMap<&str, f64> = HashMap::from([(src, weight(self.dag.service(src)?))]);
        let mut predecessors: HashMap<&str, &str> = HashMap::new();

        for node in order {
            let Some(&cost) = best.get(node) else {
                continue;
            };
            for child in self.dag.get_next_nodes(node)? {
                let next_cost = cost + weight(self.dag.service(child)?);
                let current = best.get(child.as_str()).copied().unwrap_or(f64::NEG_INFINITY);
                if next_cost > current {
                    best.insert(child.as_str(), next_cost);
                    predecessors.insert(child.as_str(), node);
                }
            }
        }

        let total = best
            .get(dst)
            .copied()
            .ok_or_else(|| StructuralError::NoPath(src.to_string(), dst.to_string()))?;
        Ok((total, rebuild_path(&predecessors, src, dst)))
    }

    fn validate_nodes_exist(&self, nodes: &[&str]) -> Result<(), StructuralError> {
        for node in nodes {
            self.dag.get_node(node)?;
        }
        Ok(())
    }
}

fn rebuild_path<'n>(predecessors: &HashMap<&'n str, &'n str>, src: &str, dst: &'n str) -> Vec<String> {
    let mut path = vec![dst.to_string()];
    let mut current = dst;
    while current != src {
        match predecessors.get(current) {
            Some(&prev) => {
                path.push(prev.to_string());
                current = prev;
            }
            None => break,
        }
    }
    path.reverse();
    path
}

#[derive(Debug)]
struct HeapEntry<'a> {
    cost: f64,
    node: &'a str,
}

impl PartialEq for HeapEntry<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cost.total_cmp(&other.cost) == Ordering::Equal && self.node == other.node
    }
}

impl Eq for HeapEntry<'_> {}

impl PartialOrd for HeapEntry<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so that `BinaryHeap` pops the cheapest entry first.
impl Ord for HeapEntry<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(self.node))
    }
}
