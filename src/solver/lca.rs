use std::collections::{HashMap, HashSet, VecDeque};

use crate::content::dag::Dag;
use crate::error::StructuralError;
use crate::solver::topological_order;

/// Lowest common ancestor of two nodes in a [`Dag`].
///
/// Depth is the longest distance from a root, so "lowest" means the common
/// ancestor furthest from the roots.
pub struct LcaSolver<'a> {
    dag: &'a Dag,
    depth_cache: HashMap<&'a str, usize>,
    ancestor_cache: HashMap<&'a str, HashSet<&'a str>>,
}

impl<'a> LcaSolver<'a> {
    pub fn new(dag: &'a Dag) -> Result<Self, StructuralError> {
        let mut depth_cache: HashMap<&'a str, usize> = HashMap::new();
        for node in topological_order(dag)? {
            let depth = depth_cache.get(node).copied().unwrap_or(0);
            depth_cache.insert(node, depth);
            for child in dag.get_next_nodes(node)? {
                let entry = depth_cache.entry(child.as_str()).or_insert(0);
                *entry = (*entry).max(depth + 1);
            }
        }

        Ok(Self {
            dag,
            depth_cache,
            ancestor_cache: HashMap::new(),
        })
    }

    pub fn depth(&self, node: &str) -> Result<usize, StructuralError> {
        self.depth_cache
            .get(node)
            .copied()
            .ok_or_else(|| StructuralError::NodeNotFound(node.to_string()))
    }

    /// `node` and everything upstream of it.
    pub fn ancestors(&mut self, node: &str) -> Result<&HashSet<&'a str>, StructuralError> {
        let node = self.resolve(node)?;
        if !self.ancestor_cache.contains_key(node) {
            let mut ancestors = HashSet::new();
            let mut stack = vec![node];
            while let Some(current) = stack.pop() {
                if ancestors.insert(current) {
                    stack.extend(self.dag.get_prev_nodes(current)?.iter().map(String::as_str));
                }
            }
            self.ancestor_cache.insert(node, ancestors);
        }
        self.ancestor_cache
            .get(node)
            .ok_or_else(|| StructuralError::NodeNotFound(node.to_string()))
    }

    /// Bidirectional BFS upwards from both nodes. Every node reached by both
    /// searches is a candidate; the search stops once nothing left in either
    /// frontier can produce a deeper candidate, and the deepest candidate wins.
    pub fn find_lca(&mut self, first: &str, second: &str) -> Result<String, StructuralError> {
        let first = self.resolve(first)?;
        let second = self.resolve(second)?;

        if self.ancestors(second)?.contains(first) {
            return Ok(first.to_string());
        }
        if self.ancestors(first)?.contains(second) {
            return Ok(second.to_string());
        }

        let mut forward_visited: HashSet<&'a str> = HashSet::from([first]);
        let mut backward_visited: HashSet<&'a str> = HashSet::from([second]);
        let mut forward = VecDeque::from([first]);
        let mut backward = VecDeque::from([second]);
        let mut best: Option<(&'a str, usize)> = None;

        while !forward.is_empty() || !backward.is_empty() {
            self.expand_level(&mut forward, &mut forward_visited, &backward_visited, &mut best)?;
            self.expand_level(&mut backward, &mut backward_visited, &forward_visited, &mut best)?;

            if let Some((_, best_depth)) = best {
                let frontier_depth = forward
                    .iter()
                    .chain(backward.iter())
                    .filter_map(|node| self.depth_cache.get(node).copied())
                    .max()
                    .unwrap_or(0);
                if frontier_depth <= best_depth {
                    break;
                }
            }
        }

        best.map(|(node, _)| node.to_string())
            .ok_or_else(|| StructuralError::NoCommonAncestor(first.to_string(), second.to_string()))
    }

    fn expand_level(
        &self,
        queue: &mut VecDeque<&'a str>,
        visited: &mut HashSet<&'a str>,
        other_visited: &HashSet<&'a str>,
        best: &mut Option<(&'a str, usize)>,
    ) -> Result<(), StructuralError> {
        for _ in 0..queue.len() {
            let Some(node) = queue.pop_front() else {
                break;
            };
            for parent in self.dag.get_prev_nodes(node)? {
                let parent = parent.as_str();
                if other_visited.contains(parent) {
                    let depth = self.depth(parent)?;
                    if best.is_none_or(|(_, best_depth)| depth > best_depth) {
                        *best = Some((parent, depth));
                    }
                }
                if visited.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }
        Ok(())
    }

    /// Map a caller-supplied name onto the DAG-owned key.
    fn resolve(&self, node: &str) -> Result<&'a str, StructuralError> {
        Ok(self.dag.get_node(node)?.service.service_name())
    }
}
