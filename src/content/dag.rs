use std::collections::{BTreeMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::content::service::Service;
use crate::error::StructuralError;

pub const START: &str = "start";
pub const END: &str = "end";

/// A service plus its adjacency. Only lives inside a [`Dag`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub service: Service,
    #[serde(default)]
    pub prev_nodes: Vec<String>,
    #[serde(default)]
    pub next_nodes: Vec<String>,
}

impl Node {
    fn new(service: Service) -> Self {
        Self {
            service,
            prev_nodes: Vec::new(),
            next_nodes: Vec::new(),
        }
    }
}

/// Arena of named nodes. Nodes point at each other by name, so cloning a
/// `Dag` is a plain value copy with no aliasing between forks.
///
/// Deserializing goes through [`Dag::from_nodes`], which repairs missing
/// reverse references, adds the `start`/`end` sentinels when absent and
/// validates the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, Node>", into = "BTreeMap<String, Node>")]
pub struct Dag {
    nodes: BTreeMap<String, Node>,
}

impl TryFrom<BTreeMap<String, Node>> for Dag {
    type Error = StructuralError;

    fn try_from(nodes: BTreeMap<String, Node>) -> Result<Self, Self::Error> {
        Dag::from_nodes(nodes)
    }
}

impl From<Dag> for BTreeMap<String, Node> {
    fn from(dag: Dag) -> Self {
        dag.nodes
    }
}

impl Dag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: BTreeMap<String, Node>) -> Result<Self, StructuralError> {
        for (key, node) in &nodes {
            if key != node.service.service_name() {
                return Err(StructuralError::NameMismatch {
                    key: key.clone(),
                    service: node.service.service_name().to_string(),
                });
            }
        }

        let mut dag = Self { nodes };
        dag.repair_adjacency()?;
        if !dag.contains(START) {
            dag.add_start_node()?;
            dag.add_end_node()?;
        }
        dag.validate_dag()?;
        Ok(dag)
    }

    pub fn add_node(&mut self, service: Service) -> Result<(), StructuralError> {
        let name = service.service_name().to_string();
        if self.nodes.contains_key(&name) {
            return Err(StructuralError::DuplicateNode(name));
        }
        self.nodes.insert(name, Node::new(service));
        Ok(())
    }

    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<(), StructuralError> {
        self.get_node(to)?;
        let source = self.get_node_mut(from)?;
        if source.next_nodes.iter().any(|n| n == to) {
            return Err(StructuralError::DuplicateEdge {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        source.next_nodes.push(to.to_string());
        self.get_node_mut(to)?.prev_nodes.push(from.to_string());
        Ok(())
    }

    /// Insert the `start` sentinel and link it to every parentless node.
    pub fn add_start_node(&mut self) -> Result<(), StructuralError> {
        if self.contains(START) {
            return Err(StructuralError::ReservedName(START.to_string()));
        }
        let roots: Vec<String> = self.roots().map(str::to_string).collect();
        self.add_node(Service::new(START))?;
        for root in roots {
            self.add_edge(START, &root)?;
        }
        Ok(())
    }

    /// Insert the `end` sentinel and link every childless node to it.
    pub fn add_end_node(&mut self) -> Result<(), StructuralError> {
        if self.contains(END) {
            return Err(StructuralError::ReservedName(END.to_string()));
        }
        let leaves: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.next_nodes.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        self.add_node(Service::new(END))?;
        for leaf in leaves {
            self.add_edge(&leaf, END)?;
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.nodes.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.nodes.values().map(|node| &node.service)
    }

    /// Nodes without predecessors.
    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.prev_nodes.is_empty())
            .map(|(name, _)| name.as_str())
    }

    pub fn get_node(&self, name: &str) -> Result<&Node, StructuralError> {
        self.nodes
            .get(name)
            .ok_or_else(|| StructuralError::NodeNotFound(name.to_string()))
    }

    pub fn get_node_mut(&mut self, name: &str) -> Result<&mut Node, StructuralError> {
        self.nodes
            .get_mut(name)
            .ok_or_else(|| StructuralError::NodeNotFound(name.to_string()))
    }

    pub fn service(&self, name: &str) -> Result<&Service, StructuralError> {
        Ok(&self.get_node(name)?.service)
    }

    pub fn service_mut(&mut self, name: &str) -> Result<&mut Service, StructuralError> {
        Ok(&mut self.get_node_mut(name)?.service)
    }

    /// Replace the service record of `name` wholesale, keeping adjacency.
    pub fn replace_service(&mut self, name: &str, service: Service) -> Result<(), StructuralError> {
        *self.service_mut(name)? = service;
        Ok(())
    }

    pub fn get_next_nodes(&self, name: &str) -> Result<&[String], StructuralError> {
        Ok(&self.get_node(name)?.next_nodes)
    }

    pub fn get_prev_nodes(&self, name: &str) -> Result<&[String], StructuralError> {
        Ok(&self.get_node(name)?.prev_nodes)
    }

    pub fn set_execute_device(&mut self, device: &str) {
        for node in self.nodes.values_mut() {
            node.service.set_execute_device(device);
        }
    }

    /// Topology and placement only; timings and results are dropped.
    pub fn deployment_info(&self) -> Dag {
        let nodes = self
            .nodes
            .iter()
            .map(|(name, node)| {
                let service = Service::with_device(name.clone(), node.service.execute_device());
                (
                    name.clone(),
                    Node {
                        service,
                        prev_nodes: node.prev_nodes.clone(),
                        next_nodes: node.next_nodes.clone(),
                    },
                )
            })
            .collect();
        Dag { nodes }
    }

    /// Check adjacency consistency, duplicate edges, cycles, connectivity and
    /// the sentinel layout. Stops at the first violation.
    pub fn validate_dag(&self) -> Result<(), StructuralError> {
        self.check_adjacency()?;
        self.check_duplicate_edges()?;
        self.check_cycles()?;
        self.check_connected()?;
        self.check_sentinels()
    }

    /// Fill in missing reverse references. A reference to a node that does
    /// not exist cannot be repaired.
    fn repair_adjacency(&mut self) -> Result<(), StructuralError> {
        let mut missing_prev = Vec::new();
        let mut missing_next = Vec::new();

        for (name, node) in &self.nodes {
            for next in &node.next_nodes {
                let target = self.nodes.get(next).ok_or_else(|| StructuralError::DanglingReference {
                    from: name.clone(),
                    to: next.clone(),
                })?;
                if !target.prev_nodes.contains(name) {
                    missing_prev.push((next.clone(), name.clone()));
                }
            }
            for prev in &node.prev_nodes {
                let source = self.nodes.get(prev).ok_or_else(|| StructuralError::DanglingReference {
                    from: name.clone(),
                    to: prev.clone(),
                })?;
                if !source.next_nodes.contains(name) {
                    missing_next.push((prev.clone(), name.clone()));
                }
            }
        }

        for (target, prev) in missing_prev {
            let node = self.get_node_mut(&target)?;
            if !node.prev_nodes.contains(&prev) {
                node.prev_nodes.push(prev);
            }
        }
        for (source, next) in missing_next {
            let node = self.get_node_mut(&source)?;
            if !node.next_nodes.contains(&next) {
                node.next_nodes.push(next);
            }
        }
        Ok(())
    }

    fn check_adjacency(&self) -> Result<(), StructuralError> {
        for (name, node) in &self.nodes {
            for next in &node.next_nodes {
                let target = self.nodes.get(next).ok_or_else(|| StructuralError::DanglingReference {
                    from: name.clone(),
                    to: next.clone(),
                })?;
                if !target.prev_nodes.contains(name) {
                    return Err(StructuralError::InconsistentEdge {
                        from: name.clone(),
                        to: next.clone(),
                    });
                }
            }
            for prev in &node.prev_nodes {
                let source = self.nodes.get(prev).ok_or_else(|| StructuralError::DanglingReference {
                    from: name.clone(),
                    to: prev.clone(),
                })?;
                if !source.next_nodes.contains(name) {
                    return Err(StructuralError::InconsistentEdge {
                        from: prev.clone(),
                        to: name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// An edge may be listed once on each side.
    fn check_duplicate_edges(&self) -> Result<(), StructuralError> {
        let mut forward = HashSet::new();
        let mut backward = HashSet::new();
        for (name, node) in &self.nodes {
            for next in &node.next_nodes {
                if !forward.insert((name.as_str(), next.as_str())) {
                    return Err(StructuralError::DuplicateEdge {
                        from: name.clone(),
                        to: next.clone(),
                    });
                }
            }
            for prev in &node.prev_nodes {
                if !backward.insert((prev.as_str(), name.as_str())) {
                    return Err(StructuralError::DuplicateEdge {
                        from: prev.clone(),
                        to: name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_cycles(&self) -> Result<(), StructuralError> {
        let mut visited = HashSet::new();
        let mut stack = HashSet::new();
        for name in self.nodes.keys() {
            self.visit(name, &mut visited, &mut stack)?;
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        visited: &mut HashSet<&'a str>,
        stack: &mut HashSet<&'a str>,
    ) -> Result<(), StructuralError> {
        if stack.contains(name) {
            return Err(StructuralError::Cycle(name.to_string()));
        }
        if !visited.insert(name) {
            return Ok(());
        }
        stack.insert(name);
        for next in self.get_next_nodes(name)? {
            self.visit(next, visited, stack)?;
        }
        stack.remove(name);
        Ok(())
    }

    fn check_connected(&self) -> Result<(), StructuralError> {
        let Some(first) = self.nodes.keys().next() else {
            return Ok(());
        };

        let mut seen: HashSet<&str> = HashSet::from([first.as_str()]);
        let mut queue = VecDeque::from([first.as_str()]);
        while let Some(current) = queue.pop_front() {
            let node = self.get_node(current)?;
            for neighbour in node.next_nodes.iter().chain(node.prev_nodes.iter()) {
                if seen.insert(neighbour.as_str()) {
                    queue.push_back(neighbour.as_str());
                }
            }
        }

        if seen.len() != self.nodes.len() {
            let unreachable = self
                .nodes
                .keys()
                .filter(|name| !seen.contains(name.as_str()))
                .cloned()
                .collect();
            return Err(StructuralError::Disconnected(unreachable));
        }
        Ok(())
    }

    fn check_sentinels(&self) -> Result<(), StructuralError> {
        let start = self
            .nodes
            .get(START)
            .ok_or_else(|| StructuralError::Sentinel(format!("missing '{START}' node")))?;
        if !start.prev_nodes.is_empty() {
            return Err(StructuralError::Sentinel(format!("'{START}' has predecessors")));
        }
        let end = self
            .nodes
            .get(END)
            .ok_or_else(|| StructuralError::Sentinel(format!("missing '{END}' node")))?;
        if !end.next_nodes.is_empty() {
            return Err(StructuralError::Sentinel(format!("'{END}' has successors")));
        }

        for (name, node) in &self.nodes {
            if name != START && node.prev_nodes.is_empty() {
                return Err(StructuralError::Sentinel(format!(
                    "node '{name}' is not reachable from '{START}'"
                )));
            }
            if name != END && node.next_nodes.is_empty() {
                return Err(StructuralError::Sentinel(format!(
                    "node '{name}' does not lead to '{END}'"
                )));
            }
        }
        Ok(())
    }
}
