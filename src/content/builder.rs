use crate::content::dag::{Dag, END, START};
use crate::content::service::Service;
use crate::error::StructuralError;

/// Fluent construction of a deployment DAG.
///
/// Sentinels are added automatically unless the builder declared them:
/// `start` links to every parentless service, every childless service
/// links to `end`.
pub struct DagBuilder {
    services: Vec<Service>,
    edges: Vec<(String, String)>,
    default_device: String,
}

impl DagBuilder {
    pub fn new() -> Self {
        Self {
            services: Vec::new(),
            edges: Vec::new(),
            default_device: String::new(),
        }
    }

    /// Device assigned to services added through [`DagBuilder::service`].
    pub fn device(mut self, device: &str) -> Self {
        self.default_device = device.to_string();
        self
    }

    pub fn service(mut self, name: &str) -> Self {
        self.services.push(Service::with_device(name, self.default_device.as_str()));
        self
    }

    pub fn service_on(mut self, name: &str, device: &str) -> Self {
        self.services.push(Service::with_device(name, device));
        self
    }

    pub fn connect(mut self, source: &str, target: &str) -> Self {
        self.edges.push((source.to_string(), target.to_string()));
        self
    }

    /// Connect `source` to every target in order.
    pub fn fan_out(mut self, source: &str, targets: &[&str]) -> Self {
        for target in targets {
            self.edges.push((source.to_string(), target.to_string()));
        }
        self
    }

    pub fn build(self) -> Result<Dag, StructuralError> {
        let mut dag = Dag::new();
        let declares_sentinels = self
            .services
            .iter()
            .any(|s| s.service_name() == START || s.service_name() == END);

        for service in self.services {
            dag.add_node(service)?;
        }
        for (source, target) in &self.edges {
            dag.add_edge(source, target)?;
        }
        if !declares_sentinels {
            dag.add_start_node()?;
            dag.add_end_node()?;
        }
        dag.validate_dag()?;
        Ok(dag)
    }
}

impl Default for DagBuilder {
    fn default() -> Self {
        Self::new()
    }
}
