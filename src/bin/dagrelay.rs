use std::path::{Path, PathBuf};

use anyhow::{Context as AnyhowContext, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use dagrelay::config::{RelayConfig, load_dag};
use dagrelay::content::{Dag, TaskCounter, Task};
use dagrelay::logging::{LogLevel, init_logging};
use dagrelay::solver::{IntermediateNodeSolver, LcaSolver};
use dagrelay::transport::{HttpTransport, TaskTransport};

#[derive(Parser)]
#[command(author, version, about = "Operator utility for dagrelay deployments", long_about = None)]
struct Cli {
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a deployment DAG and print its joins
    Validate {
        /// Path to the DAG YAML file
        dag: PathBuf,
    },
    /// Submit root tasks to the local controller
    Inject {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        dag: PathBuf,
        /// Blob sent along with every task
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value_t = 0)]
        source_id: i64,
        #[arg(long, default_value_t = 1)]
        count: u64,
        /// Place every service on this device instead of the DAG's placement
        #[arg(long)]
        device: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level)?;

    match cli.command {
        Commands::Validate { dag } => validate(&dag),
        Commands::Inject {
            config,
            dag,
            file,
            source_id,
            count,
            device,
        } => inject(config.as_deref(), &dag, &file, source_id, count, device.as_deref()).await,
    }
}

fn validate(path: &Path) -> Result<()> {
    let dag = load_dag(path)?;
    println!("DAG {} is valid ({} nodes)", path.display(), dag.len());

    for (name, node) in dag.iter() {
        println!(
            "  {name} @ {} -> [{}]",
            display_device(node.service.execute_device()),
            node.next_nodes.join(", ")
        );
    }
    for (name, node) in dag.iter().filter(|(_, node)| node.prev_nodes.len() > 1) {
        let (ancestor, intermediate) = describe_join(&dag, name, &node.prev_nodes)?;
        println!(
            "  join {name}: branches [{}] fork at {ancestor}, through [{}]",
            node.prev_nodes.join(", "),
            intermediate.join(", ")
        );
    }
    Ok(())
}

fn describe_join(dag: &Dag, join: &str, branches: &[String]) -> Result<(String, Vec<String>)> {
    let mut solver = LcaSolver::new(dag)?;
    let (first, rest) = branches
        .split_first()
        .ok_or_else(|| anyhow!("join {join} has no branches"))?;

    let mut ancestor = first.clone();
    for branch in rest {
        ancestor = solver.find_lca(&ancestor, branch)?;
    }
    let intermediate = IntermediateNodeSolver::new(dag)
        .get_intermediate_nodes(&ancestor, join)?
        .into_iter()
        .collect();
    Ok((ancestor, intermediate))
}

fn display_device(device: &str) -> &str {
    if device.is_empty() { "-" } else { device }
}

async fn inject(
    config: Option<&Path>,
    dag_path: &Path,
    file: &Path,
    source_id: i64,
    count: u64,
    device: Option<&str>,
) -> Result<()> {
    let config = RelayConfig::load(config)?;
    let mut dag = load_dag(dag_path)?;
    if let Some(device) = device {
        dag.set_execute_device(device);
    }

    let stem = file
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("invalid blob path {}", file.display()))?;
    let extension = file.extension().and_then(|s| s.to_str()).unwrap_or("bin");

    let transport = HttpTransport::new(config.network.clone(), config.local_device.as_str());
    let counter = TaskCounter::new();
    let counter_name = format!("source-{source_id}");

    for _ in 0..count {
        let task_id = i64::try_from(counter.next(&counter_name)).context("task id overflow")?;
        let mut task = Task::new(source_id, task_id, config.local_device.as_str(), dag.clone());
        task.set_all_edge_devices(config.network.nodes.keys().cloned().collect());
        task.set_file_path(Some(format!("{stem}_source-{source_id}_task-{task_id}.{extension}")));

        match transport.forward_to_device(&config.local_device, &task, file).await {
            Ok(()) => info!(source_id, task_id, root_uuid = task.root_uuid(), "Injected task"),
            Err(e) => warn!(source_id, task_id, error = %e, "Injection failed"),
        }
    }
    Ok(())
}
