use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as AnyhowContext, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use dagrelay::config::RelayConfig;
use dagrelay::controller::{Controller, FileOps, TaskCoordinator};
use dagrelay::logging::{LogLevel, init_logging};
use dagrelay::server::{AppState, serve};
use dagrelay::storage::{InMemoryJoinStore, JoinStore, RedisJoinStore};
use dagrelay::transport::HttpTransport;

#[derive(Parser, Debug)]
#[command(author, version, about = "Per-device task controller", long_about = None)]
struct Args {
    /// YAML config; environment variables override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind address, overrides `listen` from the config
    #[arg(long)]
    listen: Option<String>,

    /// Keep join state in process memory instead of Redis (single-node only)
    #[arg(long)]
    memory: bool,

    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level)?;

    let mut config = RelayConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    let store: Arc<dyn JoinStore> = if args.memory {
        info!("Running with in-memory join store");
        Arc::new(InMemoryJoinStore::new())
    } else {
        info!("Join store: {}", config.redis_url);
        Arc::new(RedisJoinStore::open(&config.redis_url).context("Invalid Redis URL")?)
    };
    let coordinator = TaskCoordinator::new(store)
        .with_storage_timeout(config.storage_timeout())
        .with_lock_timeouts(config.lock_timeout(), config.lock_wait());
    let transport = Arc::new(HttpTransport::new(config.network.clone(), config.local_device.as_str()));
    let controller = Controller::new(
        config.local_device.as_str(),
        transport,
        coordinator,
        FileOps::new(&config.temp_dir),
    )
    .with_display(config.display);

    let listener = TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    info!(device = %config.local_device, "Controller ready");

    let state = AppState::new(Arc::new(controller), config.delete_temp_files);
    serve(listener, state, shutdown_signal()).await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl+C, shutting down");
    }
}
