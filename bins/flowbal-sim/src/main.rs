mod app;
mod cluster;
mod config;
mod workload;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use flowbal_app::{run_application, wait_for_shutdown_signal, AppInfo};
use flowbal_config::{Config, ConfigManager};
use flowbal_logging::init_logging;
use tokio::sync::oneshot;

use crate::app::SimApp;
use crate::config::SimConfig;

/// Run a simulated streaming cluster against the rebalancer.
#[derive(Parser, Debug)]
#[command(name = "flowbal-sim", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dump default configuration and exit
    #[arg(long)]
    dump_default_config: bool,

    /// Override the number of batches (0 runs until interrupted)
    #[arg(long)]
    batches: Option<u64>,

    /// Override the number of hosts
    #[arg(long)]
    hosts: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.dump_default_config {
        print!("{}", SimConfig::default().render());
        return Ok(());
    }

    let manager = Arc::new(match &args.config {
        Some(path) => ConfigManager::<SimConfig>::load(path)?,
        None => ConfigManager::new(SimConfig::default()),
    });
    let mut config = manager.snapshot();
    if let Some(batches) = args.batches {
        config.batches = batches;
    }
    if let Some(hosts) = args.hosts {
        config.hosts = hosts;
    }
    config.validate()?;

    let log = Arc::new(init_logging(&config.log)?);
    let info = AppInfo::current("flowbal-sim");
    tracing::info!(
        hostname = %info.hostname,
        pid = info.pid,
        started_at = %info.started_at,
        config = ?args.config,
        "starting flowbal simulator"
    );

    let (done_tx, done_rx) = oneshot::channel();
    let app = SimApp::new(manager, log, done_tx);
    run_application(app, config, async {
        tokio::select! {
            _ = wait_for_shutdown_signal() => {}
            _ = done_rx => {}
        }
    })
    .await?;

    tracing::info!("flowbal simulator stopped");
    Ok(())
}
