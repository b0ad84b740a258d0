//! Backup Vault - Main entry point
//!
//! Daemon that periodically snapshots configured directory trees into
//! compressed archives and prunes old ones by age, size, and count.

use anyhow::{Context, Result};
use backup_vault::orchestrator::Orchestrator;
use backup_vault::scheduler::Scheduler;
use backup_vault::unit::{LogNotifier, StaticRegistry};
use backup_vault::{logging, Config};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Run a single backup cycle for all units, then exit
    #[arg(long)]
    run_once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?
    } else {
        Config::default()
    };

    logging::init(&config.log, args.log_level.as_deref());

    // Bad configuration is fatal before anything else starts
    config.validate()?;
    std::fs::create_dir_all(&config.storage.root).with_context(|| {
        format!(
            "failed to create backup directory {}",
            config.storage.root.display()
        )
    })?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        root = %config.storage.root.display(),
        units = config.units.len(),
        "Starting backup-vault"
    );

    let registry = Arc::new(StaticRegistry::from_config(&config.units));
    let orchestrator = Arc::new(Orchestrator::new(&config, registry, Arc::new(LogNotifier)));

    if args.run_once {
        for handle in Arc::clone(&orchestrator).run_cycle().await {
            let _ = handle.await;
        }
        return Ok(());
    }

    let (scheduler, _handle) = Scheduler::new(orchestrator, config.schedule.clone());
    let shutdown = CancellationToken::new();

    let scheduler_task = tokio::spawn(scheduler.run(shutdown.clone()));

    wait_for_signal().await;
    shutdown.cancel();
    scheduler_task.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn wait_for_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
