//! RigLog - test rig log manager daemon
//!
//! Polls the PLC and the current logger, builds one record per test cycle
//! and hands completed records to the configured sink until Ctrl-C.

use anyhow::Context;
use clap::Parser;
use riglog_core::cli::init_tracing;
use riglog_core::core::{notify, sink};
use riglog_core::{AppConfig, LogManager, SystemSerial};
use std::path::PathBuf;

/// RigLog daemon
#[derive(Parser, Debug)]
#[command(name = "riglog", version, about = "Endurance test rig log manager", long_about = None)]
struct Args {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, env = "RIGLOG_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging (ignored when RUST_LOG is set)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref()).context("loading configuration")?;
    let _guard = init_tracing(&config.logging, args.verbose)?;

    tracing::info!("Starting RigLog v{}", riglog_core::VERSION);

    let sink = sink::from_config(&config.sink).context("creating upload sink")?;
    let notifier = notify::from_config(&config.notify).context("creating notifier")?;
    tracing::info!(sink = sink.name(), notifier = notifier.name(), "Outputs configured");

    let mut manager = LogManager::new(SystemSerial, &config, sink, notifier);
    manager.log_port_listing();

    let delay = config.poll.startup_delay();
    if !delay.is_zero() {
        tracing::info!(delay = ?delay, "Waiting for devices to settle");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }

    manager
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Could not listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown requested");
        })
        .await;

    Ok(())
}
