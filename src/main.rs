// src/main.rs
//! rpmirror - CLI entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rpmirror::repository::check_local_completeness;
use rpmirror::{MirrorConfig, Orchestrator};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "rpmirror")]
#[command(version)]
#[command(about = "Local mirror synchronizer for RPM repositories", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "/etc/rpmirror/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single mirror cycle and exit
    Run,

    /// Run mirror cycles forever at the configured interval
    Daemon,

    /// Report local completeness of every configured repository
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = MirrorConfig::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    match cli.command {
        Commands::Run => {
            let orchestrator = Orchestrator::new(config)?;
            let summary = orchestrator.run_cycle().await;
            if !summary.all_ok() {
                warn!("Cycle finished with failed repositories");
            }
            Ok(())
        }

        Commands::Daemon => run_daemon(config).await,

        Commands::Check => {
            for repo in config.repos() {
                match check_local_completeness(repo) {
                    Ok(report) => info!(
                        "Repo '{}': {}/{} present, {} missing, {} size-mismatched",
                        repo.name,
                        report.present,
                        report.total,
                        report.missing,
                        report.size_mismatched
                    ),
                    Err(e) => warn!("Repo '{}': completeness check failed: {e}", repo.name),
                }
            }
            Ok(())
        }
    }
}

/// Cycle forever at the configured interval, stopping on ctrl-c
///
/// A ctrl-c during a cycle cancels it at its next suspension point; any
/// half-downloaded packages are left as `*.downloading` siblings and
/// repaired by the next run.
async fn run_daemon(config: MirrorConfig) -> Result<()> {
    let interval = std::time::Duration::from_secs(config.sync_interval_secs);
    let orchestrator = Orchestrator::new(config)?;

    loop {
        tokio::select! {
            _ = orchestrator.run_cycle() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested, stopping current cycle");
                return Ok(());
            }
        }

        info!("Next cycle in {} seconds", interval.as_secs());
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested, exiting");
                return Ok(());
            }
        }
    }
}
