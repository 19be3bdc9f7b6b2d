//! Controller CLI commands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::kube::run_controller;
use crate::adapters::notify;
use crate::cli::output::{output, CommandOutput};
use crate::cli::runtime::{build_verifier, Runtime};
use crate::domain::models::{Config, Tenant};
use crate::domain::ports::ResourceStore;
use crate::services::enforcement::ScannerStatus;
use crate::services::{ConvergenceEngine, NotificationForwarder};

#[derive(Args, Debug)]
pub struct ControllerArgs {
    #[command(subcommand)]
    pub command: ControllerCommands,
}

#[derive(Subcommand, Debug)]
pub enum ControllerCommands {
    /// Run the tenant controller and the enforcement scanner until interrupted
    Run {
        /// Use the in-memory store and a static verifier
        #[arg(long)]
        dry_run: bool,
        /// Seed file for the in-memory store (dry run only)
        #[arg(long, value_name = "FILE", requires = "dry_run")]
        tenants: Option<PathBuf>,
        /// Images the static verifier rejects (dry run only)
        #[arg(long, value_delimiter = ',', requires = "dry_run")]
        deny: Vec<String>,
    },
}

#[derive(Debug, Serialize)]
pub struct ControllerRunOutput {
    pub mode: &'static str,
    pub scanner: ScannerStatus,
    pub notifications_delivered: u64,
}

impl CommandOutput for ControllerRunOutput {
    fn to_human(&self) -> String {
        format!(
            "Controller stopped ({} mode): {} scan pass(es), {} failed, {} eviction(s), {} notification(s) delivered.",
            self.mode,
            self.scanner.total_passes,
            self.scanner.failed_passes,
            self.scanner.total_evictions,
            self.notifications_delivered,
        )
    }
}

pub async fn execute(args: ControllerArgs, config: &Config, json_mode: bool) -> Result<()> {
    match args.command {
        ControllerCommands::Run {
            dry_run,
            tenants,
            deny,
        } => {
            let runtime = if dry_run {
                let runtime = Runtime::in_memory(config);
                if let Some(path) = tenants {
                    runtime.seed(&path).await?;
                }
                runtime
            } else {
                Runtime::connect(config).await?
            };
            let result = run(&runtime, config, &deny).await?;
            output(&result, json_mode);
            Ok(())
        }
    }
}

async fn run(runtime: &Runtime, config: &Config, deny: &[String]) -> Result<ControllerRunOutput> {
    let verifier = build_verifier(config, runtime.is_dry_run(), deny)?;
    let notifier = notify::from_config(&config.notifier).context("Failed to set up notifications")?;

    let shutdown = CancellationToken::new();
    let forwarder = NotificationForwarder::new(runtime.events.clone(), notifier).spawn(shutdown.clone());

    let scanner = Arc::new(runtime.scanner(verifier, config));
    let scanner_status = scanner.handle();
    let scanner_task = {
        let scanner = scanner.clone();
        let token = shutdown.child_token();
        tokio::spawn(async move { scanner.run(token).await })
    };

    match runtime.client() {
        Some(client) => {
            run_controller(client.clone(), runtime.engine.clone(), config.reconcile.clone()).await;
        }
        None => {
            let resync = Duration::from_secs(config.reconcile.requeue_secs);
            tokio::select! {
                () = resync_loop(runtime.engine.clone(), resync, shutdown.clone()) => {}
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        warn!(error = %e, "failed to listen for ctrl-c, stopping");
                    }
                    info!("interrupt received, stopping");
                }
            }
        }
    }

    shutdown.cancel();
    if let Err(e) = scanner_task.await {
        warn!(error = %e, "scanner task ended abnormally");
    }
    let notifications_delivered = forwarder.await.unwrap_or_default();

    Ok(ControllerRunOutput {
        mode: if runtime.is_dry_run() { "dry-run" } else { "cluster" },
        scanner: scanner_status.status().await,
        notifications_delivered,
    })
}

/// Reconcile every tenant on a fixed period, standing in for the watch loop
/// when there is no API server.
async fn resync_loop(engine: Arc<ConvergenceEngine>, period: Duration, shutdown: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => resync_all(&engine).await,
        }
    }
}

async fn resync_all(engine: &ConvergenceEngine) {
    let tenants = match ResourceStore::<Tenant>::list(engine.store().as_ref(), None).await {
        Ok(tenants) => tenants,
        Err(e) => {
            warn!(error = %e, "failed to list tenants");
            return;
        }
    };
    for tenant in tenants {
        if let Err(e) = engine.reconcile(tenant.name()).await {
            warn!(tenant = %tenant.name(), error = %e, "reconcile failed");
        }
    }
}
