//! Enforcement scanner CLI commands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::adapters::notify;
use crate::cli::output::{output, CommandOutput};
use crate::cli::runtime::{build_verifier, Runtime};
use crate::domain::models::Config;
use crate::services::{NotificationForwarder, ScanReport};

#[derive(Args, Debug)]
pub struct ScanArgs {
    #[command(subcommand)]
    pub command: ScanCommands,
}

#[derive(Subcommand, Debug)]
pub enum ScanCommands {
    /// Run a single scan pass and exit
    Once {
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
#[serde(transparent)]
pub struct ScanOutput(pub ScanReport);

impl CommandOutput for ScanOutput {
    fn to_human(&self) -> String {
        let r = &self.0;
        if r.skipped {
            return "Scan skipped: another pass is in flight.".to_string();
        }
        format!(
            "Scanned {} tenant(s) ({} without a boundary yet), {} workload(s), {} image verification(s).\n\
             Evicted {} workload(s); {} eviction(s) failed; {} tenant error(s).",
            r.tenants_scanned,
            r.tenants_skipped,
            r.workloads_checked,
            r.images_verified,
            r.evictions,
            r.eviction_failures,
            r.errors,
        )
    }
}

pub async fn execute(args: ScanArgs, config: &Config, json_mode: bool) -> Result<()> {
    match args.command {
        ScanCommands::Once {
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
            let report = scan_once(&runtime, config, &deny).await?;
            output(&ScanOutput(report), json_mode);
            Ok(())
        }
    }
}

async fn scan_once(runtime: &Runtime, config: &Config, deny: &[String]) -> Result<ScanReport> {
    let verifier = build_verifier(config, runtime.is_dry_run(), deny)?;
    let notifier = notify::from_config(&config.notifier).context("Failed to set up notifications")?;

    let shutdown = CancellationToken::new();
    let forwarder = NotificationForwarder::new(runtime.events.clone(), notifier).spawn(shutdown.clone());

    let scanner = runtime.scanner(verifier, config);
    let result = scanner.scan_once().await;

    shutdown.cancel();
    if let Err(e) = forwarder.await {
        tracing::warn!(error = %e, "notification forwarder ended abnormally");
    }
    result.context("Scan pass failed")
}
