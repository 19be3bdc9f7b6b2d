//! Tenant Warden CLI entry point.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use tenant_warden::cli::{dispatch, report_error, Cli};
use tenant_warden::infrastructure::logging::LoggerImpl;
use tenant_warden::ConfigLoader;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let json_mode = cli.json;

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err, json_mode);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let loaded = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
    .context("Failed to load configuration")?;

    LoggerImpl::init(&loaded.config.logging).context("Failed to initialize logging")?;
    loaded.log_warnings();
    dispatch(cli, &loaded.config).await
}
