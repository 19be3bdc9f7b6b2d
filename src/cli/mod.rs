//! Command-line interface.

pub mod commands;
pub mod output;
pub mod runtime;
pub mod types;

pub use types::{Cli, Commands};

use anyhow::Result;

use crate::domain::models::Config;

/// Run one parsed command.
pub async fn dispatch(cli: Cli, config: &Config) -> Result<()> {
    match cli.command {
        Commands::Controller(args) => commands::controller::execute(args, config, cli.json).await,
        Commands::Scan(args) => commands::scan::execute(args, config, cli.json).await,
        Commands::Tenant(args) => commands::tenant::execute(args, config, cli.json).await,
        Commands::Status => commands::status::execute(cli.json),
        Commands::Crd => commands::crd::execute(cli.json),
    }
}

/// Print a command failure in the selected output mode.
pub fn report_error(err: &anyhow::Error, json_mode: bool) {
    if json_mode {
        let chain: Vec<String> = err.chain().map(ToString::to_string).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "error": err.to_string(), "causes": chain }))
                .unwrap_or_default()
        );
    } else {
        eprintln!("Error: {err:#}");
    }
}
