//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::commands::controller::ControllerArgs;
use crate::cli::commands::scan::ScanArgs;
use crate::cli::commands::tenant::TenantArgs;

#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(about = "Tenant Warden - tenant convergence and image signature enforcement", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of warden.yaml and the environment
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the tenant controller and the enforcement scanner
    Controller(ControllerArgs),

    /// Image signature enforcement
    Scan(ScanArgs),

    /// Tenant lifecycle commands
    Tenant(TenantArgs),

    /// Print service health
    Status,

    /// Print the Tenant custom resource definition
    Crd,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["warden", "status", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Status));
    }
}
