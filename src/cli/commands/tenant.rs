//! Tenant CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::output::{detail_table, list_table, output, yes_no, CommandOutput};
use crate::cli::runtime::Runtime;
use crate::domain::models::{validate_tenant_name, Config, Isolation, Tier};
use crate::services::lifecycle::DeletionReport;
use crate::services::{CreateTenantRequest, TenantSummary};

#[derive(Args, Debug)]
pub struct TenantArgs {
    #[command(subcommand)]
    pub command: TenantCommands,
}

#[derive(Subcommand, Debug)]
pub enum TenantCommands {
    /// Create a tenant and converge it once
    Create {
        /// Tenant name (DNS label)
        name: String,
        /// Owner identities (comma-separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        owners: Vec<String>,
        /// Tier: bronze, silver or gold
        #[arg(short, long, default_value = "bronze")]
        tier: String,
        /// Isolation mode
        #[arg(short, long, default_value = "namespace")]
        isolation: String,
        /// Run against an empty in-memory store
        #[arg(long)]
        dry_run: bool,
    },
    /// Delete a tenant and its boundary
    Delete {
        /// Tenant name
        name: String,
    },
    /// Show tenant status and child objects
    Status {
        /// Tenant name
        name: String,
    },
    /// List tenants
    List,
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct TenantOutput(pub TenantSummary);

impl CommandOutput for TenantOutput {
    fn to_human(&self) -> String {
        let t = &self.0;
        let phase = t.phase.map_or_else(|| "-".to_string(), |p| p.to_string());
        let mut lines = vec![detail_table(&[
            ("Name", t.name.clone()),
            ("Owners", t.owners.join(", ")),
            ("Tier", t.tier.clone()),
            ("Isolation", t.isolation.clone()),
            ("Phase", phase),
            ("Namespace", t.namespace.clone().unwrap_or_else(|| "-".to_string())),
            ("Namespace present", yes_no(t.children.namespace).to_string()),
            ("Quota present", yes_no(t.children.resource_quota).to_string()),
            ("Policy present", yes_no(t.children.network_policy).to_string()),
            ("Owner secret present", yes_no(t.children.owner_secret).to_string()),
        ])
        .to_string()];

        if !t.conditions.is_empty() {
            let mut table = list_table(&["type", "status", "reason", "since"]);
            for c in &t.conditions {
                table.add_row(vec![
                    c.type_.clone(),
                    c.status.to_string(),
                    c.reason.clone(),
                    c.last_transition_time.to_rfc3339(),
                ]);
            }
            lines.push(String::new());
            lines.push(table.to_string());
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct TenantListOutput {
    pub tenants: Vec<TenantSummary>,
    pub total: usize,
}

impl CommandOutput for TenantListOutput {
    fn to_human(&self) -> String {
        if self.tenants.is_empty() {
            return "No tenants found.".to_string();
        }
        let mut table = list_table(&["name", "tier", "isolation", "phase", "namespace"]);
        for t in &self.tenants {
            table.add_row(vec![
                t.name.clone(),
                t.tier.clone(),
                t.isolation.clone(),
                t.phase.map_or_else(|| "-".to_string(), |p| p.to_string()),
                t.namespace.clone().unwrap_or_else(|| "-".to_string()),
            ]);
        }
        format!("{} tenant(s):\n{table}", self.total)
    }
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct DeletionOutput(pub DeletionReport);

impl CommandOutput for DeletionOutput {
    fn to_human(&self) -> String {
        let r = &self.0;
        let mut lines = vec![format!("Tenant {} deleted.", r.tenant)];
        for object in &r.deleted {
            lines.push(format!("  removed  {object}"));
        }
        for object in &r.already_absent {
            lines.push(format!("  absent   {object}"));
        }
        lines.join("\n")
    }
}

pub async fn execute(args: TenantArgs, config: &Config, json_mode: bool) -> Result<()> {
    match args.command {
        TenantCommands::Create {
            name,
            owners,
            tier,
            isolation,
            dry_run,
        } => {
            // Fail fast, before any connection is made.
            validate_tenant_name(&name)?;
            let runtime = if dry_run {
                Runtime::in_memory(config)
            } else {
                Runtime::connect(config).await?
            };
            let summary = runtime
                .lifecycle()
                .create(CreateTenantRequest {
                    name: name.clone(),
                    owners,
                    tier: Tier::from(tier),
                    isolation: Isolation::from(isolation),
                })
                .await
                .with_context(|| format!("Failed to create tenant {name}"))?;
            output(&TenantOutput(summary), json_mode);
        }
        TenantCommands::Delete { name } => {
            validate_tenant_name(&name)?;
            let runtime = Runtime::connect(config).await?;
            let report = runtime
                .lifecycle()
                .delete(&name)
                .await
                .with_context(|| format!("Failed to delete tenant {name}"))?;
            output(&DeletionOutput(report), json_mode);
        }
        TenantCommands::Status { name } => {
            validate_tenant_name(&name)?;
            let runtime = Runtime::connect(config).await?;
            let summary = runtime
                .lifecycle()
                .status(&name)
                .await
                .with_context(|| format!("Failed to read tenant {name}"))?;
            output(&TenantOutput(summary), json_mode);
        }
        TenantCommands::List => {
            let runtime = Runtime::connect(config).await?;
            let tenants = runtime.lifecycle().list().await.context("Failed to list tenants")?;
            let total = tenants.len();
            output(&TenantListOutput { tenants, total }, json_mode);
        }
    }
    Ok(())
}
