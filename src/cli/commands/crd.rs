//! `warden crd`: print the Tenant custom resource definition.

use anyhow::{Context, Result};
use kube::CustomResourceExt;

use crate::adapters::kube::TenantResource;

pub fn execute(json_mode: bool) -> Result<()> {
    let crd = TenantResource::crd();
    let rendered = if json_mode {
        serde_json::to_string_pretty(&crd).context("Failed to render CRD as JSON")?
    } else {
        serde_yaml::to_string(&crd).context("Failed to render CRD as YAML")?
    };
    println!("{rendered}");
    Ok(())
}
