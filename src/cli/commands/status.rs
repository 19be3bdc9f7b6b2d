//! `warden status`

use anyhow::Result;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};

#[derive(Debug, Serialize)]
pub struct StatusOutput {
    pub service: &'static str,
    pub status: &'static str,
    pub version: &'static str,
}

impl CommandOutput for StatusOutput {
    fn to_human(&self) -> String {
        format!("{}: {}", self.service, self.status)
    }
}

pub fn execute(json_mode: bool) -> Result<()> {
    output(
        &StatusOutput {
            service: "warden",
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        },
        json_mode,
    );
    Ok(())
}
