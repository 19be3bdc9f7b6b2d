//! Resource cap policy: tier -> hard limits.
//!
//! Resolved once per reconcile and applied verbatim, so a cap is never
//! partially specified.

use std::collections::BTreeMap;

use crate::domain::errors::DomainResult;
use crate::domain::models::config::{QuotaConfig, QuotaLimits};
use crate::domain::models::{Quantity, Tier};

pub const LIMITS_CPU: &str = "limits.cpu";
pub const LIMITS_MEMORY: &str = "limits.memory";
pub const REQUESTS_CPU: &str = "requests.cpu";
pub const REQUESTS_MEMORY: &str = "requests.memory";
pub const REQUESTS_STORAGE: &str = "requests.storage";
pub const PODS: &str = "pods";

/// Maps tenant tiers to the hard-limit map written into each resource cap.
#[derive(Debug, Clone, Default)]
pub struct QuotaPolicy {
    config: QuotaConfig,
}

impl QuotaPolicy {
    pub fn new(config: QuotaConfig) -> Self {
        Self { config }
    }

    /// Limits configured for a tier. Unknown tiers get the bronze caps.
    pub fn limits_for(&self, tier: &Tier) -> &QuotaLimits {
        match tier {
            Tier::Silver => &self.config.silver,
            Tier::Gold => &self.config.gold,
            Tier::Bronze | Tier::Custom(_) => &self.config.bronze,
        }
    }

    /// Validated hard-limit map for a tier.
    pub fn hard_limits(&self, tier: &Tier) -> DomainResult<BTreeMap<String, String>> {
        to_hard_map(self.limits_for(tier))
    }

    /// Check that every configured value is a well-formed quantity.
    pub fn validate(&self) -> DomainResult<()> {
        for limits in [&self.config.bronze, &self.config.silver, &self.config.gold] {
            to_hard_map(limits)?;
        }
        Ok(())
    }
}

fn to_hard_map(limits: &QuotaLimits) -> DomainResult<BTreeMap<String, String>> {
    let entries = [
        (LIMITS_CPU, &limits.limits_cpu),
        (LIMITS_MEMORY, &limits.limits_memory),
        (REQUESTS_CPU, &limits.requests_cpu),
        (REQUESTS_MEMORY, &limits.requests_memory),
        (REQUESTS_STORAGE, &limits.requests_storage),
        (PODS, &limits.pods),
    ];

    entries
        .into_iter()
        .map(|(key, value)| Quantity::parse(value).map(|q| (key.to_string(), q.to_string())))
        .collect()
}
