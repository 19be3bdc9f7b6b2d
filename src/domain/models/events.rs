//! Domain events emitted by the control loop after a state change commits.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event emitted by the reconcile path or the enforcement scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WardenEvent {
    /// The enforcement scanner started its periodic loop.
    ScannerStarted { interval: Duration },

    /// A workload was removed because one of its images failed verification.
    WorkloadEvicted {
        tenant: String,
        namespace: String,
        workload: String,
        image: String,
        reason: String,
    },

    /// A non-compliant workload could not be removed.
    EvictionFailed {
        tenant: String,
        namespace: String,
        workload: String,
        image: String,
        error: String,
    },

    /// A tenant reconcile attempt failed and will be retried.
    ReconcileFailed { tenant: String, error: String },
}

impl WardenEvent {
    /// Plain-text rendering for notification sinks.
    pub fn to_message(&self) -> String {
        match self {
            Self::ScannerStarted { interval } => format!(
                "[warden] Image signature enforcement started (interval: {}s)",
                interval.as_secs_f64()
            ),
            Self::WorkloadEvicted {
                tenant,
                namespace,
                workload,
                image,
                reason,
            } => format!(
                "[warden] Deleted pod due to image signature verification failure\nTenant: {tenant}\nNamespace: {namespace}\nPod: {workload}\nImage: {image}\nError: {reason}"
            ),
            Self::EvictionFailed {
                tenant,
                namespace,
                workload,
                image,
                error,
            } => format!(
                "[warden] Failed to delete non-compliant pod\nTenant: {tenant}\nNamespace: {namespace}\nPod: {workload}\nImage: {image}\nError: {error}"
            ),
            Self::ReconcileFailed { tenant, error } => {
                format!("[warden] Reconcile failed for tenant {tenant}: {error}")
            }
        }
    }
}

/// Event envelope with the time it was published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub event: WardenEvent,
}
