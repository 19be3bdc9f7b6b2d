//! Derives the tenant's summarized status from a convergence attempt.

use chrono::{DateTime, Utc};

use crate::domain::models::{Condition, ConditionStatus, TenantPhase, TenantStatus};

pub const CONDITION_READY: &str = "Ready";
pub const CONDITION_PROVISIONED: &str = "Provisioned";

pub const REASON_CONVERGED: &str = "Converged";
pub const REASON_PROVISIONING: &str = "Provisioning";
pub const REASON_RECONCILE_FAILED: &str = "ReconcileFailed";
pub const REASON_CHILDREN_PRESENT: &str = "ChildrenPresent";
pub const REASON_CHILDREN_MISSING: &str = "ChildrenMissing";

/// What one reconcile attempt observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvergenceReport {
    /// Name of the boundary once it exists.
    pub boundary: Option<String>,
    pub quota_present: bool,
    pub network_policy_present: bool,
    pub owner_secret_present: bool,
    /// Error that aborted the attempt, if any.
    pub error: Option<String>,
}

impl ConvergenceReport {
    pub fn all_children_present(&self) -> bool {
        self.boundary.is_some()
            && self.quota_present
            && self.network_policy_present
            && self.owner_secret_present
    }

    fn missing_children(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.boundary.is_none() {
            missing.push("namespace");
        }
        if !self.quota_present {
            missing.push("resource quota");
        }
        if !self.network_policy_present {
            missing.push("network policy");
        }
        if !self.owner_secret_present {
            missing.push("owner secret");
        }
        missing
    }
}

/// Compute the next status from the previous one and the latest attempt.
pub fn project(previous: &TenantStatus, report: &ConvergenceReport, now: DateTime<Utc>) -> TenantStatus {
    let phase = if report.error.is_some() {
        TenantPhase::Error
    } else if report.all_children_present() {
        TenantPhase::Ready
    } else {
        TenantPhase::Pending
    };

    let mut status = TenantStatus {
        phase: Some(phase),
        namespace: report.boundary.clone().or_else(|| previous.namespace.clone()),
        conditions: previous.conditions.clone(),
    };

    let provisioned = if report.all_children_present() {
        (ConditionStatus::True, REASON_CHILDREN_PRESENT, String::new())
    } else {
        (
            ConditionStatus::False,
            REASON_CHILDREN_MISSING,
            format!("missing: {}", report.missing_children().join(", ")),
        )
    };
    set_condition(&mut status, CONDITION_PROVISIONED, provisioned.0, provisioned.1, &provisioned.2, now);

    let ready = match (&report.error, phase) {
        (Some(err), _) => (ConditionStatus::False, REASON_RECONCILE_FAILED, err.clone()),
        (None, TenantPhase::Ready) => (ConditionStatus::True, REASON_CONVERGED, String::new()),
        (None, _) => (
            ConditionStatus::False,
            REASON_PROVISIONING,
            "waiting for child objects".to_string(),
        ),
    };
    set_condition(&mut status, CONDITION_READY, ready.0, ready.1, &ready.2, now);

    status
}

/// Upsert a condition by type.
///
/// The transition time only moves when the status value flips.
pub fn set_condition(
    status: &mut TenantStatus,
    type_: &str,
    value: ConditionStatus,
    reason: &str,
    message: &str,
    now: DateTime<Utc>,
) {
    if let Some(existing) = status.conditions.iter_mut().find(|c| c.type_ == type_) {
        if existing.status != value {
            existing.status = value;
            existing.last_transition_time = now;
        }
        existing.reason = reason.to_string();
        existing.message = message.to_string();
        return;
    }

    status.conditions.push(Condition {
        type_: type_.to_string(),
        status: value,
        reason: reason.to_string(),
        message: message.to_string(),
        last_transition_time: now,
    });
    status.conditions.sort_by(|a, b| a.type_.cmp(&b.type_));
}
