//! Out-of-band tenant lifecycle operations.
//!
//! These drive the same convergence primitives as the controller, but
//! synchronously, for operators working from the command line.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Condition, Isolation, Namespace, NetworkPolicy, ObjectKey, ObjectKind, ResourceQuota, Secret,
    Tenant, TenantPhase, TenantSpec, Tier, NETWORK_POLICY_NAME, OWNER_SECRET_NAME, QUOTA_NAME,
};
use crate::domain::ports::{ClusterStore, DeleteOptions, ResourceStore, StoreError};
use crate::services::convergence::{ConvergenceEngine, ReconcileOutcome};

/// Reconciles beyond this many requeues are left to the controller.
const MAX_SYNC_PASSES: usize = 3;

/// Request to create a new tenant.
#[derive(Debug, Clone)]
pub struct CreateTenantRequest {
    pub name: String,
    pub owners: Vec<String>,
    pub tier: Tier,
    pub isolation: Isolation,
}

/// Which child objects currently exist for a tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChildPresence {
    pub namespace: bool,
    pub resource_quota: bool,
    pub network_policy: bool,
    pub owner_secret: bool,
}

/// Serializable view of one tenant.
#[derive(Debug, Clone, Serialize)]
pub struct TenantSummary {
    pub name: String,
    pub owners: Vec<String>,
    pub tier: String,
    pub isolation: String,
    pub phase: Option<TenantPhase>,
    pub namespace: Option<String>,
    pub conditions: Vec<Condition>,
    pub children: ChildPresence,
}

/// Objects removed by [`TenantLifecycle::delete`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeletionReport {
    pub tenant: String,
    pub deleted: Vec<String>,
    pub already_absent: Vec<String>,
}

pub struct TenantLifecycle {
    engine: Arc<ConvergenceEngine>,
}

impl TenantLifecycle {
    pub fn new(engine: Arc<ConvergenceEngine>) -> Self {
        Self { engine }
    }

    fn store(&self) -> &dyn ClusterStore {
        self.engine.store().as_ref()
    }

    /// Create the tenant record and converge it once.
    pub async fn create(&self, request: CreateTenantRequest) -> DomainResult<TenantSummary> {
        let tenant = Tenant::new(
            request.name.clone(),
            TenantSpec {
                owners: request
                    .owners
                    .iter()
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect(),
                tier: request.tier,
                isolation: request.isolation,
            },
        );
        tenant.validate()?;

        ResourceStore::<Tenant>::create(self.store(), &tenant).await?;
        info!(tenant = %request.name, "tenant created");

        for pass in 1..=MAX_SYNC_PASSES {
            if self.engine.reconcile(&request.name).await? == ReconcileOutcome::Done {
                break;
            }
            debug!(tenant = %request.name, pass, "reconcile asked for another pass");
        }

        self.status(&request.name).await
    }

    /// Delete the tenant and every child object it provisions.
    ///
    /// Missing objects are fine; any other failure stops the deletion.
    pub async fn delete(&self, name: &str) -> DomainResult<DeletionReport> {
        let store = self.store();
        let boundary = crate::domain::models::boundary_name(name);
        let mut report = DeletionReport {
            tenant: name.to_string(),
            ..Default::default()
        };

        let tenant_key = ObjectKey::cluster(name);
        record(
            &mut report,
            &tenant_key,
            Tenant::KIND,
            ResourceStore::<Tenant>::delete(store, &tenant_key, DeleteOptions::default()).await,
        )?;

        let policy_key = ObjectKey::namespaced(&boundary, NETWORK_POLICY_NAME);
        record(
            &mut report,
            &policy_key,
            NetworkPolicy::KIND,
            ResourceStore::<NetworkPolicy>::delete(store, &policy_key, DeleteOptions::default()).await,
        )?;

        let quota_key = ObjectKey::namespaced(&boundary, QUOTA_NAME);
        record(
            &mut report,
            &quota_key,
            ResourceQuota::KIND,
            ResourceStore::<ResourceQuota>::delete(store, &quota_key, DeleteOptions::default()).await,
        )?;

        let secret_key = ObjectKey::namespaced(&boundary, OWNER_SECRET_NAME);
        record(
            &mut report,
            &secret_key,
            Secret::KIND,
            ResourceStore::<Secret>::delete(store, &secret_key, DeleteOptions::default()).await,
        )?;

        let boundary_key = ObjectKey::cluster(&boundary);
        record(
            &mut report,
            &boundary_key,
            Namespace::KIND,
            ResourceStore::<Namespace>::delete(store, &boundary_key, DeleteOptions::default()).await,
        )?;

        info!(tenant = %name, deleted = report.deleted.len(), "tenant deleted");
        Ok(report)
    }

    /// Current status and child presence of one tenant.
    pub async fn status(&self, name: &str) -> DomainResult<TenantSummary> {
        let store = self.store();
        let tenant = ResourceStore::<Tenant>::get(store, &ObjectKey::cluster(name))
            .await?
            .ok_or_else(|| StoreError::NotFound {
                kind: Tenant::KIND,
                key: name.to_string(),
            })?;
        let boundary = tenant.boundary_name();

        let children = ChildPresence {
            namespace: ResourceStore::<Namespace>::get(store, &ObjectKey::cluster(&boundary))
                .await?
                .is_some(),
            resource_quota: ResourceStore::<ResourceQuota>::get(store, &ObjectKey::namespaced(&boundary, QUOTA_NAME))
                .await?
                .is_some(),
            network_policy: ResourceStore::<NetworkPolicy>::get(
                store,
                &ObjectKey::namespaced(&boundary, NETWORK_POLICY_NAME),
            )
            .await?
            .is_some(),
            owner_secret: ResourceStore::<Secret>::get(store, &ObjectKey::namespaced(&boundary, OWNER_SECRET_NAME))
                .await?
                .is_some(),
        };

        Ok(TenantSummary {
            name: tenant.name().to_string(),
            owners: tenant.spec.owners.clone(),
            tier: tenant.spec.tier.to_string(),
            isolation: tenant.spec.isolation.to_string(),
            phase: tenant.status.phase,
            namespace: tenant.status.namespace.clone(),
            conditions: tenant.status.conditions,
            children,
        })
    }

    /// Summaries for every tenant, sorted by name.
    pub async fn list(&self) -> DomainResult<Vec<TenantSummary>> {
        let mut names: Vec<String> = ResourceStore::<Tenant>::list(self.store(), None)
            .await?
            .into_iter()
            .map(|t| t.metadata.name)
            .collect();
        names.sort();

        let mut summaries = Vec::with_capacity(names.len());
        for name in names {
            summaries.push(self.status(&name).await?);
        }
        Ok(summaries)
    }
}

fn record(
    report: &mut DeletionReport,
    key: &ObjectKey,
    kind: &str,
    result: Result<(), StoreError>,
) -> DomainResult<()> {
    match result {
        Ok(()) => report.deleted.push(format!("{kind} {key}")),
        Err(e) if e.is_not_found() => report.already_absent.push(format!("{kind} {key}")),
        Err(e) => return Err(DomainError::from(e)),
    }
    Ok(())
}
