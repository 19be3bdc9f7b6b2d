//! Tenant convergence engine.
//!
//! Drives the boundary and its child objects toward the declared tenant,
//! links the tenant back to its boundary, and projects the resulting status.
//! Every step reads, mutates a copy and writes only when the copy differs, so
//! a reconcile of an unchanged tenant performs no writes at all.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    Namespace, NetworkPolicy, ObjectKey, ObjectKind, ObjectMeta, PolicyType, PodSelector,
    ResourceQuota, Secret, Tenant, WardenEvent, NETWORK_POLICY_NAME, OWNER_SECRET_NAME,
    QUOTA_NAME, TENANT_LABEL,
};
use crate::domain::ports::{ClusterStore, ResourceStore};
use crate::services::event_bus::EventBus;
use crate::services::ownership::{link_ownership, set_controller_reference};
use crate::services::phase::{project, ConvergenceReport};
use crate::services::quota_policy::QuotaPolicy;

/// What the caller should do after a reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Converged; wait for the next change.
    Done,
    /// A write may race with other observers; reconcile again soon.
    Requeue,
}

/// Result of a single [`create_or_update`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Get-or-create the object at `key`, apply `mutate`, and write only if needed.
///
/// When the object is absent the mutation is applied to an empty object that
/// carries just the key.
pub async fn create_or_update<K, S, F>(
    store: &S,
    key: &ObjectKey,
    mutate: F,
) -> DomainResult<(K, WriteOutcome)>
where
    K: ObjectKind,
    S: ResourceStore<K> + ?Sized,
    F: FnOnce(&mut K) -> DomainResult<()> + Send,
{
    if let Some(current) = store.get(key).await? {
        let mut desired = current.clone();
        mutate(&mut desired)?;
        if desired == current {
            return Ok((current, WriteOutcome::Unchanged));
        }
        let stored = store.update(&desired).await?;
        return Ok((stored, WriteOutcome::Updated));
    }

    let mut desired = K::from_meta(ObjectMeta {
        name: key.name.clone(),
        namespace: key.namespace.clone(),
        ..Default::default()
    });
    mutate(&mut desired)?;
    let stored = store.create(&desired).await?;
    Ok((stored, WriteOutcome::Created))
}

/// Reconciles one tenant at a time against a [`ClusterStore`].
///
/// Per-key serialization is the caller's job: the controller runtime never
/// runs two reconciles for the same tenant concurrently.
pub struct ConvergenceEngine {
    store: Arc<dyn ClusterStore>,
    quota: QuotaPolicy,
    events: Arc<EventBus>,
}

impl ConvergenceEngine {
    pub fn new(store: Arc<dyn ClusterStore>, quota: QuotaPolicy, events: Arc<EventBus>) -> Self {
        Self {
            store,
            quota,
            events,
        }
    }

    pub fn store(&self) -> &Arc<dyn ClusterStore> {
        &self.store
    }

    /// Converge the tenant called `name`.
    ///
    /// A missing or terminating tenant is a no-op. Write conflicts come back
    /// as [`ReconcileOutcome::Requeue`]; any other failure marks the tenant
    /// `Error` and is returned for retry with backoff.
    #[instrument(skip(self, name), fields(tenant = %name))]
    pub async fn reconcile(&self, name: &str) -> DomainResult<ReconcileOutcome> {
        let store = self.store.as_ref();
        let Some(tenant) = ResourceStore::<Tenant>::get(store, &ObjectKey::cluster(name)).await? else {
            debug!("tenant no longer exists, nothing to converge");
            return Ok(ReconcileOutcome::Done);
        };
        if tenant.metadata.is_terminating() {
            debug!("tenant is terminating, skipping");
            return Ok(ReconcileOutcome::Done);
        }

        let mut report = ConvergenceReport::default();
        let mut latest = tenant;
        let result = self.converge(&mut latest, &mut report).await;

        match result {
            Ok(outcome) => {
                self.write_status(&latest, &report).await?;
                Ok(outcome)
            }
            Err(e) if e.is_conflict() => {
                debug!(error = %e, "write conflict, requeueing");
                Ok(ReconcileOutcome::Requeue)
            }
            Err(e) => {
                warn!(error = %e, "reconcile failed");
                report.error = Some(e.to_string());
                if let Err(status_err) = self.write_status(&latest, &report).await {
                    warn!(error = %status_err, "failed to record error status");
                }
                self.events.publish(WardenEvent::ReconcileFailed {
                    tenant: name.to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn converge(&self, tenant: &mut Tenant, report: &mut ConvergenceReport) -> DomainResult<ReconcileOutcome> {
        let store = self.store.as_ref();
        let boundary = self.ensure_boundary(tenant).await?;
        report.boundary = Some(boundary.metadata.name.clone());

        self.ensure_quota(tenant, &boundary.metadata.name).await?;
        report.quota_present = true;

        self.ensure_network_policy(tenant, &boundary.metadata.name).await?;
        report.network_policy_present = true;

        self.ensure_owner_secret(tenant, &boundary.metadata.name).await?;
        report.owner_secret_present = true;

        if !tenant.spec.isolation.is_namespace() {
            debug!(isolation = %tenant.spec.isolation, "isolation mode has no enforcement, stopping");
            return Ok(ReconcileOutcome::Done);
        }

        let mut linked = tenant.clone();
        if !link_ownership(&mut linked, &boundary)? {
            return Ok(ReconcileOutcome::Done);
        }
        *tenant = ResourceStore::<Tenant>::update(store, &linked).await?;
        info!(boundary = %boundary.metadata.name, "linked tenant to its boundary");
        Ok(ReconcileOutcome::Requeue)
    }

    async fn ensure_boundary(&self, tenant: &Tenant) -> DomainResult<Namespace> {
        let key = ObjectKey::cluster(tenant.boundary_name());
        let (boundary, outcome) = create_or_update(self.store.as_ref(), &key, |ns: &mut Namespace| {
            ns.metadata
                .labels
                .insert(TENANT_LABEL.to_string(), tenant.name().to_string());
            set_controller_reference::<Namespace>(tenant, &mut ns.metadata)
        })
        .await?;
        log_write::<Namespace>(&key, outcome);
        Ok(boundary)
    }

    async fn ensure_quota(&self, tenant: &Tenant, boundary: &str) -> DomainResult<()> {
        let hard = self.quota.hard_limits(&tenant.spec.tier)?;
        let key = ObjectKey::namespaced(boundary, QUOTA_NAME);
        let (_, outcome) = create_or_update(self.store.as_ref(), &key, |quota: &mut ResourceQuota| {
            quota.hard = hard;
            set_controller_reference::<ResourceQuota>(tenant, &mut quota.metadata)
        })
        .await?;
        log_write::<ResourceQuota>(&key, outcome);
        Ok(())
    }

    async fn ensure_network_policy(&self, tenant: &Tenant, boundary: &str) -> DomainResult<()> {
        let key = ObjectKey::namespaced(boundary, NETWORK_POLICY_NAME);
        let (_, outcome) = create_or_update(self.store.as_ref(), &key, |policy: &mut NetworkPolicy| {
            apply_default_deny(policy);
            set_controller_reference::<NetworkPolicy>(tenant, &mut policy.metadata)
        })
        .await?;
        log_write::<NetworkPolicy>(&key, outcome);
        Ok(())
    }

    async fn ensure_owner_secret(&self, tenant: &Tenant, boundary: &str) -> DomainResult<()> {
        let payload = serde_json::to_vec(&tenant.spec.owners)?;
        let key = ObjectKey::namespaced(boundary, OWNER_SECRET_NAME);
        let (_, outcome) = create_or_update(self.store.as_ref(), &key, |secret: &mut Secret| {
            secret.data.clear();
            secret.data.insert(OWNER_SECRET_NAME.to_string(), payload);
            set_controller_reference::<Secret>(tenant, &mut secret.metadata)
        })
        .await?;
        log_write::<Secret>(&key, outcome);
        Ok(())
    }

    async fn write_status(&self, tenant: &Tenant, report: &ConvergenceReport) -> DomainResult<()> {
        let status = project(&tenant.status, report, Utc::now());
        if status == tenant.status {
            return Ok(());
        }
        let mut updated = tenant.clone();
        updated.status = status;
        self.store.update_tenant_status(&updated).await?;
        debug!(phase = ?updated.status.phase, "tenant status updated");
        Ok(())
    }
}

/// Overwrite a policy with the deny-all posture: every pod selected, both
/// directions governed, no allow rules.
pub fn apply_default_deny(policy: &mut NetworkPolicy) {
    policy.pod_selector = PodSelector::default();
    policy.policy_types = vec![PolicyType::Ingress, PolicyType::Egress];
    policy.ingress.clear();
    policy.egress.clear();
}

fn log_write<K: ObjectKind>(key: &ObjectKey, outcome: WriteOutcome) {
    match outcome {
        WriteOutcome::Created => info!(kind = K::KIND, object = %key, "created"),
        WriteOutcome::Updated => info!(kind = K::KIND, object = %key, "updated"),
        WriteOutcome::Unchanged => debug!(kind = K::KIND, object = %key, "unchanged"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryClusterStore;
    use crate::domain::errors::DomainError;
    use crate::domain::models::{Isolation, TenantPhase, TenantSpec, Tier};
    use std::collections::BTreeMap;

    async fn seeded(spec: TenantSpec) -> (Arc<InMemoryClusterStore>, ConvergenceEngine) {
        let store = Arc::new(InMemoryClusterStore::new());
        ResourceStore::<Tenant>::create(store.as_ref(), &Tenant::new("acme", spec))
            .await
            .unwrap();
        let engine = ConvergenceEngine::new(store.clone(), QuotaPolicy::default(), Arc::new(EventBus::default()));
        (store, engine)
    }

    fn spec() -> TenantSpec {
        TenantSpec {
            owners: vec!["alice@example.com".to_string()],
            tier: Tier::Bronze,
            isolation: Isolation::Namespace,
        }
    }

    #[tokio::test]
    async fn test_create_or_update_reports_outcome() {
        let store = InMemoryClusterStore::new();
        let key = ObjectKey::cluster("tenant-x");
        let label = |ns: &mut Namespace| {
            ns.metadata.labels.insert("a".to_string(), "b".to_string());
            Ok(())
        };

        let (_, first) = create_or_update(&store, &key, label).await.unwrap();
        let (_, second) = create_or_update(&store, &key, label).await.unwrap();
        let (ns, third) = create_or_update(&store, &key, |ns: &mut Namespace| {
            ns.metadata.labels.insert("c".to_string(), "d".to_string());
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(first, WriteOutcome::Created);
        assert_eq!(second, WriteOutcome::Unchanged);
        assert_eq!(third, WriteOutcome::Updated);
        assert_eq!(ns.metadata.labels.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_tenant_is_noop() {
        let store = Arc::new(InMemoryClusterStore::new());
        let engine = ConvergenceEngine::new(store.clone(), QuotaPolicy::default(), Arc::new(EventBus::default()));
        assert_eq!(engine.reconcile("ghost").await.unwrap(), ReconcileOutcome::Done);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_boundary_label_merge_keeps_foreign_labels() {
        let (store, engine) = seeded(spec()).await;
        let mut ns = Namespace::from_meta(ObjectMeta::named("tenant-acme"));
        ns.metadata.labels = BTreeMap::from([("team".to_string(), "blue".to_string())]);
        ResourceStore::<Namespace>::create(store.as_ref(), &ns).await.unwrap();

        engine.reconcile("acme").await.unwrap();

        let ns = ResourceStore::<Namespace>::get(store.as_ref(), &ObjectKey::cluster("tenant-acme"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ns.metadata.labels.get("team").map(String::as_str), Some("blue"));
        assert_eq!(ns.metadata.labels.get(TENANT_LABEL).map(String::as_str), Some("acme"));
    }

    #[tokio::test]
    async fn test_non_namespace_isolation_skips_linking() {
        let (store, engine) = seeded(TenantSpec {
            isolation: Isolation::Other("vcluster".to_string()),
            ..spec()
        })
        .await;

        assert_eq!(engine.reconcile("acme").await.unwrap(), ReconcileOutcome::Done);

        let tenant = ResourceStore::<Tenant>::get(store.as_ref(), &ObjectKey::cluster("acme"))
            .await
            .unwrap()
            .unwrap();
        assert!(tenant.metadata.owner_references.is_empty());
        assert_eq!(tenant.status.phase, Some(TenantPhase::Ready));
    }

    #[tokio::test]
    async fn test_foreign_controller_marks_error_and_publishes() {
        let (store, _) = seeded(spec()).await;
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let engine = ConvergenceEngine::new(store.clone(), QuotaPolicy::default(), bus);

        let mut taken = Namespace::from_meta(ObjectMeta::named("tenant-acme"));
        taken.metadata.owner_references.push(crate::domain::models::OwnerReference {
            api_version: "apps/v1".to_string(),
            kind: "Deployment".to_string(),
            name: "squatter".to_string(),
            uid: "s-1".to_string(),
            controller: Some(true),
            block_owner_deletion: None,
        });
        ResourceStore::<Namespace>::create(store.as_ref(), &taken).await.unwrap();

        let err = engine.reconcile("acme").await.unwrap_err();
        assert!(matches!(err, DomainError::AlreadyOwned { .. }));

        let tenant = ResourceStore::<Tenant>::get(store.as_ref(), &ObjectKey::cluster("acme"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tenant.status.phase, Some(TenantPhase::Error));
        assert!(matches!(
            rx.recv().await.unwrap().event,
            WardenEvent::ReconcileFailed { .. }
        ));
    }

    #[test]
    fn test_default_deny_resets_rules() {
        let mut policy = NetworkPolicy::from_meta(ObjectMeta::namespaced("tenant-acme", NETWORK_POLICY_NAME));
        policy.ingress.push(crate::domain::models::PolicyRule::default());
        apply_default_deny(&mut policy);

        assert!(policy.ingress.is_empty());
        assert!(policy.egress.is_empty());
        assert_eq!(policy.policy_types, vec![PolicyType::Ingress, PolicyType::Egress]);
        assert!(policy.pod_selector.match_labels.is_empty());
    }
}
