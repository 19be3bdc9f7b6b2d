//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tenant_warden::adapters::memory::InMemoryClusterStore;
use tenant_warden::domain::models::{
    boundary_name, Container, Isolation, ObjectKey, ObjectKind, ObjectMeta, Pod, Tenant, TenantSpec, Tier,
};
use tenant_warden::domain::ports::ResourceStore;
use tenant_warden::services::{ConvergenceEngine, EventBus, QuotaPolicy, ReconcileOutcome};

/// Store, event bus and engine wired together.
pub struct Fixture {
    pub store: Arc<InMemoryClusterStore>,
    pub events: Arc<EventBus>,
    pub engine: ConvergenceEngine,
}

impl Default for Fixture {
    fn default() -> Self {
        let store = Arc::new(InMemoryClusterStore::new());
        let events = Arc::new(EventBus::default());
        let engine = ConvergenceEngine::new(store.clone(), QuotaPolicy::default(), events.clone());
        Self { store, events, engine }
    }
}

impl Fixture {
    pub async fn add_tenant(&self, name: &str, tier: Tier, isolation: Isolation) -> Tenant {
        let tenant = Tenant::new(
            name,
            TenantSpec {
                owners: vec![format!("owner@{name}.example")],
                tier,
                isolation,
            },
        );
        ResourceStore::<Tenant>::create(self.store.as_ref(), &tenant)
            .await
            .expect("Failed to create tenant")
    }

    /// Reconcile until the engine reports `Done`, returning the pass count.
    pub async fn converge(&self, name: &str) -> usize {
        for pass in 1..=5 {
            if self.engine.reconcile(name).await.expect("reconcile failed") == ReconcileOutcome::Done {
                return pass;
            }
        }
        panic!("tenant {name} did not converge in 5 passes");
    }

    pub async fn tenant(&self, name: &str) -> Option<Tenant> {
        ResourceStore::<Tenant>::get(self.store.as_ref(), &ObjectKey::cluster(name))
            .await
            .expect("Failed to read tenant")
    }

    /// Add a pod with one container per image to the tenant's boundary.
    pub async fn add_pod(&self, tenant: &str, name: &str, images: &[&str]) -> Pod {
        let mut pod = Pod::from_meta(ObjectMeta::namespaced(boundary_name(tenant), name));
        pod.containers = images
            .iter()
            .enumerate()
            .map(|(i, image)| Container::new(format!("c{i}"), *image))
            .collect();
        ResourceStore::<Pod>::create(self.store.as_ref(), &pod)
            .await
            .expect("Failed to create pod")
    }

    pub async fn pod_names(&self, tenant: &str) -> Vec<String> {
        let mut names: Vec<String> = ResourceStore::<Pod>::list(self.store.as_ref(), Some(&boundary_name(tenant)))
            .await
            .expect("Failed to list pods")
            .into_iter()
            .map(|p| p.metadata.name)
            .collect();
        names.sort();
        names
    }
}

/// Poll `predicate` every 10ms until it holds or `timeout` passes.
pub async fn wait_until<F, Fut>(timeout: Duration, mut predicate: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if predicate().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
