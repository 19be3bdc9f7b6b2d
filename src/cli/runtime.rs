//! Wiring of stores, verifiers and services for the commands.
//!
//! A live run talks to the API server and shells out to cosign. A dry run
//! uses the in-memory store, optionally seeded from a YAML file, and a static
//! verifier.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::adapters::kube::KubeClusterStore;
use crate::adapters::memory::InMemoryClusterStore;
use crate::adapters::verifier::{CosignVerifier, StaticVerifier};
use crate::domain::models::{
    boundary_name, Config, Container, Isolation, ObjectKind, ObjectMeta, Pod, Tenant, TenantSpec, Tier,
};
use crate::domain::ports::{ClusterStore, ImageVerifier, ResourceStore};
use crate::services::{
    ConvergenceEngine, EnforcementConfig, EnforcementScanner, EventBus, EventBusConfig, QuotaPolicy,
    ReconcileOutcome, TenantLifecycle,
};

/// Reconcile passes a seeded tenant gets before it is left as is.
const SEED_PASSES: usize = 3;

/// Services sharing one store and one event bus.
pub struct Runtime {
    pub store: Arc<dyn ClusterStore>,
    pub events: Arc<EventBus>,
    pub engine: Arc<ConvergenceEngine>,
    client: Option<kube::Client>,
}

impl Runtime {
    fn with_store(config: &Config, store: Arc<dyn ClusterStore>, client: Option<kube::Client>) -> Self {
        let events = Arc::new(EventBus::new(EventBusConfig::default()));
        let engine = Arc::new(ConvergenceEngine::new(
            store.clone(),
            QuotaPolicy::new(config.quota.clone()),
            events.clone(),
        ));
        Self {
            store,
            events,
            engine,
            client,
        }
    }

    /// Runtime over the cluster from the ambient kubeconfig.
    pub async fn connect(config: &Config) -> Result<Self> {
        let store = KubeClusterStore::try_default()
            .await
            .context("Failed to connect to the cluster")?;
        let client = store.client().clone();
        Ok(Self::with_store(config, Arc::new(store), Some(client)))
    }

    /// Runtime over a fresh in-memory store.
    pub fn in_memory(config: &Config) -> Self {
        Self::with_store(config, Arc::new(InMemoryClusterStore::new()), None)
    }

    /// API client of a live runtime; `None` in a dry run.
    pub fn client(&self) -> Option<&kube::Client> {
        self.client.as_ref()
    }

    pub fn is_dry_run(&self) -> bool {
        self.client.is_none()
    }

    pub fn lifecycle(&self) -> TenantLifecycle {
        TenantLifecycle::new(self.engine.clone())
    }

    pub fn scanner(&self, verifier: Arc<dyn ImageVerifier>, config: &Config) -> EnforcementScanner {
        EnforcementScanner::new(
            self.store.clone(),
            verifier,
            self.events.clone(),
            EnforcementConfig::from(&config.scanner),
        )
    }

    /// Load tenants and workloads from a seed file into the store.
    pub async fn seed(&self, path: &Path) -> Result<SeedSummary> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;
        let seed: SeedFile = serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse seed file {}", path.display()))?;
        self.apply_seed(seed).await
    }

    async fn apply_seed(&self, seed: SeedFile) -> Result<SeedSummary> {
        let store = self.store.as_ref();
        let mut summary = SeedSummary::default();

        for entry in seed.tenants {
            let tenant = Tenant::new(
                entry.name.clone(),
                TenantSpec {
                    owners: entry.owners,
                    tier: entry.tier.map(Tier::from).unwrap_or_default(),
                    isolation: entry.isolation.map(Isolation::from).unwrap_or_default(),
                },
            );
            tenant.validate()?;
            ResourceStore::<Tenant>::create(store, &tenant)
                .await
                .with_context(|| format!("Failed to seed tenant {}", entry.name))?;
            summary.tenants += 1;

            for _ in 0..SEED_PASSES {
                if self.engine.reconcile(&entry.name).await? == ReconcileOutcome::Done {
                    break;
                }
            }

            for workload in entry.workloads {
                let mut pod = Pod::from_meta(ObjectMeta::namespaced(boundary_name(&entry.name), &workload.name));
                pod.containers = workload
                    .images
                    .iter()
                    .enumerate()
                    .map(|(i, image)| Container::new(format!("c{i}"), image.clone()))
                    .collect();
                ResourceStore::<Pod>::create(store, &pod)
                    .await
                    .with_context(|| format!("Failed to seed workload {} of {}", workload.name, entry.name))?;
                summary.workloads += 1;
            }
        }

        info!(tenants = summary.tenants, workloads = summary.workloads, "seeded in-memory store");
        Ok(summary)
    }
}

/// Verifier for a run: cosign when live, an allow-list otherwise.
pub fn build_verifier(config: &Config, dry_run: bool, deny: &[String]) -> Result<Arc<dyn ImageVerifier>> {
    if dry_run {
        let verifier = deny
            .iter()
            .fold(StaticVerifier::allow_all(), |verifier, image| verifier.deny(image.clone()));
        return Ok(Arc::new(verifier));
    }
    let verifier = CosignVerifier::from_config(&config.verifier).context("Failed to set up the cosign verifier")?;
    Ok(Arc::new(verifier))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub tenants: usize,
    pub workloads: usize,
}

#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default)]
    tenants: Vec<SeedTenant>,
}

#[derive(Debug, Deserialize)]
struct SeedTenant {
    name: String,
    owners: Vec<String>,
    #[serde(default)]
    tier: Option<String>,
    #[serde(default)]
    isolation: Option<String>,
    #[serde(default)]
    workloads: Vec<SeedWorkload>,
}

#[derive(Debug, Deserialize)]
struct SeedWorkload {
    name: String,
    images: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Namespace, ObjectKey, TenantPhase};

    const SEED: &str = r"
tenants:
  - name: acme
    owners: [alice@example.com]
    tier: gold
    workloads:
      - name: web
        images: [registry.local/web:1, registry.local/sidecar:2]
  - name: shared
    owners: [bob@example.com]
    isolation: shared
";

    #[tokio::test]
    async fn test_seed_converges_tenants_and_adds_workloads() {
        let runtime = Runtime::in_memory(&Config::default());
        let seed: SeedFile = serde_yaml::from_str(SEED).unwrap();
        let summary = runtime.apply_seed(seed).await.unwrap();
        assert_eq!(summary, SeedSummary { tenants: 2, workloads: 1 });

        let store = runtime.store.as_ref();
        let acme = ResourceStore::<Tenant>::get(store, &ObjectKey::cluster("acme"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(acme.status.phase, Some(TenantPhase::Ready));
        // Shared tenants still get a boundary, just no back-reference to it.
        let shared = ResourceStore::<Tenant>::get(store, &ObjectKey::cluster("shared"))
            .await
            .unwrap()
            .unwrap();
        assert!(shared.metadata.owner_references.is_empty());
        assert!(ResourceStore::<Namespace>::get(store, &ObjectKey::cluster("tenant-shared"))
            .await
            .unwrap()
            .is_some());

        let pods = ResourceStore::<Pod>::list(store, Some("tenant-acme")).await.unwrap();
        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0].containers.len(), 2);
        assert!(runtime.is_dry_run());
    }

    #[tokio::test]
    async fn test_seed_rejects_invalid_tenant() {
        let runtime = Runtime::in_memory(&Config::default());
        let seed: SeedFile = serde_yaml::from_str("tenants:\n  - name: Bad_Name\n    owners: [x]\n").unwrap();
        assert!(runtime.apply_seed(seed).await.is_err());
    }

    #[tokio::test]
    async fn test_dry_run_verifier_denies_listed_images() {
        let verifier = build_verifier(&Config::default(), true, &["bad:1".to_string()]).unwrap();
        assert!(verifier.verify("good:1").await.is_ok());
        assert!(verifier.verify("bad:1").await.is_err());
    }
}
