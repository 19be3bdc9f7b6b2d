//! Image signature enforcement scanner.
//!
//! Periodically walks every namespace-isolated tenant, verifies the images of
//! each running workload in its boundary and evicts a workload on its first
//! failing image. Failures are isolated per tenant and per workload: nothing
//! that goes wrong for one of them stops the rest of the pass.
//!
//! Overlap policy is single-flight with drop. Ticks missed while a pass runs
//! are skipped, and a concurrent [`EnforcementScanner::scan_once`] call
//! returns a [`ScanReport`] flagged as skipped instead of starting a second
//! pass.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::config::ScannerConfig;
use crate::domain::models::{Namespace, ObjectKey, ObjectKind, Pod, Tenant, WardenEvent};
use crate::domain::ports::{ClusterStore, DeleteOptions, ImageVerifier, ResourceStore, VerificationError};
use crate::services::event_bus::EventBus;

/// Runtime settings for the scanner.
#[derive(Debug, Clone)]
pub struct EnforcementConfig {
    /// Time between pass starts. The first pass runs immediately.
    pub interval: Duration,
    /// Upper bound for one verifier call; hitting it counts as a failure.
    pub verify_timeout: Duration,
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self::from(&ScannerConfig::default())
    }
}

impl From<&ScannerConfig> for EnforcementConfig {
    fn from(config: &ScannerConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs),
            verify_timeout: Duration::from_secs(config.verify_timeout_secs),
        }
    }
}

/// Counters for one scan pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// The pass did not run because another one was in flight.
    pub skipped: bool,
    pub tenants_scanned: u64,
    /// Namespace-isolated tenants whose boundary does not exist yet.
    pub tenants_skipped: u64,
    pub workloads_checked: u64,
    pub images_verified: u64,
    pub evictions: u64,
    pub eviction_failures: u64,
    /// Tenants whose scan failed part-way.
    pub errors: u64,
}

impl ScanReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

/// Status of the scanner across passes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScannerStatus {
    pub running: bool,
    pub total_passes: u64,
    pub failed_passes: u64,
    pub total_evictions: u64,
    pub last_pass_at: Option<DateTime<Utc>>,
    pub last_report: Option<ScanReport>,
}

/// Read-only view on a scanner owned elsewhere.
#[derive(Clone)]
pub struct ScannerHandle {
    status: Arc<RwLock<ScannerStatus>>,
}

impl ScannerHandle {
    pub async fn status(&self) -> ScannerStatus {
        self.status.read().await.clone()
    }
}

/// Clears the in-flight flag when a pass ends, even on early return.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct EnforcementScanner {
    store: Arc<dyn ClusterStore>,
    verifier: Arc<dyn ImageVerifier>,
    events: Arc<EventBus>,
    config: EnforcementConfig,
    in_flight: AtomicBool,
    status: Arc<RwLock<ScannerStatus>>,
}

impl EnforcementScanner {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        verifier: Arc<dyn ImageVerifier>,
        events: Arc<EventBus>,
        config: EnforcementConfig,
    ) -> Self {
        Self {
            store,
            verifier,
            events,
            config,
            in_flight: AtomicBool::new(false),
            status: Arc::new(RwLock::new(ScannerStatus::default())),
        }
    }

    pub fn handle(&self) -> ScannerHandle {
        ScannerHandle {
            status: self.status.clone(),
        }
    }

    /// Scan immediately, then every interval, until `shutdown` fires.
    ///
    /// Cancellation is observed between ticks and between workloads.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.config.interval.as_secs_f64(),
            verifier = self.verifier.name(),
            "starting image signature enforcement"
        );
        self.status.write().await.running = true;
        self.events.publish(WardenEvent::ScannerStarted {
            interval: self.config.interval,
        });

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match self.pass(&shutdown).await {
                        Ok(report) if report.skipped => debug!("previous pass still running, tick dropped"),
                        Ok(report) => debug!(?report, "scan pass finished"),
                        Err(e) => error!(error = %e, "scan pass failed"),
                    }
                }
            }
        }

        self.status.write().await.running = false;
        info!("image signature enforcement stopped");
    }

    /// Run one full pass now.
    pub async fn scan_once(&self) -> DomainResult<ScanReport> {
        self.pass(&CancellationToken::new()).await
    }

    async fn pass(&self, shutdown: &CancellationToken) -> DomainResult<ScanReport> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            return Ok(ScanReport::skipped());
        };

        let result = self.scan_tenants(shutdown).await;

        let mut status = self.status.write().await;
        status.total_passes += 1;
        status.last_pass_at = Some(Utc::now());
        match &result {
            Ok(report) => {
                status.total_evictions += report.evictions;
                status.last_report = Some(report.clone());
            }
            Err(_) => status.failed_passes += 1,
        }
        result
    }

    async fn scan_tenants(&self, shutdown: &CancellationToken) -> DomainResult<ScanReport> {
        let mut report = ScanReport::default();
        let tenants = ResourceStore::<Tenant>::list(self.store.as_ref(), None).await?;

        for tenant in tenants.iter().filter(|t| t.spec.isolation.is_namespace()) {
            if shutdown.is_cancelled() {
                break;
            }
            if let Err(e) = self.scan_tenant(tenant, &mut report, shutdown).await {
                report.errors += 1;
                warn!(tenant = %tenant.name(), error = %e, "tenant scan failed, continuing");
            }
        }
        Ok(report)
    }

    #[instrument(skip_all, fields(tenant = %tenant.name()))]
    async fn scan_tenant(
        &self,
        tenant: &Tenant,
        report: &mut ScanReport,
        shutdown: &CancellationToken,
    ) -> DomainResult<()> {
        let store = self.store.as_ref();
        let boundary = tenant.boundary_name();

        if ResourceStore::<Namespace>::get(store, &ObjectKey::cluster(&boundary))
            .await?
            .is_none()
        {
            debug!(namespace = %boundary, "boundary not converged yet, skipping");
            report.tenants_skipped += 1;
            return Ok(());
        }

        let pods = match ResourceStore::<Pod>::list(store, Some(&boundary)).await {
            Ok(pods) => pods,
            Err(e) if e.is_not_found() => {
                report.tenants_skipped += 1;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        report.tenants_scanned += 1;

        for pod in pods.iter().filter(|p| !p.metadata.is_terminating()) {
            if shutdown.is_cancelled() {
                break;
            }
            report.workloads_checked += 1;
            self.check_workload(tenant, &boundary, pod, report).await;
        }
        Ok(())
    }

    /// Verify images in order and evict on the first failure.
    async fn check_workload(&self, tenant: &Tenant, boundary: &str, pod: &Pod, report: &mut ScanReport) {
        for image in collect_images(pod) {
            report.images_verified += 1;
            if let Err(e) = self.verify(&image).await {
                warn!(namespace = %boundary, workload = %pod.metadata.name, %image, error = %e, "image failed verification");
                self.evict(tenant, boundary, pod, &image, &e, report).await;
                return;
            }
        }
    }

    async fn verify(&self, image: &str) -> Result<(), VerificationError> {
        match tokio::time::timeout(self.config.verify_timeout, self.verifier.verify(image)).await {
            Ok(result) => result,
            Err(_) => Err(VerificationError::Timeout {
                reference: image.to_string(),
                timeout: self.config.verify_timeout,
            }),
        }
    }

    async fn evict(
        &self,
        tenant: &Tenant,
        boundary: &str,
        pod: &Pod,
        image: &str,
        cause: &VerificationError,
        report: &mut ScanReport,
    ) {
        let deleted = ResourceStore::<Pod>::delete(self.store.as_ref(), &pod.key(), DeleteOptions::immediate()).await;
        match deleted {
            Ok(()) => {
                report.evictions += 1;
                info!(namespace = %boundary, workload = %pod.metadata.name, %image, "evicted workload");
                self.events.publish(WardenEvent::WorkloadEvicted {
                    tenant: tenant.name().to_string(),
                    namespace: boundary.to_string(),
                    workload: pod.metadata.name.clone(),
                    image: image.to_string(),
                    reason: cause.to_string(),
                });
            }
            Err(e) if e.is_not_found() => {
                debug!(namespace = %boundary, workload = %pod.metadata.name, "workload already gone");
            }
            Err(e) => {
                report.eviction_failures += 1;
                error!(namespace = %boundary, workload = %pod.metadata.name, %image, error = %e, "failed to evict workload");
                self.events.publish(WardenEvent::EvictionFailed {
                    tenant: tenant.name().to_string(),
                    namespace: boundary.to_string(),
                    workload: pod.metadata.name.clone(),
                    image: image.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }
}

/// Image references of a pod: init containers first, then main containers,
/// trimmed, blanks dropped, first occurrence wins.
pub fn collect_images(pod: &Pod) -> Vec<String> {
    let mut seen = HashSet::new();
    pod.init_containers
        .iter()
        .chain(pod.containers.iter())
        .map(|c| c.image.trim())
        .filter(|image| !image.is_empty())
        .filter(|image| seen.insert(*image))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Container, ObjectMeta};
    use proptest::prelude::*;

    fn pod(init: &[&str], main: &[&str]) -> Pod {
        Pod {
            metadata: ObjectMeta::namespaced("tenant-acme", "web"),
            init_containers: init.iter().map(|i| Container::new("init", *i)).collect(),
            containers: main.iter().map(|i| Container::new("main", *i)).collect(),
        }
    }

    #[test]
    fn test_collect_images_orders_init_first_and_dedups() {
        let images = collect_images(&pod(&["busybox:1", "app:2"], &["app:2", " sidecar:3 ", ""]));
        assert_eq!(images, vec!["busybox:1", "app:2", "sidecar:3"]);
    }

    #[test]
    fn test_config_from_scanner_section() {
        let config = EnforcementConfig::default();
        assert_eq!(config.interval, Duration::from_secs(20));
        assert_eq!(config.verify_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_in_flight_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let guard = InFlightGuard::acquire(&flag);
        assert!(guard.is_some());
        assert!(InFlightGuard::acquire(&flag).is_none());
        drop(guard);
        assert!(InFlightGuard::acquire(&flag).is_some());
    }

    proptest! {
        #[test]
        fn prop_collect_images_has_no_duplicates_or_blanks(
            init in proptest::collection::vec("[a-c ]{0,3}", 0..6),
            main in proptest::collection::vec("[a-c ]{0,3}", 0..6),
        ) {
            let init: Vec<&str> = init.iter().map(String::as_str).collect();
            let main: Vec<&str> = main.iter().map(String::as_str).collect();
            let images = collect_images(&pod(&init, &main));

            let unique: HashSet<&String> = images.iter().collect();
            prop_assert_eq!(unique.len(), images.len());
            prop_assert!(images.iter().all(|i| !i.is_empty() && i.trim() == i.as_str()));

            // Every non-blank input image shows up.
            for raw in init.iter().chain(main.iter()) {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    prop_assert!(images.iter().any(|i| i == trimmed));
                }
            }
        }
    }
}
