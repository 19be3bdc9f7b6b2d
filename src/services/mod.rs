//! Service layer: the tenant control loop.
//!
//! - `convergence`: idempotent reconcile of one tenant's boundary and children
//! - `ownership`: controller references and the tenant-to-boundary back edge
//! - `phase`: status and condition projection
//! - `enforcement`: periodic scan-verify-evict over tenant workloads
//! - `event_bus` / `notification_forwarder`: domain events to the notifier
//! - `lifecycle`: synchronous create/delete/status for the command line

pub mod convergence;
pub mod enforcement;
pub mod event_bus;
pub mod lifecycle;
pub mod notification_forwarder;
pub mod ownership;
pub mod phase;
pub mod quota_policy;

pub use convergence::{create_or_update, ConvergenceEngine, ReconcileOutcome, WriteOutcome};
pub use enforcement::{collect_images, EnforcementConfig, EnforcementScanner, ScanReport, ScannerHandle};
pub use event_bus::{EventBus, EventBusConfig};
pub use lifecycle::{CreateTenantRequest, TenantLifecycle, TenantSummary};
pub use notification_forwarder::NotificationForwarder;
pub use quota_policy::QuotaPolicy;
