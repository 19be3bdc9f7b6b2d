//! Kubernetes API adapters: the `Tenant` CRD, the cluster store and the
//! watch-driven controller.

pub mod controller;
pub mod crd;
pub mod mapping;
pub mod store;

pub use controller::{run_controller, ControllerContext};
pub use crd::{TenantResource, TenantResourceSpec, TenantResourceStatus};
pub use mapping::KubeMapped;
pub use store::KubeClusterStore;
