use async_trait::async_trait;

use crate::domain::models::{
    Namespace, NetworkPolicy, ObjectKey, ObjectKind, Pod, ResourceQuota, Secret, Tenant,
};
use crate::domain::ports::errors::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

/// Options for delete calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// `Some(0)` removes the object immediately.
    pub grace_period_seconds: Option<u32>,
}

impl DeleteOptions {
    pub fn immediate() -> Self {
        Self {
            grace_period_seconds: Some(0),
        }
    }
}

/// Typed CRUD port for one object kind
#[async_trait]
pub trait ResourceStore<K: ObjectKind>: Send + Sync {
    /// Get an object by key; `Ok(None)` when it does not exist
    async fn get(&self, key: &ObjectKey) -> StoreResult<Option<K>>;

    /// List objects, optionally restricted to one namespace
    async fn list(&self, namespace: Option<&str>) -> StoreResult<Vec<K>>;

    /// Create a new object and return it as stored (uid, version assigned)
    async fn create(&self, obj: &K) -> StoreResult<K>;

    /// Replace an existing object; fails with `Conflict` on a stale version
    async fn update(&self, obj: &K) -> StoreResult<K>;

    /// Delete an object by key
    async fn delete(&self, key: &ObjectKey, options: DeleteOptions) -> StoreResult<()>;
}

/// Desired-state store port covering every kind the control loop touches
#[async_trait]
pub trait ClusterStore:
    ResourceStore<Tenant>
    + ResourceStore<Namespace>
    + ResourceStore<ResourceQuota>
    + ResourceStore<NetworkPolicy>
    + ResourceStore<Secret>
    + ResourceStore<Pod>
{
    /// Write only the status of a tenant
    async fn update_tenant_status(&self, tenant: &Tenant) -> StoreResult<Tenant>;
}
