//! In-process implementation of the [`ClusterStore`] port.
//!
//! Behaves like the cluster API where the control loop can observe it:
//! uids and resource versions are assigned by the store, stale updates
//! conflict, deleting a namespace removes what lives in it, and objects whose
//! owners are all gone are garbage collected. Used by tests and dry runs.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::models::{
    Namespace, NetworkPolicy, ObjectKey, ObjectKind, Pod, ResourceQuota, Secret, Tenant,
};
use crate::domain::ports::{ClusterStore, DeleteOptions, ResourceStore, StoreError, StoreResult};

/// Store operation a fault can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Get,
    List,
    Create,
    Update,
    Delete,
    UpdateStatus,
}

/// Error produced by an injected fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultError {
    Conflict,
    Backend,
}

/// Makes matching operations fail.
#[derive(Debug, Clone)]
pub struct FaultRule {
    pub op: StoreOp,
    /// Kind name, e.g. `Pod`.
    pub kind: &'static str,
    /// Restrict to one namespace; `None` matches any.
    pub namespace: Option<String>,
    pub error: FaultError,
    /// Number of failures left; `None` fails forever.
    pub remaining: Option<u32>,
}

impl FaultRule {
    pub fn new(op: StoreOp, kind: &'static str, error: FaultError) -> Self {
        Self {
            op,
            kind,
            namespace: None,
            error,
            remaining: None,
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn times(mut self, n: u32) -> Self {
        self.remaining = Some(n);
        self
    }
}

/// A delete call as received by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRecord {
    pub kind: &'static str,
    pub key: ObjectKey,
    pub options: DeleteOptions,
}

/// Per-kind object tables.
#[derive(Debug, Default)]
pub struct Tables {
    tenants: BTreeMap<ObjectKey, Tenant>,
    namespaces: BTreeMap<ObjectKey, Namespace>,
    quotas: BTreeMap<ObjectKey, ResourceQuota>,
    policies: BTreeMap<ObjectKey, NetworkPolicy>,
    secrets: BTreeMap<ObjectKey, Secret>,
    pods: BTreeMap<ObjectKey, Pod>,
    next_version: u64,
    faults: Vec<FaultRule>,
    deletes: Vec<DeleteRecord>,
}

impl Tables {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn check_fault(&mut self, op: StoreOp, kind: &'static str, key: &ObjectKey) -> StoreResult<()> {
        let Some(rule) = self.faults.iter_mut().find(|r| {
            r.op == op
                && r.kind == kind
                && r.remaining != Some(0)
                && r.namespace.as_ref().is_none_or(|ns| key.namespace.as_ref() == Some(ns))
        }) else {
            return Ok(());
        };

        if let Some(n) = rule.remaining.as_mut() {
            *n -= 1;
        }
        Err(match rule.error {
            FaultError::Conflict => StoreError::Conflict {
                kind,
                key: key.to_string(),
                reason: "injected conflict".to_string(),
            },
            FaultError::Backend => StoreError::Backend(format!("injected failure on {kind} {key}")),
        })
    }

    fn namespace_exists(&self, name: &str) -> bool {
        self.namespaces.contains_key(&ObjectKey::cluster(name))
    }

    fn live_uids(&self) -> HashSet<String> {
        fn uids<K: ObjectKind>(table: &BTreeMap<ObjectKey, K>) -> impl Iterator<Item = String> + '_ {
            table.values().filter_map(|o| o.meta().uid.clone())
        }
        uids(&self.tenants)
            .chain(uids(&self.namespaces))
            .chain(uids(&self.quotas))
            .chain(uids(&self.policies))
            .chain(uids(&self.secrets))
            .chain(uids(&self.pods))
            .collect()
    }

    fn purge_namespace(&mut self, name: &str) {
        let inside = |key: &ObjectKey| key.namespace.as_deref() == Some(name);
        self.quotas.retain(|k, _| !inside(k));
        self.policies.retain(|k, _| !inside(k));
        self.secrets.retain(|k, _| !inside(k));
        self.pods.retain(|k, _| !inside(k));
    }

    /// Remove objects whose owners are all gone, until nothing changes.
    fn collect_garbage(&mut self) {
        loop {
            let live = self.live_uids();

            let orphaned_namespaces: Vec<ObjectKey> = orphans(&self.namespaces, &live);
            for key in &orphaned_namespaces {
                self.namespaces.remove(key);
                self.purge_namespace(&key.name);
            }

            let removed = orphaned_namespaces.len()
                + sweep(&mut self.tenants, &live)
                + sweep(&mut self.quotas, &live)
                + sweep(&mut self.policies, &live)
                + sweep(&mut self.secrets, &live)
                + sweep(&mut self.pods, &live);
            if removed == 0 {
                break;
            }
        }
    }
}

fn is_orphan<K: ObjectKind>(obj: &K, live: &HashSet<String>) -> bool {
    let refs = &obj.meta().owner_references;
    !refs.is_empty() && refs.iter().all(|r| !live.contains(&r.uid))
}

fn orphans<K: ObjectKind>(table: &BTreeMap<ObjectKey, K>, live: &HashSet<String>) -> Vec<ObjectKey> {
    table
        .iter()
        .filter(|(_, obj)| is_orphan(*obj, live))
        .map(|(key, _)| key.clone())
        .collect()
}

fn sweep<K: ObjectKind>(table: &mut BTreeMap<ObjectKey, K>, live: &HashSet<String>) -> usize {
    let before = table.len();
    table.retain(|_, obj| !is_orphan(obj, live));
    before - table.len()
}

/// Kinds the in-memory store can hold.
pub trait StoredKind: ObjectKind {
    fn table(tables: &Tables) -> &BTreeMap<ObjectKey, Self>;
    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<ObjectKey, Self>;

    /// Adjust an object before it is first stored.
    fn on_create(&mut self) {}

    /// Adjust an incoming replacement given what is stored.
    fn on_update(&mut self, _stored: &Self) {}
}

impl StoredKind for Tenant {
    fn table(tables: &Tables) -> &BTreeMap<ObjectKey, Self> {
        &tables.tenants
    }
    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<ObjectKey, Self> {
        &mut tables.tenants
    }

    // Status lives behind its own write path.
    fn on_create(&mut self) {
        self.status = Default::default();
    }
    fn on_update(&mut self, stored: &Self) {
        self.status = stored.status.clone();
    }
}

impl StoredKind for Namespace {
    fn table(tables: &Tables) -> &BTreeMap<ObjectKey, Self> {
        &tables.namespaces
    }
    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<ObjectKey, Self> {
        &mut tables.namespaces
    }
}

impl StoredKind for ResourceQuota {
    fn table(tables: &Tables) -> &BTreeMap<ObjectKey, Self> {
        &tables.quotas
    }
    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<ObjectKey, Self> {
        &mut tables.quotas
    }
}

impl StoredKind for NetworkPolicy {
    fn table(tables: &Tables) -> &BTreeMap<ObjectKey, Self> {
        &tables.policies
    }
    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<ObjectKey, Self> {
        &mut tables.policies
    }
}

impl StoredKind for Secret {
    fn table(tables: &Tables) -> &BTreeMap<ObjectKey, Self> {
        &tables.secrets
    }
    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<ObjectKey, Self> {
        &mut tables.secrets
    }
}

impl StoredKind for Pod {
    fn table(tables: &Tables) -> &BTreeMap<ObjectKey, Self> {
        &tables.pods
    }
    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<ObjectKey, Self> {
        &mut tables.pods
    }
}

/// In-memory cluster store.
#[derive(Debug, Default)]
pub struct InMemoryClusterStore {
    tables: Mutex<Tables>,
    writes: AtomicU64,
}

impl InMemoryClusterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn count_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    /// Writes (create, update, delete, status) received so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn inject_fault(&self, rule: FaultRule) {
        self.tables().faults.push(rule);
    }

    pub fn clear_faults(&self) {
        self.tables().faults.clear();
    }

    /// Every delete call received, in order.
    pub fn deletes(&self) -> Vec<DeleteRecord> {
        self.tables().deletes.clone()
    }

    /// Number of stored objects of kind `K`.
    pub fn count<K: StoredKind>(&self) -> usize {
        K::table(&self.tables()).len()
    }
}

fn validate_key<K: ObjectKind>(key: &ObjectKey) -> StoreResult<()> {
    if key.name.is_empty() {
        return Err(StoreError::Decode {
            kind: K::KIND,
            key: key.to_string(),
            reason: "object has no name".to_string(),
        });
    }
    if K::NAMESPACED != key.namespace.is_some() {
        return Err(StoreError::Decode {
            kind: K::KIND,
            key: key.to_string(),
            reason: if K::NAMESPACED {
                "namespaced object without a namespace".to_string()
            } else {
                "cluster-scoped object with a namespace".to_string()
            },
        });
    }
    Ok(())
}

#[async_trait]
impl<K: StoredKind> ResourceStore<K> for InMemoryClusterStore {
    async fn get(&self, key: &ObjectKey) -> StoreResult<Option<K>> {
        let mut tables = self.tables();
        tables.check_fault(StoreOp::Get, K::KIND, key)?;
        Ok(K::table(&tables).get(key).cloned())
    }

    async fn list(&self, namespace: Option<&str>) -> StoreResult<Vec<K>> {
        let mut tables = self.tables();
        let scope = ObjectKey {
            namespace: namespace.map(str::to_string),
            name: String::new(),
        };
        tables.check_fault(StoreOp::List, K::KIND, &scope)?;
        Ok(K::table(&tables)
            .values()
            .filter(|o| !K::NAMESPACED || namespace.is_none_or(|ns| o.meta().namespace.as_deref() == Some(ns)))
            .cloned()
            .collect())
    }

    async fn create(&self, obj: &K) -> StoreResult<K> {
        let key = obj.key();
        validate_key::<K>(&key)?;
        let mut tables = self.tables();
        tables.check_fault(StoreOp::Create, K::KIND, &key)?;

        if K::table(&tables).contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: K::KIND,
                key: key.to_string(),
            });
        }
        if let Some(ns) = key.namespace.as_deref() {
            if !tables.namespace_exists(ns) {
                return Err(StoreError::NotFound {
                    kind: Namespace::KIND,
                    key: ns.to_string(),
                });
            }
        }

        let mut stored = obj.clone();
        stored.on_create();
        let version = tables.bump_version();
        let meta = stored.meta_mut();
        meta.uid = Some(Uuid::new_v4().to_string());
        meta.resource_version = Some(version);
        meta.deletion_timestamp = None;

        K::table_mut(&mut tables).insert(key, stored.clone());
        self.count_write();
        Ok(stored)
    }

    async fn update(&self, obj: &K) -> StoreResult<K> {
        let key = obj.key();
        validate_key::<K>(&key)?;
        let mut tables = self.tables();
        tables.check_fault(StoreOp::Update, K::KIND, &key)?;

        let Some(current) = K::table(&tables).get(&key).cloned() else {
            return Err(StoreError::NotFound {
                kind: K::KIND,
                key: key.to_string(),
            });
        };
        let incoming = obj.meta().resource_version.as_ref();
        if incoming.is_some() && incoming != current.meta().resource_version.as_ref() {
            return Err(StoreError::Conflict {
                kind: K::KIND,
                key: key.to_string(),
                reason: "the object has been modified; resource version is stale".to_string(),
            });
        }

        let mut stored = obj.clone();
        stored.on_update(&current);
        let version = tables.bump_version();
        let meta = stored.meta_mut();
        meta.uid = current.meta().uid.clone();
        meta.resource_version = Some(version);

        K::table_mut(&mut tables).insert(key, stored.clone());
        // Owner references may now point at deleted objects.
        tables.collect_garbage();
        self.count_write();
        Ok(stored)
    }

    async fn delete(&self, key: &ObjectKey, options: DeleteOptions) -> StoreResult<()> {
        let mut tables = self.tables();
        tables.check_fault(StoreOp::Delete, K::KIND, key)?;
        tables.deletes.push(DeleteRecord {
            kind: K::KIND,
            key: key.clone(),
            options,
        });

        if K::table_mut(&mut tables).remove(key).is_none() {
            return Err(StoreError::NotFound {
                kind: K::KIND,
                key: key.to_string(),
            });
        }
        if K::KIND == Namespace::KIND {
            tables.purge_namespace(&key.name);
        }
        tables.collect_garbage();
        self.count_write();
        Ok(())
    }
}

#[async_trait]
impl ClusterStore for InMemoryClusterStore {
    async fn update_tenant_status(&self, tenant: &Tenant) -> StoreResult<Tenant> {
        let key = tenant.key();
        let mut tables = self.tables();
        tables.check_fault(StoreOp::UpdateStatus, Tenant::KIND, &key)?;

        let version = tables.bump_version();
        let Some(stored) = tables.tenants.get_mut(&key) else {
            return Err(StoreError::NotFound {
                kind: Tenant::KIND,
                key: key.to_string(),
            });
        };
        stored.status = tenant.status.clone();
        stored.metadata.resource_version = Some(version);
        let stored = stored.clone();

        self.count_write();
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ObjectMeta, OwnerReference, TenantPhase, TenantSpec};

    fn tenant(name: &str) -> Tenant {
        Tenant::new(
            name,
            TenantSpec {
                owners: vec!["a@x".to_string()],
                ..Default::default()
            },
        )
    }

    fn owned_by(uid: &str, kind: &str) -> OwnerReference {
        OwnerReference {
            api_version: "v1".to_string(),
            kind: kind.to_string(),
            name: "owner".to_string(),
            uid: uid.to_string(),
            controller: Some(true),
            block_owner_deletion: None,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_identity() {
        let store = InMemoryClusterStore::new();
        let created = ResourceStore::<Tenant>::create(&store, &tenant("acme")).await.unwrap();

        assert!(created.metadata.uid.is_some());
        assert!(created.metadata.resource_version.is_some());
        assert_eq!(store.write_count(), 1);

        let again = ResourceStore::<Tenant>::create(&store, &tenant("acme")).await;
        assert!(matches!(again, Err(StoreError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = InMemoryClusterStore::new();
        let created = ResourceStore::<Tenant>::create(&store, &tenant("acme")).await.unwrap();

        let mut first = created.clone();
        first.spec.owners.push("b@x".to_string());
        ResourceStore::<Tenant>::update(&store, &first).await.unwrap();

        let mut stale = created;
        stale.spec.owners.push("c@x".to_string());
        let err = ResourceStore::<Tenant>::update(&store, &stale).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_tenant_update_preserves_status() {
        let store = InMemoryClusterStore::new();
        let mut created = ResourceStore::<Tenant>::create(&store, &tenant("acme")).await.unwrap();
        created.status.phase = Some(TenantPhase::Ready);
        let with_status = store.update_tenant_status(&created).await.unwrap();

        let mut edited = with_status.clone();
        edited.status.phase = Some(TenantPhase::Error);
        let updated = ResourceStore::<Tenant>::update(&store, &edited).await.unwrap();
        assert_eq!(updated.status.phase, Some(TenantPhase::Ready));
    }

    #[tokio::test]
    async fn test_namespaced_create_requires_namespace() {
        let store = InMemoryClusterStore::new();
        let pod = Pod::from_meta(ObjectMeta::namespaced("missing", "web"));
        let err = ResourceStore::<Pod>::create(&store, &pod).await.unwrap_err();
        assert!(err.is_not_found());

        let unscoped = Pod::from_meta(ObjectMeta::named("web"));
        assert!(matches!(
            ResourceStore::<Pod>::create(&store, &unscoped).await,
            Err(StoreError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn test_namespace_delete_purges_contents() {
        let store = InMemoryClusterStore::new();
        ResourceStore::<Namespace>::create(&store, &Namespace::from_meta(ObjectMeta::named("ns")))
            .await
            .unwrap();
        ResourceStore::<Pod>::create(&store, &Pod::from_meta(ObjectMeta::namespaced("ns", "web")))
            .await
            .unwrap();

        ResourceStore::<Namespace>::delete(&store, &ObjectKey::cluster("ns"), DeleteOptions::default())
            .await
            .unwrap();
        assert_eq!(store.count::<Pod>(), 0);
    }

    #[tokio::test]
    async fn test_garbage_collection_cascades_through_cycle() {
        let store = InMemoryClusterStore::new();
        let owner = ResourceStore::<Tenant>::create(&store, &tenant("acme")).await.unwrap();
        let owner_uid = owner.metadata.uid.clone().unwrap();

        let mut ns = Namespace::from_meta(ObjectMeta::named("tenant-acme"));
        ns.metadata.owner_references.push(owned_by(&owner_uid, "Tenant"));
        let ns = ResourceStore::<Namespace>::create(&store, &ns).await.unwrap();

        let mut linked = owner;
        linked
            .metadata
            .owner_references
            .push(owned_by(ns.metadata.uid.as_deref().unwrap(), "Namespace"));
        ResourceStore::<Tenant>::update(&store, &linked).await.unwrap();

        ResourceStore::<Namespace>::delete(&store, &ObjectKey::cluster("tenant-acme"), DeleteOptions::default())
            .await
            .unwrap();
        assert_eq!(store.count::<Tenant>(), 0);
    }

    #[tokio::test]
    async fn test_object_with_live_owner_survives() {
        let store = InMemoryClusterStore::new();
        let a = ResourceStore::<Tenant>::create(&store, &tenant("a")).await.unwrap();
        let b = ResourceStore::<Tenant>::create(&store, &tenant("b")).await.unwrap();

        let mut ns = Namespace::from_meta(ObjectMeta::named("shared"));
        ns.metadata.owner_references = vec![
            owned_by(a.metadata.uid.as_deref().unwrap(), "Tenant"),
            owned_by(b.metadata.uid.as_deref().unwrap(), "Tenant"),
        ];
        ResourceStore::<Namespace>::create(&store, &ns).await.unwrap();

        ResourceStore::<Tenant>::delete(&store, &ObjectKey::cluster("a"), DeleteOptions::default())
            .await
            .unwrap();
        assert_eq!(store.count::<Namespace>(), 1);
    }

    #[tokio::test]
    async fn test_injected_fault_is_scoped_and_counted() {
        let store = InMemoryClusterStore::new();
        store.inject_fault(FaultRule::new(StoreOp::Create, "Tenant", FaultError::Backend).times(1));

        assert!(ResourceStore::<Tenant>::create(&store, &tenant("a")).await.is_err());
        assert!(ResourceStore::<Tenant>::create(&store, &tenant("a")).await.is_ok());
        assert_eq!(store.write_count(), 1);
    }
}
