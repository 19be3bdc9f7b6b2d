//! Cluster store backed by the Kubernetes API.

use async_trait::async_trait;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use tracing::debug;

use crate::domain::models::{ObjectKey, ObjectKind, Tenant};
use crate::domain::ports::{ClusterStore, DeleteOptions, ResourceStore, StoreError, StoreResult};

use super::crd::TenantResource;
use super::mapping::{status_to_kube, KubeMapped};

/// [`ClusterStore`] over a live API server.
#[derive(Clone)]
pub struct KubeClusterStore {
    client: Client,
}

impl KubeClusterStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the in-cluster service account or the local kubeconfig.
    pub async fn try_default() -> StoreResult<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| StoreError::Backend(format!("failed to build cluster client: {e}")))?;
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl std::fmt::Debug for KubeClusterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterStore").finish_non_exhaustive()
    }
}

/// Translate an API error into the store's vocabulary.
pub fn map_api_error<K: ObjectKind>(key: &ObjectKey, err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(response) if response.code == 404 => StoreError::NotFound {
            kind: K::KIND,
            key: key.to_string(),
        },
        kube::Error::Api(response) if response.code == 409 && response.reason == "AlreadyExists" => {
            StoreError::AlreadyExists {
                kind: K::KIND,
                key: key.to_string(),
            }
        }
        kube::Error::Api(response) if response.code == 409 => StoreError::Conflict {
            kind: K::KIND,
            key: key.to_string(),
            reason: response.message,
        },
        kube::Error::SerdeError(e) => StoreError::Decode {
            kind: K::KIND,
            key: key.to_string(),
            reason: e.to_string(),
        },
        other => StoreError::Backend(format!("{} {key}: {other}", K::KIND)),
    }
}

fn scope_of<K: ObjectKind>(key: &ObjectKey) -> StoreResult<Option<&str>> {
    match (K::NAMESPACED, key.namespace.as_deref()) {
        (true, Some(ns)) => Ok(Some(ns)),
        (false, None) => Ok(None),
        (true, None) => Err(StoreError::Decode {
            kind: K::KIND,
            key: key.to_string(),
            reason: "namespaced kind addressed without a namespace".to_string(),
        }),
        (false, Some(_)) => Err(StoreError::Decode {
            kind: K::KIND,
            key: key.to_string(),
            reason: "cluster-scoped kind addressed with a namespace".to_string(),
        }),
    }
}

#[async_trait]
impl<K: KubeMapped> ResourceStore<K> for KubeClusterStore {
    async fn get(&self, key: &ObjectKey) -> StoreResult<Option<K>> {
        let api = K::api(self.client.clone(), scope_of::<K>(key)?);
        api.get_opt(&key.name)
            .await
            .map_err(|e| map_api_error::<K>(key, e))?
            .map(K::from_kube)
            .transpose()
    }

    async fn list(&self, namespace: Option<&str>) -> StoreResult<Vec<K>> {
        let namespace = if K::NAMESPACED { namespace } else { None };
        let api = K::api(self.client.clone(), namespace);
        let scope = ObjectKey {
            namespace: namespace.map(str::to_string),
            name: "*".to_string(),
        };
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| map_api_error::<K>(&scope, e))?;
        list.items.into_iter().map(K::from_kube).collect()
    }

    async fn create(&self, obj: &K) -> StoreResult<K> {
        let key = obj.key();
        let api = K::api(self.client.clone(), scope_of::<K>(&key)?);
        let mut body = obj.to_kube()?;
        body.meta_mut().resource_version = None;
        body.meta_mut().uid = None;

        let created = api
            .create(&PostParams::default(), &body)
            .await
            .map_err(|e| map_api_error::<K>(&key, e))?;
        debug!(kind = K::KIND, key = %key, "created");
        K::from_kube(created)
    }

    async fn update(&self, obj: &K) -> StoreResult<K> {
        let key = obj.key();
        let api = K::api(self.client.clone(), scope_of::<K>(&key)?);
        let mut live = api
            .get_opt(&key.name)
            .await
            .map_err(|e| map_api_error::<K>(&key, e))?
            .ok_or_else(|| StoreError::NotFound {
                kind: K::KIND,
                key: key.to_string(),
            })?;

        if let Some(expected) = obj.meta().resource_version.as_deref() {
            if live.meta().resource_version.as_deref() != Some(expected) {
                return Err(StoreError::Conflict {
                    kind: K::KIND,
                    key: key.to_string(),
                    reason: format!("stale resource version {expected}"),
                });
            }
        }

        obj.overlay(&mut live)?;
        // The API server rejects the replace with 409 if the object moved again.
        let stored = api
            .replace(&key.name, &PostParams::default(), &live)
            .await
            .map_err(|e| map_api_error::<K>(&key, e))?;
        K::from_kube(stored)
    }

    async fn delete(&self, key: &ObjectKey, options: DeleteOptions) -> StoreResult<()> {
        let api = K::api(self.client.clone(), scope_of::<K>(key)?);
        let params = DeleteParams {
            grace_period_seconds: options.grace_period_seconds,
            ..DeleteParams::default()
        };
        api.delete(&key.name, &params)
            .await
            .map_err(|e| map_api_error::<K>(key, e))?;
        debug!(kind = K::KIND, key = %key, grace = ?options.grace_period_seconds, "deleted");
        Ok(())
    }
}

#[async_trait]
impl ClusterStore for KubeClusterStore {
    async fn update_tenant_status(&self, tenant: &Tenant) -> StoreResult<Tenant> {
        let key = tenant.key();
        let api = Tenant::api(self.client.clone(), None);
        let patch = serde_json::json!({
            "apiVersion": TenantResource::api_version(&()),
            "kind": TenantResource::kind(&()),
            "status": status_to_kube(&tenant.status),
        });
        let stored = api
            .patch_status(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_api_error::<Tenant>(&key, e))?;
        Tenant::from_kube(stored)
    }
}
