//! Conversion between domain objects and `k8s-openapi` / CRD types.
//!
//! Creates send a fresh object; updates overlay the fields this crate owns
//! onto the live object, so annotations, finalizers and spec fields written
//! by other controllers survive a replace.

use std::collections::BTreeMap;
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{
    Container as KubeContainer, Namespace as KubeNamespace, Pod as KubePod, PodSpec,
    ResourceQuota as KubeResourceQuota, ResourceQuotaSpec, Secret as KubeSecret,
};
use k8s_openapi::api::networking::v1::{NetworkPolicy as KubeNetworkPolicy, NetworkPolicySpec};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity as KubeQuantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    ObjectMeta as KubeMeta, OwnerReference as KubeOwnerReference, Time,
};
use k8s_openapi::ByteString;
use kube::{Api, Client};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::models::{
    Condition, ConditionStatus, Container, Namespace, NetworkPolicy, ObjectKind,
    ObjectMeta, OwnerReference, Pod, PodSelector, PolicyRule, PolicyType, ResourceQuota, Secret,
    Tenant, TenantPhase, TenantSpec, TenantStatus,
};
use crate::domain::ports::StoreError;

use super::crd::{TenantResource, TenantResourceCondition, TenantResourceSpec, TenantResourceStatus};

/// A domain kind with a cluster API counterpart.
pub trait KubeMapped: ObjectKind {
    type Api: kube::Resource<DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    /// API handle scoped to `namespace`, or cluster-wide.
    fn api(client: Client, namespace: Option<&str>) -> Api<Self::Api>;

    /// Fresh cluster object for a create.
    fn to_kube(&self) -> Result<Self::Api, StoreError>;

    /// Copy the fields this crate manages onto a live object.
    fn overlay(&self, live: &mut Self::Api) -> Result<(), StoreError>;

    fn from_kube(obj: Self::Api) -> Result<Self, StoreError>;
}

fn decode_error<K: ObjectKind>(key: &str, reason: impl Into<String>) -> StoreError {
    StoreError::Decode {
        kind: K::KIND,
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn scoped<R>(client: Client, namespace: Option<&str>) -> Api<R>
where
    R: kube::Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

fn meta_to_kube(meta: &ObjectMeta) -> KubeMeta {
    KubeMeta {
        name: Some(meta.name.clone()),
        namespace: meta.namespace.clone(),
        resource_version: meta.resource_version.clone(),
        labels: (!meta.labels.is_empty()).then(|| meta.labels.clone()),
        owner_references: (!meta.owner_references.is_empty())
            .then(|| meta.owner_references.iter().map(owner_to_kube).collect()),
        ..KubeMeta::default()
    }
}

fn overlay_meta(meta: &ObjectMeta, live: &mut KubeMeta) {
    live.labels = (!meta.labels.is_empty()).then(|| meta.labels.clone());
    live.owner_references = (!meta.owner_references.is_empty())
        .then(|| meta.owner_references.iter().map(owner_to_kube).collect());
}

fn meta_from_kube<K: ObjectKind>(meta: KubeMeta) -> Result<ObjectMeta, StoreError> {
    let name = meta
        .name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| decode_error::<K>("<unnamed>", "object has no name"))?;
    Ok(ObjectMeta {
        name,
        namespace: meta.namespace,
        uid: meta.uid,
        resource_version: meta.resource_version,
        labels: meta.labels.unwrap_or_default(),
        owner_references: meta
            .owner_references
            .unwrap_or_default()
            .into_iter()
            .map(owner_from_kube)
            .collect(),
        deletion_timestamp: meta.deletion_timestamp.map(|Time(t)| t),
    })
}

fn owner_to_kube(owner: &OwnerReference) -> KubeOwnerReference {
    KubeOwnerReference {
        api_version: owner.api_version.clone(),
        kind: owner.kind.clone(),
        name: owner.name.clone(),
        uid: owner.uid.clone(),
        controller: owner.controller,
        block_owner_deletion: owner.block_owner_deletion,
    }
}

fn owner_from_kube(owner: KubeOwnerReference) -> OwnerReference {
    OwnerReference {
        api_version: owner.api_version,
        kind: owner.kind,
        name: owner.name,
        uid: owner.uid,
        controller: owner.controller,
        block_owner_deletion: owner.block_owner_deletion,
    }
}

// Tenant

impl KubeMapped for Tenant {
    type Api = TenantResource;

    fn api(client: Client, _namespace: Option<&str>) -> Api<Self::Api> {
        Api::all(client)
    }

    fn to_kube(&self) -> Result<Self::Api, StoreError> {
        let mut resource = TenantResource::new(&self.metadata.name, tenant_spec_to_kube(&self.spec));
        resource.metadata = meta_to_kube(&self.metadata);
        Ok(resource)
    }

    /// The spec belongs to the tenant's owner; only metadata is written back.
    fn overlay(&self, live: &mut Self::Api) -> Result<(), StoreError> {
        overlay_meta(&self.metadata, &mut live.metadata);
        Ok(())
    }

    fn from_kube(obj: Self::Api) -> Result<Self, StoreError> {
        let metadata = meta_from_kube::<Self>(obj.metadata)?;
        let status = obj
            .status
            .map(|s| status_from_kube(&metadata.name, s))
            .transpose()?
            .unwrap_or_default();
        Ok(Self {
            metadata,
            spec: TenantSpec {
                owners: obj.spec.owners,
                tier: obj.spec.tier.into(),
                isolation: obj.spec.isolation.into(),
            },
            status,
        })
    }
}

fn tenant_spec_to_kube(spec: &TenantSpec) -> TenantResourceSpec {
    TenantResourceSpec {
        owners: spec.owners.clone(),
        tier: spec.tier.to_string(),
        isolation: spec.isolation.to_string(),
    }
}

/// Status body for a status-subresource patch.
pub fn status_to_kube(status: &TenantStatus) -> TenantResourceStatus {
    TenantResourceStatus {
        phase: status.phase.map(|p| p.to_string()),
        namespace: status.namespace.clone(),
        conditions: status
            .conditions
            .iter()
            .map(|c| TenantResourceCondition {
                type_: c.type_.clone(),
                status: c.status.to_string(),
                reason: c.reason.clone(),
                message: c.message.clone(),
                last_transition_time: c.last_transition_time.to_rfc3339(),
            })
            .collect(),
    }
}

fn status_from_kube(name: &str, status: TenantResourceStatus) -> Result<TenantStatus, StoreError> {
    let phase = match status.phase.as_deref() {
        None | Some("") => None,
        Some("Pending") => Some(TenantPhase::Pending),
        Some("Ready") => Some(TenantPhase::Ready),
        Some("Error") => Some(TenantPhase::Error),
        Some(other) => return Err(decode_error::<Tenant>(name, format!("unknown phase {other:?}"))),
    };

    let conditions = status
        .conditions
        .into_iter()
        .map(|c| {
            let last_transition_time = DateTime::parse_from_rfc3339(&c.last_transition_time)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| decode_error::<Tenant>(name, format!("condition {}: {e}", c.type_)))?;
            Ok(Condition {
                status: match c.status.as_str() {
                    "True" => ConditionStatus::True,
                    "False" => ConditionStatus::False,
                    _ => ConditionStatus::Unknown,
                },
                type_: c.type_,
                reason: c.reason,
                message: c.message,
                last_transition_time,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

    Ok(TenantStatus {
        phase,
        namespace: status.namespace,
        conditions,
    })
}

// Namespace

impl KubeMapped for Namespace {
    type Api = KubeNamespace;

    fn api(client: Client, _namespace: Option<&str>) -> Api<Self::Api> {
        Api::all(client)
    }

    fn to_kube(&self) -> Result<Self::Api, StoreError> {
        Ok(KubeNamespace {
            metadata: meta_to_kube(&self.metadata),
            ..KubeNamespace::default()
        })
    }

    fn overlay(&self, live: &mut Self::Api) -> Result<(), StoreError> {
        overlay_meta(&self.metadata, &mut live.metadata);
        Ok(())
    }

    fn from_kube(obj: Self::Api) -> Result<Self, StoreError> {
        Ok(Self {
            metadata: meta_from_kube::<Self>(obj.metadata)?,
        })
    }
}

// ResourceQuota

fn hard_to_kube(hard: &BTreeMap<String, String>) -> BTreeMap<String, KubeQuantity> {
    hard.iter()
        .map(|(k, v)| (k.clone(), KubeQuantity(v.clone())))
        .collect()
}

impl KubeMapped for ResourceQuota {
    type Api = KubeResourceQuota;

    fn api(client: Client, namespace: Option<&str>) -> Api<Self::Api> {
        scoped(client, namespace)
    }

    fn to_kube(&self) -> Result<Self::Api, StoreError> {
        Ok(KubeResourceQuota {
            metadata: meta_to_kube(&self.metadata),
            spec: Some(ResourceQuotaSpec {
                hard: Some(hard_to_kube(&self.hard)),
                ..ResourceQuotaSpec::default()
            }),
            ..KubeResourceQuota::default()
        })
    }

    fn overlay(&self, live: &mut Self::Api) -> Result<(), StoreError> {
        overlay_meta(&self.metadata, &mut live.metadata);
        live.spec.get_or_insert_with(ResourceQuotaSpec::default).hard = Some(hard_to_kube(&self.hard));
        Ok(())
    }

    fn from_kube(obj: Self::Api) -> Result<Self, StoreError> {
        Ok(Self {
            metadata: meta_from_kube::<Self>(obj.metadata)?,
            hard: obj
                .spec
                .and_then(|s| s.hard)
                .unwrap_or_default()
                .into_iter()
                .map(|(k, KubeQuantity(v))| (k, v))
                .collect(),
        })
    }
}

// NetworkPolicy
//
// The policy body goes through its JSON form so the mapping does not depend on which
// selector fields a given API version marks optional.

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSelector {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    match_labels: BTreeMap<String, String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePeer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pod_selector: Option<WireSelector>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRule {
    #[serde(default, alias = "to", skip_serializing_if = "Option::is_none")]
    from: Option<Vec<WirePeer>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePolicySpec {
    #[serde(default)]
    pod_selector: WireSelector,
    #[serde(default)]
    policy_types: Vec<String>,
    #[serde(default)]
    ingress: Vec<WireRule>,
    #[serde(default)]
    egress: Vec<WireRule>,
}

fn rules_to_wire(rules: &[PolicyRule], field: &str) -> Vec<serde_json::Value> {
    // A rule without peers would allow everything on the wire.
    rules
        .iter()
        .filter(|rule| !rule.peers.is_empty())
        .map(|rule| {
            let peers: Vec<serde_json::Value> = rule
                .peers
                .iter()
                .map(|sel| serde_json::json!({ "podSelector": { "matchLabels": sel.match_labels } }))
                .collect();
            let mut wire = serde_json::Map::new();
            wire.insert(field.to_string(), serde_json::Value::Array(peers));
            serde_json::Value::Object(wire)
        })
        .collect()
}

fn rules_from_wire(rules: Vec<WireRule>) -> Vec<PolicyRule> {
    rules
        .into_iter()
        .map(|rule| match rule.from.filter(|peers| !peers.is_empty()) {
            // No peer list means any peer.
            None => PolicyRule {
                peers: vec![PodSelector::default()],
            },
            Some(peers) => PolicyRule {
                peers: peers
                    .into_iter()
                    .map(|p| PodSelector {
                        match_labels: p.pod_selector.unwrap_or_default().match_labels,
                    })
                    .collect(),
            },
        })
        .collect()
}

fn policy_spec_to_kube(policy: &NetworkPolicy) -> Result<NetworkPolicySpec, StoreError> {
    let spec = serde_json::json!({
        "podSelector": { "matchLabels": policy.pod_selector.match_labels },
        "policyTypes": policy.policy_types.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
        "ingress": rules_to_wire(&policy.ingress, "from"),
        "egress": rules_to_wire(&policy.egress, "to"),
    });
    serde_json::from_value(spec)
        .map_err(|e| decode_error::<NetworkPolicy>(&policy.metadata.name, e.to_string()))
}

impl KubeMapped for NetworkPolicy {
    type Api = KubeNetworkPolicy;

    fn api(client: Client, namespace: Option<&str>) -> Api<Self::Api> {
        scoped(client, namespace)
    }

    fn to_kube(&self) -> Result<Self::Api, StoreError> {
        Ok(KubeNetworkPolicy {
            metadata: meta_to_kube(&self.metadata),
            spec: Some(policy_spec_to_kube(self)?),
        })
    }

    fn overlay(&self, live: &mut Self::Api) -> Result<(), StoreError> {
        overlay_meta(&self.metadata, &mut live.metadata);
        live.spec = Some(policy_spec_to_kube(self)?);
        Ok(())
    }

    fn from_kube(obj: Self::Api) -> Result<Self, StoreError> {
        let metadata = meta_from_kube::<Self>(obj.metadata)?;
        let wire: WirePolicySpec = match obj.spec {
            Some(spec) => serde_json::to_value(spec)
                .and_then(serde_json::from_value)
                .map_err(|e| decode_error::<Self>(&metadata.name, e.to_string()))?,
            None => WirePolicySpec::default(),
        };

        let policy_types = wire
            .policy_types
            .iter()
            .map(|t| match t.as_str() {
                "Ingress" => Ok(PolicyType::Ingress),
                "Egress" => Ok(PolicyType::Egress),
                other => Err(decode_error::<Self>(&metadata.name, format!("unknown policy type {other:?}"))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            pod_selector: PodSelector {
                match_labels: wire.pod_selector.match_labels,
            },
            policy_types,
            ingress: rules_from_wire(wire.ingress),
            egress: rules_from_wire(wire.egress),
            metadata,
        })
    }
}

// Secret

fn data_to_kube(data: &BTreeMap<String, Vec<u8>>) -> BTreeMap<String, ByteString> {
    data.iter()
        .map(|(k, v)| (k.clone(), ByteString(v.clone())))
        .collect()
}

impl KubeMapped for Secret {
    type Api = KubeSecret;

    fn api(client: Client, namespace: Option<&str>) -> Api<Self::Api> {
        scoped(client, namespace)
    }

    fn to_kube(&self) -> Result<Self::Api, StoreError> {
        Ok(KubeSecret {
            metadata: meta_to_kube(&self.metadata),
            data: Some(data_to_kube(&self.data)),
            type_: Some("Opaque".to_string()),
            ..KubeSecret::default()
        })
    }

    fn overlay(&self, live: &mut Self::Api) -> Result<(), StoreError> {
        overlay_meta(&self.metadata, &mut live.metadata);
        live.data = Some(data_to_kube(&self.data));
        live.string_data = None;
        Ok(())
    }

    fn from_kube(obj: Self::Api) -> Result<Self, StoreError> {
        Ok(Self {
            metadata: meta_from_kube::<Self>(obj.metadata)?,
            data: obj
                .data
                .unwrap_or_default()
                .into_iter()
                .map(|(k, ByteString(v))| (k, v))
                .collect(),
        })
    }
}

// Pod

fn container_to_kube(container: &Container) -> KubeContainer {
    KubeContainer {
        name: container.name.clone(),
        image: Some(container.image.clone()),
        ..KubeContainer::default()
    }
}

fn container_from_kube(container: KubeContainer) -> Container {
    Container {
        name: container.name,
        image: container.image.unwrap_or_default(),
    }
}

impl KubeMapped for Pod {
    type Api = KubePod;

    fn api(client: Client, namespace: Option<&str>) -> Api<Self::Api> {
        scoped(client, namespace)
    }

    fn to_kube(&self) -> Result<Self::Api, StoreError> {
        Ok(KubePod {
            metadata: meta_to_kube(&self.metadata),
            spec: Some(PodSpec {
                containers: self.containers.iter().map(container_to_kube).collect(),
                init_containers: (!self.init_containers.is_empty())
                    .then(|| self.init_containers.iter().map(container_to_kube).collect()),
                ..PodSpec::default()
            }),
            ..KubePod::default()
        })
    }

    fn overlay(&self, live: &mut Self::Api) -> Result<(), StoreError> {
        // Pod specs are immutable; only metadata is ours to change.
        overlay_meta(&self.metadata, &mut live.metadata);
        Ok(())
    }

    fn from_kube(obj: Self::Api) -> Result<Self, StoreError> {
        let spec = obj.spec.unwrap_or_default();
        Ok(Self {
            metadata: meta_from_kube::<Self>(obj.metadata)?,
            init_containers: spec
                .init_containers
                .unwrap_or_default()
                .into_iter()
                .map(container_from_kube)
                .collect(),
            containers: spec.containers.into_iter().map(container_from_kube).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Isolation, Tier};
    use crate::services::convergence::apply_default_deny;

    #[test]
    fn test_default_deny_policy_on_the_wire() {
        let mut policy = NetworkPolicy::from_meta(ObjectMeta::namespaced("tenant-acme", "default-deny"));
        apply_default_deny(&mut policy);
        // An allow rule with no peers must never reach the cluster.
        policy.ingress.push(PolicyRule::default());

        let kube = policy.to_kube().unwrap();
        let json = serde_json::to_value(&kube).unwrap();
        assert_eq!(json["spec"]["policyTypes"], serde_json::json!(["Ingress", "Egress"]));
        assert!(json["spec"]["ingress"].as_array().is_none_or(Vec::is_empty));
        assert!(json["spec"]["egress"].as_array().is_none_or(Vec::is_empty));
        assert!(json["spec"]["podSelector"]["matchLabels"]
            .as_object()
            .is_none_or(serde_json::Map::is_empty));
    }

    #[test]
    fn test_policy_round_trip_keeps_peers() {
        let mut policy = NetworkPolicy::from_meta(ObjectMeta::namespaced("tenant-acme", "web"));
        policy.policy_types = vec![PolicyType::Ingress];
        policy.ingress.push(PolicyRule {
            peers: vec![PodSelector {
                match_labels: BTreeMap::from([("app".to_string(), "web".to_string())]),
            }],
        });

        let back = NetworkPolicy::from_kube(policy.to_kube().unwrap()).unwrap();
        assert_eq!(back.ingress, policy.ingress);
        assert_eq!(back.policy_types, policy.policy_types);
    }

    #[test]
    fn test_open_wire_rule_decodes_as_match_all() {
        let kube: KubeNetworkPolicy = serde_json::from_value(serde_json::json!({
            "metadata": { "name": "open", "namespace": "ns" },
            "spec": { "podSelector": {}, "policyTypes": ["Ingress"], "ingress": [{}] }
        }))
        .unwrap();
        let policy = NetworkPolicy::from_kube(kube).unwrap();
        assert_eq!(policy.ingress[0].peers, vec![PodSelector::default()]);
    }

    #[test]
    fn test_tenant_status_round_trip() {
        let mut tenant = Tenant::new(
            "acme",
            TenantSpec {
                owners: vec!["a@x".to_string()],
                tier: Tier::Gold,
                isolation: Isolation::Namespace,
            },
        );
        tenant.status.phase = Some(TenantPhase::Ready);
        tenant.status.conditions.push(Condition {
            type_: "Ready".to_string(),
            status: ConditionStatus::True,
            reason: "Converged".to_string(),
            message: String::new(),
            last_transition_time: DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
                .unwrap()
                .with_timezone(&Utc),
        });

        let mut resource = tenant.to_kube().unwrap();
        resource.status = Some(status_to_kube(&tenant.status));
        let back = Tenant::from_kube(resource).unwrap();

        assert_eq!(back.spec, tenant.spec);
        assert_eq!(back.status, tenant.status);
    }

    #[test]
    fn test_overlay_preserves_foreign_metadata() {
        let mut live = KubeNamespace {
            metadata: KubeMeta {
                name: Some("tenant-acme".to_string()),
                annotations: Some(BTreeMap::from([("team".to_string(), "blue".to_string())])),
                ..KubeMeta::default()
            },
            ..KubeNamespace::default()
        };
        let mut ns = Namespace::from_meta(ObjectMeta::named("tenant-acme"));
        ns.metadata.labels.insert("tenant".to_string(), "acme".to_string());

        ns.overlay(&mut live).unwrap();
        assert!(live.metadata.annotations.is_some());
        assert_eq!(
            live.metadata.labels.as_ref().and_then(|l| l.get("tenant")).map(String::as_str),
            Some("acme")
        );
    }

    #[test]
    fn test_tenant_overlay_keeps_declared_spec() {
        let declared = TenantResourceSpec {
            owners: vec!["a@x".to_string()],
            tier: "basic".to_string(),
            isolation: "Namespace".to_string(),
        };
        let mut live = TenantResource::new("acme", declared.clone());
        let mut tenant = Tenant::from_kube(live.clone()).unwrap();
        tenant.metadata.labels.insert("tenant".to_string(), "acme".to_string());

        tenant.overlay(&mut live).unwrap();

        assert_eq!(live.spec, declared);
        assert_eq!(
            live.metadata.labels.as_ref().and_then(|l| l.get("tenant")).map(String::as_str),
            Some("acme")
        );
    }

    #[test]
    fn test_nameless_object_is_a_decode_error() {
        let err = Namespace::from_kube(KubeNamespace::default()).unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));
    }
}
