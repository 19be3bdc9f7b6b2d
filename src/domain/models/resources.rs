//! Child objects provisioned per tenant, plus the workloads the scanner inspects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::meta::{ObjectKind, ObjectMeta};

/// Fixed name of the per-boundary resource cap.
pub const QUOTA_NAME: &str = "tenant-quota";
/// Fixed name of the per-boundary default network policy.
pub const NETWORK_POLICY_NAME: &str = "default-deny";
/// Fixed name (and data key) of the per-boundary owner secret.
pub const OWNER_SECRET_NAME: &str = "owners";
/// Label put on every boundary, valued with the tenant name.
pub const TENANT_LABEL: &str = "tenant";

/// Isolation boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub metadata: ObjectMeta,
}

impl ObjectKind for Namespace {
    const API_VERSION: &'static str = "v1";
    const KIND: &'static str = "Namespace";
    const NAMESPACED: bool = false;

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn from_meta(meta: ObjectMeta) -> Self {
        Self { metadata: meta }
    }
}

/// Hard resource caps for one boundary. Values are quantity strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceQuota {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub hard: BTreeMap<String, String>,
}

impl ObjectKind for ResourceQuota {
    const API_VERSION: &'static str = "v1";
    const KIND: &'static str = "ResourceQuota";
    const NAMESPACED: bool = true;

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn from_meta(meta: ObjectMeta) -> Self {
        Self {
            metadata: meta,
            hard: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PolicyType {
    Ingress,
    Egress,
}

impl PolicyType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ingress => "Ingress",
            Self::Egress => "Egress",
        }
    }
}

/// Label selector restricted to exact label matches.
///
/// An empty selector matches every pod in the namespace; as the policy's
/// subject combined with no allow rules it denies all traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSelector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

impl PodSelector {
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }
}

/// Allow rule: traffic from/to pods matched by `peers`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    #[serde(default)]
    pub peers: Vec<PodSelector>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPolicy {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub pod_selector: PodSelector,
    #[serde(default)]
    pub policy_types: Vec<PolicyType>,
    #[serde(default)]
    pub ingress: Vec<PolicyRule>,
    #[serde(default)]
    pub egress: Vec<PolicyRule>,
}

impl NetworkPolicy {
    /// Whether traffic to or from the given pod labels is allowed in `direction`.
    ///
    /// Pods not selected by the policy are unaffected by it.
    pub fn allows(
        &self,
        direction: PolicyType,
        subject: &BTreeMap<String, String>,
        peer: &BTreeMap<String, String>,
    ) -> bool {
        if !self.pod_selector.matches(subject) || !self.policy_types.contains(&direction) {
            return true;
        }
        let rules = match direction {
            PolicyType::Ingress => &self.ingress,
            PolicyType::Egress => &self.egress,
        };
        rules
            .iter()
            .any(|rule| rule.peers.iter().any(|sel| sel.matches(peer)))
    }
}

impl ObjectKind for NetworkPolicy {
    const API_VERSION: &'static str = "networking.k8s.io/v1";
    const KIND: &'static str = "NetworkPolicy";
    const NAMESPACED: bool = true;

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn from_meta(meta: ObjectMeta) -> Self {
        Self {
            metadata: meta,
            ..Default::default()
        }
    }
}

/// Opaque key/value blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, Vec<u8>>,
}

impl ObjectKind for Secret {
    const API_VERSION: &'static str = "v1";
    const KIND: &'static str = "Secret";
    const NAMESPACED: bool = true;

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn from_meta(meta: ObjectMeta) -> Self {
        Self {
            metadata: meta,
            data: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub image: String,
}

impl Container {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
        }
    }
}

/// A running workload inside a boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub init_containers: Vec<Container>,
    #[serde(default)]
    pub containers: Vec<Container>,
}

impl ObjectKind for Pod {
    const API_VERSION: &'static str = "v1";
    const KIND: &'static str = "Pod";
    const NAMESPACED: bool = true;

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn from_meta(meta: ObjectMeta) -> Self {
        Self {
            metadata: meta,
            ..Default::default()
        }
    }
}
