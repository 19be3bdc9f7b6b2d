//! Tenant root entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::meta::{ObjectKind, ObjectMeta};
use crate::domain::errors::DomainError;

/// API group/version of the tenant resource.
pub const TENANT_API_VERSION: &str = "platform.shieldx.io/v1alpha1";

/// Prefix of every isolation boundary name.
pub const BOUNDARY_PREFIX: &str = "tenant-";

/// Longest name the store accepts for a namespace.
const MAX_LABEL_LEN: usize = 63;

/// Service tier. Only drives resource cap selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
    /// Any other label, kept verbatim.
    Custom(String),
}

impl Tier {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Gold => "gold",
            Self::Custom(s) => s,
        }
    }
}

impl Default for Tier {
    fn default() -> Self {
        Self::Bronze
    }
}

impl From<String> for Tier {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "bronze" | "basic" | "" => Self::Bronze,
            "silver" => Self::Silver,
            "gold" => Self::Gold,
            _ => Self::Custom(value),
        }
    }
}

impl From<&str> for Tier {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<Tier> for String {
    fn from(value: Tier) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Isolation mode requested by the tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Isolation {
    /// Per-tenant namespace; the only mode with enforcement semantics.
    Namespace,
    /// A mode the controller does not enforce (e.g. `cluster`).
    Other(String),
}

impl Isolation {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Namespace => "namespace",
            Self::Other(s) => s,
        }
    }

    pub fn is_namespace(&self) -> bool {
        matches!(self, Self::Namespace)
    }
}

impl Default for Isolation {
    fn default() -> Self {
        Self::Namespace
    }
}

impl From<String> for Isolation {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case("namespace") {
            Self::Namespace
        } else {
            Self::Other(value)
        }
    }
}

impl From<&str> for Isolation {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<Isolation> for String {
    fn from(value: Isolation) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for Isolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Declared state of a tenant, written by its owners.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSpec {
    /// Owner identities (email, OIDC subject or group). Never empty.
    pub owners: Vec<String>,
    #[serde(default)]
    pub tier: Tier,
    #[serde(default)]
    pub isolation: Isolation,
}

/// High-level summary of the tenant state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TenantPhase {
    Pending,
    Ready,
    Error,
}

impl std::fmt::Display for TenantPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Ready => write!(f, "Ready"),
            Self::Error => write!(f, "Error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// One observed aspect of the tenant. Unique by `type` within a status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    #[serde(default)]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

/// Observed state, written only by the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<TenantPhase>,
    /// Realized isolation boundary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl TenantStatus {
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub metadata: ObjectMeta,
    pub spec: TenantSpec,
    #[serde(default)]
    pub status: TenantStatus,
}

impl Tenant {
    pub fn new(name: impl Into<String>, spec: TenantSpec) -> Self {
        Self {
            metadata: ObjectMeta::named(name),
            spec,
            status: TenantStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Name of this tenant's isolation boundary.
    pub fn boundary_name(&self) -> String {
        boundary_name(&self.metadata.name)
    }

    /// Check the declared state before it is written to the store.
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_tenant_name(&self.metadata.name)?;
        let owners: Vec<&String> = self
            .spec
            .owners
            .iter()
            .filter(|o| !o.trim().is_empty())
            .collect();
        if owners.is_empty() {
            return Err(DomainError::InvalidTenant(format!(
                "tenant '{}' must declare at least one owner",
                self.metadata.name
            )));
        }
        Ok(())
    }
}

impl ObjectKind for Tenant {
    const API_VERSION: &'static str = TENANT_API_VERSION;
    const KIND: &'static str = "Tenant";
    const NAMESPACED: bool = false;

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn from_meta(meta: ObjectMeta) -> Self {
        Self {
            metadata: meta,
            spec: TenantSpec::default(),
            status: TenantStatus::default(),
        }
    }
}

/// Boundary name is a pure function of the tenant name.
pub fn boundary_name(tenant: &str) -> String {
    format!("{BOUNDARY_PREFIX}{tenant}")
}

/// Tenant names must be DNS labels and leave room for the boundary prefix.
pub fn validate_tenant_name(name: &str) -> Result<(), DomainError> {
    let invalid = |why: &str| -> Result<(), DomainError> {
        Err(DomainError::InvalidTenant(format!("invalid tenant name '{name}': {why}")))
    };

    if name.is_empty() {
        return invalid("name cannot be empty");
    }
    if name.len() + BOUNDARY_PREFIX.len() > MAX_LABEL_LEN {
        return invalid("name too long for its namespace");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return invalid("only lowercase letters, digits and '-' are allowed");
    }
    if name.starts_with('-') || name.ends_with('-') {
        return invalid("must start and end with an alphanumeric character");
    }
    Ok(())
}
