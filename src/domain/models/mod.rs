//! Domain models

pub mod config;
pub mod events;
pub mod meta;
pub mod quantity;
pub mod resources;
pub mod tenant;

pub use config::{
    Config, LoggingConfig, NotifierConfig, QuotaConfig, QuotaLimits, ReconcileConfig, ScannerConfig,
    VerifierConfig,
};
pub use events::WardenEvent;
pub use meta::{ObjectKey, ObjectKind, ObjectMeta, OwnerReference};
pub use quantity::Quantity;
pub use resources::{
    Container, Namespace, NetworkPolicy, Pod, PodSelector, PolicyRule, PolicyType, ResourceQuota,
    Secret, NETWORK_POLICY_NAME, OWNER_SECRET_NAME, QUOTA_NAME, TENANT_LABEL,
};
pub use tenant::{
    boundary_name, validate_tenant_name, Condition, ConditionStatus, Isolation, Tenant,
    TenantPhase, TenantSpec, TenantStatus, Tier, TENANT_API_VERSION,
};
