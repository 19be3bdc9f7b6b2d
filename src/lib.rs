//! Tenant Warden - multi-tenancy control loop
//!
//! Turns declarative `Tenant` records into isolated, resource-capped,
//! network-locked tenant boundaries, and continuously evicts workloads whose
//! container images fail signature verification.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, errors and the port traits
//! - **Service Layer** (`services`): convergence, ownership linking, status
//!   projection and the enforcement scanner
//! - **Adapters** (`adapters`): Kubernetes API, in-memory store, cosign,
//!   Telegram
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tenant_warden::adapters::memory::InMemoryClusterStore;
//! use tenant_warden::services::{ConvergenceEngine, EventBus, QuotaPolicy};
//!
//! # async fn demo() -> Result<(), tenant_warden::domain::errors::DomainError> {
//! let store = Arc::new(InMemoryClusterStore::new());
//! let engine = ConvergenceEngine::new(store, QuotaPolicy::default(), Arc::new(EventBus::default()));
//! engine.reconcile("acme").await?;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{Config, LoggingConfig, Tenant, TenantPhase, TenantSpec};
pub use domain::ports::{ClusterStore, ImageVerifier, Notifier, ResourceStore};
pub use infrastructure::config::{ConfigError, ConfigLoader, LoadedConfig};
pub use services::{ConvergenceEngine, EnforcementScanner, TenantLifecycle};
