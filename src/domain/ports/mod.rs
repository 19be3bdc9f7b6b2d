//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that infrastructure adapters must implement:
//! - ClusterStore: typed CRUD over tenants, boundaries, child objects and workloads
//! - ImageVerifier: image signature verification
//! - Notifier: best-effort notification delivery
//!
//! These traits keep the control loop independent of the cluster API client,
//! the signature tooling and the notification transport.

pub mod cluster_store;
pub mod errors;
pub mod image_verifier;
pub mod notifier;

pub use cluster_store::{ClusterStore, DeleteOptions, ResourceStore, StoreResult};
pub use errors::{NotifyError, StoreError, VerificationError};
pub use image_verifier::ImageVerifier;
pub use notifier::Notifier;
