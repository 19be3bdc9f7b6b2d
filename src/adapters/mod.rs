//! Infrastructure adapters for external systems.
//!
//! - `kube`: the cluster store and watch controller over the API server
//! - `memory`: an in-process cluster store for tests and dry runs
//! - `verifier`: cosign and static image verifiers
//! - `notify`: Telegram and log notifiers

pub mod kube;
pub mod memory;
pub mod notify;
pub mod verifier;
