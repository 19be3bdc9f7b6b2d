//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - YAML file loading (`warden.yaml`, `warden.local.yaml`)
//! - Legacy and `WARDEN_*` environment variable overrides
//! - Configuration validation

pub mod loader;

pub use loader::{parse_duration, ConfigError, ConfigLoader, ConfigWarning, LoadedConfig};
