//! Domain layer for the tenant control loop
//!
//! This module contains the object model, error types and port traits.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
