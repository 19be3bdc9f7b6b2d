//! Domain errors for the tenant control loop.

use thiserror::Error;

use super::ports::errors::{StoreError, VerificationError};

/// Domain-level errors that can occur while converging or enforcing tenants.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid tenant: {0}")]
    InvalidTenant(String),

    #[error("Invalid quantity: {0:?}")]
    InvalidQuantity(String),

    #[error("{kind} {key} is already controlled by {owner}")]
    AlreadyOwned {
        kind: &'static str,
        key: String,
        owner: String,
    },

    #[error("Owner {0} has no uid yet; it must be persisted before it can own objects")]
    OwnerWithoutUid(String),

    #[error("Verification error: {0}")]
    Verification(#[from] VerificationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Write conflicts are retried by requeueing the whole reconcile.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_conflict())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
