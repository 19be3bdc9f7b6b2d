use std::time::Duration;

use thiserror::Error;

/// Desired-state store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: String },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: &'static str, key: String },

    #[error("Conflict writing {kind} {key}: {reason}")]
    Conflict {
        kind: &'static str,
        key: String,
        reason: String,
    },

    #[error("Cannot decode {kind} {key}: {reason}")]
    Decode {
        kind: &'static str,
        key: String,
        reason: String,
    },

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

/// Image signature verification errors
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("empty image reference")]
    EmptyReference,

    #[error(
        "image {0} looks like a signature artifact tag (ends with .sig); verify the real image tag or digest instead"
    )]
    SignatureArtifact(String),

    #[error("invalid image reference {reference}: {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("verifier key material unavailable: {0}")]
    KeyMaterial(String),

    #[error("transparency log unavailable: {0} (set ignore_tlog to skip log verification)")]
    TransparencyLog(String),

    #[error("signature verification failed for {reference}: {reason}")]
    SignatureInvalid { reference: String, reason: String },

    #[error("verification of {reference} timed out after {timeout:?}")]
    Timeout { reference: String, timeout: Duration },

    #[error("verifier backend error: {0}")]
    Backend(String),
}

/// Notification sink errors
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notifier is not configured: {0}")]
    NotConfigured(String),

    #[error("Notification request failed: {0}")]
    RequestFailed(String),

    #[error("Notification endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },
}
