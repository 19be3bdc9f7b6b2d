//! Verifier with a fixed verdict per image, for tests and dry runs.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::ports::{ImageVerifier, VerificationError};

use super::screen_reference;

/// Allows or denies images from fixed lists; unlisted images get the default.
#[derive(Debug, Default)]
pub struct StaticVerifier {
    allow_unlisted: bool,
    allowed: HashSet<String>,
    denied: HashSet<String>,
    delay: Option<Duration>,
    calls: AtomicU64,
    seen: Mutex<Vec<String>>,
}

impl StaticVerifier {
    /// Every image passes unless denied.
    pub fn allow_all() -> Self {
        Self {
            allow_unlisted: true,
            ..Default::default()
        }
    }

    /// Every image fails unless allowed.
    pub fn deny_all() -> Self {
        Self::default()
    }

    pub fn allow(mut self, image: impl Into<String>) -> Self {
        self.allowed.insert(image.into());
        self
    }

    pub fn deny(mut self, image: impl Into<String>) -> Self {
        self.denied.insert(image.into());
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of verify calls so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// References verified so far, in call order.
    pub fn seen(&self) -> Vec<String> {
        self.seen
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ImageVerifier for StaticVerifier {
    async fn verify(&self, image: &str) -> Result<(), VerificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(image.to_string());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reference = screen_reference(image)?;
        let passes = if self.denied.contains(reference) {
            false
        } else {
            self.allowed.contains(reference) || self.allow_unlisted
        };
        if passes {
            Ok(())
        } else {
            Err(VerificationError::SignatureInvalid {
                reference: reference.to_string(),
                reason: "no matching signatures".to_string(),
            })
        }
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lists_override_default() {
        let verifier = StaticVerifier::allow_all().deny("evil:1");
        assert!(verifier.verify("nginx:1").await.is_ok());
        assert!(verifier.verify("evil:1").await.is_err());

        let verifier = StaticVerifier::deny_all().allow("signed:1");
        assert!(verifier.verify("signed:1").await.is_ok());
        assert!(verifier.verify("nginx:1").await.is_err());
        assert_eq!(verifier.calls(), 2);
        assert_eq!(verifier.seen(), vec!["signed:1", "nginx:1"]);
    }

    #[tokio::test]
    async fn test_screening_still_applies() {
        let verifier = StaticVerifier::allow_all();
        assert!(matches!(
            verifier.verify("repo:sha256-abc.sig").await,
            Err(VerificationError::SignatureArtifact(_))
        ));
    }
}
