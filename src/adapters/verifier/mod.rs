//! Image signature verifiers.

pub mod cosign;
pub mod static_verifier;

pub use cosign::CosignVerifier;
pub use static_verifier::StaticVerifier;

use crate::domain::ports::VerificationError;

/// Reject references that can never verify, before any backend is called.
///
/// Returns the trimmed reference.
pub fn screen_reference(image: &str) -> Result<&str, VerificationError> {
    let reference = image.trim();
    if reference.is_empty() {
        return Err(VerificationError::EmptyReference);
    }
    if reference.ends_with(".sig") && reference.contains(":sha256-") {
        return Err(VerificationError::SignatureArtifact(reference.to_string()));
    }
    if reference.contains(char::is_whitespace) {
        return Err(VerificationError::InvalidReference {
            reference: reference.to_string(),
            reason: "contains whitespace".to_string(),
        });
    }
    if reference.contains("://") {
        return Err(VerificationError::InvalidReference {
            reference: reference.to_string(),
            reason: "image references carry no URL scheme".to_string(),
        });
    }
    if reference.starts_with(['/', ':', '@']) {
        return Err(VerificationError::InvalidReference {
            reference: reference.to_string(),
            reason: "missing repository name".to_string(),
        });
    }
    Ok(reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_accepts_tags_and_digests() {
        assert_eq!(screen_reference(" nginx:1.27 ").unwrap(), "nginx:1.27");
        assert!(screen_reference("ghcr.io/acme/api@sha256:abcd").is_ok());
        assert!(screen_reference("localhost:5000/app").is_ok());
    }

    #[test]
    fn test_screen_rejects_signature_artifacts() {
        let err = screen_reference("ghcr.io/acme/api:sha256-abcd.sig").unwrap_err();
        assert!(matches!(err, VerificationError::SignatureArtifact(_)));
        // A plain tag that merely ends in .sig is still an image.
        assert!(screen_reference("acme/tool:v1.sig").is_ok());
    }

    #[test]
    fn test_screen_rejects_malformed() {
        assert!(matches!(screen_reference("   "), Err(VerificationError::EmptyReference)));
        assert!(matches!(
            screen_reference("https://ghcr.io/acme/api"),
            Err(VerificationError::InvalidReference { .. })
        ));
        assert!(matches!(
            screen_reference("acme/api latest"),
            Err(VerificationError::InvalidReference { .. })
        ));
        assert!(matches!(
            screen_reference("@sha256:abcd"),
            Err(VerificationError::InvalidReference { .. })
        ));
    }
}
