use async_trait::async_trait;

use crate::domain::ports::errors::VerificationError;

/// Port for image signature verification
///
/// Any `Err` means the image must be treated as non-compliant.
#[async_trait]
pub trait ImageVerifier: Send + Sync {
    /// Verify the signature of one image reference
    async fn verify(&self, image: &str) -> Result<(), VerificationError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}
