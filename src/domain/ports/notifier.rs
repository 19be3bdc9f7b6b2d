use async_trait::async_trait;

use crate::domain::ports::errors::NotifyError;

/// Best-effort notification sink
///
/// Callers only log failures; a notifier must never gate control-loop work.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a plain-text message
    async fn notify(&self, text: &str) -> Result<(), NotifyError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}
