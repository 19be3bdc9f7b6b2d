//! Notifier that only writes to the log, used when no transport is configured.

use async_trait::async_trait;

use crate::domain::ports::{NotifyError, Notifier};

#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        tracing::info!(notification = %text, "notification");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
