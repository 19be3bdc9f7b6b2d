//! Notification sinks.

pub mod log;
pub mod telegram;

use std::sync::Arc;

pub use log::LogNotifier;
pub use telegram::TelegramNotifier;

use crate::domain::models::NotifierConfig;
use crate::domain::ports::{NotifyError, Notifier};

/// Telegram when credentials are configured, otherwise the log.
///
/// Credentials that are present but malformed are an error rather than a
/// silent fallback.
pub fn from_config(config: &NotifierConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    let configured = config.telegram_bot_token.as_deref().is_some_and(|t| !t.trim().is_empty())
        || config.telegram_chat_id.as_deref().is_some_and(|c| !c.trim().is_empty());
    if !configured {
        tracing::info!("no telegram credentials configured, notifications go to the log");
        return Ok(Arc::new(LogNotifier));
    }
    Ok(Arc::new(TelegramNotifier::from_config(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_falls_back_to_log() {
        let notifier = from_config(&NotifierConfig::default()).unwrap();
        assert_eq!(notifier.name(), "log");
    }

    #[test]
    fn test_half_configured_is_an_error() {
        let config = NotifierConfig {
            telegram_bot_token: Some("token".to_string()),
            ..Default::default()
        };
        assert!(from_config(&config).is_err());
    }
}
