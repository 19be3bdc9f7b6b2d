//! Telegram Bot API notifier.
//!
//! Sends plain text (no parse mode, so messages with brackets or angle
//! brackets are never rejected by Telegram's markup parser).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::domain::models::NotifierConfig;
use crate::domain::ports::{NotifyError, Notifier};

/// Longest response body kept in an error.
const MAX_ERROR_BODY: usize = 4096;

#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    http: Client,
    endpoint: String,
    chat_id: i64,
}

impl TelegramNotifier {
    /// Build from configuration. Both the bot token and chat id are required.
    pub fn from_config(config: &NotifierConfig) -> Result<Self, NotifyError> {
        let token = config
            .telegram_bot_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| NotifyError::NotConfigured("telegram bot token is not set".to_string()))?;
        let chat_id = config
            .telegram_chat_id
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| NotifyError::NotConfigured("telegram chat id is not set".to_string()))?;
        let chat_id = parse_chat_id(chat_id)?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotifyError::NotConfigured(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: format!("{}/bot{}/sendMessage", config.api_base.trim_end_matches('/'), token),
            chat_id,
        })
    }
}

/// Chat ids are integers; group chats are negative.
pub fn parse_chat_id(raw: &str) -> Result<i64, NotifyError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|e| NotifyError::NotConfigured(format!("invalid telegram chat id {raw:?}: {e}")))
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        let chat_id = self.chat_id.to_string();
        let response = self
            .http
            .post(&self.endpoint)
            .form(&[("chat_id", chat_id.as_str()), ("text", text)])
            .send()
            .await
            .map_err(|e| NotifyError::RequestFailed(e.without_url().to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            body: body.chars().take(MAX_ERROR_BODY).collect(),
        })
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(token: Option<&str>, chat: Option<&str>) -> NotifierConfig {
        NotifierConfig {
            telegram_bot_token: token.map(str::to_string),
            telegram_chat_id: chat.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_chat_id() {
        assert_eq!(parse_chat_id("-5090601314").unwrap(), -5_090_601_314);
        assert_eq!(parse_chat_id(" 42 ").unwrap(), 42);
        assert!(parse_chat_id("@channel").is_err());
    }

    #[test]
    fn test_requires_credentials() {
        assert!(matches!(
            TelegramNotifier::from_config(&config(None, Some("1"))),
            Err(NotifyError::NotConfigured(_))
        ));
        assert!(matches!(
            TelegramNotifier::from_config(&config(Some("t"), Some("  "))),
            Err(NotifyError::NotConfigured(_))
        ));
        assert!(TelegramNotifier::from_config(&config(Some("t"), Some("-1"))).is_ok());
    }

    #[test]
    fn test_endpoint_shape() {
        let mut cfg = config(Some("123:abc"), Some("1"));
        cfg.api_base = "http://localhost:9999/".to_string();
        let notifier = TelegramNotifier::from_config(&cfg).unwrap();
        assert_eq!(notifier.endpoint, "http://localhost:9999/bot123:abc/sendMessage");
    }
}
