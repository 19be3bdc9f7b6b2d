use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

/// Main configuration structure for the warden
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Enforcement scanner configuration
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Signature verifier configuration
    #[serde(default)]
    pub verifier: VerifierConfig,

    /// Notification sink configuration
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Reconcile loop configuration
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Resource caps per tier
    #[serde(default)]
    pub quota: QuotaConfig,
}

/// Enforcement scanner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScannerConfig {
    /// Seconds between scan passes
    #[serde(default = "default_scan_interval_secs")]
    pub interval_secs: u64,

    /// Upper bound for a single image verification, in seconds
    #[serde(default = "default_verify_timeout_secs")]
    pub verify_timeout_secs: u64,
}

const fn default_scan_interval_secs() -> u64 {
    20
}

const fn default_verify_timeout_secs() -> u64 {
    10
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_scan_interval_secs(),
            verify_timeout_secs: default_verify_timeout_secs(),
        }
    }
}

/// Signature verifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VerifierConfig {
    /// Path to the cosign binary
    #[serde(default = "default_cosign_binary")]
    pub cosign_binary: String,

    /// PEM-encoded public key; preferred over `public_key_path`
    #[serde(default)]
    pub public_key_pem: Option<String>,

    /// Public key file used when no PEM is provided
    #[serde(default = "default_public_key_path")]
    pub public_key_path: PathBuf,

    /// Skip transparency log verification
    #[serde(default)]
    pub ignore_tlog: bool,
}

fn default_cosign_binary() -> String {
    "cosign".to_string()
}

fn default_public_key_path() -> PathBuf {
    PathBuf::from("./cosign.pub")
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            cosign_binary: default_cosign_binary(),
            public_key_pem: None,
            public_key_path: default_public_key_path(),
            ignore_tlog: false,
        }
    }
}

/// Notification sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NotifierConfig {
    /// Telegram bot token; notifications only go to the log when unset
    #[serde(default)]
    pub telegram_bot_token: Option<String>,

    /// Telegram chat id (integer, may be negative for groups)
    #[serde(default, deserialize_with = "chat_id_text")]
    pub telegram_chat_id: Option<String>,

    /// Telegram API base URL
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,

    /// HTTP timeout in seconds
    #[serde(default = "default_notify_timeout_secs")]
    pub timeout_secs: u64,
}

/// Accept the chat id as text or as a bare number.
fn chat_id_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(text) => text,
        Raw::Number(n) => n.to_string(),
    }))
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

const fn default_notify_timeout_secs() -> u64 {
    5
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: None,
            telegram_chat_id: None,
            api_base: default_telegram_api_base(),
            timeout_secs: default_notify_timeout_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Reconcile loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReconcileConfig {
    /// Delay before retrying a failed reconcile, in seconds
    #[serde(default = "default_error_requeue_secs")]
    pub error_requeue_secs: u64,

    /// Delay before re-running a reconcile that asked to be requeued
    #[serde(default = "default_requeue_secs")]
    pub requeue_secs: u64,
}

const fn default_error_requeue_secs() -> u64 {
    5
}

const fn default_requeue_secs() -> u64 {
    1
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            error_requeue_secs: default_error_requeue_secs(),
            requeue_secs: default_requeue_secs(),
        }
    }
}

/// Hard caps applied to one tier. Every value is a quantity string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QuotaLimits {
    pub limits_cpu: String,
    pub limits_memory: String,
    pub requests_cpu: String,
    pub requests_memory: String,
    pub requests_storage: String,
    pub pods: String,
}

impl QuotaLimits {
    fn new(
        limits_cpu: &str,
        limits_memory: &str,
        requests_cpu: &str,
        requests_memory: &str,
        requests_storage: &str,
        pods: &str,
    ) -> Self {
        Self {
            limits_cpu: limits_cpu.to_string(),
            limits_memory: limits_memory.to_string(),
            requests_cpu: requests_cpu.to_string(),
            requests_memory: requests_memory.to_string(),
            requests_storage: requests_storage.to_string(),
            pods: pods.to_string(),
        }
    }

    pub fn bronze() -> Self {
        Self::new("1", "1Gi", "500m", "512Mi", "5Gi", "10")
    }

    pub fn silver() -> Self {
        Self::new("4", "8Gi", "2", "4Gi", "20Gi", "20")
    }

    pub fn gold() -> Self {
        Self::new("16", "32Gi", "8", "16Gi", "100Gi", "50")
    }
}

/// Resource caps per tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QuotaConfig {
    #[serde(default = "QuotaLimits::bronze")]
    pub bronze: QuotaLimits,
    #[serde(default = "QuotaLimits::silver")]
    pub silver: QuotaLimits,
    #[serde(default = "QuotaLimits::gold")]
    pub gold: QuotaLimits,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            bronze: QuotaLimits::bronze(),
            silver: QuotaLimits::silver(),
            gold: QuotaLimits::gold(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_id_accepts_numbers() {
        let config: NotifierConfig = serde_yaml::from_str("telegram_chat_id: -5090601314\n").unwrap();
        assert_eq!(config.telegram_chat_id.as_deref(), Some("-5090601314"));

        let config: NotifierConfig = serde_yaml::from_str("telegram_chat_id: '42'\n").unwrap();
        assert_eq!(config.telegram_chat_id.as_deref(), Some("42"));

        let config: NotifierConfig = serde_yaml::from_str("api_base: http://x\n").unwrap();
        assert!(config.telegram_chat_id.is_none());
    }
}
