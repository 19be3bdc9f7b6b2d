use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::adapters::notify::telegram::parse_chat_id;
use crate::domain::models::config::Config;
use crate::services::QuotaPolicy;

/// Project config file, merged over the defaults.
pub const CONFIG_FILE: &str = "warden.yaml";
/// Optional local overrides, merged over [`CONFIG_FILE`].
pub const LOCAL_CONFIG_FILE: &str = "warden.local.yaml";
/// Prefix of structured environment overrides (`WARDEN_SCANNER__INTERVAL_SECS`).
pub const ENV_PREFIX: &str = "WARDEN_";

pub const LEGACY_SCAN_INTERVAL: &str = "SHIELDX_SIGNATURE_SCAN_INTERVAL";
pub const LEGACY_PUB_KEY_PEM: &str = "COSIGN_PUB_KEY_PEM";
pub const LEGACY_PUB_KEY_PATH: &str = "COSIGN_PUB_KEY";
pub const LEGACY_IGNORE_TLOG: &str = "COSIGN_IGNORE_TLOG";
pub const LEGACY_TELEGRAM_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const LEGACY_TELEGRAM_CHAT: &str = "TELEGRAM_CHAT_ID";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid scanner interval_secs: {0}. Must be at least 1")]
    InvalidScanInterval(u64),

    #[error("Invalid verify_timeout_secs: {0}. Must be at least 1")]
    InvalidVerifyTimeout(u64),

    #[error("Invalid reconcile {field}: {value}. Must be at least 1")]
    InvalidRequeue { field: &'static str, value: u64 },

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid quota configuration: {0}")]
    InvalidQuota(String),

    #[error("Invalid telegram chat id: {0}")]
    InvalidChatId(String),

    #[error("cosign_binary cannot be empty")]
    EmptyCosignBinary,
}

/// A setting that was ignored while loading. Loading happens before the
/// logger is installed, so these are carried out and logged afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub variable: &'static str,
    pub value: String,
    pub message: String,
}

impl ConfigWarning {
    pub fn log(&self) {
        tracing::warn!(variable = self.variable, value = %self.value, "{}", self.message);
    }
}

/// Loaded configuration plus the warnings collected on the way.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: Config,
    pub warnings: Vec<ConfigWarning>,
}

impl LoadedConfig {
    /// Log every collected warning. Call once logging is initialized.
    pub fn log_warnings(&self) {
        for warning in &self.warnings {
            warning.log();
        }
    }
}

/// Partial config built from the legacy variable names.
#[derive(Debug)]
pub struct LegacyOverrides {
    pub values: Value,
    pub warnings: Vec<ConfigWarning>,
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the working directory and the environment.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. warden.yaml
    /// 3. warden.local.yaml (optional)
    /// 4. Legacy variables (SHIELDX_*, COSIGN_*, TELEGRAM_*)
    /// 5. WARDEN_* variables, nested with `__`
    pub fn load() -> Result<LoadedConfig> {
        Self::load_from_dir(".")
    }

    /// Same as [`ConfigLoader::load`], resolving the config files under `dir`.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<LoadedConfig> {
        let dir = dir.as_ref();
        let legacy = legacy_overrides(|key| std::env::var(key).ok());
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join(CONFIG_FILE)))
            .merge(Yaml::file(dir.join(LOCAL_CONFIG_FILE)))
            .merge(Serialized::defaults(legacy.values))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(LoadedConfig {
            config,
            warnings: legacy.warnings,
        })
    }

    /// Load configuration from a specific file, ignoring the environment.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<LoadedConfig> {
        if !path.as_ref().is_file() {
            anyhow::bail!("Config file {} does not exist", path.as_ref().display());
        }
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(LoadedConfig {
            config,
            warnings: Vec::new(),
        })
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.scanner.interval_secs == 0 {
            return Err(ConfigError::InvalidScanInterval(config.scanner.interval_secs));
        }
        if config.scanner.verify_timeout_secs == 0 {
            return Err(ConfigError::InvalidVerifyTimeout(config.scanner.verify_timeout_secs));
        }
        if config.reconcile.error_requeue_secs == 0 {
            return Err(ConfigError::InvalidRequeue {
                field: "error_requeue_secs",
                value: 0,
            });
        }
        if config.reconcile.requeue_secs == 0 {
            return Err(ConfigError::InvalidRequeue {
                field: "requeue_secs",
                value: 0,
            });
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.verifier.cosign_binary.trim().is_empty() {
            return Err(ConfigError::EmptyCosignBinary);
        }

        QuotaPolicy::new(config.quota.clone())
            .validate()
            .map_err(|e| ConfigError::InvalidQuota(e.to_string()))?;

        if let Some(chat_id) = config.notifier.telegram_chat_id.as_deref().filter(|c| !c.trim().is_empty()) {
            parse_chat_id(chat_id).map_err(|_| ConfigError::InvalidChatId(chat_id.to_string()))?;
        }

        Ok(())
    }
}

/// Read the legacy variable names through `lookup`.
///
/// An unusable scan interval is left out with a warning, so the configured
/// value stays in effect.
pub fn legacy_overrides(lookup: impl Fn(&str) -> Option<String>) -> LegacyOverrides {
    let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let mut warnings = Vec::new();

    let mut scanner = Map::new();
    if let Some(raw) = read(LEGACY_SCAN_INTERVAL) {
        let message = match parse_duration(&raw.to_lowercase()) {
            Ok(interval) if interval.as_secs() > 0 => {
                scanner.insert("interval_secs".to_string(), json!(interval.as_secs()));
                None
            }
            Ok(_) => Some("scan interval below one second; using default".to_string()),
            Err(e) => Some(format!("invalid scan interval ({e}); using default")),
        };
        if let Some(message) = message {
            warnings.push(ConfigWarning {
                variable: LEGACY_SCAN_INTERVAL,
                value: raw,
                message,
            });
        }
    }

    let mut verifier = Map::new();
    if let Some(pem) = read(LEGACY_PUB_KEY_PEM) {
        verifier.insert("public_key_pem".to_string(), json!(pem));
    }
    if let Some(path) = read(LEGACY_PUB_KEY_PATH) {
        verifier.insert("public_key_path".to_string(), json!(path));
    }
    if let Some(flag) = read(LEGACY_IGNORE_TLOG) {
        verifier.insert(
            "ignore_tlog".to_string(),
            json!(flag.eq_ignore_ascii_case("true") || flag == "1"),
        );
    }

    let mut notifier = Map::new();
    if let Some(token) = read(LEGACY_TELEGRAM_TOKEN) {
        notifier.insert("telegram_bot_token".to_string(), json!(token));
    }
    if let Some(chat) = read(LEGACY_TELEGRAM_CHAT) {
        notifier.insert("telegram_chat_id".to_string(), json!(chat));
    }

    let mut overrides = Map::new();
    for (section, values) in [("scanner", scanner), ("verifier", verifier), ("notifier", notifier)] {
        if !values.is_empty() {
            overrides.insert(section.to_string(), Value::Object(values));
        }
    }
    LegacyOverrides {
        values: Value::Object(overrides),
        warnings,
    }
}

/// Parse durations such as `90s`, `2m`, `1h30m` or `500ms`.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("Empty duration string");
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            anyhow::bail!("Expected a number in duration '{s}'");
        }
        let num: u64 = rest[..digits].parse().context("Invalid number in duration")?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let part = match unit {
            "ms" => Duration::from_millis(num),
            "s" => Duration::from_secs(num),
            "m" => Duration::from_secs(num.saturating_mul(60)),
            "h" => Duration::from_secs(num.saturating_mul(3600)),
            "" => anyhow::bail!("Duration '{s}' is missing a unit (ms, s, m, h)"),
            other => anyhow::bail!("Unknown duration unit '{other}' in '{s}'"),
        };
        total = total.saturating_add(part);
    }
    Ok(total)
}
