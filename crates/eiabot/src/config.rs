//! Application configuration.
//!
//! Layering, lowest first: built-in defaults, the TOML file, the deployment's
//! legacy variables (`EIAKEY`, `EIABOT_TGKEY`, `EIABOT_TGCHAT`,
//! `EIABOT_TABLE`), then `EIABOT__SECTION__KEY` overrides.

use crate::error::{AppError, AppResult};
use eiabot_core::ReportKind;
use eiabot_detector::DetectorConfig;
use eiabot_report::FetchOptions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file used when neither `--config` nor `EIABOT_CONFIG` is set.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Prefix of structured environment overrides (`EIABOT__UPSTREAM__API_KEY`).
const ENV_PREFIX: &str = "EIABOT";
const ENV_SEPARATOR: &str = "__";

/// EIA API settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Query the retired v1 `series/` API instead of v2.
    #[serde(default)]
    pub legacy_series_api: bool,
    /// Points requested per weekly stocks series.
    #[serde(default = "default_stocks_lookback")]
    pub stocks_lookback: usize,
    /// Points requested per daily futures series.
    #[serde(default = "default_futures_lookback")]
    pub futures_lookback: usize,
}

fn default_base_url() -> String {
    "https://api.eia.gov".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_stocks_lookback() -> usize {
    4
}

fn default_futures_lookback() -> usize {
    6
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            legacy_series_api: self.legacy_series_api,
            stocks_lookback: self.stocks_lookback,
            futures_lookback: self.futures_lookback,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
            legacy_series_api: false,
            stocks_lookback: default_stocks_lookback(),
            futures_lookback: default_futures_lookback(),
        }
    }
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("timeout_secs", &self.timeout_secs)
            .field("legacy_series_api", &self.legacy_series_api)
            .field("stocks_lookback", &self.stocks_lookback)
            .field("futures_lookback", &self.futures_lookback)
            .finish()
    }
}

/// Telegram Bot API settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub bot_token: String,
    /// Channel id (`-100…`) or `@channelname`.
    #[serde(default)]
    pub chat_id: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_disable_web_page_preview")]
    pub disable_web_page_preview: bool,
}

fn default_api_base() -> String {
    eiabot_notify::DEFAULT_API_BASE.to_string()
}

fn default_disable_web_page_preview() -> bool {
    true
}

impl TelegramConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            bot_token: String::new(),
            chat_id: String::new(),
            timeout_secs: default_timeout_secs(),
            disable_web_page_preview: default_disable_web_page_preview(),
        }
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_base", &self.api_base)
            .field("bot_token", &redact(&self.bot_token))
            .field("chat_id", &self.chat_id)
            .field("timeout_secs", &self.timeout_secs)
            .field("disable_web_page_preview", &self.disable_web_page_preview)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

/// Posting log storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite file. Parent directories are created on startup.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/eiabot.sqlite3")
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl StoreConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default)]
    pub log_level: Option<String>,
    /// node-exporter textfile written at the end of each invocation.
    #[serde(default)]
    pub metrics_textfile: Option<PathBuf>,
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub dedup: DetectorConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Report produced when `--report` is not given.
    #[serde(default)]
    pub default_report: ReportKind,
    /// File the settings were read from; `None` when it did not exist.
    #[serde(skip)]
    pub source_file: Option<PathBuf>,
}

impl AppConfig {
    /// Resolve the config path: CLI argument > `EIABOT_CONFIG` > default.
    pub fn resolve_path(cli: Option<&str>) -> PathBuf {
        cli.map(str::to_string)
            .or_else(|| std::env::var("EIABOT_CONFIG").ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
            .into()
    }

    /// Load from `path` and the process environment. A missing file means
    /// defaults plus environment, and `source_file` stays `None`.
    ///
    /// Runs before logging is initialized, so it does not log.
    pub fn load(path: &Path) -> AppResult<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path.to_path_buf())
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?;

        let mut config: AppConfig = settings.try_deserialize()?;
        config.source_file = path.is_file().then(|| path.to_path_buf());
        config.apply_legacy_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Parse a TOML document, no environment.
    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Fill settings from the deployment's original variables.
    ///
    /// A structured `EIABOT__…` override of the same setting wins.
    pub fn apply_legacy_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let legacy = |name: &str, structured: &str| -> Option<String> {
            if lookup(structured).is_some() {
                return None;
            }
            lookup(name).filter(|v| !v.trim().is_empty())
        };

        if let Some(key) = legacy("EIAKEY", "EIABOT__UPSTREAM__API_KEY") {
            self.upstream.api_key = key;
        }
        if let Some(token) = legacy("EIABOT_TGKEY", "EIABOT__TELEGRAM__BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(chat) = legacy("EIABOT_TGCHAT", "EIABOT__TELEGRAM__CHAT_ID") {
            self.telegram.chat_id = chat;
        }
        if let Some(table) = legacy("EIABOT_TABLE", "EIABOT__STORE__PATH") {
            self.store.path = PathBuf::from(table);
        }
    }

    /// Checks needed before talking to the EIA API.
    pub fn validate_upstream(&self) -> AppResult<()> {
        if self.upstream.api_key.trim().is_empty() {
            return Err(AppError::Config(
                "upstream.api_key is not set (EIAKEY or EIABOT__UPSTREAM__API_KEY)".to_string(),
            ));
        }
        if self.upstream.base_url.trim().is_empty() {
            return Err(AppError::Config("upstream.base_url is empty".to_string()));
        }
        if self.upstream.timeout_secs == 0 {
            return Err(AppError::Config("upstream.timeout_secs must be > 0".to_string()));
        }
        Ok(())
    }

    /// Checks needed before posting to Telegram.
    pub fn validate_telegram(&self) -> AppResult<()> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(AppError::Config(
                "telegram.bot_token is not set (EIABOT_TGKEY or EIABOT__TELEGRAM__BOT_TOKEN)"
                    .to_string(),
            ));
        }
        if self.telegram.chat_id.trim().is_empty() {
            return Err(AppError::Config(
                "telegram.chat_id is not set (EIABOT_TGCHAT or EIABOT__TELEGRAM__CHAT_ID)"
                    .to_string(),
            ));
        }
        if self.telegram.timeout_secs == 0 {
            return Err(AppError::Config("telegram.timeout_secs must be > 0".to_string()));
        }
        Ok(())
    }

    /// Full check for `run`.
    pub fn validate(&self) -> AppResult<()> {
        self.validate_upstream()?;
        self.validate_telegram()?;
        if self.dedup.reservation_ttl_secs == 0 {
            return Err(AppError::Config(
                "dedup.reservation_ttl_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eiabot_detector::DedupMode;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.upstream.base_url, "https://api.eia.gov");
        assert_eq!(config.upstream.timeout(), Duration::from_secs(10));
        assert_eq!(config.telegram.api_base, "https://api.telegram.org");
        assert!(config.telegram.disable_web_page_preview);
        assert_eq!(config.store.busy_timeout(), Duration::from_secs(5));
        assert_eq!(config.dedup.mode, DedupMode::ConditionalInsert);
        assert_eq!(config.default_report, ReportKind::CrudeStocks);
    }

    #[test]
    fn test_parse_toml() {
        let config = AppConfig::from_toml(
            r#"
            default_report = "futures"

            [upstream]
            api_key = "k"
            legacy_series_api = true

            [telegram]
            bot_token = "t"
            chat_id = "-100123"

            [dedup]
            mode = "reserve_then_finalize"
            reservation_ttl_secs = 120

            [telemetry]
            metrics_textfile = "/var/lib/node_exporter/eiabot.prom"
            "#,
        )
        .unwrap();

        assert_eq!(config.default_report, ReportKind::Futures);
        assert!(config.upstream.fetch_options().legacy_series_api);
        assert_eq!(config.upstream.futures_lookback, 6);
        assert_eq!(config.dedup.mode, DedupMode::ReserveThenFinalize);
        assert_eq!(config.dedup.reservation_ttl(), Duration::from_secs(120));
        assert!(config.telemetry.metrics_textfile.is_some());
        config.validate().unwrap();
    }

    #[test]
    fn test_legacy_env() {
        let mut config = AppConfig::default();
        config.apply_legacy_env(env(&[
            ("EIAKEY", "eia-key"),
            ("EIABOT_TGKEY", "123:abc"),
            ("EIABOT_TGCHAT", "@energy"),
            ("EIABOT_TABLE", "/tmp/postings.sqlite3"),
        ]));

        assert_eq!(config.upstream.api_key, "eia-key");
        assert_eq!(config.telegram.bot_token, "123:abc");
        assert_eq!(config.telegram.chat_id, "@energy");
        assert_eq!(config.store.path, PathBuf::from("/tmp/postings.sqlite3"));
        config.validate().unwrap();
    }

    #[test]
    fn test_structured_override_beats_legacy() {
        let mut config = AppConfig::default();
        config.upstream.api_key = "from-structured".to_string();
        config.apply_legacy_env(env(&[
            ("EIAKEY", "legacy"),
            ("EIABOT__UPSTREAM__API_KEY", "from-structured"),
        ]));
        assert_eq!(config.upstream.api_key, "from-structured");
    }

    #[test]
    fn test_validate_rejects_missing_secrets() {
        let config = AppConfig::default();
        assert!(matches!(config.validate_upstream(), Err(AppError::Config(msg)) if msg.contains("api_key")));

        let mut config = AppConfig::default();
        config.upstream.api_key = "k".to_string();
        config.validate_upstream().unwrap();
        assert!(matches!(config.validate(), Err(AppError::Config(msg)) if msg.contains("bot_token")));

        config.telegram.bot_token = "t".to_string();
        assert!(matches!(config.validate(), Err(AppError::Config(msg)) if msg.contains("chat_id")));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = AppConfig::default();
        config.upstream.api_key = "super-secret-key".to_string();
        config.telegram.bot_token = "123:super-secret-token".to_string();
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.store.busy_timeout_ms, 5_000);
        assert_eq!(config.source_file, None);
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eiabot.toml");
        std::fs::write(&path, "[store]\nbusy_timeout_ms = 250\n").unwrap();
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.store.busy_timeout(), Duration::from_millis(250));
        assert_eq!(config.source_file.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_load_malformed_file_is_config_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[store\nbusy_timeout_ms = \n").unwrap();
        let err = AppConfig::load(&path).unwrap_err();
        assert!(matches!(err, AppError::ConfigSource(_)));
        assert_eq!(err.outcome_label(), "config_error");
    }
}
