//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/stockpulse/config.toml)
//! 3. Environment variables (STOCKPULSE_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::ApiConfig;
use crate::job::JobConfig;
use crate::live::{LiveSyncConfig, ReconnectPolicy};

/// Environment variable prefix
const ENV_PREFIX: &str = "STOCKPULSE";

/// Longest join or idle timeout accepted (one day)
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Shortest reconnect delay accepted
pub const MIN_RECONNECT_DELAY_MS: u64 = 100;

/// Keys accepted by [`Config::set`]
pub const CONFIG_KEYS: &[&str] = &[
    "api_url",
    "push_url",
    "forecast_url",
    "topic",
    "reconnect_base_delay_ms",
    "reconnect_max_delay_ms",
    "max_retries",
    "join_timeout_secs",
    "idle_timeout_secs",
    "job_idle_timeout_secs",
    "notification_lifetime_secs",
];

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Stock REST service
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Push server WebSocket URL
    #[serde(default = "default_push_url")]
    pub push_url: String,

    /// Forecast service (retraining jobs)
    #[serde(default = "default_forecast_url")]
    pub forecast_url: String,

    /// Room joined on the push server
    #[serde(default = "default_topic")]
    pub topic: String,

    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,

    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,

    /// Retries after consecutive failures; unset retries forever
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// Seconds to wait for the snapshot after joining
    #[serde(default = "default_join_timeout_secs")]
    pub join_timeout_secs: u64,

    /// Drop the push connection after this many silent seconds
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,

    /// Fail a retraining job after this many silent seconds
    #[serde(default)]
    pub job_idle_timeout_secs: Option<u64>,

    #[serde(default = "default_notification_lifetime_secs")]
    pub notification_lifetime_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            push_url: default_push_url(),
            forecast_url: default_forecast_url(),
            topic: default_topic(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            max_retries: None,
            join_timeout_secs: default_join_timeout_secs(),
            idle_timeout_secs: None,
            job_idle_timeout_secs: None,
            notification_lifetime_secs: default_notification_lifetime_secs(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (STOCKPULSE_API_URL, STOCKPULSE_PUSH_URL, ...)
    /// 2. Config file (~/.config/stockpulse/config.toml or STOCKPULSE_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load from a path given on the command line, or the default location
    pub fn load_with_cli_override(config_path: Option<&PathBuf>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        // STOCKPULSE_API_URL
        if let Ok(val) = std::env::var(format!("{}_API_URL", ENV_PREFIX)) {
            self.api_url = val;
        }

        // STOCKPULSE_PUSH_URL
        if let Ok(val) = std::env::var(format!("{}_PUSH_URL", ENV_PREFIX)) {
            self.push_url = val;
        }

        // STOCKPULSE_FORECAST_URL
        if let Ok(val) = std::env::var(format!("{}_FORECAST_URL", ENV_PREFIX)) {
            self.forecast_url = val;
        }

        // STOCKPULSE_TOPIC
        if let Ok(val) = std::env::var(format!("{}_TOPIC", ENV_PREFIX)) {
            self.topic = val;
        }

        // STOCKPULSE_MAX_RETRIES
        if let Ok(val) = std::env::var(format!("{}_MAX_RETRIES", ENV_PREFIX)) {
            self.max_retries = parse_optional(&val)
                .with_context(|| format!("Invalid {}_MAX_RETRIES: '{}'", ENV_PREFIX, val))?;
        }

        Ok(())
    }

    /// Set a single value by key, validating it
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "api_url" => self.api_url = non_empty(key, value)?,
            "push_url" => self.push_url = non_empty(key, value)?,
            "forecast_url" => self.forecast_url = non_empty(key, value)?,
            "topic" => self.topic = non_empty(key, value)?,
            "reconnect_base_delay_ms" => {
                self.reconnect_base_delay_ms =
                    parse_in_range(key, value, MIN_RECONNECT_DELAY_MS..=u64::MAX)?
            }
            "reconnect_max_delay_ms" => {
                self.reconnect_max_delay_ms =
                    parse_in_range(key, value, MIN_RECONNECT_DELAY_MS..=u64::MAX)?
            }
            "max_retries" => {
                self.max_retries = parse_optional(value)
                    .with_context(|| format!("Invalid value for {}: '{}'", key, value))?
            }
            "join_timeout_secs" => {
                self.join_timeout_secs = parse_in_range(key, value, 1..=MAX_TIMEOUT_SECS)?
            }
            "idle_timeout_secs" => self.idle_timeout_secs = parse_optional_timeout(key, value)?,
            "job_idle_timeout_secs" => {
                self.job_idle_timeout_secs = parse_optional_timeout(key, value)?
            }
            "notification_lifetime_secs" => {
                self.notification_lifetime_secs = parse_number(key, value)?
            }
            _ => bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                CONFIG_KEYS.join(", ")
            ),
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with STOCKPULSE_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stockpulse")
            .join("config.toml")
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let base_delay =
            Duration::from_millis(self.reconnect_base_delay_ms.max(MIN_RECONNECT_DELAY_MS));
        ReconnectPolicy {
            base_delay,
            max_delay: Duration::from_millis(self.reconnect_max_delay_ms).max(base_delay),
            max_retries: self.max_retries,
        }
    }

    /// Settings for [`crate::live::LiveSyncClient`]
    pub fn live_sync_config(&self) -> LiveSyncConfig {
        LiveSyncConfig {
            url: self.push_url.clone(),
            reconnect: self.reconnect_policy(),
            join_timeout: timeout_secs(self.join_timeout_secs),
            idle_timeout: self.idle_timeout_secs.map(timeout_secs),
            notification_lifetime: Duration::from_secs(self.notification_lifetime_secs),
            ..LiveSyncConfig::default()
        }
    }

    /// Settings for [`crate::job::JobStreamReader`]
    pub fn job_config(&self) -> JobConfig {
        JobConfig {
            base_url: self.forecast_url.clone(),
            idle_timeout: self.job_idle_timeout_secs.map(timeout_secs),
            ..JobConfig::default()
        }
    }

    /// Settings for [`crate::api::InventoryApi`]
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.api_url.clone(),
            ..ApiConfig::default()
        }
    }
}

fn non_empty(key: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        bail!("{} cannot be empty", key);
    }
    Ok(value.to_string())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: '{}'", key, value))
}

fn parse_in_range(key: &str, value: &str, range: RangeInclusive<u64>) -> Result<u64> {
    let number: u64 = parse_number(key, value)?;
    if !range.contains(&number) {
        bail!(
            "{} must be between {} and {}, got {}",
            key,
            range.start(),
            range.end(),
            number
        );
    }
    Ok(number)
}

fn parse_optional_timeout(key: &str, value: &str) -> Result<Option<u64>> {
    let timeout = parse_optional(value)
        .with_context(|| format!("Invalid value for {}: '{}'", key, value))?;
    if let Some(secs) = timeout {
        if !(1..=MAX_TIMEOUT_SECS).contains(&secs) {
            bail!(
                "{} must be between 1 and {}, got {}",
                key,
                MAX_TIMEOUT_SECS,
                secs
            );
        }
    }
    Ok(timeout)
}

/// Values read from a file bypass `set`, so clamp them here too
fn timeout_secs(secs: u64) -> Duration {
    Duration::from_secs(secs.clamp(1, MAX_TIMEOUT_SECS))
}

/// Empty or "none" clears the value
fn parse_optional<T: std::str::FromStr>(value: &str) -> Result<Option<T>, T::Err> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    value.parse().map(Some)
}

fn default_api_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_push_url() -> String {
    "ws://localhost:5000/ws".to_string()
}

fn default_forecast_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_topic() -> String {
    "inventory".to_string()
}

fn default_reconnect_base_delay_ms() -> u64 {
    1000
}

fn default_reconnect_max_delay_ms() -> u64 {
    5000
}

fn default_join_timeout_secs() -> u64 {
    10
}

fn default_notification_lifetime_secs() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "STOCKPULSE_CONFIG",
        "STOCKPULSE_API_URL",
        "STOCKPULSE_PUSH_URL",
        "STOCKPULSE_FORECAST_URL",
        "STOCKPULSE_TOPIC",
        "STOCKPULSE_MAX_RETRIES",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.topic, "inventory");
        assert_eq!(config.reconnect_base_delay_ms, 1000);
        assert!(config.max_retries.is_none());
        assert!(config.idle_timeout_secs.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("STOCKPULSE_PUSH_URL", "ws://stock.example.com/ws");
        env::set_var("STOCKPULSE_TOPIC", "warehouse");
        env::set_var("STOCKPULSE_MAX_RETRIES", "3");
        config.apply_env_overrides().unwrap();

        assert_eq!(config.push_url, "ws://stock.example.com/ws");
        assert_eq!(config.topic, "warehouse");
        assert_eq!(config.max_retries, Some(3));

        // "none" clears the budget
        env::set_var("STOCKPULSE_MAX_RETRIES", "none");
        config.apply_env_overrides().unwrap();
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let _guard = EnvGuard::new(ENV_VARS);

        env::set_var("STOCKPULSE_MAX_RETRIES", "lots");
        let err = Config::load_from_str("").unwrap_err();
        assert!(err.to_string().contains("STOCKPULSE_MAX_RETRIES"));
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            api_url = "http://stock:5000"
            max_retries = 4
            idle_timeout_secs = 30
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.api_url, "http://stock:5000");
        assert_eq!(config.max_retries, Some(4));
        assert_eq!(config.idle_timeout_secs, Some(30));
        // Unset keys keep their defaults
        assert_eq!(config.forecast_url, "http://localhost:8000");
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.set("topic", "returns").unwrap();
        config.set("job_idle_timeout_secs", "120").unwrap();
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_file_path_override() {
        let _guard = EnvGuard::new(ENV_VARS);

        env::set_var("STOCKPULSE_CONFIG", "/tmp/stockpulse-test.toml");
        assert_eq!(
            Config::config_file_path(),
            PathBuf::from("/tmp/stockpulse-test.toml")
        );
    }

    #[test]
    fn test_set_validates() {
        let mut config = Config::default();

        config.set("max_retries", "2").unwrap();
        assert_eq!(config.max_retries, Some(2));
        config.set("max_retries", "").unwrap();
        assert!(config.max_retries.is_none());

        assert!(config.set("join_timeout_secs", "soon").is_err());
        assert!(config.set("join_timeout_secs", "0").is_err());
        let err = config
            .set("join_timeout_secs", "18446744073709551615")
            .unwrap_err();
        assert!(err.to_string().contains("must be between 1 and 86400"));
        config.set("join_timeout_secs", "30").unwrap();
        assert_eq!(config.join_timeout_secs, 30);

        assert!(config.set("idle_timeout_secs", "18446744073709551615").is_err());
        assert!(config.set("job_idle_timeout_secs", "0").is_err());
        config.set("idle_timeout_secs", "90").unwrap();
        assert_eq!(config.idle_timeout_secs, Some(90));
        config.set("idle_timeout_secs", "none").unwrap();
        assert!(config.idle_timeout_secs.is_none());

        assert!(config.set("reconnect_base_delay_ms", "0").is_err());
        assert!(config.set("reconnect_max_delay_ms", "5").is_err());
        config.set("reconnect_base_delay_ms", "500").unwrap();
        assert_eq!(config.reconnect_base_delay_ms, 500);
        assert!(config.set("api_url", "  ").is_err());

        let err = config.set("colour", "blue").unwrap_err();
        assert!(err.to_string().contains("Unknown configuration key"));
    }

    #[test]
    fn test_derived_configs() {
        let config = Config {
            reconnect_base_delay_ms: 250,
            reconnect_max_delay_ms: 100,
            max_retries: Some(5),
            idle_timeout_secs: Some(45),
            job_idle_timeout_secs: Some(600),
            ..Config::default()
        };

        let live = config.live_sync_config();
        assert_eq!(live.url, config.push_url);
        assert_eq!(live.reconnect.base_delay, Duration::from_millis(250));
        // Max delay never drops below the base delay
        assert_eq!(live.reconnect.max_delay, Duration::from_millis(250));
        assert_eq!(live.reconnect.max_retries, Some(5));
        assert_eq!(live.idle_timeout, Some(Duration::from_secs(45)));
        assert_eq!(live.notification_lifetime, Duration::from_secs(5));

        let job = config.job_config();
        assert_eq!(job.retrain_url(), "http://localhost:8000/retrain");
        assert_eq!(job.idle_timeout, Some(Duration::from_secs(600)));

        assert_eq!(config.api_config().base_url, "http://localhost:5000");
    }

    #[test]
    fn test_derived_configs_clamp_file_values() {
        let _guard = EnvGuard::new(ENV_VARS);
        let config = Config::load_from_str(
            r#"
reconnect_base_delay_ms = 0
reconnect_max_delay_ms = 0
join_timeout_secs = 9223372036854775807
idle_timeout_secs = 0
job_idle_timeout_secs = 9223372036854775807
"#,
        )
        .unwrap();

        let live = config.live_sync_config();
        assert_eq!(
            live.reconnect.base_delay,
            Duration::from_millis(MIN_RECONNECT_DELAY_MS)
        );
        assert_eq!(
            live.reconnect.max_delay,
            Duration::from_millis(MIN_RECONNECT_DELAY_MS)
        );
        assert_eq!(live.join_timeout, Duration::from_secs(MAX_TIMEOUT_SECS));
        assert_eq!(live.idle_timeout, Some(Duration::from_secs(1)));

        let job = config.job_config();
        assert_eq!(job.idle_timeout, Some(Duration::from_secs(MAX_TIMEOUT_SECS)));
    }
}
