//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! API keys are loaded from the GEMINI_API_KEYS env var or api_keys_file,
//! never stored in the TOML directly to avoid leaking secrets.

use common::Secret;
use key_pool::Limits;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Env var holding comma-separated API keys.
const API_KEYS_ENV: &str = "GEMINI_API_KEYS";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    /// Resolved from env or `upstream.api_keys_file`, in configured order
    #[serde(skip)]
    pub api_keys: Vec<Secret<String>>,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Upstream model endpoint
#[derive(Debug, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Per-attempt timeout
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Path to a file with one API key per line (alternative to GEMINI_API_KEYS)
    #[serde(default)]
    pub api_keys_file: Option<PathBuf>,
}

/// Daily quota and admission settings
#[derive(Debug, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u64,
    #[serde(default = "default_threshold_percent")]
    pub threshold_percent: u8,
    #[serde(default = "default_per_minute_cap")]
    pub per_minute_cap: u64,
    /// IANA name of the timezone whose calendar day is the quota period
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_cooldown_margin")]
    pub cooldown_margin_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_timeout(),
            api_keys_file: None,
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            threshold_percent: default_threshold_percent(),
            per_minute_cap: default_per_minute_cap(),
            timezone: default_timezone(),
            cooldown_margin_secs: default_cooldown_margin(),
        }
    }
}

fn default_max_connections() -> usize {
    1000
}

fn default_base_url() -> String {
    upstream::gemini::DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_daily_limit() -> u64 {
    1000
}

fn default_threshold_percent() -> u8 {
    95
}

fn default_per_minute_cap() -> u64 {
    60
}

fn default_timezone() -> String {
    "America/Los_Angeles".to_string()
}

fn default_cooldown_margin() -> u64 {
    3600
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// API key resolution order:
    /// 1. GEMINI_API_KEYS env var
    /// 2. api_keys_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.upstream.base_url.starts_with("http://")
            && !config.upstream.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.upstream.base_url
            )));
        }

        if config.upstream.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if config.quota.daily_limit == 0 {
            return Err(common::Error::Config(
                "daily_limit must be greater than 0".into(),
            ));
        }

        if config.quota.threshold_percent > 100 {
            return Err(common::Error::Config(format!(
                "threshold_percent must be between 0 and 100, got: {}",
                config.quota.threshold_percent
            )));
        }

        if config.quota.per_minute_cap == 0 {
            return Err(common::Error::Config(
                "per_minute_cap must be greater than 0".into(),
            ));
        }

        // Fail at startup, not on the first request
        config.quota.timezone()?;

        // Resolve API keys: env var takes precedence over file
        if let Ok(raw) = std::env::var(API_KEYS_ENV) {
            config.api_keys = Secret::parse_list(&raw);
        } else if let Some(ref keys_file) = config.upstream.api_keys_file {
            let raw = std::fs::read_to_string(keys_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read api_keys_file {}: {e}",
                    keys_file.display()
                ))
            })?;
            config.api_keys = Secret::parse_list(&raw);
        }

        if config.api_keys.is_empty() {
            return Err(common::Error::Config(format!(
                "no API keys configured: set {API_KEYS_ENV} or upstream.api_keys_file"
            )));
        }

        Ok(config)
    }

    /// Gateway limits derived from the `[quota]` and `[upstream]` sections.
    pub fn limits(&self) -> common::Result<Limits> {
        Ok(Limits {
            daily_limit: self.quota.daily_limit,
            threshold_percent: self.quota.threshold_percent,
            per_minute_cap: self.quota.per_minute_cap,
            timezone: self.quota.timezone()?,
            cooldown_margin: Duration::from_secs(self.quota.cooldown_margin_secs),
            attempt_timeout: Duration::from_secs(self.upstream.timeout_secs),
        })
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("quota-gateway.toml")
    }
}

impl QuotaConfig {
    pub fn timezone(&self) -> common::Result<chrono_tz::Tz> {
        self.timezone
            .parse()
            .map_err(|_| common::Error::Timezone(self.timezone.clone()))
    }
}
