//! Quote stream configuration
//!
//! Layered, lowest precedence first: built-in defaults, an optional YAML
//! file, then `QUOTEFEED_*` environment variables. The CLI applies its flags
//! on top.

use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;
use crate::policy::ReconnectConfig;

/// Local API server used when nothing else is configured
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:4000";

/// Quote feed endpoint, relative to the API base
pub const QUOTES_PATH: &str = "/ws/quotes";

#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// HTTP(S) base address of the market-data API
    pub api_base_url: String,
    /// Update cadence requested in the subscribe message
    pub subscribe_interval_ms: u32,
    /// Bound on a single connection attempt
    pub connect_timeout: Duration,
    /// A connection silent for this long is treated as failed
    pub read_timeout: Duration,
    /// Per-observer buffer before a slow observer starts skipping quotes
    pub channel_capacity: usize,
    pub reconnect: ReconnectConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            subscribe_interval_ms: 1000,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(120),
            channel_capacity: 256,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// On-disk shape; every field is optional and overrides the default.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    api_base_url: Option<String>,
    subscribe_interval_ms: Option<u32>,
    connect_timeout_ms: Option<u64>,
    read_timeout_ms: Option<u64>,
    channel_capacity: Option<usize>,
    reconnect: Option<FileReconnectConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileReconnectConfig {
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    max_attempts: Option<u32>,
    clean_close_delay_ms: Option<u64>,
}

impl StreamConfig {
    /// Load from a YAML file layered over the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = serde_yaml::from_str(content)?;
        let mut config = Self::default();

        if let Some(v) = file.api_base_url {
            config.api_base_url = v;
        }
        if let Some(v) = file.subscribe_interval_ms {
            config.subscribe_interval_ms = v;
        }
        if let Some(v) = file.connect_timeout_ms {
            config.connect_timeout = Duration::from_millis(v);
        }
        if let Some(v) = file.read_timeout_ms {
            config.read_timeout = Duration::from_millis(v);
        }
        if let Some(v) = file.channel_capacity {
            config.channel_capacity = v;
        }
        if let Some(r) = file.reconnect {
            if let Some(v) = r.base_delay_ms {
                config.reconnect.base_delay = Duration::from_millis(v);
            }
            if let Some(v) = r.max_delay_ms {
                config.reconnect.max_delay = Duration::from_millis(v);
            }
            if let Some(v) = r.max_attempts {
                config.reconnect.max_attempts = v;
            }
            if let Some(v) = r.clean_close_delay_ms {
                config.reconnect.clean_close_delay = Duration::from_millis(v);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env()
    }

    /// Apply environment overrides
    ///
    /// - `QUOTEFEED_API_BASE_URL`
    /// - `QUOTEFEED_SUBSCRIBE_INTERVAL_MS`
    /// - `QUOTEFEED_MAX_RECONNECT_ATTEMPTS`
    pub fn with_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(v) = env::var("QUOTEFEED_API_BASE_URL") {
            if !v.trim().is_empty() {
                self.api_base_url = v;
            }
        }
        if let Some(v) = parse_env_u32("QUOTEFEED_SUBSCRIBE_INTERVAL_MS")? {
            self.subscribe_interval_ms = v;
        }
        if let Some(v) = parse_env_u32("QUOTEFEED_MAX_RECONNECT_ATTEMPTS")? {
            self.reconnect.max_attempts = v;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.subscribe_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "subscribe_interval_ms must be positive".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "channel_capacity must be positive".to_string(),
            ));
        }
        if self.read_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(ConfigError::Invalid("timeouts must be positive".to_string()));
        }
        if self.reconnect.base_delay > self.reconnect.max_delay {
            return Err(ConfigError::Invalid(format!(
                "reconnect base_delay ({:?}) exceeds max_delay ({:?})",
                self.reconnect.base_delay, self.reconnect.max_delay
            )));
        }
        self.ws_url()?;
        Ok(())
    }

    /// Derive `<ws-base>/ws/quotes` from the HTTP(S) base address
    pub fn ws_url(&self) -> Result<Url, ConfigError> {
        let trimmed = self.api_base_url.trim().trim_end_matches('/');
        let mut url = Url::parse(trimmed)?;

        let ws_scheme = match url.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => {
                return Err(ConfigError::Invalid(format!(
                    "api base URL must be http or https, got {:?}",
                    other
                )))
            }
        };
        url.set_scheme(ws_scheme).map_err(|_| {
            ConfigError::Invalid(format!("cannot derive WebSocket URL from {}", trimmed))
        })?;

        let path = format!("{}{}", url.path().trim_end_matches('/'), QUOTES_PATH);
        url.set_path(&path);
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }
}

fn parse_env_u32(name: &str) -> Result<Option<u32>, ConfigError> {
    match env::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvVar {
                name: name.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}
