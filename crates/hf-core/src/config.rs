use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Env var overriding [`ApiConfig::base_url`].
pub const ENV_API_URL: &str = "HOOKFILTER_API_URL";
/// Env var overriding [`StreamConfig::url`].
pub const ENV_STREAM_URL: &str = "HOOKFILTER_STREAM_URL";

/// Client configuration loaded from `~/.hookfilter/config.toml`.
///
/// **Security**: this struct never holds passwords or tokens. Sign-in
/// credentials come from the environment through [`CredentialProvider`], and
/// access tokens only ever live in the in-memory session store.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

impl Config {
    /// Load from the default path, falling back to defaults when the file
    /// does not exist. Environment overrides are applied on top.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        let mut cfg = if path.exists() {
            Self::read(&path)?
        } else {
            Config::default()
        };
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific path (no env overrides).
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let cfg = Self::read(&path.into())?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn read(path: &PathBuf) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply `HOOKFILTER_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the environment in
    /// production, a map in tests). Empty values are ignored.
    pub fn apply_overrides_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            tracing::debug!(url = %url, "api base url overridden from environment");
            self.api.base_url = url;
        }
        if let Some(url) = lookup(ENV_STREAM_URL).filter(|v| !v.trim().is_empty()) {
            tracing::debug!(url = %url, "stream url overridden from environment");
            self.stream.url = url;
        }
    }

    /// Semantic checks that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api.validate()?;
        self.stream.validate()?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".hookfilter")
            .join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base that every API path is joined onto.
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
    /// Upper bound for any single HTTP call, renewal included.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl ApiConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "api.base_url must start with http:// or https:// (got {:?})",
                self.base_url
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "api.request_timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_api_base_url() -> String {
    "http://localhost:8080/api/v1".into()
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    format!("hookfilter-cli/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Socket endpoint; the pipe id is appended as a path segment.
    #[serde(default = "default_stream_url")]
    pub url: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Maximum number of events kept per subscription (oldest evicted).
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// Pause before the CLI re-subscribes after the socket closes.
    #[serde(default = "default_resubscribe_delay_ms")]
    pub resubscribe_delay_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: default_stream_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            buffer_capacity: default_buffer_capacity(),
            resubscribe_delay_ms: default_resubscribe_delay_ms(),
        }
    }
}

impl StreamConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(ConfigError::Validation(format!(
                "stream.url must start with ws:// or wss:// (got {:?})",
                self.url
            )));
        }
        if self.buffer_capacity == 0 {
            return Err(ConfigError::Validation(
                "stream.buffer_capacity must be greater than 0".into(),
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "stream.connect_timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_stream_url() -> String {
    "ws://localhost:8080/ws".into()
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_buffer_capacity() -> usize {
    500
}
fn default_resubscribe_delay_ms() -> u64 {
    2_000
}

// ---------------------------------------------------------------------------
// Credential provider
// ---------------------------------------------------------------------------

/// Reads sign-in credentials from environment variables on demand.
pub struct CredentialProvider;

impl CredentialProvider {
    pub const EMAIL_VAR: &'static str = "HOOKFILTER_EMAIL";
    pub const PASSWORD_VAR: &'static str = "HOOKFILTER_PASSWORD";

    pub fn email() -> Option<String> {
        Self::from_env(Self::EMAIL_VAR)
    }

    pub fn password() -> Option<String> {
        Self::from_env(Self::PASSWORD_VAR)
    }

    /// Non-empty value of `var_name`.
    pub fn from_env(var_name: &str) -> Option<String> {
        std::env::var(var_name).ok().filter(|v| !v.is_empty())
    }
}
