//! Client configuration.
//!
//! ```rust,no_run
//! use aip_sdk::ClientConfig;
//!
//! # fn example() -> Result<(), aip_sdk::ConfigError> {
//! let config = ClientConfig::from_env()?;
//! let custom = ClientConfig::new("https://aip.example.com/api", "sk-test")?
//!     .with_timeout(std::time::Duration::from_secs(10));
//! # Ok(())
//! # }
//! ```

pub mod env;

pub use env::EnvSource;

use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::client::{RetryConfig, StreamFraming};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur while assembling a [`ClientConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required key not set
    #[error("{key} is not set")]
    Missing { key: String },

    /// Value present but unusable
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Connection settings shared by every request a client makes.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL; resource paths are appended to it.
    pub api_url: Url,
    pub api_key: SecretString,
    /// Per-request timeout. Streaming runs use their own deadline instead.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryConfig,
    pub framing: StreamFraming,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn new(api_url: &str, api_key: impl Into<String>) -> ConfigResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "api_key".into(),
            });
        }

        Ok(Self {
            api_url: parse_api_url(api_url)?,
            api_key: SecretString::from(api_key),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            retry: RetryConfig::default(),
            framing: StreamFraming::default(),
            user_agent: default_user_agent(),
        })
    }

    /// Reads `AIP_API_URL`, `AIP_API_KEY`, and optionally `AIP_TIMEOUT`
    /// (seconds) and `AIP_MAX_RETRIES`.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_source(&EnvSource::new())
    }

    pub fn from_source(source: &EnvSource) -> ConfigResult<Self> {
        let url = source.require("api.url")?;
        let key = source.require("api.key")?;
        let mut config = Self::new(&url, key)?;

        if let Some(secs) = source.parse::<f64>("timeout")? {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    key: source.env_key("timeout"),
                    message: "must be a positive number of seconds".into(),
                });
            }
            config.timeout = Duration::from_secs_f64(secs);
        }
        if let Some(attempts) = source.parse::<u32>("max.retries")? {
            config.retry.max_attempts = attempts.max(1);
        }

        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_framing(mut self, framing: StreamFraming) -> Self {
        self.framing = framing;
        self
    }

    /// Absolute URL for a resource path such as `agents/{id}`.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

pub fn default_user_agent() -> String {
    format!("aip-sdk/{}", env!("CARGO_PKG_VERSION"))
}

fn parse_api_url(raw: &str) -> ConfigResult<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidValue {
        key: "api_url".into(),
        message: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidValue {
            key: "api_url".into(),
            message: format!("unsupported scheme '{}'", other),
        }),
    }
}
