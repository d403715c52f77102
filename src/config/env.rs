//! Environment variable lookup for client configuration.
//!
//! Keys are written in dotted lowercase (`api.url`) and resolved against an
//! upper-case prefixed variable name (`AIP_API_URL`).

use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

use super::{ConfigError, ConfigResult};

pub const DEFAULT_PREFIX: &str = "AIP_";

/// Read-only view over process environment variables, or over a fixed map.
#[derive(Debug, Clone)]
pub struct EnvSource {
    prefix: String,
    fixed: Option<HashMap<String, String>>,
}

impl EnvSource {
    pub fn new() -> Self {
        Self::prefixed(DEFAULT_PREFIX)
    }

    pub fn prefixed(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            fixed: None,
        }
    }

    /// Resolve keys from `vars` instead of the process environment.
    ///
    /// `vars` is keyed by full variable name, e.g. `AIP_API_URL`.
    pub fn from_map<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            fixed: Some(
                vars.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    pub fn env_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.to_uppercase().replace('.', "_"))
    }

    /// Blank values are treated as unset.
    pub fn get(&self, key: &str) -> ConfigResult<Option<String>> {
        let env_key = self.env_key(key);
        let value = match &self.fixed {
            Some(vars) => vars.get(&env_key).cloned(),
            None => match std::env::var(&env_key) {
                Ok(value) => Some(value),
                Err(std::env::VarError::NotPresent) => None,
                Err(e) => {
                    return Err(ConfigError::InvalidValue {
                        key: env_key,
                        message: e.to_string(),
                    });
                }
            },
        };
        Ok(value.filter(|v| !v.trim().is_empty()))
    }

    pub fn require(&self, key: &str) -> ConfigResult<String> {
        self.get(key)?.ok_or_else(|| ConfigError::Missing {
            key: self.env_key(key),
        })
    }

    pub fn parse<T>(&self, key: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key)? {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|e: T::Err| ConfigError::InvalidValue {
                    key: self.env_key(key),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_key() {
        let source = EnvSource::new();
        assert_eq!(source.env_key("api.url"), "AIP_API_URL");
        assert_eq!(source.env_key("timeout"), "AIP_TIMEOUT");

        let custom = EnvSource::prefixed("MYAPP_");
        assert_eq!(custom.env_key("api.key"), "MYAPP_API_KEY");
    }

    #[test]
    fn test_blank_is_unset() {
        let source = EnvSource::from_map([("AIP_API_KEY", "  ")]);
        assert_eq!(source.get("api.key").unwrap(), None);
        assert!(matches!(
            source.require("api.key"),
            Err(ConfigError::Missing { key }) if key == "AIP_API_KEY"
        ));
    }

    #[test]
    fn test_parse() {
        let source = EnvSource::from_map([("AIP_TIMEOUT", "12.5"), ("AIP_MAX_RETRIES", "many")]);
        assert_eq!(source.parse::<f64>("timeout").unwrap(), Some(12.5));
        assert!(matches!(
            source.parse::<u32>("max.retries"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(source.parse::<u32>("missing").unwrap(), None);
    }
}
