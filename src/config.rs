use std::str::FromStr;

use serde::Deserialize;

use crate::cache::DEFAULT_STATEMENT_CACHE_CAPACITY;
use crate::error::{BridgeError, Result};

/// Session configuration.
///
/// Every field has a default, so a partial TOML table or an empty
/// environment is valid.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Statements cached before the cache is flushed (default: 20)
    pub statement_cache_capacity: usize,

    /// Worker threads of the runtime that drives blocking calls (default: 1)
    pub worker_threads: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            statement_cache_capacity: DEFAULT_STATEMENT_CACHE_CAPACITY,
            worker_threads: 1,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults for unset ones.
    ///
    /// - `DBBRIDGE_STATEMENT_CACHE_CAPACITY`
    /// - `DBBRIDGE_WORKER_THREADS`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            statement_cache_capacity: parse_var(
                &lookup,
                "DBBRIDGE_STATEMENT_CACHE_CAPACITY",
                defaults.statement_cache_capacity,
            )?,
            worker_threads: parse_var(&lookup, "DBBRIDGE_WORKER_THREADS", defaults.worker_threads)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document such as `statement_cache_capacity = 50`.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| BridgeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.statement_cache_capacity == 0 {
            return Err(BridgeError::Config(
                "statement_cache_capacity must be at least 1".to_string(),
            ));
        }
        if self.worker_threads == 0 {
            return Err(BridgeError::Config(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| BridgeError::Config(format!("{} is not a valid number: {:?}", key, raw))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.statement_cache_capacity, 20);
        assert_eq!(config.worker_threads, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_lookup_overrides_defaults() {
        let config = BridgeConfig::from_lookup(|key| match key {
            "DBBRIDGE_STATEMENT_CACHE_CAPACITY" => Some(" 64 ".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.statement_cache_capacity, 64);
        assert_eq!(config.worker_threads, 1);
    }

    #[test]
    fn test_lookup_rejects_garbage() {
        let err = BridgeConfig::from_lookup(|key| match key {
            "DBBRIDGE_WORKER_THREADS" => Some("many".to_string()),
            _ => None,
        })
        .unwrap_err();
        assert_eq!(
            err.message(),
            "DBBRIDGE_WORKER_THREADS is not a valid number: \"many\""
        );
    }

    #[test]
    fn test_partial_toml() {
        let config = BridgeConfig::from_toml_str("statement_cache_capacity = 5").unwrap();
        assert_eq!(config.statement_cache_capacity, 5);
        assert_eq!(config.worker_threads, 1);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(matches!(
            BridgeConfig::from_toml_str("statement_cache_capacity = 0"),
            Err(BridgeError::Config(_))
        ));
        assert!(matches!(
            BridgeConfig::from_toml_str("worker_threads = \"two\""),
            Err(BridgeError::Config(_))
        ));
    }
}
