//! Ingestion configuration.
//!
//! Values can be set with the builder methods or layered from the
//! environment with [`IngestConfig::from_env`], using the
//! `PREFIX__SETTING_NAME` convention:
//!
//! ```bash
//! export BLOBS__DEFAULT_PER_BLOB_LIMIT_BYTES=10485760
//! export BLOBS__SERIALIZE_SAME_KEY=true
//! ```

use std::str::FromStr;

use crate::{IngestError, IngestResult};

/// Configuration for blob ingestion
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Per-blob cap applied when a tenant's quota record does not carry its own
    pub default_per_blob_limit_bytes: u64,

    /// Serialize concurrent uploads of the same `(tenant, name)` pair.
    /// When false, concurrent uploads race and the last put wins.
    pub serialize_same_key: bool,

    /// Cache list/size reads until a tagged mutation invalidates them
    pub cache_enabled: bool,

    /// Buffer size of the ingestion event channel
    pub event_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            default_per_blob_limit_bytes: 100 * 1024 * 1024, // 100MB
            serialize_same_key: false,
            cache_enabled: true,
            event_capacity: 256,
        }
    }
}

impl IngestConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `PREFIX__*` environment variables
    pub fn from_env(prefix: &str) -> IngestResult<Self> {
        Self::from_vars(prefix, std::env::vars())
    }

    /// Same as [`IngestConfig::from_env`] over an explicit set of variables
    pub fn from_vars<I, K, V>(prefix: &str, vars: I) -> IngestResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        let prefix = format!("{}__", prefix.to_uppercase());

        for (key, value) in vars {
            let Some(setting) = key.as_ref().strip_prefix(&prefix) else {
                continue;
            };
            let value = value.as_ref().trim();
            match setting.to_lowercase().as_str() {
                "default_per_blob_limit_bytes" => {
                    config.default_per_blob_limit_bytes = parse_setting(setting, value)?;
                }
                "serialize_same_key" => config.serialize_same_key = parse_setting(setting, value)?,
                "cache_enabled" => config.cache_enabled = parse_setting(setting, value)?,
                "event_capacity" => config.event_capacity = parse_setting(setting, value)?,
                _ => {}
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the default per-blob limit
    pub fn with_default_per_blob_limit(mut self, bytes: u64) -> Self {
        self.default_per_blob_limit_bytes = bytes;
        self
    }

    /// Serialize same-key uploads
    pub fn serialize_same_key(mut self) -> Self {
        self.serialize_same_key = true;
        self
    }

    /// Turn off read caching
    pub fn without_cache(mut self) -> Self {
        self.cache_enabled = false;
        self
    }

    /// Set event channel capacity
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn validate(&self) -> IngestResult<()> {
        if self.default_per_blob_limit_bytes == 0 {
            return Err(IngestError::invalid("default_per_blob_limit_bytes must be > 0"));
        }
        if self.event_capacity == 0 {
            return Err(IngestError::invalid("event_capacity must be > 0"));
        }
        Ok(())
    }
}

fn parse_setting<T: FromStr>(setting: &str, value: &str) -> IngestResult<T> {
    value
        .parse::<T>()
        .map_err(|_| IngestError::invalid(format!("Invalid value '{}' for {}", value, setting)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_defaults() {
        let vars = vec![
            ("BLOBS__DEFAULT_PER_BLOB_LIMIT_BYTES", "2048"),
            ("BLOBS__SERIALIZE_SAME_KEY", "true"),
            ("BLOBS__CACHE_ENABLED", "false"),
            ("OTHER__EVENT_CAPACITY", "1"),
        ];
        let config = IngestConfig::from_vars("blobs", vars).unwrap();

        assert_eq!(config.default_per_blob_limit_bytes, 2048);
        assert!(config.serialize_same_key);
        assert!(!config.cache_enabled);
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn unparseable_values_are_rejected() {
        let vars = vec![("BLOBS__EVENT_CAPACITY", "lots")];
        let err = IngestConfig::from_vars("BLOBS", vars).unwrap_err();
        assert!(matches!(err, IngestError::Invalid { .. }));
    }

    #[test]
    fn zero_per_blob_limit_is_invalid() {
        let vars = vec![("BLOBS__DEFAULT_PER_BLOB_LIMIT_BYTES", "0")];
        assert!(IngestConfig::from_vars("BLOBS", vars).is_err());
    }
}
