//! Cache configuration and the process-wide config registry.
//!
//! A [`CacheConfig`] names one logical cache and carries everything the
//! engine needs at call time: namespace, key derivation, storage type,
//! strategy name, and the three TTLs (remote, local, empty-result).
//! Configs are immutable after registration; the [`CacheRegistry`] is built
//! once at startup and read-only thereafter.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, KeyError};
use crate::key::KeySpec;

/// Default storage strategy name.
pub const DEFAULT_STRATEGY: &str = "json";

/// Default empty-value marker.
///
/// A reserved sentinel stored in place of "no result". It must never
/// collide with a real serialized value; serialized JSON always starts
/// with a quote, digit, brace, bracket, or literal, so a bare word with
/// underscores is safe.
pub const DEFAULT_EMPTY_MARKER: &str = "__LC_EMPTY__";

/// How a value is physically laid out in the remote tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// One serialized value at one key.
    Scalar,
    /// A list container; each element serialized individually.
    List,
    /// A set container; each member serialized individually.
    Set,
    /// Fields of a shared hash structure, addressed as (key, field).
    Hash,
    /// A page/object result; cached like a scalar, with the page arguments
    /// participating in the key.
    Page,
}

impl StorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::List => "list",
            Self::Set => "set",
            Self::Hash => "hash",
            Self::Page => "page",
        }
    }
}

/// Configuration for one named cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Logical name, used to look the config up at call time.
    pub name: String,
    /// Key namespace prefix, e.g. `test:user`.
    pub namespace: String,
    /// Key derivation over the call arguments.
    pub key_spec: KeySpec,
    /// Physical layout in the remote tier.
    pub storage_type: StorageType,
    /// Storage strategy name, e.g. `json` or `gzip`.
    pub strategy: String,
    /// TTL for values in the remote tier.
    pub l2_ttl: Duration,
    /// TTL for the in-process tier. `None` disables L1 for this config:
    /// reads always fall through to the remote tier.
    pub l1_ttl: Option<Duration>,
    /// Shorter TTL for cached empty results (anti-penetration).
    pub empty_ttl: Duration,
    /// Sentinel stored in place of "no result".
    pub empty_marker: String,
    /// Optional L1 entry bound for this config.
    pub l1_capacity: Option<usize>,
}

impl CacheConfig {
    /// Create a config with defaults: scalar storage, json strategy,
    /// 10 minute remote TTL, no L1, 10 second empty TTL.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            key_spec: KeySpec::default(),
            storage_type: StorageType::Scalar,
            strategy: DEFAULT_STRATEGY.to_string(),
            l2_ttl: Duration::from_secs(600),
            l1_ttl: None,
            empty_ttl: Duration::from_secs(10),
            empty_marker: DEFAULT_EMPTY_MARKER.to_string(),
            l1_capacity: None,
        }
    }

    /// Set the key derivation spec.
    pub fn with_key_spec(mut self, spec: KeySpec) -> Self {
        self.key_spec = spec;
        self
    }

    /// Set the storage type.
    pub fn with_storage_type(mut self, storage_type: StorageType) -> Self {
        self.storage_type = storage_type;
        self
    }

    /// Select a storage strategy by name.
    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = strategy.into();
        self
    }

    /// Set the remote-tier TTL.
    pub fn with_l2_ttl(mut self, ttl: Duration) -> Self {
        self.l2_ttl = ttl;
        self
    }

    /// Enable L1 for this config with the given TTL.
    pub fn with_l1_ttl(mut self, ttl: Duration) -> Self {
        self.l1_ttl = Some(ttl);
        self
    }

    /// Set the empty-result TTL.
    pub fn with_empty_ttl(mut self, ttl: Duration) -> Self {
        self.empty_ttl = ttl;
        self
    }

    /// Override the empty-value marker.
    pub fn with_empty_marker(mut self, marker: impl Into<String>) -> Self {
        self.empty_marker = marker.into();
        self
    }

    /// Bound the number of L1 entries for this config.
    pub fn with_l1_capacity(mut self, capacity: usize) -> Self {
        self.l1_capacity = Some(capacity);
        self
    }

    /// Whether the in-process tier is enabled for this config.
    pub fn l1_enabled(&self) -> bool {
        self.l1_ttl.is_some()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.is_empty() {
            return Err(ConfigError::EmptyNamespace {
                name: self.name.clone(),
            });
        }
        if self.empty_marker.is_empty() {
            return Err(ConfigError::InvalidEmptyMarker {
                name: self.name.clone(),
                reason: "marker must be non-empty".into(),
            });
        }
        // A marker that parses as JSON could be confused with real data.
        if serde_json::from_str::<serde_json::Value>(&self.empty_marker).is_ok() {
            return Err(ConfigError::InvalidEmptyMarker {
                name: self.name.clone(),
                reason: "marker must not be valid JSON".into(),
            });
        }
        Ok(())
    }
}

/// Process-wide immutable table of cache configs.
///
/// Built once at startup via [`CacheRegistry::builder`]; looked up by name
/// at call time. There are no teardown semantics beyond process exit.
#[derive(Debug, Default)]
pub struct CacheRegistry {
    configs: HashMap<String, CacheConfig>,
}

impl CacheRegistry {
    pub fn builder() -> CacheRegistryBuilder {
        CacheRegistryBuilder::default()
    }

    /// Look up a config by name.
    pub fn get(&self, name: &str) -> Result<&CacheConfig, KeyError> {
        self.configs.get(name).ok_or_else(|| KeyError::UnknownConfig {
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.configs.contains_key(name)
    }

    /// Iterate over all registered config names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

/// Builder for the config registry.
#[derive(Debug, Default)]
pub struct CacheRegistryBuilder {
    configs: Vec<CacheConfig>,
}

impl CacheRegistryBuilder {
    /// Add a config. Duplicates and invalid configs are rejected at
    /// [`build`](Self::build) time.
    pub fn register(mut self, config: CacheConfig) -> Self {
        self.configs.push(config);
        self
    }

    pub fn build(self) -> Result<CacheRegistry, ConfigError> {
        let mut configs = HashMap::with_capacity(self.configs.len());
        for config in self.configs {
            config.validate()?;
            let name = config.name.clone();
            if configs.insert(name.clone(), config).is_some() {
                return Err(ConfigError::DuplicateName { name });
            }
        }
        Ok(CacheRegistry { configs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::new("TEST_USER_CACHE", "test:user");
        assert_eq!(config.strategy, DEFAULT_STRATEGY);
        assert_eq!(config.storage_type, StorageType::Scalar);
        assert!(!config.l1_enabled());
        assert_eq!(config.empty_marker, DEFAULT_EMPTY_MARKER);
    }

    #[test]
    fn test_builder_chain() {
        let config = CacheConfig::new("TEST_USER_CACHE", "test:user")
            .with_storage_type(StorageType::Set)
            .with_strategy("gzip")
            .with_l2_ttl(Duration::from_secs(120))
            .with_l1_ttl(Duration::from_secs(30))
            .with_empty_ttl(Duration::from_secs(5))
            .with_l1_capacity(1000);

        assert_eq!(config.storage_type, StorageType::Set);
        assert_eq!(config.strategy, "gzip");
        assert_eq!(config.l2_ttl, Duration::from_secs(120));
        assert_eq!(config.l1_ttl, Some(Duration::from_secs(30)));
        assert_eq!(config.empty_ttl, Duration::from_secs(5));
        assert_eq!(config.l1_capacity, Some(1000));
        assert!(config.l1_enabled());
    }

    #[test]
    fn test_registry_lookup() {
        let registry = CacheRegistry::builder()
            .register(CacheConfig::new("A", "ns:a"))
            .register(CacheConfig::new("B", "ns:b"))
            .build()
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("A"));
        assert_eq!(registry.get("B").unwrap().namespace, "ns:b");

        let err = registry.get("MISSING").unwrap_err();
        assert_eq!(
            err,
            KeyError::UnknownConfig {
                name: "MISSING".into()
            }
        );
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = CacheRegistry::builder()
            .register(CacheConfig::new("A", "ns:a"))
            .register(CacheConfig::new("A", "ns:other"))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::DuplicateName { name: "A".into() });
    }

    #[test]
    fn test_empty_namespace_rejected() {
        let err = CacheRegistry::builder()
            .register(CacheConfig::new("A", ""))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::EmptyNamespace { name: "A".into() });
    }

    #[test]
    fn test_json_shaped_marker_rejected() {
        let err = CacheRegistry::builder()
            .register(CacheConfig::new("A", "ns:a").with_empty_marker("123"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEmptyMarker { .. }));
    }

    #[test]
    fn test_storage_type_names() {
        assert_eq!(StorageType::Scalar.as_str(), "scalar");
        assert_eq!(StorageType::Page.as_str(), "page");
    }
}
