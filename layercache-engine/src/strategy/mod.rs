//! Pluggable storage strategies for the remote tier.
//!
//! A strategy owns the encode/decode step and the physical read/write
//! against the [`L2Store`] for one value shape. Strategies are registered
//! by name; a config selects one with
//! [`CacheConfig::strategy`](layercache_core::CacheConfig).
//!
//! Reads are three-state: the engine must tell a real value from a stored
//! empty marker from a plain miss, because a marker hit suppresses the
//! loader (anti-penetration) while a miss triggers it. The marker literal
//! never leaves this layer.

pub mod gzip;
pub mod json;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use layercache_core::{CacheConfig, CacheError, CacheResult, ResolvedKey};

use crate::store::L2Store;

pub use gzip::GzipStrategy;
pub use json::JsonStrategy;

/// Outcome of a strategy read.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyRead {
    /// A decoded value.
    Hit(Value),
    /// The key holds the empty marker: known-absent, do not load.
    Empty,
    /// No key.
    Miss,
}

/// Encode/decode plus read/write contract over the remote store.
///
/// A strategy that has not implemented an operation must fail with
/// [`CacheError::Unsupported`] rather than degrade to partial or
/// per-key behavior; the trait's defaults do exactly that for the
/// hash-field operations.
#[async_trait]
pub trait StorageStrategy: Send + Sync + std::fmt::Debug {
    /// Registration name, e.g. `"json"`.
    fn name(&self) -> &'static str;

    /// Read and decode one key.
    async fn read(
        &self,
        store: &dyn L2Store,
        key: &str,
        config: &CacheConfig,
    ) -> CacheResult<StrategyRead>;

    /// Batch read. Returns a per-key outcome for every requested key that
    /// exists; omitted keys are misses. Empty-marked keys come back as
    /// [`StrategyRead::Empty`] so the caller never forwards them to a
    /// loader.
    async fn read_multi(
        &self,
        store: &dyn L2Store,
        keys: &[ResolvedKey],
        config: &CacheConfig,
    ) -> CacheResult<HashMap<ResolvedKey, StrategyRead>>;

    /// Encode and write one value with the config's remote TTL.
    async fn write(
        &self,
        store: &dyn L2Store,
        key: &str,
        value: &Value,
        config: &CacheConfig,
    ) -> CacheResult<()>;

    /// Batch write with the config's remote TTL.
    async fn write_multi(
        &self,
        store: &dyn L2Store,
        entries: &HashMap<ResolvedKey, Value>,
        config: &CacheConfig,
    ) -> CacheResult<()>;

    /// Store the empty marker at one key with the empty-result TTL.
    async fn write_empty(
        &self,
        store: &dyn L2Store,
        key: &str,
        config: &CacheConfig,
    ) -> CacheResult<()>;

    /// Store the empty marker at each key with the empty-result TTL.
    async fn write_multi_empty(
        &self,
        store: &dyn L2Store,
        keys: &[ResolvedKey],
        config: &CacheConfig,
    ) -> CacheResult<()>;

    /// Read one field of a shared hash structure.
    async fn read_field(
        &self,
        _store: &dyn L2Store,
        _key: &str,
        _field: &str,
        _config: &CacheConfig,
    ) -> CacheResult<StrategyRead> {
        Err(CacheError::Unsupported {
            strategy: self.name().to_string(),
            operation: "read_field",
        })
    }

    /// Write one field of a shared hash structure.
    async fn write_field(
        &self,
        _store: &dyn L2Store,
        _key: &str,
        _field: &str,
        _value: &Value,
        _config: &CacheConfig,
    ) -> CacheResult<()> {
        Err(CacheError::Unsupported {
            strategy: self.name().to_string(),
            operation: "write_field",
        })
    }

    /// Store the empty marker in one field of a shared hash structure.
    ///
    /// Discouraged: the marker write can perturb the whole structure's
    /// TTL semantics. Implementations log a warning when they do this.
    async fn write_field_empty(
        &self,
        _store: &dyn L2Store,
        _key: &str,
        _field: &str,
        _config: &CacheConfig,
    ) -> CacheResult<()> {
        Err(CacheError::Unsupported {
            strategy: self.name().to_string(),
            operation: "write_field_empty",
        })
    }
}

/// TTL arguments strategies pass to the store.
pub(crate) fn value_ttl(config: &CacheConfig) -> Option<Duration> {
    Some(config.l2_ttl)
}

pub(crate) fn empty_ttl(config: &CacheConfig) -> Option<Duration> {
    Some(config.empty_ttl)
}

/// Name-indexed table of strategies, built at startup.
#[derive(Clone)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn StorageStrategy>>,
}

impl StrategyRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Registry with the built-in strategies: `json` and `gzip`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(JsonStrategy::new()));
        registry.register(Arc::new(GzipStrategy::new()));
        registry
    }

    /// Add or replace a strategy under its own name.
    pub fn register(&mut self, strategy: Arc<dyn StorageStrategy>) {
        self.strategies
            .insert(strategy.name().to_string(), strategy);
    }

    pub fn get(&self, name: &str) -> CacheResult<Arc<dyn StorageStrategy>> {
        self.strategies
            .get(name)
            .cloned()
            .ok_or_else(|| CacheError::UnknownStrategy {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
