//! Operational surface: explicit eviction and local-tier statistics.
//!
//! Invalidation is caller-driven; the engine never pushes updates between
//! processes. [`CacheAdmin::evict`] clears both tiers for use after a
//! source-of-truth write; [`CacheAdmin::evict_l1`] clears only the local
//! tier, forcing the next read back through L2 without touching it.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use layercache_core::{resolve, CacheRegistry, CacheResult};

use crate::engine::CacheEngine;
use crate::l1::{L1Cache, L1Stats};
use crate::store::L2Store;

/// Handle for eviction and stats, detached from the fetch surface.
#[derive(Clone)]
pub struct CacheAdmin {
    registry: Arc<CacheRegistry>,
    l1: Arc<L1Cache>,
    store: Arc<dyn L2Store>,
}

impl CacheEngine {
    pub fn admin(&self) -> CacheAdmin {
        CacheAdmin {
            registry: self.registry.clone(),
            l1: self.l1.clone(),
            store: self.store.clone(),
        }
    }
}

impl CacheAdmin {
    /// Evict one key from both tiers. L1 first, so a concurrent reader
    /// cannot refill L1 from the stale L2 entry after it is gone.
    ///
    /// Returns whether the remote tier held the key.
    pub async fn evict(&self, config_name: &str, key_args: &[Value]) -> CacheResult<bool> {
        let config = self.registry.get(config_name)?;
        let key = resolve(config, key_args)?;
        self.l1.evict(&config.name, &key);
        let deleted = self.store.delete(&key).await?;
        debug!(%key, deleted, "evicted from both tiers");
        Ok(deleted)
    }

    /// Evict one field of a shared hash structure from both tiers. The
    /// L1 entry is keyed `hash_key:field`, matching the hash fetch path;
    /// the rest of the structure is untouched.
    ///
    /// Returns whether the remote tier held the field.
    pub async fn evict_hash_field(
        &self,
        config_name: &str,
        hash_key: &str,
        field: &str,
    ) -> CacheResult<bool> {
        let config = self.registry.get(config_name)?;
        let l1_key = format!("{hash_key}:{field}");
        self.l1.evict(&config.name, &l1_key);
        let deleted = self.store.hash_delete(hash_key, field).await?;
        debug!(key = %l1_key, deleted, "evicted hash field from both tiers");
        Ok(deleted)
    }

    /// Evict one key from the local tier only. The remote entry stays;
    /// the next fetch refills L1 from L2 without consulting the loader.
    pub fn evict_l1(&self, config_name: &str, key_args: &[Value]) -> CacheResult<bool> {
        let config = self.registry.get(config_name)?;
        let key = resolve(config, key_args)?;
        Ok(self.l1.evict(&config.name, &key))
    }

    /// Snapshot of the local tier's counters for one config. Read-only;
    /// the counters keep accumulating.
    pub fn l1_stats(&self, config_name: &str) -> CacheResult<L1Stats> {
        self.registry.get(config_name)?;
        Ok(self.l1.stats(config_name))
    }
}
