//! In-process (L1) cache tier.
//!
//! A per-config sharded map with per-entry TTL and hit/miss counters.
//! TTL is checked lazily on read: an expired entry is treated as absent
//! and purged by the access that observed it. There is no background
//! sweep.
//!
//! The empty state (a known-absent key) is a distinct entry kind, stored
//! via [`L1Cache::put_empty`] with the config's empty TTL so
//! anti-penetration expires on the same schedule as the remote tier's
//! marker. `Value::Null` is a legitimate cached value (a type whose JSON
//! encoding is null) and reads back as a hit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::Value;

use layercache_core::CacheConfig;

#[derive(Debug, Clone)]
enum L1Slot {
    Value(Value),
    Empty,
}

#[derive(Debug, Clone)]
struct L1Entry {
    slot: L1Slot,
    expires_at: Instant,
}

/// A live L1 entry: a cached value, or a remembered empty state.
#[derive(Debug, Clone, PartialEq)]
pub enum L1Read {
    Hit(Value),
    Empty,
}

impl L1Read {
    fn from_slot(slot: &L1Slot) -> Self {
        match slot {
            L1Slot::Value(value) => Self::Hit(value.clone()),
            L1Slot::Empty => Self::Empty,
        }
    }
}

#[derive(Debug, Default)]
struct ConfigShard {
    entries: RwLock<HashMap<String, L1Entry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    capacity: Option<usize>,
}

/// Hit/miss counters for one config's L1 shard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct L1Stats {
    pub hits: u64,
    pub misses: u64,
    pub entry_count: u64,
}

impl L1Stats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Thread-safe in-process cache, sharded by config name.
///
/// Callers never need external locking: gets and puts from many tasks are
/// safe concurrently. Whether L1 applies at all for a given config is the
/// engine's decision (configs without a local TTL bypass this tier).
#[derive(Debug, Default)]
pub struct L1Cache {
    shards: RwLock<HashMap<String, Arc<ConfigShard>>>,
}

impl L1Cache {
    pub fn new() -> Self {
        Self::default()
    }

    fn shard(&self, config: &CacheConfig) -> Arc<ConfigShard> {
        if let Some(shard) = self.shards.read().get(&config.name) {
            return Arc::clone(shard);
        }
        let mut shards = self.shards.write();
        Arc::clone(shards.entry(config.name.clone()).or_insert_with(|| {
            Arc::new(ConfigShard {
                capacity: config.l1_capacity,
                ..ConfigShard::default()
            })
        }))
    }

    /// Get a live entry. Expired entries count as misses and are purged.
    pub fn get(&self, config: &CacheConfig, key: &str) -> Option<L1Read> {
        let shard = self.shard(config);
        let now = Instant::now();

        {
            let entries = shard.entries.read();
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => {
                    shard.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(L1Read::from_slot(&entry.slot));
                }
                Some(_) => {} // expired, purge below
                None => {
                    shard.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        let mut entries = shard.entries.write();
        if let Some(entry) = entries.get(key) {
            // Re-check: another task may have refreshed the entry between
            // dropping the read lock and taking the write lock.
            if entry.expires_at > Instant::now() {
                let read = L1Read::from_slot(&entry.slot);
                shard.hits.fetch_add(1, Ordering::Relaxed);
                return Some(read);
            }
            entries.remove(key);
        }
        shard.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert a value with an explicit TTL.
    pub fn put(&self, config: &CacheConfig, key: &str, value: Value, ttl: Duration) {
        self.put_slot(config, key, L1Slot::Value(value), ttl);
    }

    /// Remember a known-absent key for `ttl`.
    pub fn put_empty(&self, config: &CacheConfig, key: &str, ttl: Duration) {
        self.put_slot(config, key, L1Slot::Empty, ttl);
    }

    /// When the shard is at capacity, the entry closest to expiry makes
    /// room for the new one.
    fn put_slot(&self, config: &CacheConfig, key: &str, slot: L1Slot, ttl: Duration) {
        let shard = self.shard(config);
        let mut entries = shard.entries.write();

        if let Some(capacity) = shard.capacity {
            if entries.len() >= capacity && !entries.contains_key(key) {
                let victim = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.expires_at)
                    .map(|(k, _)| k.clone());
                if let Some(victim) = victim {
                    entries.remove(&victim);
                }
            }
        }

        entries.insert(
            key.to_string(),
            L1Entry {
                slot,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Remove one entry. Returns true if it was present.
    pub fn evict(&self, config_name: &str, key: &str) -> bool {
        let shard = self.shards.read().get(config_name).cloned();
        match shard {
            Some(shard) => shard.entries.write().remove(key).is_some(),
            None => false,
        }
    }

    /// Drop every entry for a config. Counters survive.
    pub fn evict_config(&self, config_name: &str) {
        if let Some(shard) = self.shards.read().get(config_name) {
            shard.entries.write().clear();
        }
    }

    /// Read-only counters for a config. Unknown configs report zeros.
    pub fn stats(&self, config_name: &str) -> L1Stats {
        match self.shards.read().get(config_name) {
            Some(shard) => L1Stats {
                hits: shard.hits.load(Ordering::Relaxed),
                misses: shard.misses.load(Ordering::Relaxed),
                entry_count: shard.entries.read().len() as u64,
            },
            None => L1Stats::default(),
        }
    }
}
