//! The fetch coordinator: read-through and write-back across both tiers.
//!
//! [`CacheEngine`] orchestrates the lookup/fill protocol: resolve the key,
//! check L1, check L2 through the config's storage strategy, and only then
//! call the source-of-truth loader. A successful load is written back to
//! L2 and then L1; a null load stores the empty marker with the shorter
//! empty TTL so known-absent keys stop hammering the source
//! (anti-penetration).
//!
//! Decode failures on stored data are fail-open: logged, treated as a
//! miss, and repaired by the reload's write-back. Loader failures
//! propagate to the caller unchanged and write nothing to either tier.
//!
//! There is no single-flight de-duplication: concurrent misses on one key
//! may each invoke the loader independently.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use layercache_core::{
    resolve, CacheConfig, CacheError, CacheRegistry, CacheResult, ResolvedKey,
};

use crate::l1::{L1Cache, L1Read};
use crate::store::L2Store;
use crate::strategy::{StorageStrategy, StrategyRegistry, StrategyRead};

/// Source-of-truth callback for a single value.
///
/// `Ok(None)` means the source has no value for this key; the engine then
/// caches the empty state. Errors propagate to the caller unchanged and
/// nothing is cached.
///
/// Implemented for any async closure `Fn() -> Future<Output =
/// CacheResult<Option<T>>>`; implement it by hand when the test or call
/// site needs to observe invocations.
#[async_trait]
pub trait SourceLoader<T>: Send + Sync {
    async fn load(&self) -> CacheResult<Option<T>>;
}

#[async_trait]
impl<T, F, Fut> SourceLoader<T> for F
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = CacheResult<Option<T>>> + Send,
{
    async fn load(&self) -> CacheResult<Option<T>> {
        (self)().await
    }
}

/// Source-of-truth callback for the union path.
///
/// Invoked with exactly the keys that were resolvable in neither tier.
/// Keys absent from the returned map are treated as known-empty and
/// marked as such in the remote tier.
#[async_trait]
pub trait BatchSetLoader<T>: Send + Sync {
    async fn load(
        &self,
        missing: Vec<ResolvedKey>,
    ) -> CacheResult<HashMap<ResolvedKey, HashSet<T>>>;
}

#[async_trait]
impl<T, F, Fut> BatchSetLoader<T> for F
where
    T: Send + 'static,
    F: Fn(Vec<ResolvedKey>) -> Fut + Send + Sync,
    Fut: Future<Output = CacheResult<HashMap<ResolvedKey, HashSet<T>>>> + Send,
{
    async fn load(
        &self,
        missing: Vec<ResolvedKey>,
    ) -> CacheResult<HashMap<ResolvedKey, HashSet<T>>> {
        (self)(missing).await
    }
}

/// Two-tier read-through cache engine.
///
/// Cheap to clone; all state is shared. Invoked synchronously by arbitrary
/// caller tasks; the engine schedules nothing of its own.
#[derive(Clone)]
pub struct CacheEngine {
    pub(crate) registry: Arc<CacheRegistry>,
    pub(crate) strategies: Arc<StrategyRegistry>,
    pub(crate) l1: Arc<L1Cache>,
    pub(crate) store: Arc<dyn L2Store>,
}

impl CacheEngine {
    /// Build an engine with the built-in strategies.
    pub fn new(registry: Arc<CacheRegistry>, store: Arc<dyn L2Store>) -> Self {
        Self::with_strategies(registry, store, StrategyRegistry::with_defaults())
    }

    /// Build an engine with a custom strategy table.
    pub fn with_strategies(
        registry: Arc<CacheRegistry>,
        store: Arc<dyn L2Store>,
        strategies: StrategyRegistry,
    ) -> Self {
        Self {
            registry,
            strategies: Arc::new(strategies),
            l1: Arc::new(L1Cache::new()),
            store,
        }
    }

    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    pub(crate) fn strategy_for(
        &self,
        config: &CacheConfig,
    ) -> CacheResult<Arc<dyn StorageStrategy>> {
        self.strategies.get(&config.strategy)
    }

    /// Read-through fetch of one value.
    ///
    /// Returns `Ok(None)` both when the source reports no value and when a
    /// previously cached empty state is still live; the empty marker
    /// itself never reaches the caller.
    pub async fn fetch_data<T, L>(
        &self,
        config_name: &str,
        loader: &L,
        key_args: &[Value],
    ) -> CacheResult<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        L: SourceLoader<T> + ?Sized,
    {
        let config = self.registry.get(config_name)?;
        let key = resolve(config, key_args)?;
        let strategy = self.strategy_for(config)?;

        if let Some(found) = self.lookup_tiers::<T>(config, strategy.as_ref(), &key).await? {
            return Ok(found.into());
        }

        match loader.load().await? {
            Some(value) => {
                let encoded =
                    serde_json::to_value(&value).map_err(|err| CacheError::encoding(&key, err))?;
                strategy
                    .write(self.store.as_ref(), &key, &encoded, config)
                    .await?;
                self.l1_fill(config, &key, encoded);
                Ok(Some(value))
            }
            None => {
                strategy.write_empty(self.store.as_ref(), &key, config).await?;
                self.l1_fill_empty(config, &key);
                Ok(None)
            }
        }
    }

    /// Set-union batch fetch across independent keys.
    ///
    /// The loader is invoked with exactly the keys resolvable in neither
    /// tier; this is the efficiency contract of the union path. Loaded
    /// sets are union-written back to L2 and filled into L1 per key, so a
    /// repeat call with the same key list needs no L2 round trip at all.
    /// Keys the loader does not return are marked empty.
    pub async fn fetch_union_data<T, L>(
        &self,
        config_name: &str,
        keys: &[ResolvedKey],
        loader: &L,
    ) -> CacheResult<HashSet<T>>
    where
        T: Serialize + DeserializeOwned + Eq + Hash + Send + 'static,
        L: BatchSetLoader<T> + ?Sized,
    {
        let config = self.registry.get(config_name)?;
        let strategy = self.strategy_for(config)?;
        let mut result: HashSet<T> = HashSet::new();

        // Tier 1 partition.
        let mut remaining: Vec<ResolvedKey> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::with_capacity(keys.len());
        for key in keys {
            if !seen.insert(key.as_str()) {
                continue;
            }
            match self.l1_lookup(config, key) {
                Some(L1Read::Empty) => {} // live empty state, contributes nothing
                Some(L1Read::Hit(value)) => match decode_set::<T>(key, &value) {
                    Ok(items) => result.extend(items),
                    Err(err) => {
                        warn!(%key, error = %err, "undecodable L1 union entry, refetching");
                        self.l1.evict(&config.name, key);
                        remaining.push(key.clone());
                    }
                },
                None => remaining.push(key.clone()),
            }
        }

        // Tier 2 partition, one batch read.
        let mut missing: Vec<ResolvedKey> = Vec::new();
        if !remaining.is_empty() {
            let found = strategy
                .read_multi(self.store.as_ref(), &remaining, config)
                .await?;
            for key in remaining {
                match found.get(&key) {
                    Some(StrategyRead::Hit(value)) => match decode_set::<T>(&key, value) {
                        Ok(items) => {
                            result.extend(items);
                            self.l1_fill(config, &key, value.clone());
                        }
                        Err(err) => {
                            warn!(%key, error = %err, "undecodable L2 union entry, reloading");
                            missing.push(key);
                        }
                    },
                    Some(StrategyRead::Empty) => self.l1_fill_empty(config, &key),
                    Some(StrategyRead::Miss) | None => missing.push(key),
                }
            }
        }

        // Source load for whatever neither tier could answer.
        if !missing.is_empty() {
            let mut loaded = loader.load(missing.clone()).await?;
            let mut to_write: HashMap<ResolvedKey, Value> = HashMap::new();
            let mut to_mark: Vec<ResolvedKey> = Vec::new();

            for key in &missing {
                match loaded.remove(key) {
                    Some(set) if !set.is_empty() => {
                        let mut items = Vec::with_capacity(set.len());
                        for item in &set {
                            items.push(
                                serde_json::to_value(item)
                                    .map_err(|err| CacheError::encoding(key, err))?,
                            );
                        }
                        let value = Value::Array(items);
                        self.l1_fill(config, key, value.clone());
                        to_write.insert(key.clone(), value);
                        result.extend(set);
                    }
                    _ => to_mark.push(key.clone()),
                }
            }
            if !loaded.is_empty() {
                debug!(
                    extra = loaded.len(),
                    "union loader returned keys that were not requested; ignoring"
                );
            }

            if !to_write.is_empty() {
                strategy
                    .write_multi(self.store.as_ref(), &to_write, config)
                    .await?;
            }
            if !to_mark.is_empty() {
                strategy
                    .write_multi_empty(self.store.as_ref(), &to_mark, config)
                    .await?;
                for key in &to_mark {
                    self.l1_fill_empty(config, key);
                }
            }
        }

        Ok(result)
    }

    /// Read-through fetch of one field of a shared hash structure.
    ///
    /// Same protocol as [`fetch_data`](Self::fetch_data), addressed at
    /// `(hash_key, field)`. The L1 entry is keyed `hash_key:field`.
    pub async fn fetch_hash_data<T, L>(
        &self,
        config_name: &str,
        hash_key: &str,
        field: &str,
        loader: &L,
    ) -> CacheResult<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        L: SourceLoader<T> + ?Sized,
    {
        let config = self.registry.get(config_name)?;
        let strategy = self.strategy_for(config)?;
        let l1_key = format!("{hash_key}:{field}");

        match self.l1_lookup(config, &l1_key) {
            Some(L1Read::Empty) => return Ok(None),
            Some(L1Read::Hit(value)) => match serde_json::from_value::<T>(value) {
                Ok(decoded) => return Ok(Some(decoded)),
                Err(err) => {
                    warn!(key = %l1_key, error = %err, "undecodable L1 entry, falling through");
                    self.l1.evict(&config.name, &l1_key);
                }
            },
            None => {}
        }

        match strategy
            .read_field(self.store.as_ref(), hash_key, field, config)
            .await
        {
            Ok(StrategyRead::Hit(value)) => match serde_json::from_value::<T>(value.clone()) {
                Ok(decoded) => {
                    self.l1_fill(config, &l1_key, value);
                    return Ok(Some(decoded));
                }
                Err(err) => {
                    warn!(key = %l1_key, error = %err, "undecodable hash field, reloading")
                }
            },
            Ok(StrategyRead::Empty) => {
                self.l1_fill_empty(config, &l1_key);
                return Ok(None);
            }
            Ok(StrategyRead::Miss) => {}
            Err(err) if err.is_encoding() => {
                warn!(key = %l1_key, error = %err, "decode failure on hash field, reloading")
            }
            Err(err) => return Err(err),
        }

        match loader.load().await? {
            Some(value) => {
                let encoded = serde_json::to_value(&value)
                    .map_err(|err| CacheError::encoding(&l1_key, err))?;
                strategy
                    .write_field(self.store.as_ref(), hash_key, field, &encoded, config)
                    .await?;
                self.l1_fill(config, &l1_key, encoded);
                Ok(Some(value))
            }
            None => {
                strategy
                    .write_field_empty(self.store.as_ref(), hash_key, field, config)
                    .await?;
                self.l1_fill_empty(config, &l1_key);
                Ok(None)
            }
        }
    }

    /// L1 then L2, returning a terminal outcome or `None` for a full miss.
    async fn lookup_tiers<T>(
        &self,
        config: &CacheConfig,
        strategy: &dyn StorageStrategy,
        key: &str,
    ) -> CacheResult<Option<TierHit<T>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        match self.l1_lookup(config, key) {
            Some(L1Read::Empty) => return Ok(Some(TierHit::Empty)),
            Some(L1Read::Hit(value)) => match serde_json::from_value::<T>(value) {
                Ok(decoded) => {
                    debug!(%key, "L1 hit");
                    return Ok(Some(TierHit::Value(decoded)));
                }
                Err(err) => {
                    warn!(%key, error = %err, "undecodable L1 entry, falling through");
                    self.l1.evict(&config.name, key);
                }
            },
            None => {}
        }

        match strategy.read(self.store.as_ref(), key, config).await {
            Ok(StrategyRead::Hit(value)) => match serde_json::from_value::<T>(value.clone()) {
                Ok(decoded) => {
                    debug!(%key, "L2 hit");
                    self.l1_fill(config, key, value);
                    Ok(Some(TierHit::Value(decoded)))
                }
                Err(err) => {
                    warn!(%key, error = %err, "undecodable L2 value, reloading");
                    Ok(None)
                }
            },
            Ok(StrategyRead::Empty) => {
                debug!(%key, "empty marker hit, suppressing load");
                self.l1_fill_empty(config, key);
                Ok(Some(TierHit::Empty))
            }
            Ok(StrategyRead::Miss) => Ok(None),
            // Fail-open: a decode failure is a miss, repaired by reload.
            Err(err) if err.is_encoding() => {
                warn!(%key, error = %err, "decode failure on stored value, reloading");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn l1_lookup(&self, config: &CacheConfig, key: &str) -> Option<L1Read> {
        if config.l1_enabled() {
            self.l1.get(config, key)
        } else {
            None
        }
    }

    fn l1_fill(&self, config: &CacheConfig, key: &str, value: Value) {
        if let Some(ttl) = config.l1_ttl {
            self.l1.put(config, key, value, ttl);
        }
    }

    /// Remember the empty state locally, on the empty-result schedule.
    fn l1_fill_empty(&self, config: &CacheConfig, key: &str) {
        if config.l1_enabled() {
            self.l1.put_empty(config, key, config.empty_ttl);
        }
    }
}

/// Terminal outcome of a tier lookup.
enum TierHit<T> {
    Value(T),
    Empty,
}

impl<T> From<TierHit<T>> for Option<T> {
    fn from(hit: TierHit<T>) -> Self {
        match hit {
            TierHit::Value(value) => Some(value),
            TierHit::Empty => None,
        }
    }
}

fn decode_set<T>(key: &str, value: &Value) -> CacheResult<HashSet<T>>
where
    T: DeserializeOwned + Eq + Hash,
{
    let items = value
        .as_array()
        .ok_or_else(|| CacheError::encoding(key, "expected an array of set members"))?;
    items
        .iter()
        .map(|item| {
            serde_json::from_value(item.clone()).map_err(|err| CacheError::encoding(key, err))
        })
        .collect()
}
