//! Bulk cache warming.
//!
//! Startup-time population of a config's keyspace from records already in
//! hand, so the first wave of traffic hits warm entries instead of
//! stampeding the source. Records are grouped by partition key; each
//! partition becomes one cache entry at the key resolved from that
//! partition value.

use std::collections::HashMap;
use std::hash::Hash;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use layercache_core::{resolve, CacheError, CacheResult, ResolvedKey};

use crate::engine::CacheEngine;

impl CacheEngine {
    /// Write every partition's records to the remote tier in one batch.
    ///
    /// Each map entry becomes one cache entry: the key is resolved from
    /// the partition value through the config's key spec, and the value is
    /// the record list encoded by the config's strategy. Existing entries
    /// at those keys are overwritten. L1 is not touched; it fills lazily
    /// on the first read after preload. Returns the number of partitions
    /// written.
    ///
    /// Strategies without batch support (such as `gzip`) fail the whole
    /// call with [`CacheError::Unsupported`].
    pub async fn preload<T>(
        &self,
        config_name: &str,
        groups: HashMap<String, Vec<T>>,
    ) -> CacheResult<usize>
    where
        T: Serialize,
    {
        let config = self.registry.get(config_name)?;
        let strategy = self.strategy_for(config)?;

        if groups.is_empty() {
            debug!(config = %config.name, "preload called with no records");
            return Ok(0);
        }

        let mut entries: HashMap<ResolvedKey, Value> = HashMap::with_capacity(groups.len());
        for (partition, records) in &groups {
            let key = resolve(config, &[json!(partition)])?;
            let mut items = Vec::with_capacity(records.len());
            for record in records {
                items.push(
                    serde_json::to_value(record).map_err(|err| CacheError::encoding(&key, err))?,
                );
            }
            entries.insert(key, Value::Array(items));
        }

        let count = entries.len();
        strategy
            .write_multi(self.store.as_ref(), &entries, config)
            .await?;

        info!(config = %config.name, partitions = count, "cache preloaded");
        Ok(count)
    }
}

/// Group records by a derived partition key, preserving input order within
/// each group. Companion to [`CacheEngine::preload`].
pub fn group_by<T, K, F>(items: Vec<T>, key_fn: F) -> HashMap<K, Vec<T>>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut groups: HashMap<K, Vec<T>> = HashMap::new();
    for item in items {
        groups.entry(key_fn(&item)).or_default().push(item);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SourceLoader;
    use crate::store::{L2Store, MemoryStore};
    use async_trait::async_trait;
    use layercache_core::{CacheConfig, CacheRegistry, StorageType};
    use serde::Deserialize;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestUser {
        id: u64,
        tenant_id: String,
        name: String,
    }

    fn user(id: u64, tenant: &str) -> TestUser {
        TestUser {
            id,
            tenant_id: tenant.to_string(),
            name: format!("User-{id}"),
        }
    }

    struct PanicLoader;

    #[async_trait]
    impl SourceLoader<Vec<TestUser>> for PanicLoader {
        async fn load(&self) -> CacheResult<Option<Vec<TestUser>>> {
            panic!("loader must not be invoked after preload");
        }
    }

    fn engine() -> (CacheEngine, Arc<MemoryStore>) {
        let registry = Arc::new(
            CacheRegistry::builder()
                .register(
                    CacheConfig::new("TENANT_USERS", "test:user:tenant")
                        .with_l1_ttl(Duration::from_secs(30)),
                )
                .register(
                    CacheConfig::new("TENANT_GZIP", "test:user:gz").with_strategy("gzip"),
                )
                .build()
                .unwrap(),
        );
        let store = Arc::new(MemoryStore::new());
        let engine = CacheEngine::new(registry, store.clone());
        (engine, store)
    }

    #[tokio::test]
    async fn test_preload_writes_one_entry_per_partition() {
        let (engine, store) = engine();
        let records = vec![
            user(2001, "tenant001"),
            user(2002, "tenant001"),
            user(2003, "tenant002"),
        ];
        let groups = group_by(records, |u| u.tenant_id.clone());

        let written = engine.preload("TENANT_USERS", groups).await.unwrap();
        assert_eq!(written, 2);
        assert!(store.exists("test:user:tenant:tenant001").await.unwrap());
        assert!(store.exists("test:user:tenant:tenant002").await.unwrap());
    }

    #[tokio::test]
    async fn test_preloaded_partition_serves_fetches_without_loader() {
        let (engine, _) = engine();
        let groups = group_by(vec![user(2001, "tenant001"), user(2002, "tenant001")], |u| {
            u.tenant_id.clone()
        });
        engine.preload("TENANT_USERS", groups).await.unwrap();

        let got: Option<Vec<TestUser>> = engine
            .fetch_data(
                "TENANT_USERS",
                &PanicLoader,
                &[serde_json::json!("tenant001")],
            )
            .await
            .unwrap();
        let got = got.unwrap();
        assert_eq!(got.len(), 2);
        assert!(got.contains(&user(2001, "tenant001")));
    }

    #[tokio::test]
    async fn test_preload_overwrites_existing_entries() {
        let (engine, store) = engine();
        engine
            .preload(
                "TENANT_USERS",
                group_by(vec![user(1, "t1")], |u| u.tenant_id.clone()),
            )
            .await
            .unwrap();
        engine
            .preload(
                "TENANT_USERS",
                group_by(vec![user(2, "t1")], |u| u.tenant_id.clone()),
            )
            .await
            .unwrap();

        let raw = store.get("test:user:tenant:t1").await.unwrap().unwrap();
        assert!(raw.contains("User-2"));
        assert!(!raw.contains("User-1"));
    }

    #[tokio::test]
    async fn test_preload_empty_input_is_a_noop() {
        let (engine, store) = engine();
        let written = engine
            .preload::<TestUser>("TENANT_USERS", HashMap::new())
            .await
            .unwrap();
        assert_eq!(written, 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_preload_through_batchless_strategy_fails_loudly() {
        let (engine, _) = engine();
        let err = engine
            .preload(
                "TENANT_GZIP",
                group_by(vec![user(1, "t1")], |u| u.tenant_id.clone()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Unsupported { .. }));
    }

    #[test]
    fn test_group_by_preserves_order_within_groups() {
        let groups = group_by(vec![1, 2, 3, 4, 5, 6], |n| n % 2);
        assert_eq!(groups[&0], vec![2, 4, 6]);
        assert_eq!(groups[&1], vec![1, 3, 5]);
    }
}
