//! Default storage strategy: serde_json text encoding.
//!
//! Scalar and page values are stored as one serialized text value per key.
//! List and set configs address the store's native containers, one
//! serialized element per member. Hash configs address single fields of a
//! shared structure. The empty marker is always stored as plain text at
//! the key (or field), with the config's shorter empty TTL.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use layercache_core::{CacheConfig, CacheError, CacheResult, ResolvedKey, StorageType, StoreError};

use crate::store::L2Store;

use super::{empty_ttl, value_ttl, StorageStrategy, StrategyRead};

/// The built-in `json` strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonStrategy;

impl JsonStrategy {
    pub fn new() -> Self {
        Self
    }

    fn decode(key: &str, text: &str) -> CacheResult<Value> {
        serde_json::from_str(text).map_err(|err| CacheError::encoding(key, err))
    }

    fn encode(key: &str, value: &Value) -> CacheResult<String> {
        serde_json::to_string(value).map_err(|err| CacheError::encoding(key, err))
    }

    fn encode_elements(key: &str, value: &Value) -> CacheResult<Vec<String>> {
        let items = value.as_array().ok_or_else(|| {
            CacheError::encoding(key, "container storage types expect an array value")
        })?;
        items.iter().map(|item| Self::encode(key, item)).collect()
    }

    fn decode_elements(key: &str, members: &[String]) -> CacheResult<Value> {
        let items = members
            .iter()
            .map(|member| Self::decode(key, member))
            .collect::<CacheResult<Vec<_>>>()?;
        Ok(Value::Array(items))
    }

    /// Container read with marker fallthrough: a `WrongShape` from the
    /// container accessor means the key may hold the text marker instead.
    async fn read_container(
        &self,
        store: &dyn L2Store,
        key: &str,
        config: &CacheConfig,
        members: Result<Option<Vec<String>>, StoreError>,
    ) -> CacheResult<StrategyRead> {
        match members {
            Ok(Some(members)) => Ok(StrategyRead::Hit(Self::decode_elements(key, &members)?)),
            Ok(None) => Ok(StrategyRead::Miss),
            Err(StoreError::WrongShape { .. }) => match store.get(key).await? {
                Some(text) if text == config.empty_marker => Ok(StrategyRead::Empty),
                Some(_) => Err(CacheError::encoding(
                    key,
                    "expected a container or the empty marker",
                )),
                None => Ok(StrategyRead::Miss),
            },
            Err(err) => Err(err.into()),
        }
    }

    fn read_text(config: &CacheConfig, key: &str, text: Option<String>) -> CacheResult<StrategyRead> {
        match text {
            None => Ok(StrategyRead::Miss),
            Some(text) if text == config.empty_marker => Ok(StrategyRead::Empty),
            Some(text) => Ok(StrategyRead::Hit(Self::decode(key, &text)?)),
        }
    }
}

#[async_trait]
impl StorageStrategy for JsonStrategy {
    fn name(&self) -> &'static str {
        "json"
    }

    async fn read(
        &self,
        store: &dyn L2Store,
        key: &str,
        config: &CacheConfig,
    ) -> CacheResult<StrategyRead> {
        match config.storage_type {
            StorageType::Set => {
                let members = store.set_members(key).await;
                self.read_container(store, key, config, members).await
            }
            StorageType::List => {
                let items = store.list_range(key).await;
                self.read_container(store, key, config, items).await
            }
            StorageType::Scalar | StorageType::Page | StorageType::Hash => {
                Self::read_text(config, key, store.get(key).await?)
            }
        }
    }

    async fn read_multi(
        &self,
        store: &dyn L2Store,
        keys: &[ResolvedKey],
        config: &CacheConfig,
    ) -> CacheResult<HashMap<ResolvedKey, StrategyRead>> {
        let mut out = HashMap::with_capacity(keys.len());
        match config.storage_type {
            StorageType::Scalar | StorageType::Page | StorageType::Hash => {
                let texts = store.get_multi(keys).await?;
                for (key, text) in keys.iter().zip(texts) {
                    match Self::read_text(config, key, text) {
                        Ok(StrategyRead::Miss) => {}
                        Ok(read) => {
                            out.insert(key.clone(), read);
                        }
                        // One undecodable key must not poison the batch:
                        // report it as a miss so the caller reloads it.
                        Err(err) if err.is_encoding() => {
                            warn!(%key, error = %err, "undecodable batch entry treated as miss");
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
            StorageType::Set | StorageType::List => {
                for key in keys {
                    match self.read(store, key, config).await {
                        Ok(StrategyRead::Miss) => {}
                        Ok(read) => {
                            out.insert(key.clone(), read);
                        }
                        Err(err) if err.is_encoding() => {
                            warn!(%key, error = %err, "undecodable batch entry treated as miss");
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
        }
        Ok(out)
    }

    async fn write(
        &self,
        store: &dyn L2Store,
        key: &str,
        value: &Value,
        config: &CacheConfig,
    ) -> CacheResult<()> {
        match config.storage_type {
            StorageType::Set => {
                let members = Self::encode_elements(key, value)?;
                // Replace semantics: clear whatever is there (possibly a
                // text marker) before adding members.
                store.delete(key).await?;
                store.set_add(key, &members, value_ttl(config)).await?;
            }
            StorageType::List => {
                let items = Self::encode_elements(key, value)?;
                store.list_replace(key, &items, value_ttl(config)).await?;
            }
            StorageType::Scalar | StorageType::Page | StorageType::Hash => {
                let text = Self::encode(key, value)?;
                store.set(key, &text, value_ttl(config)).await?;
            }
        }
        debug!(%key, storage_type = config.storage_type.as_str(), "wrote value to remote tier");
        Ok(())
    }

    async fn write_multi(
        &self,
        store: &dyn L2Store,
        entries: &HashMap<ResolvedKey, Value>,
        config: &CacheConfig,
    ) -> CacheResult<()> {
        match config.storage_type {
            StorageType::Scalar | StorageType::Page | StorageType::Hash => {
                let mut batch = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    batch.push((key.clone(), Self::encode(key, value)?));
                }
                store.set_multi(&batch, value_ttl(config)).await?;
            }
            StorageType::Set | StorageType::List => {
                for (key, value) in entries {
                    self.write(store, key, value, config).await?;
                }
            }
        }
        Ok(())
    }

    async fn write_empty(
        &self,
        store: &dyn L2Store,
        key: &str,
        config: &CacheConfig,
    ) -> CacheResult<()> {
        store
            .set(key, &config.empty_marker, empty_ttl(config))
            .await?;
        debug!(%key, "stored empty marker");
        Ok(())
    }

    async fn write_multi_empty(
        &self,
        store: &dyn L2Store,
        keys: &[ResolvedKey],
        config: &CacheConfig,
    ) -> CacheResult<()> {
        let entries: Vec<(ResolvedKey, String)> = keys
            .iter()
            .map(|key| (key.clone(), config.empty_marker.clone()))
            .collect();
        store.set_multi(&entries, empty_ttl(config)).await?;
        Ok(())
    }

    async fn read_field(
        &self,
        store: &dyn L2Store,
        key: &str,
        field: &str,
        config: &CacheConfig,
    ) -> CacheResult<StrategyRead> {
        let addressed = format!("{key}:{field}");
        Self::read_text(config, &addressed, store.hash_get(key, field).await?)
    }

    async fn write_field(
        &self,
        store: &dyn L2Store,
        key: &str,
        field: &str,
        value: &Value,
        config: &CacheConfig,
    ) -> CacheResult<()> {
        let text = Self::encode(key, value)?;
        store
            .hash_set(key, field, &text, value_ttl(config))
            .await?;
        Ok(())
    }

    async fn write_field_empty(
        &self,
        store: &dyn L2Store,
        key: &str,
        field: &str,
        config: &CacheConfig,
    ) -> CacheResult<()> {
        // Policy for marker writes into a shared structure: the structure's
        // TTL is set only if this write creates it, and is otherwise left
        // untouched. The marker then lives as long as the structure does.
        warn!(%key, %field, "storing empty marker in a shared hash field");
        store
            .hash_set(key, field, &config.empty_marker, empty_ttl(config))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn config(storage_type: StorageType) -> CacheConfig {
        CacheConfig::new("JSON_TEST", "json:test").with_storage_type(storage_type)
    }

    #[tokio::test]
    async fn test_scalar_roundtrip() {
        let store = MemoryStore::new();
        let strategy = JsonStrategy::new();
        let cfg = config(StorageType::Scalar);
        let value = json!({"id": 1001, "name": "User-1001"});

        strategy.write(&store, "json:test:1001", &value, &cfg).await.unwrap();
        let read = strategy.read(&store, "json:test:1001", &cfg).await.unwrap();
        assert_eq!(read, StrategyRead::Hit(value));
    }

    #[tokio::test]
    async fn test_absent_key_is_miss() {
        let store = MemoryStore::new();
        let strategy = JsonStrategy::new();
        let cfg = config(StorageType::Scalar);
        let read = strategy.read(&store, "json:test:nope", &cfg).await.unwrap();
        assert_eq!(read, StrategyRead::Miss);
    }

    #[tokio::test]
    async fn test_marker_reads_as_empty_not_data() {
        let store = MemoryStore::new();
        let strategy = JsonStrategy::new();
        let cfg = config(StorageType::Scalar);

        strategy.write_empty(&store, "json:test:9999", &cfg).await.unwrap();
        let read = strategy.read(&store, "json:test:9999", &cfg).await.unwrap();
        assert_eq!(read, StrategyRead::Empty);
    }

    #[tokio::test]
    async fn test_undecodable_value_is_encoding_error() {
        let store = MemoryStore::new();
        let strategy = JsonStrategy::new();
        let cfg = config(StorageType::Scalar);

        store.set("json:test:bad", "{not-json", None).await.unwrap();
        let err = strategy.read(&store, "json:test:bad", &cfg).await.unwrap_err();
        assert!(err.is_encoding());
    }

    #[tokio::test]
    async fn test_set_storage_uses_native_container() {
        let store = MemoryStore::new();
        let strategy = JsonStrategy::new();
        let cfg = config(StorageType::Set);

        strategy
            .write(&store, "json:test:fans", &json!([1, 2, 3]), &cfg)
            .await
            .unwrap();

        // Physically a set of serialized members.
        let mut members = store.set_members("json:test:fans").await.unwrap().unwrap();
        members.sort();
        assert_eq!(members, vec!["1", "2", "3"]);

        let read = strategy.read(&store, "json:test:fans", &cfg).await.unwrap();
        match read {
            StrategyRead::Hit(Value::Array(items)) => assert_eq!(items.len(), 3),
            other => panic!("expected array hit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_set_marker_fallthrough() {
        let store = MemoryStore::new();
        let strategy = JsonStrategy::new();
        let cfg = config(StorageType::Set);

        strategy.write_empty(&store, "json:test:fans", &cfg).await.unwrap();
        let read = strategy.read(&store, "json:test:fans", &cfg).await.unwrap();
        assert_eq!(read, StrategyRead::Empty);

        // And a real write replaces the marker cleanly.
        strategy
            .write(&store, "json:test:fans", &json!([7]), &cfg)
            .await
            .unwrap();
        let read = strategy.read(&store, "json:test:fans", &cfg).await.unwrap();
        assert_eq!(read, StrategyRead::Hit(json!([7])));
    }

    #[tokio::test]
    async fn test_list_storage_preserves_order() {
        let store = MemoryStore::new();
        let strategy = JsonStrategy::new();
        let cfg = config(StorageType::List);
        let value = json!([{"name": "A"}, {"name": "B"}]);

        strategy.write(&store, "json:test:list", &value, &cfg).await.unwrap();
        let read = strategy.read(&store, "json:test:list", &cfg).await.unwrap();
        assert_eq!(read, StrategyRead::Hit(value));
    }

    #[tokio::test]
    async fn test_container_write_rejects_non_array() {
        let store = MemoryStore::new();
        let strategy = JsonStrategy::new();
        let cfg = config(StorageType::Set);

        let err = strategy
            .write(&store, "json:test:fans", &json!({"not": "array"}), &cfg)
            .await
            .unwrap_err();
        assert!(err.is_encoding());
    }

    #[tokio::test]
    async fn test_read_multi_three_states() {
        let store = MemoryStore::new();
        let strategy = JsonStrategy::new();
        let cfg = config(StorageType::Scalar);

        strategy.write(&store, "k:hit", &json!(1), &cfg).await.unwrap();
        strategy.write_empty(&store, "k:empty", &cfg).await.unwrap();
        store.set("k:bad", "~garbage~", None).await.unwrap();

        let keys = vec![
            "k:hit".to_string(),
            "k:empty".to_string(),
            "k:miss".to_string(),
            "k:bad".to_string(),
        ];
        let out = strategy.read_multi(&store, &keys, &cfg).await.unwrap();

        assert_eq!(out.get("k:hit"), Some(&StrategyRead::Hit(json!(1))));
        assert_eq!(out.get("k:empty"), Some(&StrategyRead::Empty));
        assert_eq!(out.get("k:miss"), None);
        // Undecodable entry is a miss, not a batch failure.
        assert_eq!(out.get("k:bad"), None);
    }

    #[tokio::test]
    async fn test_hash_field_roundtrip_and_marker() {
        let store = MemoryStore::new();
        let strategy = JsonStrategy::new();
        let cfg = config(StorageType::Hash);

        strategy
            .write_field(&store, "json:test:hash", "1001", &json!({"name": "HashUser1"}), &cfg)
            .await
            .unwrap();
        let read = strategy
            .read_field(&store, "json:test:hash", "1001", &cfg)
            .await
            .unwrap();
        assert_eq!(read, StrategyRead::Hit(json!({"name": "HashUser1"})));

        strategy
            .write_field_empty(&store, "json:test:hash", "absent", &cfg)
            .await
            .unwrap();
        let read = strategy
            .read_field(&store, "json:test:hash", "absent", &cfg)
            .await
            .unwrap();
        assert_eq!(read, StrategyRead::Empty);
    }
}
