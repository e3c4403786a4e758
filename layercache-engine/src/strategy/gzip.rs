//! Compressed storage strategy: JSON -> gzip -> base64 text.
//!
//! Meant for oversized values (long articles, large pages) where space in
//! the remote tier matters more than the CPU spent compressing. Values of
//! any storage type are treated as one compressed text value at one key.
//!
//! The empty marker is stored as plain, uncompressed text so the
//! anti-penetration path never runs the decompressor; conversely, the
//! read path rejects the marker as non-compressed input before decoding.
//! Batch operations are not implemented and fail with an explicit
//! `Unsupported` error.

use std::collections::HashMap;
use std::io::{Read, Write};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;
use tracing::debug;

use layercache_core::{CacheConfig, CacheError, CacheResult, ResolvedKey};

use crate::store::L2Store;

use super::{empty_ttl, value_ttl, StorageStrategy, StrategyRead};

/// The built-in `gzip` strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct GzipStrategy;

impl GzipStrategy {
    pub fn new() -> Self {
        Self
    }

    fn compress(key: &str, json: &str) -> CacheResult<String> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(json.as_bytes())
            .map_err(|err| CacheError::encoding(key, err))?;
        let bytes = encoder
            .finish()
            .map_err(|err| CacheError::encoding(key, err))?;
        Ok(BASE64.encode(bytes))
    }

    fn decompress(key: &str, text: &str) -> CacheResult<String> {
        let bytes = BASE64
            .decode(text)
            .map_err(|err| CacheError::encoding(key, err))?;
        let mut json = String::new();
        GzDecoder::new(bytes.as_slice())
            .read_to_string(&mut json)
            .map_err(|err| CacheError::encoding(key, err))?;
        Ok(json)
    }
}

#[async_trait]
impl StorageStrategy for GzipStrategy {
    fn name(&self) -> &'static str {
        "gzip"
    }

    async fn read(
        &self,
        store: &dyn L2Store,
        key: &str,
        config: &CacheConfig,
    ) -> CacheResult<StrategyRead> {
        match store.get(key).await? {
            None => Ok(StrategyRead::Miss),
            Some(text) if text == config.empty_marker => Ok(StrategyRead::Empty),
            Some(text) => {
                let json = Self::decompress(key, &text)?;
                let value =
                    serde_json::from_str(&json).map_err(|err| CacheError::encoding(key, err))?;
                Ok(StrategyRead::Hit(value))
            }
        }
    }

    async fn read_multi(
        &self,
        _store: &dyn L2Store,
        _keys: &[ResolvedKey],
        _config: &CacheConfig,
    ) -> CacheResult<HashMap<ResolvedKey, StrategyRead>> {
        Err(CacheError::Unsupported {
            strategy: self.name().to_string(),
            operation: "read_multi",
        })
    }

    async fn write(
        &self,
        store: &dyn L2Store,
        key: &str,
        value: &Value,
        config: &CacheConfig,
    ) -> CacheResult<()> {
        let json = serde_json::to_string(value).map_err(|err| CacheError::encoding(key, err))?;
        let compressed = Self::compress(key, &json)?;
        debug!(
            %key,
            original_len = json.len(),
            compressed_len = compressed.len(),
            "gzip write"
        );
        store.set(key, &compressed, value_ttl(config)).await?;
        Ok(())
    }

    async fn write_multi(
        &self,
        _store: &dyn L2Store,
        _entries: &HashMap<ResolvedKey, Value>,
        _config: &CacheConfig,
    ) -> CacheResult<()> {
        Err(CacheError::Unsupported {
            strategy: self.name().to_string(),
            operation: "write_multi",
        })
    }

    async fn write_empty(
        &self,
        store: &dyn L2Store,
        key: &str,
        config: &CacheConfig,
    ) -> CacheResult<()> {
        // Markers are stored as plain text, never compressed.
        store
            .set(key, &config.empty_marker, empty_ttl(config))
            .await?;
        Ok(())
    }

    async fn write_multi_empty(
        &self,
        _store: &dyn L2Store,
        _keys: &[ResolvedKey],
        _config: &CacheConfig,
    ) -> CacheResult<()> {
        Err(CacheError::Unsupported {
            strategy: self.name().to_string(),
            operation: "write_multi_empty",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn config() -> CacheConfig {
        CacheConfig::new("TEST_GZIP_CACHE", "test:gzip:article").with_strategy("gzip")
    }

    fn long_article() -> Value {
        let content =
            "This is a very long text repeated to test compression efficiency. ".repeat(100);
        json!({"id": 888, "title": "Big News", "content": content})
    }

    #[tokio::test]
    async fn test_roundtrip_restores_exactly() {
        let store = MemoryStore::new();
        let strategy = GzipStrategy::new();
        let cfg = config();
        let article = long_article();

        strategy
            .write(&store, "test:gzip:article:888", &article, &cfg)
            .await
            .unwrap();
        let read = strategy
            .read(&store, "test:gzip:article:888", &cfg)
            .await
            .unwrap();
        assert_eq!(read, StrategyRead::Hit(article));
    }

    #[tokio::test]
    async fn test_stored_text_is_compressed_base64() {
        let store = MemoryStore::new();
        let strategy = GzipStrategy::new();
        let cfg = config();
        let article = long_article();
        let original_len = serde_json::to_string(&article).unwrap().len();

        strategy
            .write(&store, "test:gzip:article:888", &article, &cfg)
            .await
            .unwrap();

        let stored = store.get("test:gzip:article:888").await.unwrap().unwrap();
        assert!(!stored.starts_with('{'));
        assert!(stored
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '='));
        // Repetitive text compresses well; well under half the original.
        assert!(stored.len() < original_len / 2);
    }

    #[tokio::test]
    async fn test_marker_is_plain_text_and_reads_empty() {
        let store = MemoryStore::new();
        let strategy = GzipStrategy::new();
        let cfg = config();

        strategy
            .write_empty(&store, "test:gzip:article:9999", &cfg)
            .await
            .unwrap();
        let stored = store.get("test:gzip:article:9999").await.unwrap().unwrap();
        assert_eq!(stored, cfg.empty_marker);

        let read = strategy
            .read(&store, "test:gzip:article:9999", &cfg)
            .await
            .unwrap();
        assert_eq!(read, StrategyRead::Empty);
    }

    #[tokio::test]
    async fn test_non_compressed_garbage_is_encoding_error() {
        let store = MemoryStore::new();
        let strategy = GzipStrategy::new();
        let cfg = config();

        store
            .set("test:gzip:article:bad", "definitely not gzip!", None)
            .await
            .unwrap();
        let err = strategy
            .read(&store, "test:gzip:article:bad", &cfg)
            .await
            .unwrap_err();
        assert!(err.is_encoding());
    }

    #[tokio::test]
    async fn test_batch_paths_are_unsupported() {
        let store = MemoryStore::new();
        let strategy = GzipStrategy::new();
        let cfg = config();
        let keys = vec!["a".to_string()];

        let err = strategy.read_multi(&store, &keys, &cfg).await.unwrap_err();
        assert!(matches!(
            err,
            CacheError::Unsupported {
                operation: "read_multi",
                ..
            }
        ));

        let err = strategy
            .write_multi_empty(&store, &keys, &cfg)
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Unsupported { .. }));

        let err = strategy
            .write_multi(&store, &HashMap::new(), &cfg)
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Unsupported { .. }));
    }
}
