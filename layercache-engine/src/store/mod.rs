//! Remote (L2) store abstraction.
//!
//! [`L2Store`] is the thin adapter storage strategies talk to: get/set,
//! batch get/set, delete, and the container operations (hash fields, set
//! members, lists) that the structured storage types address. Values are
//! text at this layer; encoding is the strategy's concern.
//!
//! Every operation is key-local. No transaction spans multiple keys, and
//! per-key last-write-wins at the store is acceptable.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

use layercache_core::{ResolvedKey, StoreResult};

pub use memory::MemoryStore;

/// Contract over the shared remote key-value store.
///
/// Implementations must be safe for concurrent use from many tasks.
/// Accessors return `Ok(None)` for an absent key and
/// [`StoreError::WrongShape`](layercache_core::StoreError::WrongShape)
/// when the key exists but holds a different container kind, so callers
/// can tell "nothing there" from "something else there".
#[async_trait]
pub trait L2Store: Send + Sync {
    /// Read a text value.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a text value, replacing whatever was at the key.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;

    /// Batch read. The result is positionally aligned with `keys`.
    async fn get_multi(&self, keys: &[ResolvedKey]) -> StoreResult<Vec<Option<String>>>;

    /// Batch write with one shared TTL.
    async fn set_multi(
        &self,
        entries: &[(ResolvedKey, String)],
        ttl: Option<Duration>,
    ) -> StoreResult<()>;

    /// Remove a key of any shape. Returns true if it existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Whether a key of any shape exists.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Read one field of a hash.
    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// Write one field of a hash.
    ///
    /// The TTL applies to the whole structure and only when this write
    /// creates it; writing a field into an existing hash leaves the
    /// structure's TTL untouched.
    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> StoreResult<()>;

    /// Remove one field of a hash. Returns true if the field existed.
    async fn hash_delete(&self, key: &str, field: &str) -> StoreResult<bool>;

    /// Read all members of a set, or `None` if the key is absent.
    async fn set_members(&self, key: &str) -> StoreResult<Option<Vec<String>>>;

    /// Add members to a set, creating it if needed. TTL semantics match
    /// [`hash_set`](Self::hash_set): applied on creation only.
    async fn set_add(&self, key: &str, members: &[String], ttl: Option<Duration>)
        -> StoreResult<()>;

    /// Read all elements of a list, or `None` if the key is absent.
    async fn list_range(&self, key: &str) -> StoreResult<Option<Vec<String>>>;

    /// Replace the whole list at a key.
    async fn list_replace(
        &self,
        key: &str,
        items: &[String],
        ttl: Option<Duration>,
    ) -> StoreResult<()>;
}
