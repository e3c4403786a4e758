//! In-process reference implementation of [`L2Store`].
//!
//! Backs the test suite and serves as the behavioral contract concrete
//! remote backends must match: per-key deadlines with lazy expiry, text
//! and container slots, and `WrongShape` errors when an operation meets a
//! different container kind than it addresses.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;

use layercache_core::{ResolvedKey, StoreError, StoreResult};

use super::L2Store;

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Text(String),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
    List(Vec<String>),
}

impl Slot {
    fn kind(&self) -> &'static str {
        match self {
            Slot::Text(_) => "text",
            Slot::Hash(_) => "hash",
            Slot::Set(_) => "set",
            Slot::List(_) => "list",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    slot: Slot,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(deadline) if deadline <= now)
    }
}

/// In-memory store with per-entry TTL.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys. Test/diagnostic surface.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Purge-if-expired, then hand the live entry to `f`.
    fn with_live<R>(
        &self,
        key: &str,
        f: impl FnOnce(Option<&mut Entry>) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(key) {
            if entry.is_expired(Instant::now()) {
                entries.remove(key);
            }
        }
        f(entries.get_mut(key))
    }

    fn insert(&self, key: &str, slot: Slot, ttl: Option<Duration>) {
        self.entries.write().insert(
            key.to_string(),
            Entry {
                slot,
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
    }

    fn wrong_shape(op: &'static str, key: &str) -> StoreError {
        StoreError::WrongShape {
            op,
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl L2Store for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.with_live(key, |entry| match entry {
            None => Ok(None),
            Some(entry) => match &entry.slot {
                Slot::Text(text) => Ok(Some(text.clone())),
                _ => Err(Self::wrong_shape("get", key)),
            },
        })
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        self.insert(key, Slot::Text(value.to_string()), ttl);
        Ok(())
    }

    async fn get_multi(&self, keys: &[ResolvedKey]) -> StoreResult<Vec<Option<String>>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(key).await?);
        }
        Ok(out)
    }

    async fn set_multi(
        &self,
        entries: &[(ResolvedKey, String)],
        ttl: Option<Duration>,
    ) -> StoreResult<()> {
        for (key, value) in entries {
            self.insert(key, Slot::Text(value.clone()), ttl);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut entries = self.entries.write();
        match entries.remove(key) {
            Some(entry) => Ok(!entry.is_expired(Instant::now())),
            None => Ok(false),
        }
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.with_live(key, |entry| Ok(entry.is_some()))
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.with_live(key, |entry| match entry {
            None => Ok(None),
            Some(entry) => match &entry.slot {
                Slot::Hash(fields) => Ok(fields.get(field).cloned()),
                _ => Err(Self::wrong_shape("hash_get", key)),
            },
        })
    }

    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> StoreResult<()> {
        self.with_live(key, |entry| match entry {
            None => Ok(None),
            Some(entry) => match &mut entry.slot {
                Slot::Hash(fields) => {
                    // TTL applies on creation only; an existing structure's
                    // deadline stays as it is.
                    fields.insert(field.to_string(), value.to_string());
                    Ok(Some(()))
                }
                _ => Err(Self::wrong_shape("hash_set", key)),
            },
        })?
        .map_or_else(
            || {
                let mut fields = HashMap::new();
                fields.insert(field.to_string(), value.to_string());
                self.insert(key, Slot::Hash(fields), ttl);
                Ok(())
            },
            Ok,
        )
    }

    async fn hash_delete(&self, key: &str, field: &str) -> StoreResult<bool> {
        self.with_live(key, |entry| match entry {
            None => Ok(false),
            Some(entry) => match &mut entry.slot {
                Slot::Hash(fields) => Ok(fields.remove(field).is_some()),
                _ => Err(Self::wrong_shape("hash_delete", key)),
            },
        })
    }

    async fn set_members(&self, key: &str) -> StoreResult<Option<Vec<String>>> {
        self.with_live(key, |entry| match entry {
            None => Ok(None),
            Some(entry) => match &entry.slot {
                Slot::Set(members) => Ok(Some(members.iter().cloned().collect())),
                _ => Err(Self::wrong_shape("set_members", key)),
            },
        })
    }

    async fn set_add(
        &self,
        key: &str,
        members: &[String],
        ttl: Option<Duration>,
    ) -> StoreResult<()> {
        self.with_live(key, |entry| match entry {
            None => Ok(None),
            Some(entry) => match &mut entry.slot {
                Slot::Set(existing) => {
                    existing.extend(members.iter().cloned());
                    Ok(Some(()))
                }
                _ => Err(Self::wrong_shape("set_add", key)),
            },
        })?
        .map_or_else(
            || {
                self.insert(key, Slot::Set(members.iter().cloned().collect()), ttl);
                Ok(())
            },
            Ok,
        )
    }

    async fn list_range(&self, key: &str) -> StoreResult<Option<Vec<String>>> {
        self.with_live(key, |entry| match entry {
            None => Ok(None),
            Some(entry) => match &entry.slot {
                Slot::List(items) => Ok(Some(items.clone())),
                _ => Err(Self::wrong_shape("list_range", key)),
            },
        })
    }

    async fn list_replace(
        &self,
        key: &str,
        items: &[String],
        ttl: Option<Duration>,
    ) -> StoreResult<()> {
        self.insert(key, Slot::List(items.to_vec()), ttl);
        Ok(())
    }
}
