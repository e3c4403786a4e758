//! Layercache core - configuration, key resolution, and error types.
//!
//! Pure data and pure functions; no I/O and no async. The engine crate
//! depends on this for everything it shares with callers: [`CacheConfig`]
//! and the [`CacheRegistry`], the deterministic key resolver, and the
//! error taxonomy.

pub mod config;
pub mod error;
pub mod key;

pub use config::{CacheConfig, CacheRegistry, CacheRegistryBuilder, StorageType};
pub use config::{DEFAULT_EMPTY_MARKER, DEFAULT_STRATEGY};
pub use error::{CacheError, CacheResult, ConfigError, KeyError, StoreError, StoreResult};
pub use key::{resolve, KeyPart, KeySpec, ResolvedKey, KEY_SEPARATOR};
