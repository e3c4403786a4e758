//! Two-tier read-through cache engine.
//!
//! Sits between application code and a slow source of truth with two
//! cache tiers: an in-process L1 (per-entry TTL, per-config hit/miss
//! counters) and a remote L2 key-value store behind the [`L2Store`]
//! trait. Reads go L1, then L2 through a pluggable [`StorageStrategy`],
//! and only then to the caller-supplied loader; loaded values are written
//! back to both tiers, and null loads are remembered as an empty marker
//! so absent keys cannot be used to hammer the source.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use layercache_core::{CacheConfig, CacheRegistry};
//! use layercache_engine::{CacheEngine, MemoryStore};
//!
//! # #[derive(serde::Serialize, serde::Deserialize)]
//! # struct User { id: u64 }
//! # async fn demo() -> layercache_core::CacheResult<()> {
//! let registry = Arc::new(
//!     CacheRegistry::builder()
//!         .register(
//!             CacheConfig::new("USER_CACHE", "app:user")
//!                 .with_l2_ttl(Duration::from_secs(600))
//!                 .with_l1_ttl(Duration::from_secs(60)),
//!         )
//!         .build()?,
//! );
//! let engine = CacheEngine::new(registry, Arc::new(MemoryStore::new()));
//!
//! let user: Option<User> = engine
//!     .fetch_data(
//!         "USER_CACHE",
//!         &|| async { Ok::<_, layercache_core::CacheError>(None) },
//!         &[serde_json::json!(1001)],
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod engine;
pub mod l1;
pub mod preload;
pub mod store;
pub mod strategy;

pub use admin::CacheAdmin;
pub use engine::{BatchSetLoader, CacheEngine, SourceLoader};
pub use l1::{L1Cache, L1Read, L1Stats};
pub use preload::group_by;
pub use store::{L2Store, MemoryStore};
pub use strategy::{
    GzipStrategy, JsonStrategy, StorageStrategy, StrategyRead, StrategyRegistry,
};
