//! Error types for layercache operations

use thiserror::Error;

/// Key resolution errors.
///
/// These are fatal to the call that produced them: a key that cannot be
/// resolved deterministically must never be silently degraded into a
/// catch-all key.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("key part references argument {index}, but only {provided} arguments were given")]
    MissingArgument { index: usize, provided: usize },

    #[error("field path `{path}` not found in argument {arg}")]
    MissingField { arg: usize, path: String },

    #[error("key part from argument {arg} is not a scalar value")]
    NonScalar { arg: usize },

    #[error("no cache config registered under `{name}`")]
    UnknownConfig { name: String },
}

/// Configuration errors, raised when the registry is built.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("duplicate cache config name `{name}`")]
    DuplicateName { name: String },

    #[error("cache config `{name}` has an empty namespace")]
    EmptyNamespace { name: String },

    #[error("cache config `{name}` has an empty marker that is not distinguishable: {reason}")]
    InvalidEmptyMarker { name: String, reason: String },
}

/// Remote store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("remote store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("store operation `{op}` failed on key `{key}`: {reason}")]
    OperationFailed {
        op: &'static str,
        key: String,
        reason: String,
    },

    #[error("value at `{key}` has the wrong shape for `{op}`")]
    WrongShape { op: &'static str, key: String },
}

/// Top-level cache engine error.
///
/// `Encoding` is special: the fetch coordinator treats a decode failure on
/// stored data as a miss and re-invokes the loader (fail-open). All other
/// variants are surfaced to the caller.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode or decode cached value at `{key}`: {reason}")]
    Encoding { key: String, reason: String },

    #[error("strategy `{strategy}` does not support `{operation}`")]
    Unsupported {
        strategy: String,
        operation: &'static str,
    },

    #[error("no storage strategy registered under `{name}`")]
    UnknownStrategy { name: String },

    #[error("source load failed: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl CacheError {
    /// Wrap an arbitrary loader failure.
    ///
    /// Loader errors propagate to the caller unchanged in meaning; no cache
    /// write happens on the failing path.
    pub fn source<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Source(Box::new(err))
    }

    /// Shorthand for a decode/encode failure at a given key.
    pub fn encoding(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::Encoding {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if this error is a fail-open decode error.
    pub fn is_encoding(&self) -> bool {
        matches!(self, Self::Encoding { .. })
    }
}

/// Result type for all cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Result type for raw store operations.
pub type StoreResult<T> = Result<T, StoreError>;
