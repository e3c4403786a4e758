//! Deterministic key resolution.
//!
//! A cache key is the config namespace joined with an ordered list of key
//! parts derived from the call arguments: `<namespace>:<part1>:<part2>:...`.
//! Key derivation is declared once, when the config is registered, not
//! interpreted per call. Resolution is a pure function: the same config and
//! the same ordered argument values always produce the same key, and any
//! missing argument or field fails fast instead of producing a degenerate
//! key.

use serde_json::Value;

use crate::config::CacheConfig;
use crate::error::KeyError;

/// Separator between the namespace and each key part.
pub const KEY_SEPARATOR: char = ':';

/// A fully resolved cache key.
pub type ResolvedKey = String;

/// One part of a cache key, derived from the call arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPart {
    /// Render the nth argument as a string. The argument must be a scalar
    /// (string, number, or bool).
    Positional(usize),
    /// Extract a dotted field path out of a structured (JSON object)
    /// argument, e.g. `arg: 0, path: "tenant.id"`.
    Field { arg: usize, path: String },
}

impl KeyPart {
    /// Convenience constructor for a field extraction part.
    pub fn field(arg: usize, path: impl Into<String>) -> Self {
        Self::Field {
            arg,
            path: path.into(),
        }
    }
}

/// Declarative key derivation over the call arguments.
///
/// Declared at config-registration time. The default takes every provided
/// argument, in order, which is what most configs want.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KeySpec {
    /// Every argument, in the order given. Arity is whatever the caller
    /// passes; two calls with different argument lists resolve to
    /// different keys.
    #[default]
    AllPositional,
    /// An explicit ordered list of parts.
    Parts(Vec<KeyPart>),
}

impl KeySpec {
    /// Build a spec from an explicit part list.
    pub fn parts(parts: Vec<KeyPart>) -> Self {
        Self::Parts(parts)
    }
}

/// Resolve a cache key from a config and the ordered argument values.
pub fn resolve(config: &CacheConfig, args: &[Value]) -> Result<ResolvedKey, KeyError> {
    let mut key = String::with_capacity(config.namespace.len() + 16);
    key.push_str(&config.namespace);

    match &config.key_spec {
        KeySpec::AllPositional => {
            for (index, arg) in args.iter().enumerate() {
                key.push(KEY_SEPARATOR);
                key.push_str(&render_scalar(arg, index)?);
            }
        }
        KeySpec::Parts(parts) => {
            for part in parts {
                key.push(KEY_SEPARATOR);
                key.push_str(&resolve_part(part, args)?);
            }
        }
    }

    Ok(key)
}

fn resolve_part(part: &KeyPart, args: &[Value]) -> Result<String, KeyError> {
    match part {
        KeyPart::Positional(index) => {
            let arg = args.get(*index).ok_or(KeyError::MissingArgument {
                index: *index,
                provided: args.len(),
            })?;
            render_scalar(arg, *index)
        }
        KeyPart::Field { arg, path } => {
            let root = args.get(*arg).ok_or(KeyError::MissingArgument {
                index: *arg,
                provided: args.len(),
            })?;
            let value = extract_path(root, path).ok_or_else(|| KeyError::MissingField {
                arg: *arg,
                path: path.clone(),
            })?;
            render_scalar(value, *arg)
        }
    }
}

/// Walk a dotted path through nested JSON objects.
fn extract_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Render a scalar JSON value as a key part.
///
/// Null, arrays, and objects are rejected: they have no canonical string
/// form and would silently collapse distinct calls onto one key.
fn render_scalar(value: &Value, arg: usize) -> Result<String, KeyError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => Err(KeyError::NonScalar { arg }),
    }
}

/// Join pre-rendered parts onto a namespace.
///
/// Used by callers that build keys by hand (e.g. union-fetch key lists)
/// and by preload, so the format stays in one place.
pub fn join(namespace: &str, parts: &[&str]) -> ResolvedKey {
    let mut key = String::from(namespace);
    for part in parts {
        key.push(KEY_SEPARATOR);
        key.push_str(part);
    }
    key
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use crate::config::CacheConfig;
    use proptest::prelude::*;
    use serde_json::json;

    /// Strategy for scalar key-part arguments.
    fn scalar_arg_strategy() -> impl Strategy<Value = serde_json::Value> {
        prop_oneof![
            "[a-zA-Z0-9_-]{0,12}".prop_map(|s| json!(s)),
            any::<i64>().prop_map(|n| json!(n)),
            any::<bool>().prop_map(|b| json!(b)),
        ]
    }

    proptest! {
        /// Property: resolving the same config and the same ordered argument
        /// values twice yields the same key.
        #[test]
        fn prop_resolution_is_deterministic(
            args in proptest::collection::vec(scalar_arg_strategy(), 0..6)
        ) {
            let config = CacheConfig::new("PROP", "prop:ns");
            let first = resolve(&config, &args);
            let second = resolve(&config, &args);
            prop_assert_eq!(first, second);
        }

        /// Property: every resolved key starts with the namespace, and the
        /// part count matches the argument count.
        #[test]
        fn prop_key_shape(
            args in proptest::collection::vec(any::<u32>().prop_map(|n| json!(n)), 0..6)
        ) {
            let config = CacheConfig::new("PROP", "prop:ns");
            let key = resolve(&config, &args).unwrap();
            prop_assert!(key.starts_with("prop:ns"));
            let suffix = &key["prop:ns".len()..];
            let parts = suffix.split(KEY_SEPARATOR).filter(|p| !p.is_empty()).count();
            prop_assert_eq!(parts, args.len());
        }

        /// Property: numeric arguments that differ resolve to different keys.
        #[test]
        fn prop_distinct_numeric_args_distinct_keys(a in any::<i64>(), b in any::<i64>()) {
            prop_assume!(a != b);
            let config = CacheConfig::new("PROP", "prop:ns");
            let key_a = resolve(&config, &[json!(a)]).unwrap();
            let key_b = resolve(&config, &[json!(b)]).unwrap();
            prop_assert_ne!(key_a, key_b);
        }
    }
}
