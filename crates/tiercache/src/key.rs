//! Namespaced cache keys.
//!
//! ## Key Format
//!
//! `{namespace}:{id}` (e.g. `menu-analysis:item:42`)
//!
//! Namespace names are restricted to `[A-Za-z0-9_.-]`, so `{namespace}:` is never a
//! prefix of another namespace's keys and `{namespace}:*` is a safe Redis
//! `SCAN MATCH` pattern. The id part is free-form.

use std::fmt;

use crate::error::{CacheError, CacheResult};

/// A fully-qualified cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: String,
    id: String,
}

impl CacheKey {
    /// Build a key, validating the namespace.
    pub fn new(namespace: &str, id: impl Into<String>) -> CacheResult<Self> {
        validate_namespace(namespace)?;
        Ok(Self {
            namespace: namespace.to_string(),
            id: id.into(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Prefix shared by every key in `namespace`.
    #[inline]
    pub fn namespace_prefix(namespace: &str) -> String {
        format!("{namespace}:")
    }

    /// Glob pattern matching every key in `namespace`.
    #[inline]
    pub fn namespace_pattern(namespace: &str) -> String {
        format!("{namespace}:*")
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.id)
    }
}

/// Check that a namespace name is usable as a key prefix.
pub fn validate_namespace(namespace: &str) -> CacheResult<()> {
    if namespace.is_empty() {
        return Err(CacheError::InvalidNamespace(
            "namespace must not be empty".into(),
        ));
    }
    if let Some(c) = namespace
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(CacheError::InvalidNamespace(format!(
            "namespace '{namespace}' contains invalid character '{c}'"
        )));
    }
    Ok(())
}
