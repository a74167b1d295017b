//! Error types for cache operations.

/// Cache operation result.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache errors.
///
/// Only the caller-input variants (`InvalidNamespace`, `InvalidTtl`,
/// `Serialization`, `EntryTooLarge`) ever leave [`crate::CacheManager`].
/// Network failures and corrupt entries are absorbed and reported as misses.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("invalid TTL: {0}")]
    InvalidTtl(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("entry of {size} bytes exceeds the local byte budget of {budget} bytes")]
    EntryTooLarge { size: usize, budget: usize },

    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("operation not supported by backend: {0}")]
    Unsupported(&'static str),

    #[error("configuration error: {0}")]
    Config(String),
}

impl CacheError {
    pub fn backend_unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the error is a transient network-tier failure.
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }

    /// Short label used for the `kind` metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Serialization(_) => "serialization",
            Self::Deserialization(_) => "deserialization",
            Self::InvalidTtl(_) => "invalid_ttl",
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::EntryTooLarge { .. } => "entry_too_large",
            Self::InvalidNamespace(_) => "invalid_namespace",
            Self::Unsupported(_) => "unsupported",
            Self::Config(_) => "config",
        }
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        Self::BackendUnavailable(e.to_string())
    }
}

impl From<deadpool_redis::PoolError> for CacheError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        Self::BackendUnavailable(format!("failed to get Redis connection: {e}"))
    }
}
