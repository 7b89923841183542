//! Error types for cache levels and chains
//!
//! Every level reports failures through [`CacheError`]. The chain only ever
//! distinguishes two cases: a definitive [`CacheError::NotFound`], which lets a
//! lookup fall through to the next level, and everything else, which is
//! subject to the chain's resilience policy.

use thiserror::Error;

/// Unified error type for cache levels, chains and the memoizer.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key is definitively absent from the level (or from every level of a chain)
    #[error("key not found: {key}")]
    NotFound { key: String },

    /// Any other failure raised by a level: connectivity, serialization, ...
    #[error(transparent)]
    Backend(#[from] anyhow::Error),

    /// The cache was assembled incorrectly; raised at construction, never retried
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The backend refused a payload above its size limit
    #[error("value for key '{key}' is {size} bytes, limit is {limit} bytes")]
    ValueTooLarge {
        key: String,
        size: usize,
        limit: usize,
    },
}

impl CacheError {
    /// Create a `NotFound` error for `key`
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create an `InvalidConfiguration` error
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration(reason.into())
    }

    /// `true` for a definitive "key not found" signal
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// `true` when a backend rejected an oversized payload
    #[must_use]
    pub fn is_value_too_large(&self) -> bool {
        matches!(self, Self::ValueTooLarge { .. })
    }
}

/// Convenience result type used across the crate.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display_and_predicate() {
        let err = CacheError::not_found("user:1");
        assert!(err.is_not_found());
        assert!(!err.is_value_too_large());
        assert_eq!(err.to_string(), "key not found: user:1");
    }

    #[test]
    fn test_backend_from_anyhow_is_transparent() {
        let err: CacheError = anyhow::anyhow!("connection refused").into();
        assert!(!err.is_not_found());
        assert_eq!(err.to_string(), "connection refused");
    }

    #[test]
    fn test_value_too_large_display() {
        let err = CacheError::ValueTooLarge {
            key: "blob".to_string(),
            size: 10,
            limit: 4,
        };
        assert!(err.is_value_too_large());
        assert_eq!(err.to_string(), "value for key 'blob' is 10 bytes, limit is 4 bytes");
    }
}
