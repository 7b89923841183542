//! Cache Chain Builder
//!
//! Provides a builder for assembling a [`CacheChain`] level by level.
//!
//! # Example
//!
//! ```rust
//! use cache_chain::{ChainBuilder, DashMapCache};
//! use std::sync::Arc;
//!
//! # fn example() -> cache_chain::Result<()> {
//! let chain = ChainBuilder::new()
//!     .with_level(Arc::new(DashMapCache::new()))
//!     .with_level(Arc::new(DashMapCache::new()))
//!     .resilient(true)
//!     .build()?;
//! assert_eq!(chain.level_count(), 2);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use tracing::debug;

use crate::chain::CacheChain;
use crate::error::Result;
use crate::traits::CacheBackend;

/// Builder for constructing a [`CacheChain`]
///
/// Levels are kept in the order they are added: the first level added is
/// level 0, the highest priority. The chain is not resilient unless
/// [`resilient`](Self::resilient) is called.
#[derive(Default)]
pub struct ChainBuilder {
    levels: Vec<Arc<dyn CacheBackend>>,
    resilient: bool,
}

impl ChainBuilder {
    /// Create a new builder with no levels
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a level below the ones already added
    ///
    /// # Arguments
    ///
    /// * `backend` - Any type implementing `CacheBackend`, including another chain
    #[must_use]
    pub fn with_level(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        debug!(backend = backend.name(), position = self.levels.len(), "Adding chain level");
        self.levels.push(backend);
        self
    }

    /// Append several levels, in order
    #[must_use]
    pub fn with_levels<I>(mut self, backends: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn CacheBackend>>,
    {
        for backend in backends {
            self = self.with_level(backend);
        }
        self
    }

    /// Bypass per-level failures instead of failing fast
    #[must_use]
    pub fn resilient(mut self, resilient: bool) -> Self {
        self.resilient = resilient;
        self
    }

    /// Build the chain
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if fewer than two levels were added.
    pub fn build(self) -> Result<CacheChain> {
        CacheChain::new(self.levels, self.resilient)
    }
}
