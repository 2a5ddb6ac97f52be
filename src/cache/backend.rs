//! Seams to the external read-cache.

use async_trait::async_trait;
use serde_json::Value;

use super::error::BackendError;
use super::keys::CacheKey;

/// Read-cache operations the coordination layer is allowed to perform.
///
/// Nothing else may mutate the cache: every write goes through one of these
/// methods, normally via [`CacheClient`](super::CacheClient).
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Mark every entry matched by any pattern as stale. Returns the match count.
    async fn invalidate(&self, patterns: &[CacheKey]) -> Result<usize, BackendError>;

    /// Force a fresh read of `key`.
    async fn refetch(&self, key: &CacheKey) -> Result<Value, BackendError>;

    /// Evict `key` entirely. Returns whether an entry existed.
    async fn remove(&self, key: &CacheKey) -> Result<bool, BackendError>;

    /// Mark every entry stale. Returns the number of entries touched.
    async fn invalidate_all(&self) -> Result<usize, BackendError>;
}

/// Source of truth behind the read-cache, normally the transport layer.
#[async_trait]
pub trait QueryLoader: Send + Sync {
    async fn load(&self, key: &CacheKey) -> Result<Value, BackendError>;
}
