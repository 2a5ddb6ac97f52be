//! Cache configuration.
//!
//! Controls the read-cache adapter via the `[cache]` table of `orderloom.toml`.

use std::time::Duration;

const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 5000;

/// Cache configuration from `orderloom.toml`.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Enable invalidation. When off, sync wrappers become no-ops.
    pub enabled: bool,
    /// Upper bound (ms) for a single backend load; 0 disables the bound.
    pub operation_timeout_ms: u64,
    /// Let concurrent refetches of one key share a single load.
    pub coalesce_refetch: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
            coalesce_refetch: true,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            operation_timeout_ms: settings.operation_timeout_ms,
            coalesce_refetch: settings.coalesce_refetch,
        }
    }
}

impl CacheConfig {
    /// Returns the load bound, or `None` when loads are unbounded.
    pub fn operation_timeout(&self) -> Option<Duration> {
        (self.operation_timeout_ms > 0).then(|| Duration::from_millis(self.operation_timeout_ms))
    }
}
