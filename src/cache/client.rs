//! Cache client used by the write path.
//!
//! Wraps a [`CacheBackend`] with logging, metrics and bookkeeping of
//! in-flight invalidations so navigation can wait for them to settle.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use super::backend::CacheBackend;
use super::error::CacheError;
use super::keys::CacheKey;

const METRIC_INVALIDATE_TOTAL: &str = "orderloom_cache_invalidate_total";
const METRIC_INVALIDATE_FAILED: &str = "orderloom_cache_invalidate_failed_total";
const METRIC_INVALIDATE_MS: &str = "orderloom_cache_invalidate_ms";

/// Decrements the outstanding counter when an invalidation settles or is dropped.
struct FlushTicket<'a> {
    outstanding: &'a watch::Sender<usize>,
}

impl Drop for FlushTicket<'_> {
    fn drop(&mut self) {
        self.outstanding
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}

pub struct CacheClient {
    backend: Arc<dyn CacheBackend>,
    outstanding: watch::Sender<usize>,
}

impl CacheClient {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        let (outstanding, _) = watch::channel(0);
        Self {
            backend,
            outstanding,
        }
    }

    fn begin_flush(&self) -> FlushTicket<'_> {
        self.outstanding.send_modify(|count| *count += 1);
        FlushTicket {
            outstanding: &self.outstanding,
        }
    }

    /// Mark every cached read matched by `keys` as stale.
    #[instrument(skip(self, keys), fields(key_count = keys.len()))]
    pub async fn invalidate(&self, keys: &[CacheKey]) -> Result<(), CacheError> {
        if keys.is_empty() {
            return Ok(());
        }

        let _ticket = self.begin_flush();
        let started_at = Instant::now();
        let result = self.backend.invalidate(keys).await;
        histogram!(METRIC_INVALIDATE_MS, "scope" => "targeted")
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        match result {
            Ok(matched) => {
                counter!(METRIC_INVALIDATE_TOTAL, "scope" => "targeted").increment(1);
                debug!(matched, "Cache keys invalidated");
                Ok(())
            }
            Err(err) => {
                counter!(METRIC_INVALIDATE_FAILED, "scope" => "targeted").increment(1);
                warn!(error = %err, "Cache invalidation failed");
                Err(CacheError::unavailable("invalidate", err))
            }
        }
    }

    /// Mark the whole cache stale. Reserved for navigation and explicit resets.
    #[instrument(skip(self))]
    pub async fn invalidate_all(&self) -> Result<(), CacheError> {
        let _ticket = self.begin_flush();
        let started_at = Instant::now();
        let result = self.backend.invalidate_all().await;
        histogram!(METRIC_INVALIDATE_MS, "scope" => "all")
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        match result {
            Ok(matched) => {
                counter!(METRIC_INVALIDATE_TOTAL, "scope" => "all").increment(1);
                debug!(matched, "Entire cache invalidated");
                Ok(())
            }
            Err(err) => {
                counter!(METRIC_INVALIDATE_FAILED, "scope" => "all").increment(1);
                warn!(error = %err, "Full cache invalidation failed");
                Err(CacheError::unavailable("invalidate_all", err))
            }
        }
    }

    /// Force an immediate re-read of `key`.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn refetch(&self, key: &CacheKey) -> Result<Value, CacheError> {
        self.backend.refetch(key).await.map_err(|err| {
            warn!(error = %err, "Cache refetch failed");
            CacheError::unavailable("refetch", err)
        })
    }

    /// Evict `key`, typically after the entity behind it was deleted.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        match self.backend.remove(key).await {
            Ok(existed) => {
                debug!(existed, "Cache key removed");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Cache removal failed");
                Err(CacheError::unavailable("remove", err))
            }
        }
    }

    /// Number of invalidations currently in flight.
    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    pub fn has_outstanding(&self) -> bool {
        self.outstanding() > 0
    }

    /// Resolves once no invalidation is in flight.
    pub async fn wait_for_flush(&self) {
        let mut receiver = self.outstanding.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = receiver.wait_for(|count| *count == 0).await;
    }
}
