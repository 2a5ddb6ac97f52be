//! Cache sync wrappers.
//!
//! Resolve a domain event into key patterns and hand them to the cache client.
//! Callers decide what to do when invalidation fails.

use std::sync::Arc;

use tracing::debug;

use crate::domain::events::DomainEvent;

use super::client::CacheClient;
use super::config::CacheConfig;
use super::error::CacheError;
use super::resolver::InvalidationKeyResolver;

/// # Usage
///
/// ```ignore
/// // After a customer record was saved:
/// sync.sync_customers().await?;
/// ```
pub struct CacheSync {
    config: CacheConfig,
    resolver: InvalidationKeyResolver,
    client: Arc<CacheClient>,
}

impl CacheSync {
    pub fn new(config: CacheConfig, client: Arc<CacheClient>) -> Self {
        Self {
            config,
            resolver: InvalidationKeyResolver::new(),
            client,
        }
    }

    /// Invalidate every view `event` makes stale.
    pub async fn sync(&self, event: DomainEvent) -> Result<(), CacheError> {
        if !self.config.enabled {
            debug!(event = %event, "Cache sync skipped: cache disabled");
            return Ok(());
        }

        let keys = self.resolver.resolve(event);
        debug!(event = %event, key_count = keys.len(), "Cache sync resolved keys");
        self.client.invalidate(&keys).await
    }

    /// Same as [`sync`](Self::sync) for an event given by name.
    pub async fn sync_named(&self, name: &str) -> Result<(), CacheError> {
        let event = name
            .parse::<DomainEvent>()
            .map_err(|_| CacheError::unknown_event(name))?;
        self.sync(event).await
    }

    pub async fn sync_customers(&self) -> Result<(), CacheError> {
        self.sync(DomainEvent::CustomerChange).await
    }

    pub async fn sync_catalog(&self) -> Result<(), CacheError> {
        self.sync(DomainEvent::CatalogChange).await
    }

    pub async fn sync_orders(&self) -> Result<(), CacheError> {
        self.sync(DomainEvent::OrderChange).await
    }

    pub async fn sync_team(&self) -> Result<(), CacheError> {
        self.sync(DomainEvent::TeamChange).await
    }

    /// Invalidate the whole cache. Prefer the targeted wrappers.
    pub async fn sync_everything(&self) -> Result<(), CacheError> {
        if !self.config.enabled {
            debug!("Cache sync skipped: cache disabled");
            return Ok(());
        }
        self.client.invalidate_all().await
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn resolver(&self) -> &InvalidationKeyResolver {
        &self.resolver
    }

    pub fn client(&self) -> &Arc<CacheClient> {
        &self.client
    }
}
