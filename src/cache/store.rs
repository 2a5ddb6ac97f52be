//! In-memory read-cache.
//!
//! Entries are either fresh or stale. Stale entries stay readable until the
//! next fetch reloads them; removed entries are absent. Concurrent refetches
//! of one key may share a single load. A load that was already running when
//! its key was invalidated or removed never lands as fresh.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use metrics::counter;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::debug;

use super::backend::{CacheBackend, QueryLoader};
use super::config::CacheConfig;
use super::error::BackendError;
use super::keys::CacheKey;
use super::lock::{mutex_lock, rw_read, rw_write};

const SOURCE: &str = "cache::store";
const METRIC_REFETCH_COALESCED: &str = "orderloom_cache_refetch_coalesced_total";

type SharedLoad = Shared<BoxFuture<'static, Result<Value, BackendError>>>;

/// Observable state of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Fresh,
    Stale,
    Absent,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    stale: bool,
    fetched_at: OffsetDateTime,
}

struct InFlight {
    ticket: u64,
    load: SharedLoad,
}

struct StoreInner {
    config: CacheConfig,
    loader: Arc<dyn QueryLoader>,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    inflight: Mutex<HashMap<CacheKey, InFlight>>,
    /// Tickets of loads whose result may still land as fresh.
    ///
    /// Lock order: `inflight`, then `live`, then `entries`.
    live: Mutex<HashMap<u64, CacheKey>>,
    tickets: AtomicU64,
}

/// Releases a load's ticket when the load ends or is dropped.
struct LiveTicket<'a> {
    live: &'a Mutex<HashMap<u64, CacheKey>>,
    ticket: u64,
}

impl Drop for LiveTicket<'_> {
    fn drop(&mut self) {
        mutex_lock(self.live, SOURCE, "live_ticket_drop").remove(&self.ticket);
    }
}

/// Query cache backed by a [`QueryLoader`].
#[derive(Clone)]
pub struct QueryStore {
    inner: Arc<StoreInner>,
}

impl QueryStore {
    pub fn new(config: CacheConfig, loader: Arc<dyn QueryLoader>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                config,
                loader,
                entries: RwLock::new(HashMap::new()),
                inflight: Mutex::new(HashMap::new()),
                live: Mutex::new(HashMap::new()),
                tickets: AtomicU64::new(0),
            }),
        }
    }

    /// Store a value as fresh without going through the loader.
    pub fn seed(&self, key: CacheKey, value: Value) {
        rw_write(&self.inner.entries, SOURCE, "seed").insert(
            key,
            CacheEntry {
                value,
                stale: false,
                fetched_at: OffsetDateTime::now_utc(),
            },
        );
    }

    /// Cached value regardless of staleness.
    pub fn peek(&self, key: &CacheKey) -> Option<Value> {
        rw_read(&self.inner.entries, SOURCE, "peek")
            .get(key)
            .map(|entry| entry.value.clone())
    }

    pub fn entry_state(&self, key: &CacheKey) -> EntryState {
        match rw_read(&self.inner.entries, SOURCE, "entry_state").get(key) {
            Some(entry) if entry.stale => EntryState::Stale,
            Some(_) => EntryState::Fresh,
            None => EntryState::Absent,
        }
    }

    pub fn fetched_at(&self, key: &CacheKey) -> Option<OffsetDateTime> {
        rw_read(&self.inner.entries, SOURCE, "fetched_at")
            .get(key)
            .map(|entry| entry.fetched_at)
    }

    pub fn len(&self) -> usize {
        rw_read(&self.inner.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read through the cache: fresh entries are served, anything else loads.
    pub async fn fetch(&self, key: &CacheKey) -> Result<Value, BackendError> {
        let cached = rw_read(&self.inner.entries, SOURCE, "fetch")
            .get(key)
            .filter(|entry| !entry.stale)
            .map(|entry| entry.value.clone());

        match cached {
            Some(value) => Ok(value),
            None => self.load(key).await,
        }
    }

    async fn load(&self, key: &CacheKey) -> Result<Value, BackendError> {
        if !self.inner.config.coalesce_refetch {
            let ticket = self.inner.issue_ticket(key);
            return StoreInner::load_and_store(self.inner.clone(), key.clone(), ticket).await;
        }

        let load = {
            let mut inflight = mutex_lock(&self.inner.inflight, SOURCE, "load");
            match inflight.get(key) {
                Some(existing) => {
                    counter!(METRIC_REFETCH_COALESCED).increment(1);
                    debug!(key = %key, "Joining in-flight cache load");
                    existing.load.clone()
                }
                None => {
                    let ticket = self.inner.issue_ticket(key);
                    let load = StoreInner::load_and_store(self.inner.clone(), key.clone(), ticket)
                        .boxed()
                        .shared();
                    inflight.insert(
                        key.clone(),
                        InFlight {
                            ticket,
                            load: load.clone(),
                        },
                    );
                    load
                }
            }
        };

        load.await
    }
}

impl StoreInner {
    fn issue_ticket(&self, key: &CacheKey) -> u64 {
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst);
        mutex_lock(&self.live, SOURCE, "issue_ticket").insert(ticket, key.clone());
        ticket
    }

    async fn load_and_store(
        self: Arc<Self>,
        key: CacheKey,
        ticket: u64,
    ) -> Result<Value, BackendError> {
        let _release = LiveTicket {
            live: &self.live,
            ticket,
        };
        let loaded = match self.config.operation_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.loader.load(&key))
                .await
                .unwrap_or_else(|_| Err(BackendError::Timeout { key: key.clone() })),
            None => self.loader.load(&key).await,
        };

        {
            let mut inflight = mutex_lock(&self.inflight, SOURCE, "load_and_store");
            if inflight
                .get(&key)
                .is_some_and(|entry| entry.ticket == ticket)
            {
                inflight.remove(&key);
            }
        }

        let value = loaded?;

        // The ticket check and the write share the `live` lock with
        // invalidation, so a detached load can never land as fresh.
        let mut live = mutex_lock(&self.live, SOURCE, "load_and_store");
        let current = live.remove(&ticket).is_some();
        let mut entries = rw_write(&self.entries, SOURCE, "load_and_store");
        if current {
            entries.insert(
                key,
                CacheEntry {
                    value: value.clone(),
                    stale: false,
                    fetched_at: OffsetDateTime::now_utc(),
                },
            );
        } else {
            entries.entry(key).or_insert_with(|| CacheEntry {
                value: value.clone(),
                stale: true,
                fetched_at: OffsetDateTime::now_utc(),
            });
        }
        drop(entries);
        drop(live);

        Ok(value)
    }

    /// Detach in-flight loads for keys matched by `matches`, then apply
    /// `update` to the entries while invalidation still holds the ticket lock.
    fn detach_then<R>(
        &self,
        matches: impl Fn(&CacheKey) -> bool,
        update: impl FnOnce(&mut HashMap<CacheKey, CacheEntry>) -> R,
    ) -> R {
        mutex_lock(&self.inflight, SOURCE, "detach").retain(|key, _| !matches(key));
        let mut live = mutex_lock(&self.live, SOURCE, "detach");
        live.retain(|_, key| !matches(key));
        let mut entries = rw_write(&self.entries, SOURCE, "detach");
        update(&mut entries)
    }
}

#[async_trait]
impl CacheBackend for QueryStore {
    async fn invalidate(&self, patterns: &[CacheKey]) -> Result<usize, BackendError> {
        let matches = |key: &CacheKey| patterns.iter().any(|pattern| pattern.matches(key));
        Ok(self.inner.detach_then(matches, |entries| {
            let mut matched = 0;
            for (key, entry) in entries.iter_mut() {
                if matches(key) {
                    entry.stale = true;
                    matched += 1;
                }
            }
            matched
        }))
    }

    async fn refetch(&self, key: &CacheKey) -> Result<Value, BackendError> {
        self.load(key).await
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool, BackendError> {
        Ok(self
            .inner
            .detach_then(|candidate| candidate == key, |entries| entries.remove(key).is_some()))
    }

    async fn invalidate_all(&self) -> Result<usize, BackendError> {
        Ok(self.inner.detach_then(
            |_| true,
            |entries| {
                for entry in entries.values_mut() {
                    entry.stale = true;
                }
                entries.len()
            },
        ))
    }
}
