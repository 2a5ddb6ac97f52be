//! In-flight mutation registry.
//!
//! Tracks long-running writes so navigation and "leaving page" prompts can
//! tell whether it is safe to move on. All operations are synchronous and
//! idempotent; nothing here suspends.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use metrics::gauge;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::lock::mutex_lock;

const SOURCE: &str = "application::mutations";
const METRIC_PENDING: &str = "orderloom_mutations_pending";

/// Identifier of one tracked write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(String);

impl MutationId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MutationId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for MutationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub id: MutationId,
    pub registered_at: OffsetDateTime,
}

/// Table of writes currently in flight.
///
/// One instance per running application, owned by the composition root and
/// shared by `Arc`.
pub struct MutationRegistry {
    records: Mutex<HashMap<MutationId, MutationRecord>>,
    pending: watch::Sender<usize>,
    last_millis: AtomicU64,
}

impl MutationRegistry {
    pub fn new() -> Self {
        let (pending, _) = watch::channel(0);
        Self {
            records: Mutex::new(HashMap::new()),
            pending,
            last_millis: AtomicU64::new(0),
        }
    }

    /// Start tracking `id`. Returns false when it was already tracked.
    pub fn register(&self, id: impl Into<MutationId>) -> bool {
        let id = id.into();
        let mut records = mutex_lock(&self.records, SOURCE, "register");
        if records.contains_key(&id) {
            debug!(mutation_id = %id, "Mutation already registered");
            return false;
        }

        records.insert(
            id.clone(),
            MutationRecord {
                id: id.clone(),
                registered_at: OffsetDateTime::now_utc(),
            },
        );
        self.publish(records.len());
        debug!(mutation_id = %id, pending = records.len(), "Mutation registered");
        true
    }

    /// Stop tracking `id`. Unknown ids are ignored. Returns whether it was tracked.
    pub fn unregister(&self, id: &MutationId) -> bool {
        let mut records = mutex_lock(&self.records, SOURCE, "unregister");
        let removed = records.remove(id).is_some();
        if removed {
            self.publish(records.len());
            debug!(mutation_id = %id, pending = records.len(), "Mutation unregistered");
        }
        removed
    }

    pub fn is_any_pending(&self) -> bool {
        self.pending_count() > 0
    }

    pub fn pending_count(&self) -> usize {
        mutex_lock(&self.records, SOURCE, "pending_count").len()
    }

    pub fn is_registered(&self, id: &MutationId) -> bool {
        mutex_lock(&self.records, SOURCE, "is_registered").contains_key(id)
    }

    /// Snapshot of tracked writes, oldest first.
    pub fn records(&self) -> Vec<MutationRecord> {
        let mut records: Vec<MutationRecord> = mutex_lock(&self.records, SOURCE, "records")
            .values()
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        records
    }

    pub fn pending_ids(&self) -> Vec<MutationId> {
        self.records().into_iter().map(|record| record.id).collect()
    }

    /// Fresh id: `mut-{unix_millis}-{random}` with strictly increasing millis.
    pub fn generate_id(&self) -> MutationId {
        let now = u64::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000)
            .unwrap_or_default();
        let previous = self
            .last_millis
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        let millis = now.max(previous + 1);
        let suffix = Uuid::new_v4().simple().to_string();

        MutationId(format!("mut-{millis}-{}", &suffix[..8]))
    }

    /// Register a write and return a guard that unregisters it.
    ///
    /// The guard unregisters on [`MutationGuard::finish`] or when dropped, so
    /// an abandoned write never leaves a permanent entry behind.
    pub fn track(self: &Arc<Self>, id: Option<MutationId>) -> MutationGuard {
        let id = id.unwrap_or_else(|| self.generate_id());
        self.register(id.clone());
        MutationGuard {
            registry: Arc::clone(self),
            id,
            released: false,
        }
    }

    /// Resolves once nothing is pending.
    pub async fn wait_idle(&self) {
        let mut receiver = self.pending.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = receiver.wait_for(|count| *count == 0).await;
    }

    fn publish(&self, count: usize) {
        self.pending.send_replace(count);
        gauge!(METRIC_PENDING).set(count as f64);
    }
}

impl Default for MutationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a write registered for as long as it is alive.
#[must_use = "dropping the guard unregisters the mutation immediately"]
pub struct MutationGuard {
    registry: Arc<MutationRegistry>,
    id: MutationId,
    released: bool,
}

impl MutationGuard {
    pub fn id(&self) -> &MutationId {
        &self.id
    }

    /// Unregister after the write settled.
    pub fn finish(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.unregister(&self.id);
        }
    }
}

impl Drop for MutationGuard {
    fn drop(&mut self) {
        if !self.released {
            warn!(mutation_id = %self.id, "Mutation abandoned before settling; unregistering");
            self.release();
        }
    }
}
