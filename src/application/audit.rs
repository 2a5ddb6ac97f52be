//! Append-only audit trail for order changes.
//!
//! Entries are only ever inserted. Timestamps are assigned here and never
//! go backwards within one order, even if the wall clock does.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use metrics::counter;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, error, instrument};
use uuid::Uuid;

use crate::application::error::CoordinationErrorKind;
use crate::application::repos::{CollectionStore, RepoError};
use crate::cache::lock::mutex_lock;
use crate::domain::audit::{AuditAction, AuditLogEntry, AuditLogEntryInput};

const METRIC_APPEND_TOTAL: &str = "orderloom_audit_append_total";
const METRIC_WRITE_FAILED: &str = "orderloom_audit_write_failed_total";
const ORDER_ID_FIELD: &str = "orderId";
const SOURCE: &str = "application::audit";
/// Per-order clocks kept before entries at or behind the wall clock are pruned.
const DEFAULT_CLOCK_RETENTION: usize = 4_096;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("unknown audit action `{action}`")]
    InvalidAction { action: String },
    #[error("failed to append audit entry: {0}")]
    WriteFailed(#[source] RepoError),
    #[error("failed to read audit entries: {0}")]
    ReadFailed(#[source] RepoError),
    #[error("stored audit entry is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl AuditError {
    /// Coordination kind for write-side failures; reads have none.
    pub fn kind(&self) -> Option<CoordinationErrorKind> {
        match self {
            AuditError::InvalidAction { .. } => Some(CoordinationErrorKind::InvalidAction),
            AuditError::WriteFailed(_) => Some(CoordinationErrorKind::AuditWriteFailed),
            AuditError::ReadFailed(_) | AuditError::Malformed(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditConfig {
    /// When false, best-effort recording is skipped. Explicit appends still write.
    pub enabled: bool,
    pub collection: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            collection: "audit_logs".to_string(),
        }
    }
}

impl From<&crate::config::AuditSettings> for AuditConfig {
    fn from(settings: &crate::config::AuditSettings) -> Self {
        Self {
            enabled: settings.enabled,
            collection: settings.collection.clone(),
        }
    }
}

pub struct AuditLogWriter {
    store: Arc<dyn CollectionStore>,
    config: AuditConfig,
    clocks: DashMap<Uuid, OffsetDateTime>,
    /// Lower bound for orders whose clock was pruned.
    clock_floor: Mutex<OffsetDateTime>,
    clock_retention: usize,
}

impl AuditLogWriter {
    pub fn new(store: Arc<dyn CollectionStore>, config: AuditConfig) -> Self {
        Self {
            store,
            config,
            clocks: DashMap::new(),
            clock_floor: Mutex::new(OffsetDateTime::UNIX_EPOCH),
            clock_retention: DEFAULT_CLOCK_RETENTION,
        }
    }

    /// Number of per-order clocks kept before pruning.
    pub fn with_clock_retention(mut self, retention: usize) -> Self {
        self.clock_retention = retention.max(1);
        self
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Validate and persist one entry.
    #[instrument(skip(self, input), fields(order_id = %input.order_id, action = %input.action))]
    pub async fn append(&self, input: AuditLogEntryInput) -> Result<AuditLogEntry, AuditError> {
        self.append_at(input, OffsetDateTime::now_utc()).await
    }

    /// Best-effort append used after a successful write.
    ///
    /// Store failures are logged and counted, then swallowed as `Ok(None)`.
    /// An unknown action is still an error.
    pub async fn record(
        &self,
        input: AuditLogEntryInput,
    ) -> Result<Option<AuditLogEntry>, AuditError> {
        if !self.config.enabled {
            debug!(order_id = %input.order_id, "Audit recording disabled; entry dropped");
            return Ok(None);
        }

        match self.append(input).await {
            Ok(entry) => Ok(Some(entry)),
            Err(AuditError::WriteFailed(err)) => {
                error!(error = %err, "Audit entry could not be written");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Every entry for `order_id`, oldest first.
    #[instrument(skip(self))]
    pub async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<AuditLogEntry>, AuditError> {
        let documents = self
            .store
            .query_eq(
                &self.config.collection,
                ORDER_ID_FIELD,
                &Value::String(order_id.to_string()),
            )
            .await
            .map_err(AuditError::ReadFailed)?;

        let mut entries = documents
            .into_iter()
            .map(serde_json::from_value::<AuditLogEntry>)
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|entry| entry.timestamp);
        Ok(entries)
    }

    async fn append_at(
        &self,
        input: AuditLogEntryInput,
        now: OffsetDateTime,
    ) -> Result<AuditLogEntry, AuditError> {
        let action: AuditAction = input.action.parse().map_err(|_| AuditError::InvalidAction {
            action: input.action.clone(),
        })?;

        let entry = AuditLogEntry {
            id: Uuid::new_v4(),
            order_id: input.order_id,
            user_id: input.user_id,
            action,
            entity_type: input.entity_type,
            entity_id: input.entity_id,
            field_name: input.field_name,
            old_value: input.old_value,
            new_value: input.new_value,
            changes_summary: input.changes_summary,
            metadata: input.metadata,
            timestamp: self.next_timestamp(input.order_id, now),
            created_at: now,
        };

        let document = serde_json::to_value(&entry)?;
        if let Err(err) = self.store.insert(&self.config.collection, document).await {
            counter!(METRIC_WRITE_FAILED, "action" => action.as_str()).increment(1);
            return Err(AuditError::WriteFailed(err));
        }

        counter!(METRIC_APPEND_TOTAL, "action" => action.as_str()).increment(1);
        debug!(entry_id = %entry.id, "Audit entry appended");
        Ok(entry)
    }

    /// `max(now, last issued)` for the order, updated under the entry lock.
    fn next_timestamp(&self, order_id: Uuid, now: OffsetDateTime) -> OffsetDateTime {
        let issued = {
            let mut last = self
                .clocks
                .entry(order_id)
                .or_insert_with(|| *mutex_lock(&self.clock_floor, SOURCE, "clock_floor"));
            let issued = now.max(*last);
            *last = issued;
            issued
        };

        if self.clocks.len() > self.clock_retention {
            self.prune_clocks(now);
        }
        issued
    }

    /// Drop clocks that `now` already dominates. The floor absorbs what was
    /// dropped so a later regression cannot issue an earlier timestamp.
    fn prune_clocks(&self, now: OffsetDateTime) {
        let before = self.clocks.len();
        self.clocks.retain(|_, last| {
            if *last > now {
                return true;
            }
            let mut floor = mutex_lock(&self.clock_floor, SOURCE, "prune_clocks");
            *floor = (*floor).max(*last);
            false
        });
        debug!(
            pruned = before.saturating_sub(self.clocks.len()),
            kept = self.clocks.len(),
            "Pruned audit clocks"
        );
    }
}
