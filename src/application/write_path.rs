//! Write-path composition: track, write, invalidate, audit.

use std::future::Future;
use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::application::audit::{AuditConfig, AuditError, AuditLogWriter};
use crate::application::mutations::{MutationId, MutationRegistry};
use crate::application::navigation::{NavigationConfig, NavigationGuard, NavigationRuntime};
use crate::application::repos::CollectionStore;
use crate::application::transport::TransportError;
use crate::cache::{CacheBackend, CacheClient, CacheConfig, CacheError, CacheSync};
use crate::config::Settings;
use crate::domain::audit::{AuditLogEntry, AuditLogEntryInput};
use crate::domain::events::DomainEvent;

const METRIC_MUTATION_FAILED: &str = "orderloom_mutation_failed_total";

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("write failed: {0}")]
    Transport(#[from] TransportError),
}

/// How a write should be coordinated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationSpec {
    pub id: Option<MutationId>,
    pub event: DomainEvent,
    pub tracked: bool,
}

impl MutationSpec {
    /// Untracked write that invalidates the views of `event`.
    pub fn new(event: DomainEvent) -> Self {
        Self {
            id: None,
            event,
            tracked: false,
        }
    }

    /// Register the write with the mutation registry while it runs.
    pub fn tracked(mut self) -> Self {
        self.tracked = true;
        self
    }

    /// Track under a caller-chosen id.
    pub fn with_id(mut self, id: impl Into<MutationId>) -> Self {
        self.id = Some(id.into());
        self.tracked = true;
        self
    }
}

/// Outcome of a successful write plus its follow-up steps.
#[derive(Debug)]
pub struct Settled<T> {
    pub data: T,
    pub invalidation: Result<(), CacheError>,
    pub audit: Result<Option<AuditLogEntry>, AuditError>,
}

/// Per-application coordination context.
///
/// Built once at the composition root and shared by `Arc`.
pub struct WriteCoordinator {
    registry: Arc<MutationRegistry>,
    sync: Arc<CacheSync>,
    audit: Arc<AuditLogWriter>,
    navigation: Arc<NavigationGuard>,
}

impl WriteCoordinator {
    pub fn new(
        registry: Arc<MutationRegistry>,
        sync: Arc<CacheSync>,
        audit: Arc<AuditLogWriter>,
        navigation: Arc<NavigationGuard>,
    ) -> Self {
        Self {
            registry,
            sync,
            audit,
            navigation,
        }
    }

    /// Build every component from loaded settings around the given
    /// collaborators. The registry and cache client are shared between the
    /// write path and the navigation guard.
    pub fn from_settings(
        settings: &Settings,
        backend: Arc<dyn CacheBackend>,
        store: Arc<dyn CollectionStore>,
        runtime: Arc<dyn NavigationRuntime>,
    ) -> Self {
        let registry = Arc::new(MutationRegistry::new());
        let client = Arc::new(CacheClient::new(backend));
        let sync = CacheSync::new(CacheConfig::from(&settings.cache), client.clone());
        let audit = AuditLogWriter::new(store, AuditConfig::from(&settings.audit));
        let navigation = NavigationGuard::new(
            NavigationConfig::from(&settings.navigation),
            registry.clone(),
            client,
            runtime,
        );

        Self::new(
            registry,
            Arc::new(sync),
            Arc::new(audit),
            Arc::new(navigation),
        )
    }

    pub fn registry(&self) -> &Arc<MutationRegistry> {
        &self.registry
    }

    pub fn sync(&self) -> &Arc<CacheSync> {
        &self.sync
    }

    pub fn audit(&self) -> &Arc<AuditLogWriter> {
        &self.audit
    }

    pub fn navigation(&self) -> &Arc<NavigationGuard> {
        &self.navigation
    }

    /// Run `write` and invalidate the views of the mutation's event afterwards.
    pub async fn run<T, F>(
        &self,
        mutation: MutationSpec,
        write: F,
    ) -> Result<Settled<T>, MutationError>
    where
        F: Future<Output = Result<T, TransportError>>,
    {
        self.run_audited(mutation, write, |_: &T| None).await
    }

    /// Like [`run`](Self::run), then record the entry built by `audit` from
    /// the written data. The audit step is best-effort.
    pub async fn run_audited<T, F, A>(
        &self,
        mutation: MutationSpec,
        write: F,
        audit: A,
    ) -> Result<Settled<T>, MutationError>
    where
        F: Future<Output = Result<T, TransportError>>,
        A: FnOnce(&T) -> Option<AuditLogEntryInput>,
    {
        let guard = mutation
            .tracked
            .then(|| self.registry.track(mutation.id.clone()));
        let mutation_id = guard
            .as_ref()
            .map(|guard| guard.id().to_string())
            .unwrap_or_default();
        let span = info_span!("mutation", mutation_id = %mutation_id, event = %mutation.event);

        async move {
            let result = write.await;
            if let Some(guard) = guard {
                guard.finish();
            }

            let invalidation = self.sync.sync(mutation.event).await;
            if let Err(err) = &invalidation {
                warn!(error = %err, "Invalidation after write failed; views may be stale");
            }

            match result {
                Ok(data) => {
                    let audit = match audit(&data) {
                        Some(input) => self.audit.record(input).await,
                        None => Ok(None),
                    };
                    debug!("Write settled");
                    Ok(Settled {
                        data,
                        invalidation,
                        audit,
                    })
                }
                Err(err) => {
                    counter!(METRIC_MUTATION_FAILED, "kind" => err.kind.as_str()).increment(1);
                    if err.kind.is_client_error() {
                        warn!(kind = %err.kind, error = %err, "Write rejected");
                    } else {
                        error!(
                            kind = %err.kind,
                            retryable = err.is_retryable(),
                            error = %err,
                            "Write failed"
                        );
                    }
                    Err(MutationError::Transport(err))
                }
            }
        }
        .instrument(span)
        .await
    }
}
