use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use orderloom::application::mutations::MutationRegistry;
use orderloom::application::navigation::{
    NavState, NavigationConfig, NavigationGuard, NavigationOutcome, NavigationRuntime,
};
use orderloom::cache::{BackendError, CacheBackend, CacheClient, CacheKey};
use serde_json::Value;
use tokio::time::Instant;

/// Backend whose every call hangs forever.
#[derive(Default)]
struct HangingBackend {
    full_invalidations: AtomicUsize,
}

#[async_trait]
impl CacheBackend for HangingBackend {
    async fn invalidate(&self, _patterns: &[CacheKey]) -> Result<usize, BackendError> {
        std::future::pending().await
    }

    async fn refetch(&self, _key: &CacheKey) -> Result<Value, BackendError> {
        std::future::pending().await
    }

    async fn remove(&self, _key: &CacheKey) -> Result<bool, BackendError> {
        std::future::pending().await
    }

    async fn invalidate_all(&self) -> Result<usize, BackendError> {
        self.full_invalidations.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

#[derive(Default)]
struct Runtime {
    replaced: Mutex<Vec<String>>,
}

impl NavigationRuntime for Runtime {
    fn go_back(&self) {}

    fn replace(&self, path: &str) {
        self.replaced.lock().unwrap().push(path.to_string());
    }

    fn history_len(&self) -> usize {
        1
    }
}

struct Harness {
    guard: Arc<NavigationGuard>,
    registry: Arc<MutationRegistry>,
    client: Arc<CacheClient>,
    backend: Arc<HangingBackend>,
    runtime: Arc<Runtime>,
}

impl Harness {
    /// Let detached refresh tasks run, then report how many full
    /// invalidations reached the backend.
    async fn full_invalidations(&self) -> usize {
        for _ in 0..100 {
            if self.backend.full_invalidations.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        self.backend.full_invalidations.load(Ordering::SeqCst)
    }
}

fn harness(config: NavigationConfig) -> Harness {
    let registry = Arc::new(MutationRegistry::new());
    let backend = Arc::new(HangingBackend::default());
    let client = Arc::new(CacheClient::new(backend.clone()));
    let runtime = Arc::new(Runtime::default());
    let guard = Arc::new(NavigationGuard::new(
        config,
        registry.clone(),
        client.clone(),
        runtime.clone(),
    ));
    Harness {
        guard,
        registry,
        client,
        backend,
        runtime,
    }
}

#[tokio::test(start_paused = true)]
async fn hanging_invalidation_delays_navigation_only_until_the_timeout() {
    let h = harness(NavigationConfig::default());
    tokio::spawn({
        let client = h.client.clone();
        async move { client.invalidate(&[CacheKey::domain("orders")]).await }
    });
    while !h.client.has_outstanding() {
        tokio::task::yield_now().await;
    }
    let started_at = Instant::now();

    let outcome = h.guard.safe_navigate_back("/dashboard").await;

    let waited = started_at.elapsed();
    assert_eq!(outcome, NavigationOutcome::Replaced("/dashboard".into()));
    assert!(waited >= Duration::from_millis(2_000));
    assert!(waited < Duration::from_millis(2_100));
    assert_eq!(*h.runtime.replaced.lock().unwrap(), vec!["/dashboard"]);
    assert_eq!(h.guard.state(), NavState::Idle);
    assert_eq!(h.full_invalidations().await, 1);
}

#[tokio::test(start_paused = true)]
async fn configured_timeout_is_honoured() {
    let h = harness(NavigationConfig {
        flush_timeout: Duration::from_millis(250),
        history_limit: 5,
    });
    let _stuck = h.registry.track(Some("upload-artwork".into()));
    let started_at = Instant::now();

    let outcome = h.guard.safe_navigate_back("/orders").await;

    assert_eq!(outcome, NavigationOutcome::Replaced("/orders".into()));
    assert!(started_at.elapsed() < Duration::from_millis(300));
    // The write is still running; leaving was forced, not cleared.
    assert!(!h.guard.can_leave());
    assert_eq!(h.full_invalidations().await, 1);
}

#[tokio::test(start_paused = true)]
async fn idle_guard_navigates_without_waiting_on_the_backend() {
    let h = harness(NavigationConfig::default());
    let started_at = Instant::now();

    let outcome = h.guard.safe_navigate_back("/dashboard").await;

    assert_eq!(outcome, NavigationOutcome::Replaced("/dashboard".into()));
    assert_eq!(started_at.elapsed(), Duration::ZERO);
    assert_eq!(h.full_invalidations().await, 1);
}

#[tokio::test(start_paused = true)]
async fn timed_out_flush_releases_the_guard_for_the_next_navigation() {
    let h = harness(NavigationConfig {
        flush_timeout: Duration::from_millis(100),
        history_limit: 10,
    });
    let _stuck = h.registry.track(None);

    let first = h.guard.safe_navigate_back("/a").await;
    let second = h.guard.safe_navigate_back("/b").await;

    assert_eq!(first, NavigationOutcome::Replaced("/a".into()));
    assert_eq!(second, NavigationOutcome::Replaced("/b".into()));
    assert_eq!(h.guard.history(), vec!["/b"]);
}
