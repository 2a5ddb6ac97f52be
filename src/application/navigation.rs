//! Navigation guard.
//!
//! Leaving a view while a write is still in flight would show the
//! destination with stale reads. The guard waits (boundedly) for pending
//! mutations and invalidations, refreshes the cache, then moves back or to a
//! fallback path.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use metrics::{counter, histogram};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::application::mutations::MutationRegistry;
use crate::cache::CacheClient;
use crate::cache::lock::mutex_lock;

const SOURCE: &str = "application::navigation";
const METRIC_FLUSH_MS: &str = "orderloom_navigation_flush_ms";
const METRIC_FLUSH_TIMEOUT: &str = "orderloom_navigation_flush_timeout_total";

/// Host navigation primitives.
pub trait NavigationRuntime: Send + Sync {
    fn go_back(&self);
    fn replace(&self, path: &str);
    /// Entries in the host's own history stack.
    fn history_len(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationConfig {
    pub flush_timeout: Duration,
    pub history_limit: usize,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            flush_timeout: Duration::from_millis(2_000),
            history_limit: 10,
        }
    }
}

impl From<&crate::config::NavigationSettings> for NavigationConfig {
    fn from(settings: &crate::config::NavigationSettings) -> Self {
        Self {
            flush_timeout: Duration::from_millis(settings.flush_timeout_ms.get()),
            history_limit: settings.history_limit.get(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    Idle,
    Flushing,
    Navigating,
}

impl NavState {
    pub fn as_str(self) -> &'static str {
        match self {
            NavState::Idle => "idle",
            NavState::Flushing => "flushing",
            NavState::Navigating => "navigating",
        }
    }
}

impl fmt::Display for NavState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    WentBack,
    Replaced(String),
    /// Another navigation was already running; nothing happened.
    AlreadyNavigating,
}

/// Bounded stack of visited paths, most recent last.
#[derive(Debug, Clone)]
pub struct PathHistory {
    paths: VecDeque<String>,
    limit: usize,
}

impl PathHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            paths: VecDeque::with_capacity(limit),
            limit: limit.max(1),
        }
    }

    pub fn push(&mut self, path: &str) {
        if self.current() == Some(path) {
            return;
        }
        if self.paths.len() == self.limit {
            self.paths.pop_front();
        }
        self.paths.push_back(path.to_string());
    }

    pub fn current(&self) -> Option<&str> {
        self.paths.back().map(String::as_str)
    }

    pub fn previous(&self) -> Option<&str> {
        let len = self.paths.len();
        if len < 2 {
            return None;
        }
        self.paths.get(len - 2).map(String::as_str)
    }

    pub fn pop(&mut self) -> Option<String> {
        self.paths.pop_back()
    }

    pub fn replace_top(&mut self, path: &str) {
        self.paths.pop_back();
        self.push(path);
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> Vec<String> {
        self.paths.iter().cloned().collect()
    }
}

/// Returns the guard to `Idle` however navigation ends, cancellation included.
struct StateReset<'a> {
    state: &'a Mutex<NavState>,
}

impl StateReset<'_> {
    fn set(&self, next: NavState) {
        *mutex_lock(self.state, SOURCE, "set_state") = next;
    }
}

impl Drop for StateReset<'_> {
    fn drop(&mut self) {
        *mutex_lock(self.state, SOURCE, "reset_state") = NavState::Idle;
    }
}

pub struct NavigationGuard {
    config: NavigationConfig,
    registry: Arc<MutationRegistry>,
    cache: Arc<CacheClient>,
    runtime: Arc<dyn NavigationRuntime>,
    history: Mutex<PathHistory>,
    state: Mutex<NavState>,
}

impl NavigationGuard {
    pub fn new(
        config: NavigationConfig,
        registry: Arc<MutationRegistry>,
        cache: Arc<CacheClient>,
        runtime: Arc<dyn NavigationRuntime>,
    ) -> Self {
        Self {
            history: Mutex::new(PathHistory::new(config.history_limit)),
            state: Mutex::new(NavState::Idle),
            config,
            registry,
            cache,
            runtime,
        }
    }

    pub fn config(&self) -> &NavigationConfig {
        &self.config
    }

    pub fn state(&self) -> NavState {
        *mutex_lock(&self.state, SOURCE, "state")
    }

    /// Whether the current view can be left without interrupting a write.
    pub fn can_leave(&self) -> bool {
        !self.registry.is_any_pending()
    }

    pub fn record_visit(&self, path: &str) {
        mutex_lock(&self.history, SOURCE, "record_visit").push(path);
    }

    pub fn history(&self) -> Vec<String> {
        mutex_lock(&self.history, SOURCE, "history").paths()
    }

    /// Go back one view once in-flight writes settled, or to `fallback`.
    ///
    /// Flushing is bounded by the configured timeout; after it elapses the
    /// guard navigates anyway. Every path that navigates invalidates the whole
    /// cache first, in the background when it cannot be awaited.
    pub async fn safe_navigate_back(&self, fallback: &str) -> NavigationOutcome {
        let needs_flush = self.registry.is_any_pending() || self.cache.has_outstanding();
        let initial = if needs_flush {
            NavState::Flushing
        } else {
            NavState::Navigating
        };
        let Some(reset) = self.begin(initial) else {
            debug!(fallback, "Navigation already in progress");
            return NavigationOutcome::AlreadyNavigating;
        };

        if needs_flush {
            let flushed = self.flush().await;
            reset.set(NavState::Navigating);
            if !flushed {
                return self.replace_with(fallback);
            }
        } else {
            self.refresh_in_background();
        }

        self.navigate(fallback)
    }

    /// Invalidate everything without holding up navigation.
    fn refresh_in_background(&self) {
        let cache = Arc::clone(&self.cache);
        tokio::spawn(async move {
            if let Err(err) = cache.invalidate_all().await {
                warn!(error = %err, "Background cache refresh after navigation failed");
            }
        });
    }

    fn begin(&self, initial: NavState) -> Option<StateReset<'_>> {
        let mut state = mutex_lock(&self.state, SOURCE, "begin");
        if *state != NavState::Idle {
            return None;
        }
        *state = initial;
        Some(StateReset { state: &self.state })
    }

    /// Wait for pending work and refresh the cache. Returns false on a flush error.
    async fn flush(&self) -> bool {
        let started_at = Instant::now();
        let pending = self.registry.pending_count();
        debug!(pending, "Flushing before navigation");

        let work = async {
            self.registry.wait_idle().await;
            self.cache.wait_for_flush().await;
            self.cache.invalidate_all().await
        };

        let flushed = match tokio::time::timeout(self.config.flush_timeout, work).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                warn!(error = %err, "Flush before navigation failed; using fallback");
                false
            }
            Err(_) => {
                counter!(METRIC_FLUSH_TIMEOUT).increment(1);
                warn!(
                    timeout_ms = self.config.flush_timeout.as_millis() as u64,
                    pending = self.registry.pending_count(),
                    "Flush before navigation timed out; navigating anyway"
                );
                self.refresh_in_background();
                true
            }
        };

        histogram!(METRIC_FLUSH_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        flushed
    }

    fn navigate(&self, fallback: &str) -> NavigationOutcome {
        let mut history = mutex_lock(&self.history, SOURCE, "navigate");
        if history.previous().is_some() && self.runtime.history_len() > 1 {
            history.pop();
            drop(history);
            self.runtime.go_back();
            info!("Navigated back");
            return NavigationOutcome::WentBack;
        }
        drop(history);
        self.replace_with(fallback)
    }

    fn replace_with(&self, fallback: &str) -> NavigationOutcome {
        mutex_lock(&self.history, SOURCE, "replace").replace_top(fallback);
        self.runtime.replace(fallback);
        info!(path = fallback, "Navigated to fallback");
        NavigationOutcome::Replaced(fallback.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use super::*;
    use crate::cache::{BackendError, CacheBackend, CacheKey};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Back,
        Replace(String),
    }

    struct FakeRuntime {
        calls: Mutex<Vec<Call>>,
        len: AtomicUsize,
    }

    impl FakeRuntime {
        fn with_len(len: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                len: AtomicUsize::new(len),
            })
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl NavigationRuntime for FakeRuntime {
        fn go_back(&self) {
            self.calls.lock().unwrap().push(Call::Back);
        }

        fn replace(&self, path: &str) {
            self.calls.lock().unwrap().push(Call::Replace(path.to_string()));
        }

        fn history_len(&self) -> usize {
            self.len.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct CountingBackend {
        full: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl CacheBackend for CountingBackend {
        async fn invalidate(&self, patterns: &[CacheKey]) -> Result<usize, BackendError> {
            Ok(patterns.len())
        }

        async fn refetch(&self, _key: &CacheKey) -> Result<Value, BackendError> {
            Ok(json!(null))
        }

        async fn remove(&self, _key: &CacheKey) -> Result<bool, BackendError> {
            Ok(false)
        }

        async fn invalidate_all(&self) -> Result<usize, BackendError> {
            self.full.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(BackendError::unreachable("cache offline"));
            }
            Ok(0)
        }
    }

    struct Fixture {
        guard: Arc<NavigationGuard>,
        registry: Arc<MutationRegistry>,
        backend: Arc<CountingBackend>,
        runtime: Arc<FakeRuntime>,
    }

    fn fixture(runtime_len: usize) -> Fixture {
        let registry = Arc::new(MutationRegistry::new());
        let backend = Arc::new(CountingBackend::default());
        let cache = Arc::new(CacheClient::new(backend.clone()));
        let runtime = FakeRuntime::with_len(runtime_len);
        let guard = Arc::new(NavigationGuard::new(
            NavigationConfig::default(),
            registry.clone(),
            cache,
            runtime.clone(),
        ));
        Fixture {
            guard,
            registry,
            backend,
            runtime,
        }
    }

    #[test]
    fn history_is_bounded_and_collapses_repeats() {
        let mut history = PathHistory::new(3);
        for path in ["/a", "/a", "/b", "/c", "/d"] {
            history.push(path);
        }

        assert_eq!(history.paths(), vec!["/b", "/c", "/d"]);
        assert_eq!(history.previous(), Some("/c"));

        history.replace_top("/dashboard");
        assert_eq!(history.current(), Some("/dashboard"));
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn goes_back_when_both_histories_allow_it() {
        let fx = fixture(3);
        fx.guard.record_visit("/orders");
        fx.guard.record_visit("/orders/42");

        let outcome = fx.guard.safe_navigate_back("/dashboard").await;

        assert_eq!(outcome, NavigationOutcome::WentBack);
        assert_eq!(fx.runtime.calls(), vec![Call::Back]);
        assert_eq!(fx.guard.history(), vec!["/orders"]);
        assert_eq!(fx.guard.state(), NavState::Idle);
    }

    #[tokio::test]
    async fn shallow_runtime_history_uses_fallback() {
        let fx = fixture(1);
        fx.guard.record_visit("/orders");
        fx.guard.record_visit("/orders/42");

        let outcome = fx.guard.safe_navigate_back("/dashboard").await;

        assert_eq!(outcome, NavigationOutcome::Replaced("/dashboard".into()));
        assert_eq!(fx.runtime.calls(), vec![Call::Replace("/dashboard".into())]);
        assert_eq!(fx.guard.history(), vec!["/orders", "/dashboard"]);
    }

    #[tokio::test]
    async fn empty_app_history_uses_fallback() {
        let fx = fixture(5);

        let outcome = fx.guard.safe_navigate_back("/dashboard").await;

        assert_eq!(outcome, NavigationOutcome::Replaced("/dashboard".into()));
    }

    #[tokio::test]
    async fn pending_mutation_is_awaited_before_leaving() {
        let fx = fixture(3);
        fx.guard.record_visit("/orders");
        fx.guard.record_visit("/orders/42");
        let mutation = fx.registry.track(None);
        assert!(!fx.guard.can_leave());

        let nav = tokio::spawn({
            let guard = fx.guard.clone();
            async move { guard.safe_navigate_back("/dashboard").await }
        });
        while fx.guard.state() != NavState::Flushing {
            tokio::task::yield_now().await;
        }
        assert!(fx.runtime.calls().is_empty());

        mutation.finish();
        let outcome = nav.await.unwrap();

        assert_eq!(outcome, NavigationOutcome::WentBack);
        assert_eq!(fx.backend.full.load(Ordering::SeqCst), 1);
        assert!(fx.guard.can_leave());
    }

    async fn wait_for_full_invalidations(backend: &CountingBackend, expected: usize) {
        for _ in 0..100 {
            if backend.full.load(Ordering::SeqCst) >= expected {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(backend.full.load(Ordering::SeqCst), expected);
    }

    #[tokio::test]
    async fn fast_path_still_invalidates_everything() {
        let fx = fixture(3);

        let outcome = fx.guard.safe_navigate_back("/dashboard").await;

        assert_eq!(outcome, NavigationOutcome::Replaced("/dashboard".into()));
        wait_for_full_invalidations(&fx.backend, 1).await;
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_flush_still_invalidates_everything() {
        let registry = Arc::new(MutationRegistry::new());
        let backend = Arc::new(CountingBackend::default());
        let runtime = FakeRuntime::with_len(1);
        let guard = NavigationGuard::new(
            NavigationConfig {
                flush_timeout: Duration::from_millis(100),
                history_limit: 10,
            },
            registry.clone(),
            Arc::new(CacheClient::new(backend.clone())),
            runtime.clone(),
        );
        let _stuck = registry.track(None);

        let outcome = guard.safe_navigate_back("/dashboard").await;

        assert_eq!(outcome, NavigationOutcome::Replaced("/dashboard".into()));
        assert_eq!(runtime.calls(), vec![Call::Replace("/dashboard".into())]);
        wait_for_full_invalidations(&backend, 1).await;
    }

    #[tokio::test]
    async fn second_call_while_flushing_is_rejected() {
        let fx = fixture(3);
        let mutation = fx.registry.track(None);

        let first = tokio::spawn({
            let guard = fx.guard.clone();
            async move { guard.safe_navigate_back("/dashboard").await }
        });
        while fx.guard.state() != NavState::Flushing {
            tokio::task::yield_now().await;
        }

        let second = fx.guard.safe_navigate_back("/dashboard").await;
        assert_eq!(second, NavigationOutcome::AlreadyNavigating);

        mutation.finish();
        first.await.unwrap();
        assert_eq!(fx.runtime.calls().len(), 1);
        assert_eq!(fx.guard.state(), NavState::Idle);
    }

    #[tokio::test]
    async fn flush_error_goes_straight_to_fallback() {
        let fx = fixture(3);
        fx.guard.record_visit("/orders");
        fx.guard.record_visit("/orders/42");
        fx.backend.fail.store(true, Ordering::SeqCst);
        let mutation = fx.registry.track(None);

        let nav = tokio::spawn({
            let guard = fx.guard.clone();
            async move { guard.safe_navigate_back("/dashboard").await }
        });
        while fx.guard.state() != NavState::Flushing {
            tokio::task::yield_now().await;
        }
        mutation.finish();

        assert_eq!(
            nav.await.unwrap(),
            NavigationOutcome::Replaced("/dashboard".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_mutation_only_delays_until_timeout() {
        let fx = fixture(1);
        let _stuck = fx.registry.track(Some("never-settles".into()));
        let started_at = Instant::now();

        let outcome = fx.guard.safe_navigate_back("/dashboard").await;

        assert_eq!(outcome, NavigationOutcome::Replaced("/dashboard".into()));
        assert!(started_at.elapsed() >= NavigationConfig::default().flush_timeout);
        assert_eq!(fx.guard.state(), NavState::Idle);
    }
}
