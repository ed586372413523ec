//! Task Polling Engine
//!
//! A [`TaskWatch`] keeps one task's status fresh by fetching it on a fixed
//! interval until it reaches a terminal status. Fetch results go into the
//! shared [`TaskCache`]; the session observes the cache, so documents
//! delivered by the realtime engine are seen exactly like polled ones.
//!
//! Session loop, per watched id:
//!
//! ```text
//! cancel            -> exit
//! cache changed     -> observe (callbacks on terminal transition, stop)
//! interval tick     -> fetch with retry -> cache write
//! back-stop tick    -> invalidate id    -> every poller of the id refetches
//! invalidation      -> fetch with retry -> cache write
//! ```

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use concept_visualizer_api::{fetch_with_retry, RetryPolicy, TaskApi};
use concept_visualizer_core::{
    ActiveTaskAccess, TaskDocument, TaskEvent, TaskFailure, TaskFlags, TaskId,
};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::task_cache::{TaskCache, UpdateSource, WriteGate};
use super::transitions::TerminalTracker;

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Poller-wide timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Fetch cadence while a task is non-terminal (default: 2s)
    pub interval: Duration,
    /// Forced refresh of every watched id (default: 10s)
    pub backstop_interval: Duration,
    /// Retries for a failing fetch (default: 3 x 1s)
    pub retry: RetryPolicy,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            backstop_interval: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

pub type SuccessCallback = Arc<dyn Fn(&TaskDocument) + Send + Sync>;
pub type FailureCallback = Arc<dyn Fn(&TaskDocument, &TaskFailure) + Send + Sync>;

/// Per-consumer options for [`TaskPoller::watch`].
#[derive(Clone)]
pub struct PollOptions {
    pub enabled: bool,
    /// Overrides [`PollConfig::interval`].
    pub interval: Option<Duration>,
    pub on_success: Option<SuccessCallback>,
    pub on_failure: Option<FailureCallback>,
    /// When set, the active task is cleared once the watched task ends.
    pub active_task: Option<Arc<dyn ActiveTaskAccess>>,
    /// Evict the cache entry when the watch stops or switches ids.
    pub evict_on_stop: bool,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: None,
            on_success: None,
            on_failure: None,
            active_task: None,
            evict_on_stop: true,
        }
    }
}

impl fmt::Debug for PollOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollOptions")
            .field("enabled", &self.enabled)
            .field("interval", &self.interval)
            .field("on_success", &self.on_success.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .field("active_task", &self.active_task.is_some())
            .field("evict_on_stop", &self.evict_on_stop)
            .finish()
    }
}

impl PollOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn on_success(mut self, callback: impl Fn(&TaskDocument) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn on_failure(
        mut self,
        callback: impl Fn(&TaskDocument, &TaskFailure) + Send + Sync + 'static,
    ) -> Self {
        self.on_failure = Some(Arc::new(callback));
        self
    }

    pub fn clear_active_on_terminal(mut self, active: Arc<dyn ActiveTaskAccess>) -> Self {
        self.active_task = Some(active);
        self
    }

    pub fn evict_on_stop(mut self, evict: bool) -> Self {
        self.evict_on_stop = evict;
        self
    }
}

/// What a watch currently knows about its task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchState {
    pub task_id: Option<TaskId>,
    pub document: Option<TaskDocument>,
    pub flags: TaskFlags,
    /// A polling session is running.
    pub is_polling: bool,
    /// A fetch (including its retries) is in flight.
    pub is_fetching: bool,
    /// Last fetch failure, cleared by the next successful fetch.
    pub error: Option<String>,
    /// Terminal outcome once observed.
    pub outcome: Option<TaskEvent>,
}

struct PollerInner {
    api: Arc<dyn TaskApi>,
    cache: Arc<TaskCache>,
    config: PollConfig,
    tracker: TerminalTracker,
    sessions: AtomicUsize,
}

/// Spawns polling sessions against a shared cache.
#[derive(Clone)]
pub struct TaskPoller {
    inner: Arc<PollerInner>,
}

impl TaskPoller {
    pub fn new(api: Arc<dyn TaskApi>, cache: Arc<TaskCache>, config: PollConfig) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                api,
                cache,
                config,
                tracker: TerminalTracker::new(),
                sessions: AtomicUsize::new(0),
            }),
        }
    }

    /// Start watching `task_id`. `None` yields an idle watch.
    pub fn watch(&self, task_id: Option<TaskId>, options: PollOptions) -> TaskWatch {
        let (state, _) = watch::channel(WatchState::default());
        let mut watch = TaskWatch {
            poller: self.clone(),
            options,
            state: Arc::new(state),
            session: None,
        };
        watch.start(task_id);
        watch
    }

    /// Number of live polling sessions.
    pub fn active_sessions(&self) -> usize {
        self.inner.sessions.load(Ordering::SeqCst)
    }

    pub fn cache(&self) -> &Arc<TaskCache> {
        &self.inner.cache
    }

    pub fn tracker(&self) -> &TerminalTracker {
        &self.inner.tracker
    }

    pub fn config(&self) -> &PollConfig {
        &self.inner.config
    }
}

impl PollerInner {
    /// Drop what is kept about `task_id` once nothing caches or polls it.
    fn release(&self, task_id: &str) {
        if self.cache.release(task_id) {
            self.tracker.forget(task_id);
        }
    }
}

struct PollSession {
    task_id: TaskId,
    cancel: CancellationToken,
    gate: Arc<WriteGate>,
    handle: JoinHandle<()>,
}

/// Handle to one consumer's watch. Dropping it stops polling.
pub struct TaskWatch {
    poller: TaskPoller,
    options: PollOptions,
    state: Arc<watch::Sender<WatchState>>,
    session: Option<PollSession>,
}

impl TaskWatch {
    fn start(&mut self, task_id: Option<TaskId>) {
        let cache = &self.poller.inner.cache;
        let document = task_id.as_deref().and_then(|id| cache.document(id));
        let spawn = self.options.enabled && task_id.is_some();
        self.state.send_replace(WatchState {
            task_id: task_id.clone(),
            flags: TaskFlags::from_document(document.as_ref()),
            document,
            is_polling: spawn,
            ..WatchState::default()
        });

        let Some(task_id) = task_id.filter(|_| spawn) else {
            return;
        };
        let cancel = CancellationToken::new();
        let gate = Arc::new(WriteGate::default());
        let session = SessionTask {
            guard: SessionGuard::new(self.poller.inner.clone()),
            task_id: task_id.clone(),
            options: self.options.clone(),
            state: self.state.clone(),
            cancel: cancel.clone(),
            gate: gate.clone(),
        };
        let handle = tokio::spawn(session.run());
        self.session = Some(PollSession {
            task_id,
            cancel,
            gate,
            handle,
        });
    }

    fn teardown(&mut self, evict: bool) {
        if let Some(session) = self.session.take() {
            let inner = &self.poller.inner;
            session.gate.close(|| {
                session.cancel.cancel();
                if evict {
                    inner.cache.evict(&session.task_id);
                }
            });
            inner.release(&session.task_id);
            debug!(task_id = %session.task_id, "polling session torn down");
        }
    }

    pub fn task_id(&self) -> Option<TaskId> {
        self.state.borrow().task_id.clone()
    }

    pub fn state(&self) -> WatchState {
        self.state.borrow().clone()
    }

    pub fn document(&self) -> Option<TaskDocument> {
        self.state.borrow().document.clone()
    }

    pub fn flags(&self) -> TaskFlags {
        self.state.borrow().flags
    }

    pub fn error(&self) -> Option<String> {
        self.state.borrow().error.clone()
    }

    pub fn is_polling(&self) -> bool {
        self.state.borrow().is_polling
    }

    pub fn subscribe(&self) -> watch::Receiver<WatchState> {
        self.state.subscribe()
    }

    /// Refetch now. Does nothing once the session has ended.
    pub fn refresh(&self) -> bool {
        match &self.session {
            Some(session) if !session.handle.is_finished() => self
                .poller
                .inner
                .cache
                .invalidate(&session.task_id),
            _ => false,
        }
    }

    /// Switch to another task. The previous session is torn down first.
    pub fn set_task_id(&mut self, task_id: Option<TaskId>) {
        if self.task_id() == task_id {
            return;
        }
        self.teardown(self.options.evict_on_stop);
        self.start(task_id);
    }

    /// Pause or resume polling without forgetting the task or its cache
    /// entry.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.options.enabled == enabled {
            return;
        }
        self.options.enabled = enabled;
        let task_id = self.task_id();
        self.teardown(false);
        self.start(task_id);
    }

    pub fn stop(&mut self) {
        self.teardown(self.options.evict_on_stop);
        self.state.send_modify(|state| {
            state.is_polling = false;
            state.is_fetching = false;
        });
    }

    /// Wait until the task ends or polling stops.
    pub async fn wait_for_outcome(&self) -> Option<TaskEvent> {
        let mut rx = self.subscribe();
        let state = rx
            .wait_for(|state| state.outcome.is_some() || !state.is_polling)
            .await
            .ok()?;
        state.outcome.clone()
    }
}

impl Drop for TaskWatch {
    fn drop(&mut self) {
        self.teardown(self.options.evict_on_stop);
    }
}

/// Counts a live session for as long as it exists.
struct SessionGuard {
    inner: Arc<PollerInner>,
}

impl SessionGuard {
    fn new(inner: Arc<PollerInner>) -> Self {
        inner.sessions.fetch_add(1, Ordering::SeqCst);
        Self { inner }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.inner.sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

struct SessionTask {
    guard: SessionGuard,
    task_id: TaskId,
    options: PollOptions,
    state: Arc<watch::Sender<WatchState>>,
    cancel: CancellationToken,
    gate: Arc<WriteGate>,
}

impl SessionTask {
    fn inner(&self) -> &PollerInner {
        &self.guard.inner
    }

    async fn run(self) {
        let inner = self.guard.inner.clone();
        let task_id = self.task_id.clone();
        let period = self
            .options
            .interval
            .unwrap_or(inner.config.interval)
            .max(MIN_PERIOD);
        info!(task_id = %task_id, interval_ms = period.as_millis() as u64, "polling started");

        let mut cache_rx = inner.cache.subscribe(&task_id);
        let mut invalidations = inner.cache.subscribe_invalidations();

        let seeded = cache_rx.borrow_and_update().clone();
        let ended = match seeded {
            Some(cached) => self.observe(&cached.document),
            None => false,
        };

        if !ended {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let backstop = inner.config.backstop_interval.max(MIN_PERIOD);
            let mut backstop_ticker = interval_at(Instant::now() + backstop, backstop);
            backstop_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let should_fetch = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    changed = cache_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = cache_rx.borrow_and_update().clone();
                        match snapshot {
                            Some(cached) => {
                                if self.observe(&cached.document) {
                                    break;
                                }
                            }
                            None => self.publish(|state| {
                                state.document = None;
                                state.flags = TaskFlags::default();
                            }),
                        }
                        false
                    }
                    _ = ticker.tick() => true,
                    _ = backstop_ticker.tick() => {
                        debug!(task_id = %task_id, "back-stop refresh");
                        inner.cache.invalidate(&task_id);
                        false
                    }
                    received = invalidations.recv() => match received {
                        Ok(id) => id == task_id,
                        Err(broadcast::error::RecvError::Lagged(_)) => true,
                        Err(broadcast::error::RecvError::Closed) => false,
                    },
                };

                if should_fetch {
                    if !self.fetch().await {
                        break;
                    }
                    // Next tick is a full period after this fetch settled.
                    ticker.reset();
                }
            }
        }

        self.publish(|state| {
            state.is_polling = false;
            state.is_fetching = false;
        });
        drop(cache_rx);
        inner.release(&task_id);
        info!(task_id = %task_id, "polling stopped");
    }

    /// Fetch once (with retries) and write the result to the cache.
    /// Returns `false` when cancelled mid-flight.
    async fn fetch(&self) -> bool {
        let inner = self.inner();
        self.publish(|state| state.is_fetching = true);

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return false,
            result = fetch_with_retry(inner.api.as_ref(), &self.task_id, &inner.config.retry) => result,
        };

        match result {
            Ok(mut document) => {
                if document.id != self.task_id {
                    warn!(
                        task_id = %self.task_id,
                        returned_id = %document.id,
                        "status response carried a different task id"
                    );
                    document.id = self.task_id.clone();
                }
                let written = self.gate.write(|| {
                    inner.cache.insert(document, UpdateSource::Poll);
                });
                if !written {
                    return false;
                }
                self.publish(|state| {
                    state.is_fetching = false;
                    state.error = None;
                });
            }
            Err(err) => {
                warn!(task_id = %self.task_id, error = %err, "status fetch failed");
                let message = err.to_string();
                self.publish(|state| {
                    state.is_fetching = false;
                    state.error = Some(message);
                });
            }
        }
        true
    }

    /// Apply a cached document. Returns whether the task is terminal.
    fn observe(&self, document: &TaskDocument) -> bool {
        let terminal = document.is_terminal();
        self.publish(|state| {
            state.document = Some(document.clone());
            state.flags = TaskFlags::from_document(Some(document));
            if terminal {
                state.outcome = TaskEvent::from_document(document);
            }
        });

        if let Some(event) = self.inner().tracker.observe(document) {
            self.notify(&event);
        }
        terminal
    }

    fn notify(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Completed(document) => {
                info!(task_id = %document.id, "task completed");
                if let Some(callback) = &self.options.on_success {
                    callback(document);
                }
            }
            TaskEvent::Failed { document, error } => {
                warn!(task_id = %document.id, error = %error.message, "task failed");
                if let Some(callback) = &self.options.on_failure {
                    callback(document, error);
                }
            }
        }

        if let Some(active) = &self.options.active_task {
            if active.is_active(event.task_id()) {
                active.clear_active_task();
            }
        }
    }

    /// Publish into the watch state unless this session is stale.
    fn publish(&self, update: impl FnOnce(&mut WatchState)) {
        self.state.send_if_modified(|state| {
            if self.cancel.is_cancelled() || state.task_id.as_deref() != Some(self.task_id.as_str())
            {
                return false;
            }
            let before = state.clone();
            update(state);
            *state != before
        });
    }
}
