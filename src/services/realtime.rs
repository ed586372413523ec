//! Realtime Subscription Engine
//!
//! A [`TaskSubscription`] holds a push channel open for one task id and
//! writes every delivered document into the shared cache, where the
//! polling engine and the active-task store pick it up.
//!
//! Session lifecycle:
//!
//! ```text
//! hydrate (cache hit, or one fetch)
//!   -> open channel -> subscribing -> subscribed
//!        update      -> cache write; terminal ends the session
//!        error/close/timeout -> wait delay -> reopen (bounded)
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use concept_visualizer_api::{ChannelEvent, ChannelStatus, RealtimeTransport, TaskApi};
use concept_visualizer_core::{TaskDocument, TaskId};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::reconnect::{ReconnectAction, ReconnectConfig, ReconnectMachine, SubscriptionStatus};
use super::task_cache::{TaskCache, UpdateSource, WriteGate};

const EVENT_BUFFER: usize = 32;

/// What a subscription currently knows about its task.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubscriptionView {
    pub task_id: Option<TaskId>,
    /// Last document this subscription hydrated or received over its
    /// channel. Poll writes to the same id show up in the cache, not here.
    pub document: Option<TaskDocument>,
    pub status: SubscriptionStatus,
    /// The session is running (hydrating, connected, or waiting to reconnect).
    pub is_active: bool,
}

struct SubscriberInner {
    transport: Arc<dyn RealtimeTransport>,
    hydration: Option<Arc<dyn TaskApi>>,
    cache: Arc<TaskCache>,
    config: ReconnectConfig,
    sessions: AtomicUsize,
}

/// Opens task subscriptions over a push transport.
#[derive(Clone)]
pub struct TaskSubscriber {
    inner: Arc<SubscriberInner>,
}

impl TaskSubscriber {
    pub fn new(
        transport: Arc<dyn RealtimeTransport>,
        cache: Arc<TaskCache>,
        config: ReconnectConfig,
    ) -> Self {
        Self::build(transport, None, cache, config)
    }

    /// Like [`TaskSubscriber::new`], fetching the task once when the cache
    /// has nothing for it yet.
    pub fn with_hydration(
        transport: Arc<dyn RealtimeTransport>,
        api: Arc<dyn TaskApi>,
        cache: Arc<TaskCache>,
        config: ReconnectConfig,
    ) -> Self {
        Self::build(transport, Some(api), cache, config)
    }

    fn build(
        transport: Arc<dyn RealtimeTransport>,
        hydration: Option<Arc<dyn TaskApi>>,
        cache: Arc<TaskCache>,
        config: ReconnectConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SubscriberInner {
                transport,
                hydration,
                cache,
                config,
                sessions: AtomicUsize::new(0),
            }),
        }
    }

    pub fn subscribe(&self, task_id: Option<TaskId>) -> TaskSubscription {
        self.open_subscription(task_id, true)
    }

    /// Subscribe without the hydration fetch. The view is still seeded from
    /// the cache. For callers that poll the same id and fetch it anyway.
    pub fn subscribe_cached(&self, task_id: Option<TaskId>) -> TaskSubscription {
        self.open_subscription(task_id, false)
    }

    fn open_subscription(&self, task_id: Option<TaskId>, fetch: bool) -> TaskSubscription {
        let (view, _) = watch::channel(SubscriptionView::default());
        let mut subscription = TaskSubscription {
            subscriber: self.clone(),
            view: Arc::new(view),
            fetch,
            session: None,
        };
        subscription.start(task_id);
        subscription
    }

    /// Number of live subscription sessions.
    pub fn active_sessions(&self) -> usize {
        self.inner.sessions.load(Ordering::SeqCst)
    }

    pub fn cache(&self) -> &Arc<TaskCache> {
        &self.inner.cache
    }
}

/// Handle to one consumer's subscription. Dropping it closes the channel.
pub struct TaskSubscription {
    subscriber: TaskSubscriber,
    view: Arc<watch::Sender<SubscriptionView>>,
    fetch: bool,
    session: Option<(CancellationToken, Arc<WriteGate>)>,
}

impl TaskSubscription {
    fn start(&mut self, task_id: Option<TaskId>) {
        let cache = &self.subscriber.inner.cache;
        let document = task_id.as_deref().and_then(|id| cache.document(id));
        self.view.send_replace(SubscriptionView {
            is_active: task_id.is_some(),
            task_id: task_id.clone(),
            document,
            status: SubscriptionStatus::default(),
        });

        let Some(task_id) = task_id else {
            return;
        };
        let cancel = CancellationToken::new();
        let gate = Arc::new(WriteGate::default());
        let session = SubscriptionSession {
            guard: SessionGuard::new(self.subscriber.inner.clone()),
            task_id,
            view: self.view.clone(),
            fetch: self.fetch,
            cancel: cancel.clone(),
            gate: gate.clone(),
        };
        tokio::spawn(session.run());
        self.session = Some((cancel, gate));
    }

    /// Once this returns the session writes nothing more to the cache.
    fn teardown(&mut self) {
        if let Some((cancel, gate)) = self.session.take() {
            gate.close(|| cancel.cancel());
        }
    }

    pub fn task_id(&self) -> Option<TaskId> {
        self.view.borrow().task_id.clone()
    }

    pub fn view(&self) -> SubscriptionView {
        self.view.borrow().clone()
    }

    pub fn status(&self) -> SubscriptionStatus {
        self.view.borrow().status.clone()
    }

    pub fn document(&self) -> Option<TaskDocument> {
        self.view.borrow().document.clone()
    }

    pub fn is_active(&self) -> bool {
        self.view.borrow().is_active
    }

    pub fn watch(&self) -> watch::Receiver<SubscriptionView> {
        self.view.subscribe()
    }

    /// Move the subscription to another task, closing the current channel.
    pub fn set_task_id(&mut self, task_id: Option<TaskId>) {
        if self.task_id() == task_id {
            return;
        }
        self.teardown();
        self.start(task_id);
    }

    pub fn unsubscribe(&mut self) {
        self.teardown();
        self.view.send_modify(|view| view.is_active = false);
    }
}

impl Drop for TaskSubscription {
    fn drop(&mut self) {
        self.teardown();
    }
}

struct SessionGuard {
    inner: Arc<SubscriberInner>,
}

impl SessionGuard {
    fn new(inner: Arc<SubscriberInner>) -> Self {
        inner.sessions.fetch_add(1, Ordering::SeqCst);
        Self { inner }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.inner.sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

/// How an attached channel stopped.
enum Detach {
    Cancelled,
    Terminal,
    Failed(ReconnectAction),
}

struct SubscriptionSession {
    guard: SessionGuard,
    task_id: TaskId,
    view: Arc<watch::Sender<SubscriptionView>>,
    fetch: bool,
    cancel: CancellationToken,
    gate: Arc<WriteGate>,
}

impl SubscriptionSession {
    fn inner(&self) -> &SubscriberInner {
        &self.guard.inner
    }

    async fn run(self) {
        let mut machine = ReconnectMachine::new(self.inner().config);

        if self.hydrate().await {
            debug!(task_id = %self.task_id, "task already terminal, not subscribing");
            self.finish(&mut machine);
            return;
        }

        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            machine.begin_subscribe();
            self.publish_status(&machine);

            let action = match self.attach(&mut machine).await {
                Detach::Cancelled => return,
                Detach::Terminal => {
                    info!(task_id = %self.task_id, "task finished, closing subscription");
                    self.finish(&mut machine);
                    return;
                }
                Detach::Failed(action) => action,
            };

            machine.mark_disconnected();
            self.publish_status(&machine);
            match action {
                ReconnectAction::Reconnect { attempt, delay } => {
                    info!(
                        task_id = %self.task_id,
                        attempt,
                        max_attempts = machine.config().max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "scheduling realtime reconnect"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                ReconnectAction::GiveUp => {
                    warn!(
                        task_id = %self.task_id,
                        attempts = machine.status().reconnect_attempts,
                        error = ?machine.status().last_error,
                        "realtime reconnect attempts exhausted"
                    );
                    self.finish(&mut machine);
                    return;
                }
            }
        }
    }

    /// Seed the view from the cache, or fetch once. Returns whether the
    /// task is already terminal.
    async fn hydrate(&self) -> bool {
        let inner = self.inner();
        if let Some(cached) = inner.cache.get(&self.task_id) {
            let terminal = cached.document.is_terminal();
            self.publish_document(cached.document);
            return terminal;
        }

        let Some(api) = inner.hydration.as_ref().filter(|_| self.fetch) else {
            return false;
        };
        let fetched = tokio::select! {
            _ = self.cancel.cancelled() => return false,
            result = api.fetch_task(&self.task_id) => result,
        };
        match fetched {
            Ok(document) if document.id == self.task_id => {
                let terminal = document.is_terminal();
                let seeded = self.gate.write(|| {
                    inner.cache.insert(document.clone(), UpdateSource::Seed);
                });
                if !seeded {
                    return false;
                }
                self.publish_document(document);
                terminal
            }
            Ok(document) => {
                warn!(
                    task_id = %self.task_id,
                    returned_id = %document.id,
                    "hydration returned a different task id"
                );
                false
            }
            Err(err) => {
                debug!(task_id = %self.task_id, error = %err, "hydration fetch failed");
                false
            }
        }
    }

    /// Open one channel and pump its events until it ends.
    async fn attach(&self, machine: &mut ReconnectMachine) -> Detach {
        let inner = self.inner();
        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);

        let opened = tokio::select! {
            _ = self.cancel.cancelled() => return Detach::Cancelled,
            result = inner.transport.open(&self.task_id, tx) => result,
        };
        let channel = match opened {
            Ok(channel) => channel,
            Err(err) => {
                warn!(task_id = %self.task_id, error = %err, "failed to open realtime channel");
                return Detach::Failed(machine.on_open_failed(err.to_string()));
            }
        };

        let detach = loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break Detach::Cancelled,
                event = rx.recv() => event,
            };
            match event {
                Some(ChannelEvent::Status(status)) => {
                    debug!(task_id = %self.task_id, status = ?status, "channel status");
                    let action = machine.on_status(&status);
                    self.publish_status(machine);
                    if let Some(action) = action {
                        break Detach::Failed(action);
                    }
                }
                Some(ChannelEvent::Update(document)) => {
                    if document.id != self.task_id {
                        continue;
                    }
                    let terminal = document.is_terminal();
                    let written = self.gate.write(|| {
                        inner.cache.insert(document.clone(), UpdateSource::Push);
                    });
                    if !written {
                        break Detach::Cancelled;
                    }
                    self.publish_document(document);
                    if terminal {
                        break Detach::Terminal;
                    }
                }
                None => {
                    let action = machine.on_status(&ChannelStatus::Closed);
                    self.publish_status(machine);
                    match action {
                        Some(action) => break Detach::Failed(action),
                        None => break Detach::Cancelled,
                    }
                }
            }
        };

        channel.close().await;
        detach
    }

    fn finish(&self, machine: &mut ReconnectMachine) {
        machine.mark_disconnected();
        let status = machine.status().clone();
        self.publish(|view| {
            view.status = status;
            view.is_active = false;
        });
    }

    fn publish_status(&self, machine: &ReconnectMachine) {
        let status = machine.status().clone();
        self.publish(|view| view.status = status);
    }

    fn publish_document(&self, document: TaskDocument) {
        self.publish(|view| view.document = Some(document));
    }

    fn publish(&self, update: impl FnOnce(&mut SubscriptionView)) {
        self.view.send_if_modified(|view| {
            if self.cancel.is_cancelled() || view.task_id.as_deref() != Some(self.task_id.as_str()) {
                return false;
            }
            let before = view.clone();
            update(view);
            *view != before
        });
    }
}
