//! Task Tracker
//!
//! Wires the shared cache, the active-task store, the polling engine, and
//! (optionally) the realtime engine together, and exposes the job-creation
//! and cancellation calls that feed them.

use std::sync::Arc;

use concept_visualizer_api::{
    ConceptApi, GenerationRequest, RealtimeTransport, RefinementRequest, TaskApi,
};
use concept_visualizer_core::{TaskDocument, TaskEvent, TaskId};
use tracing::info;

use super::active_task::ActiveTaskStore;
use super::polling::{PollConfig, PollOptions, TaskPoller, TaskWatch, WatchState};
use super::realtime::{SubscriptionView, TaskSubscriber, TaskSubscription};
use super::reconnect::ReconnectConfig;
use super::task_cache::{TaskCache, UpdateSource};
use crate::utils::error::{AppError, AppResult};

pub struct TaskTracker {
    api: Arc<dyn TaskApi>,
    concepts: Option<Arc<dyn ConceptApi>>,
    cache: Arc<TaskCache>,
    active: Arc<ActiveTaskStore>,
    poller: TaskPoller,
    subscriber: Option<TaskSubscriber>,
}

impl TaskTracker {
    pub fn new(api: Arc<dyn TaskApi>, poll_config: PollConfig) -> Self {
        let cache = Arc::new(TaskCache::new());
        let active = ActiveTaskStore::new(cache.clone());
        let poller = TaskPoller::new(api.clone(), cache.clone(), poll_config);
        Self {
            api,
            concepts: None,
            cache,
            active,
            poller,
            subscriber: None,
        }
    }

    pub fn with_concepts(mut self, concepts: Arc<dyn ConceptApi>) -> Self {
        self.concepts = Some(concepts);
        self
    }

    /// Enable push updates alongside polling.
    pub fn with_realtime(
        mut self,
        transport: Arc<dyn RealtimeTransport>,
        config: ReconnectConfig,
    ) -> Self {
        self.subscriber = Some(TaskSubscriber::with_hydration(
            transport,
            self.api.clone(),
            self.cache.clone(),
            config,
        ));
        self
    }

    pub fn cache(&self) -> &Arc<TaskCache> {
        &self.cache
    }

    pub fn active_tasks(&self) -> &Arc<ActiveTaskStore> {
        &self.active
    }

    pub fn poller(&self) -> &TaskPoller {
        &self.poller
    }

    pub fn subscriber(&self) -> Option<&TaskSubscriber> {
        self.subscriber.as_ref()
    }

    fn concepts(&self) -> AppResult<&Arc<dyn ConceptApi>> {
        self.concepts
            .as_ref()
            .ok_or_else(|| AppError::config("concept endpoints are not configured"))
    }

    /// Start a generation job and make it the active task.
    pub async fn start_generation(&self, request: &GenerationRequest) -> AppResult<TaskDocument> {
        let document = self.concepts()?.start_generation(request).await?;
        info!(task_id = %document.id, "generation task started");
        self.adopt(document.clone());
        Ok(document)
    }

    /// Start a refinement job and make it the active task.
    pub async fn start_refinement(&self, request: &RefinementRequest) -> AppResult<TaskDocument> {
        let document = self.concepts()?.start_refinement(request).await?;
        info!(task_id = %document.id, "refinement task started");
        self.adopt(document.clone());
        Ok(document)
    }

    fn adopt(&self, document: TaskDocument) {
        let task_id = document.id.clone();
        self.cache.insert(document, UpdateSource::Seed);
        self.active.set_active_task(task_id);
    }

    /// Ask the backend to abort a task. Tracking is unaffected; the task
    /// ends when a terminal status is observed.
    pub async fn cancel(&self, task_id: &str) -> AppResult<TaskDocument> {
        if task_id.trim().is_empty() {
            return Err(AppError::validation("task id must not be empty"));
        }
        let acknowledgement = self.api.cancel_task(task_id).await?;
        info!(task_id, "cancellation requested");
        Ok(acknowledgement)
    }

    /// Poll `task_id`, and subscribe to its pushes when realtime is enabled.
    ///
    /// While polling is enabled the first poll doubles as the subscription's
    /// hydration, so the task is fetched once at startup.
    pub fn track(&self, task_id: Option<TaskId>, options: PollOptions) -> TrackedTask {
        let polling = options.enabled;
        let subscription = self.subscriber.as_ref().map(|subscriber| {
            if polling {
                subscriber.subscribe_cached(task_id.clone())
            } else {
                subscriber.subscribe(task_id.clone())
            }
        });
        let watch = self.poller.watch(task_id, options);
        TrackedTask {
            watch,
            subscription,
        }
    }

    /// Track whichever task is currently active.
    pub fn track_active(&self, options: PollOptions) -> TrackedTask {
        self.track(self.active.active_task_id(), options)
    }
}

/// A task followed by both engines.
pub struct TrackedTask {
    watch: TaskWatch,
    subscription: Option<TaskSubscription>,
}

impl TrackedTask {
    pub fn task_id(&self) -> Option<TaskId> {
        self.watch.task_id()
    }

    pub fn state(&self) -> WatchState {
        self.watch.state()
    }

    pub fn subscription(&self) -> Option<SubscriptionView> {
        self.subscription.as_ref().map(TaskSubscription::view)
    }

    pub fn watch(&self) -> &TaskWatch {
        &self.watch
    }

    pub fn refresh(&self) -> bool {
        self.watch.refresh()
    }

    pub fn set_task_id(&mut self, task_id: Option<TaskId>) {
        if let Some(subscription) = self.subscription.as_mut() {
            subscription.set_task_id(task_id.clone());
        }
        self.watch.set_task_id(task_id);
    }

    pub fn stop(&mut self) {
        if let Some(subscription) = self.subscription.as_mut() {
            subscription.unsubscribe();
        }
        self.watch.stop();
    }

    pub async fn wait_for_outcome(&self) -> Option<TaskEvent> {
        self.watch.wait_for_outcome().await
    }
}
