//! Active Task Store
//!
//! Application-wide "current task" with derived selectors. Each selector is
//! its own watch channel and only wakes its subscribers when its own value
//! changes, so a consumer reading `is_task_completed` is not disturbed by
//! unrelated churn in the document.
//!
//! The store derives everything from the shared [`TaskCache`]; it never
//! fetches.

use std::sync::{Arc, Mutex, Weak};

use concept_visualizer_core::{ActiveTaskAccess, TaskDocument, TaskFlags, TaskId};
use tokio::sync::watch;
use tracing::debug;

use super::task_cache::{CachedTask, TaskCache};

/// Boolean selectors exposed by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSelector {
    Pending,
    Processing,
    Completed,
    Failed,
    HasActiveTask,
}

struct Selectors {
    // Serializes recomputation between the cache observer and setters.
    publish_lock: Mutex<()>,
    active_task_id: watch::Sender<Option<TaskId>>,
    latest: watch::Sender<Option<TaskDocument>>,
    pending: watch::Sender<bool>,
    processing: watch::Sender<bool>,
    completed: watch::Sender<bool>,
    failed: watch::Sender<bool>,
    has_active: watch::Sender<bool>,
}

fn publish_flag(sender: &watch::Sender<bool>, value: bool) {
    sender.send_if_modified(|current| {
        if *current == value {
            return false;
        }
        *current = value;
        true
    });
}

impl Selectors {
    fn new() -> Self {
        Self {
            publish_lock: Mutex::new(()),
            active_task_id: watch::channel(None).0,
            latest: watch::channel(None).0,
            pending: watch::channel(false).0,
            processing: watch::channel(false).0,
            completed: watch::channel(false).0,
            failed: watch::channel(false).0,
            has_active: watch::channel(false).0,
        }
    }

    fn flag(&self, selector: TaskSelector) -> &watch::Sender<bool> {
        match selector {
            TaskSelector::Pending => &self.pending,
            TaskSelector::Processing => &self.processing,
            TaskSelector::Completed => &self.completed,
            TaskSelector::Failed => &self.failed,
            TaskSelector::HasActiveTask => &self.has_active,
        }
    }

    /// Must be called with `publish_lock` held.
    fn publish(&self, document: Option<&TaskDocument>) {
        let has_active = self.active_task_id.borrow().is_some();
        let document = if has_active { document } else { None };
        let flags = TaskFlags::from_document(document);

        self.latest.send_if_modified(|current| {
            if current.as_ref() == document {
                return false;
            }
            *current = document.cloned();
            true
        });
        publish_flag(&self.pending, flags.is_pending);
        publish_flag(&self.processing, flags.is_processing);
        publish_flag(&self.completed, flags.is_completed);
        publish_flag(&self.failed, flags.is_failed);
        publish_flag(&self.has_active, has_active);
    }

    /// Notifications can arrive out of write order when writers race, so
    /// the entry is re-read under the lock rather than taken from the
    /// notification.
    fn on_cache_write(&self, cache: &TaskCache, task_id: &str) {
        let _guard = self.publish_lock.lock().unwrap_or_else(|e| e.into_inner());
        let is_active = self.active_task_id.borrow().as_deref() == Some(task_id);
        if is_active {
            let document = cache.document(task_id);
            self.publish(document.as_ref());
        }
    }
}

/// Observable active-task store backed by the shared cache.
pub struct ActiveTaskStore {
    cache: Arc<TaskCache>,
    selectors: Arc<Selectors>,
}

impl ActiveTaskStore {
    pub fn new(cache: Arc<TaskCache>) -> Arc<Self> {
        let selectors = Arc::new(Selectors::new());
        let weak: Weak<Selectors> = Arc::downgrade(&selectors);
        let weak_cache: Weak<TaskCache> = Arc::downgrade(&cache);
        cache.observe(Arc::new(move |task_id: &str, _: Option<&CachedTask>| {
            if let (Some(selectors), Some(cache)) = (weak.upgrade(), weak_cache.upgrade()) {
                selectors.on_cache_write(&cache, task_id);
            }
        }));
        Arc::new(Self { cache, selectors })
    }

    pub fn set_active_task(&self, task_id: impl Into<TaskId>) {
        self.set_active_task_id(Some(task_id.into()));
    }

    pub fn active_task_id(&self) -> Option<TaskId> {
        self.selectors.active_task_id.borrow().clone()
    }

    /// Latest cached document of the active task.
    pub fn latest_document(&self) -> Option<TaskDocument> {
        self.selectors.latest.borrow().clone()
    }

    pub fn has_active_task(&self) -> bool {
        self.get(TaskSelector::HasActiveTask)
    }

    pub fn is_task_pending(&self) -> bool {
        self.get(TaskSelector::Pending)
    }

    pub fn is_task_processing(&self) -> bool {
        self.get(TaskSelector::Processing)
    }

    pub fn is_task_completed(&self) -> bool {
        self.get(TaskSelector::Completed)
    }

    pub fn is_task_failed(&self) -> bool {
        self.get(TaskSelector::Failed)
    }

    pub fn get(&self, selector: TaskSelector) -> bool {
        *self.selectors.flag(selector).borrow()
    }

    pub fn flags(&self) -> TaskFlags {
        TaskFlags {
            is_pending: self.is_task_pending(),
            is_processing: self.is_task_processing(),
            is_completed: self.is_task_completed(),
            is_failed: self.is_task_failed(),
        }
    }

    /// Subscribe to a single boolean selector.
    pub fn watch(&self, selector: TaskSelector) -> watch::Receiver<bool> {
        self.selectors.flag(selector).subscribe()
    }

    pub fn watch_active_task_id(&self) -> watch::Receiver<Option<TaskId>> {
        self.selectors.active_task_id.subscribe()
    }

    pub fn watch_latest_document(&self) -> watch::Receiver<Option<TaskDocument>> {
        self.selectors.latest.subscribe()
    }
}

impl ActiveTaskAccess for ActiveTaskStore {
    fn active_task_id(&self) -> Option<TaskId> {
        ActiveTaskStore::active_task_id(self)
    }

    /// Replacing or clearing the id leaves the cache untouched.
    fn set_active_task_id(&self, task_id: Option<TaskId>) {
        let selectors = &self.selectors;
        let _guard = selectors
            .publish_lock
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        let changed = selectors.active_task_id.send_if_modified(|current| {
            if *current == task_id {
                return false;
            }
            *current = task_id.clone();
            true
        });
        if changed {
            debug!(task_id = ?task_id, "active task changed");
        }

        let document = task_id.as_deref().and_then(|id| self.cache.document(id));
        selectors.publish(document.as_ref());
    }
}
