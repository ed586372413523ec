//! Shared Task Cache
//!
//! Single source of truth for task status documents, keyed by task id.
//! Both the polling engine and the realtime engine write here; consumers
//! read or subscribe per key.
//!
//! Writes are last-writer-wins. Every write is stamped with a cache-wide
//! monotonically increasing revision so the order in which poll and push
//! results were applied is observable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use concept_visualizer_core::{TaskDocument, TaskId};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::debug;

/// Capacity of the invalidation broadcast. Slow listeners only lose
/// refresh hints, never documents.
const INVALIDATION_CAPACITY: usize = 64;

/// Where a cached document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateSource {
    Poll,
    Push,
    /// Initial fetch or a job-creation response.
    Seed,
}

/// A document together with its write metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedTask {
    pub document: TaskDocument,
    pub revision: u64,
    pub source: UpdateSource,
    pub applied_at: DateTime<Utc>,
    /// Set by [`TaskCache::invalidate`] until the next write.
    pub stale: bool,
}

/// Called after every write or eviction with the task id and new entry.
pub type CacheObserver = Arc<dyn Fn(&str, Option<&CachedTask>) + Send + Sync>;

struct Entries {
    slots: HashMap<TaskId, watch::Sender<Option<CachedTask>>>,
    revision: u64,
}

impl Entries {
    fn slot(&mut self, task_id: &str) -> &watch::Sender<Option<CachedTask>> {
        if !self.slots.contains_key(task_id) {
            // Evicted keys keep their slot while observed; drop the ones
            // whose last observer has gone since.
            self.slots
                .retain(|_, slot| slot.receiver_count() > 0 || slot.borrow().is_some());
        }
        self.slots
            .entry(task_id.to_string())
            .or_insert_with(|| watch::channel(None).0)
    }
}

/// Keyed, observable task store.
pub struct TaskCache {
    entries: RwLock<Entries>,
    invalidations: broadcast::Sender<TaskId>,
    observers: RwLock<Vec<CacheObserver>>,
}

impl Default for TaskCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskCache {
    pub fn new() -> Self {
        let (invalidations, _) = broadcast::channel(INVALIDATION_CAPACITY);
        Self {
            entries: RwLock::new(Entries {
                slots: HashMap::new(),
                revision: 0,
            }),
            invalidations,
            observers: RwLock::new(Vec::new()),
        }
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the entry for `document.id`. Returns the write's revision.
    pub fn insert(&self, document: TaskDocument, source: UpdateSource) -> u64 {
        let task_id = document.id.clone();
        let cached = {
            let mut entries = self.write_entries();
            entries.revision += 1;
            let cached = CachedTask {
                document,
                revision: entries.revision,
                source,
                applied_at: Utc::now(),
                stale: false,
            };
            entries.slot(&task_id).send_replace(Some(cached.clone()));
            cached
        };

        debug!(
            task_id = %task_id,
            status = %cached.document.status,
            revision = cached.revision,
            source = ?source,
            "cache write"
        );
        self.notify(&task_id, Some(&cached));
        cached.revision
    }

    pub fn get(&self, task_id: &str) -> Option<CachedTask> {
        self.read_entries()
            .slots
            .get(task_id)
            .and_then(|slot| slot.borrow().clone())
    }

    pub fn document(&self, task_id: &str) -> Option<TaskDocument> {
        self.get(task_id).map(|cached| cached.document)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.get(task_id).is_some()
    }

    /// Number of keys currently holding a document.
    pub fn len(&self) -> usize {
        self.read_entries()
            .slots
            .values()
            .filter(|slot| slot.borrow().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Revision of the most recent write anywhere in the cache.
    pub fn revision(&self) -> u64 {
        self.read_entries().revision
    }

    /// Observe one key. The receiver sees `None` until the first write and
    /// after an eviction.
    pub fn subscribe(&self, task_id: &str) -> watch::Receiver<Option<CachedTask>> {
        self.write_entries().slot(task_id).subscribe()
    }

    /// Mark the entry stale and ask every live poller of `task_id` to
    /// refetch. Returns whether anyone was listening.
    pub fn invalidate(&self, task_id: &str) -> bool {
        if let Some(slot) = self.read_entries().slots.get(task_id) {
            // Staleness alone is not a new value; don't wake subscribers.
            slot.send_if_modified(|current| {
                if let Some(cached) = current.as_mut() {
                    cached.stale = true;
                }
                false
            });
        }
        self.invalidations.send(task_id.to_string()).is_ok()
    }

    /// Stream of invalidated task ids.
    pub fn subscribe_invalidations(&self) -> broadcast::Receiver<TaskId> {
        self.invalidations.subscribe()
    }

    /// Drop the document for `task_id`.
    ///
    /// Keys that still have subscribers keep their slot and observe `None`.
    pub fn evict(&self, task_id: &str) -> bool {
        let removed = {
            let mut entries = self.write_entries();
            match entries.slots.get(task_id) {
                None => false,
                Some(slot) if slot.receiver_count() == 0 => {
                    let had_value = slot.borrow().is_some();
                    entries.slots.remove(task_id);
                    had_value
                }
                Some(slot) => slot.send_replace(None).is_some(),
            }
        };
        if removed {
            debug!(task_id, "cache evict");
            self.notify(task_id, None);
        }
        removed
    }

    /// Forget `task_id` if it holds no document and nobody observes it.
    /// Returns whether the key is now unknown to the cache.
    pub fn release(&self, task_id: &str) -> bool {
        let mut entries = self.write_entries();
        match entries.slots.get(task_id) {
            None => true,
            Some(slot) if slot.receiver_count() == 0 && slot.borrow().is_none() => {
                entries.slots.remove(task_id);
                true
            }
            Some(_) => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn slot_count(&self) -> usize {
        self.read_entries().slots.len()
    }

    /// Register a synchronous observer for all writes and evictions.
    pub fn observe(&self, observer: CacheObserver) {
        self.observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    fn notify(&self, task_id: &str, cached: Option<&CachedTask>) {
        let observers: Vec<CacheObserver> = self
            .observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for observer in observers {
            observer(task_id, cached);
        }
    }
}

/// Orders one session's cache writes against its teardown.
///
/// Once [`WriteGate::close`] returns, no write from the session can land,
/// so an eviction run inside `close` is final.
#[derive(Debug, Default)]
pub(crate) struct WriteGate {
    closed: Mutex<bool>,
}

impl WriteGate {
    /// Run `write` unless the gate is closed. Returns whether it ran.
    pub(crate) fn write(&self, write: impl FnOnce()) -> bool {
        let closed = self.closed.lock().unwrap_or_else(|e| e.into_inner());
        if *closed {
            return false;
        }
        write();
        true
    }

    pub(crate) fn close(&self, teardown: impl FnOnce()) {
        let mut closed = self.closed.lock().unwrap_or_else(|e| e.into_inner());
        *closed = true;
        teardown();
    }
}
