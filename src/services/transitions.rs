//! Terminal Transition Tracking
//!
//! Remembers the last status seen per task so that completion and failure
//! callbacks fire on the transition into a terminal status, and only once
//! per task, however many times the terminal document is re-observed.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use concept_visualizer_core::{TaskDocument, TaskEvent, TaskId, TaskStatus};

#[derive(Debug, Clone, Copy)]
struct Observation {
    last_status: TaskStatus,
    fired: bool,
}

#[derive(Debug, Default)]
pub struct TerminalTracker {
    seen: Mutex<HashMap<TaskId, Observation>>,
}

impl TerminalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn seen(&self) -> MutexGuard<'_, HashMap<TaskId, Observation>> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record `document` and return the terminal event if this observation
    /// is the task's first transition into a terminal status.
    pub fn observe(&self, document: &TaskDocument) -> Option<TaskEvent> {
        let mut seen = self.seen();
        let status = document.status;

        let mut changed = true;
        let observation = seen
            .entry(document.id.clone())
            .and_modify(|o| {
                changed = o.last_status != status;
                o.last_status = status;
            })
            .or_insert(Observation {
                last_status: status,
                fired: false,
            });

        if !changed || observation.fired || !status.is_terminal() {
            return None;
        }
        observation.fired = true;
        TaskEvent::from_document(document)
    }

    pub fn last_status(&self, task_id: &str) -> Option<TaskStatus> {
        self.seen().get(task_id).map(|o| o.last_status)
    }

    pub fn has_fired(&self, task_id: &str) -> bool {
        self.seen().get(task_id).is_some_and(|o| o.fired)
    }

    pub fn forget(&self, task_id: &str) {
        self.seen().remove(task_id);
    }
}
