//! Active Task Capability
//!
//! The polling and realtime engines never reach for the global active-task
//! store directly. They receive this capability instead, which keeps the
//! store free to depend on the engines' cache without a cycle.

use std::sync::Mutex;

use crate::task::TaskId;

/// Read/write access to the application-wide "current" task id.
pub trait ActiveTaskAccess: Send + Sync {
    /// The task id currently in focus, if any.
    fn active_task_id(&self) -> Option<TaskId>;

    /// Replace the active task id. `None` clears it.
    fn set_active_task_id(&self, task_id: Option<TaskId>);

    fn clear_active_task(&self) {
        self.set_active_task_id(None);
    }

    fn is_active(&self, task_id: &str) -> bool {
        self.active_task_id().as_deref() == Some(task_id)
    }
}

/// Plain in-memory holder, for callers that need the capability without an
/// observable store.
#[derive(Debug, Default)]
pub struct ActiveTaskSlot {
    current: Mutex<Option<TaskId>>,
}

impl ActiveTaskSlot {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActiveTaskAccess for ActiveTaskSlot {
    fn active_task_id(&self) -> Option<TaskId> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_active_task_id(&self, task_id: Option<TaskId>) {
        *self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = task_id;
    }
}
