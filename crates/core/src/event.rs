//! Terminal Task Events
//!
//! The outcome delivered to consumers when a task reaches a terminal
//! state. Delivered once per task id by the polling engine.

use serde::Serialize;
use thiserror::Error;

use crate::task::{TaskDocument, TaskId, TaskStatus};

/// Error describing a task that the backend reported as failed.
///
/// This is a normal terminal outcome, not a transport failure.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("Task {task_id} failed: {message}")]
pub struct TaskFailure {
    pub task_id: TaskId,
    pub message: String,
}

impl TaskFailure {
    /// Message used when the backend sends no `error_message`.
    pub const DEFAULT_MESSAGE: &'static str = "Task failed";

    pub fn from_document(document: &TaskDocument) -> Self {
        Self {
            task_id: document.id.clone(),
            message: document
                .error_message
                .clone()
                .filter(|msg| !msg.trim().is_empty())
                .unwrap_or_else(|| Self::DEFAULT_MESSAGE.to_string()),
        }
    }
}

/// Terminal outcome of a tracked task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Completed(TaskDocument),
    Failed {
        document: TaskDocument,
        error: TaskFailure,
    },
}

impl TaskEvent {
    /// Build the event for a terminal document; `None` for non-terminal ones.
    pub fn from_document(document: &TaskDocument) -> Option<Self> {
        match document.status {
            TaskStatus::Completed => Some(TaskEvent::Completed(document.clone())),
            TaskStatus::Failed => Some(TaskEvent::Failed {
                document: document.clone(),
                error: TaskFailure::from_document(document),
            }),
            TaskStatus::Pending | TaskStatus::Processing => None,
        }
    }

    pub fn document(&self) -> &TaskDocument {
        match self {
            TaskEvent::Completed(document) => document,
            TaskEvent::Failed { document, .. } => document,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.document().id
    }
}
