//! Task Document Model
//!
//! The normalized representation of one asynchronous backend job
//! (concept generation or refinement) and the adapter that produces it
//! from the loosely-shaped payloads the REST API and the realtime channel
//! deliver.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};

/// Stable identifier of a backend task.
pub type TaskId = String;

/// Lifecycle status of a task.
///
/// `Completed` and `Failed` are terminal: no further transitions are
/// expected once either is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Whether this status ends the task lifecycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(CoreError::parse(format!("unknown task status: {}", other))),
        }
    }
}

/// Task payload exactly as the backend sends it.
///
/// Some endpoints label the identifier `task_id`, others `id`. Everything
/// beyond the fields named here is carried through untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTaskDocument {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// Latest known state of one task.
///
/// Deserializing goes through [`RawTaskDocument`], so `task_id` aliasing
/// and unknown statuses are handled in one place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTaskDocument")]
pub struct TaskDocument {
    pub id: TaskId,
    pub status: TaskStatus,
    /// Only set when `status` is `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Opaque result references (`result_id`, `type`, timestamps, ...).
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl TaskDocument {
    pub fn new(id: impl Into<TaskId>, status: TaskStatus) -> Self {
        Self {
            id: id.into(),
            status,
            error_message: None,
            fields: Map::new(),
        }
    }

    /// Build a failed document carrying the backend's message.
    pub fn failed(id: impl Into<TaskId>, message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::new(id, TaskStatus::Failed)
        }
    }

    /// Attach an opaque field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Normalize a raw payload.
    ///
    /// `fallback_id` is used when the payload names no identifier at all,
    /// which happens for status responses addressed by URL path.
    pub fn from_raw(raw: RawTaskDocument, fallback_id: Option<&str>) -> CoreResult<Self> {
        let id = [raw.id, raw.task_id]
            .into_iter()
            .flatten()
            .find(|candidate| !candidate.trim().is_empty())
            .or_else(|| fallback_id.map(str::to_string))
            .ok_or_else(|| CoreError::parse("task document has neither id nor task_id"))?;

        let status: TaskStatus = raw
            .status
            .as_deref()
            .ok_or_else(|| CoreError::parse(format!("task {} has no status", id)))?
            .parse()?;

        let error_message = match status {
            TaskStatus::Failed => raw.error_message,
            _ => None,
        };

        Ok(Self {
            id,
            status,
            error_message,
            fields: raw.rest,
        })
    }

    /// Normalize an arbitrary JSON value.
    pub fn from_value(value: Value, fallback_id: Option<&str>) -> CoreResult<Self> {
        let raw: RawTaskDocument = serde_json::from_value(value)?;
        Self::from_raw(raw, fallback_id)
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Identifier of the produced concept, once the job completes.
    pub fn result_id(&self) -> Option<&str> {
        self.field("result_id").and_then(Value::as_str)
    }

    /// Server-side modification timestamp, when the backend provides one.
    pub fn updated_at(&self) -> Option<&str> {
        self.field("updated_at").and_then(Value::as_str)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl TryFrom<RawTaskDocument> for TaskDocument {
    type Error = CoreError;

    fn try_from(raw: RawTaskDocument) -> Result<Self, Self::Error> {
        Self::from_raw(raw, None)
    }
}

/// Boolean view over a task's status, as consumed by UI code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskFlags {
    pub is_pending: bool,
    pub is_processing: bool,
    pub is_completed: bool,
    pub is_failed: bool,
}

impl TaskFlags {
    pub fn from_status(status: Option<TaskStatus>) -> Self {
        Self {
            is_pending: status == Some(TaskStatus::Pending),
            is_processing: status == Some(TaskStatus::Processing),
            is_completed: status == Some(TaskStatus::Completed),
            is_failed: status == Some(TaskStatus::Failed),
        }
    }

    pub fn from_document(document: Option<&TaskDocument>) -> Self {
        Self::from_status(document.map(|doc| doc.status))
    }
}
