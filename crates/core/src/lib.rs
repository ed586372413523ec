//! Concept Visualizer Core
//!
//! Task model, error types, and shared capabilities for the Concept
//! Visualizer task-tracking workspace. This crate has no dependency on the
//! HTTP/realtime transports or on the tracking engines.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `task` - Normalized task document (`TaskDocument`, `TaskStatus`, `TaskFlags`)
//! - `event` - Terminal outcomes (`TaskEvent`, `TaskFailure`)
//! - `active` - Active-task capability (`ActiveTaskAccess`)

pub mod active;
pub mod error;
pub mod event;
pub mod task;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Task Model ─────────────────────────────────────────────────────────
pub use task::{RawTaskDocument, TaskDocument, TaskFlags, TaskId, TaskStatus};

// ── Terminal Events ────────────────────────────────────────────────────
pub use event::{TaskEvent, TaskFailure};

// ── Active Task Capability ─────────────────────────────────────────────
pub use active::{ActiveTaskAccess, ActiveTaskSlot};
