//! Concept Visualizer - Task Tracking Client
//!
//! Tracks long-running concept generation and refinement jobs by combining
//! fixed-interval polling with Supabase Realtime push updates. Both feed a
//! shared task cache, from which the active-task store derives its
//! selectors.
//!
//! It includes:
//! - Tracking services (cache, polling, realtime, active task)
//! - Storage layer (JSON config)
//! - Data models and utilities

pub mod models;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

// ── Configuration ──────────────────────────────────────────────────────
pub use models::settings::{AppConfig, SettingsUpdate};
pub use state::{build_tracker, AppState};
pub use storage::ConfigService;

// ── Tracking ───────────────────────────────────────────────────────────
pub use services::{
    ActiveTaskStore, PollConfig, PollOptions, ReconnectConfig, TaskCache, TaskPoller,
    TaskSelector, TaskSubscriber, TaskSubscription, TaskTracker, TaskWatch, TrackedTask,
    UpdateSource,
};

// ── Task Model ─────────────────────────────────────────────────────────
pub use concept_visualizer_core::{
    ActiveTaskAccess, TaskDocument, TaskEvent, TaskFailure, TaskFlags, TaskId, TaskStatus,
};

// ── Errors ─────────────────────────────────────────────────────────────
pub use utils::error::{AppError, AppResult};
